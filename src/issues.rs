use crate::boxes::{BoxTree, FourCC};
use crate::error::{Error, Result};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

const INFO_BASE_URL: &str =
    "https://github.com/AOMediaCodec/av1-avif/wiki/Identified-issues-in-existing-AVIF-files";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "RENDERING DIFFERENCES")]
    RenderingDifferences,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::RenderingDifferences => "RENDERING DIFFERENCES",
            Severity::Critical => "CRITICAL",
        })
    }
}

/// What an issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Item(u32),
    Track(u32),
    File,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Item(id) => write!(f, "Item {id}"),
            Subject::Track(id) => write!(f, "Track {id}"),
            Subject::File => f.write_str("File"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub description: String,
}

/// Repairs an issue by mutating the box tree.
pub type FixFn = Box<dyn FnOnce(&mut BoxTree) -> Result<()>>;

struct Fix {
    description: String,
    apply: FixFn,
}

/// A validation finding for one box, with an optional fix.
pub struct Issue {
    pub subject: Subject,
    pub box_type: FourCC,
    pub findings: Vec<Finding>,
    info_section: Option<&'static str>,
    fix: Option<Fix>,
}

impl fmt::Debug for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issue")
            .field("subject", &self.subject)
            .field("box_type", &self.box_type)
            .field("findings", &self.findings)
            .field("info_section", &self.info_section)
            .field("fix", &self.fix_description())
            .finish()
    }
}

impl Issue {
    pub fn new(subject: Subject, box_type: &[u8; 4]) -> Self {
        Self {
            subject,
            box_type: FourCC(*box_type),
            findings: Vec::new(),
            info_section: None,
            fix: None,
        }
    }

    pub fn add(&mut self, severity: Severity, description: impl Into<String>) {
        self.findings.push(Finding { severity, description: description.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Section of the AVIF wiki page on known issues describing this one.
    pub fn set_info_section(&mut self, section: &'static str) {
        self.info_section = Some(section);
    }

    pub fn info_url(&self) -> Option<String> {
        self.info_section.map(|s| format!("{INFO_BASE_URL}#{s}"))
    }

    pub fn set_fix(
        &mut self,
        description: impl Into<String>,
        apply: impl FnOnce(&mut BoxTree) -> Result<()> + 'static,
    ) {
        self.fix = Some(Fix { description: description.into(), apply: Box::new(apply) });
    }

    pub fn has_fix(&self) -> bool {
        self.fix.is_some()
    }

    pub fn fix_description(&self) -> Option<&str> {
        self.fix.as_ref().map(|f| f.description.as_str())
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Runs the fix, then drops properties the fix left unreferenced.
    pub fn apply_fix(self, tree: &mut BoxTree) -> Result<()> {
        let Some(fix) = self.fix else {
            let summary = self
                .findings
                .first()
                .map(|f| f.description.clone())
                .unwrap_or_default();
            return Err(Error::NoFix(format!("{} '{}': {summary}", self.subject, self.box_type)));
        };
        debug!("applying fix for {} '{}': {}", self.subject, self.box_type, fix.description);
        (fix.apply)(tree)?;
        tree.compact_properties()
    }

    /// Findings grouped by severity, severities in order of first appearance.
    fn grouped(&self) -> Vec<(Severity, Vec<&str>)> {
        let mut groups: Vec<(Severity, Vec<&str>)> = Vec::new();
        for f in &self.findings {
            match groups.iter_mut().find(|(s, _)| *s == f.severity) {
                Some((_, list)) => list.push(&f.description),
                None => groups.push((f.severity, vec![&f.description])),
            }
        }
        groups
    }

    /// Human-readable listing. `others` are issues with identical findings on other subjects.
    pub fn render(&self, others: &[&Issue]) -> String {
        let mut out = String::new();
        if others.is_empty() {
            out.push_str(&format!("{}\n", self.subject));
        } else {
            let mut ids: Vec<String> = others.iter().map(|o| subject_id(o.subject)).collect();
            ids.sort();
            out.push_str(&format!("{} (also applies to [{}])\n", self.subject, ids.join(",")));
        }
        out.push_str(&format!("  Box {}\n", self.box_type));
        for (severity, descriptions) in self.grouped() {
            out.push_str(&format!("    {severity}\n"));
            for d in descriptions {
                out.push_str(&format!("      {d}\n"));
            }
        }
        if let Some(url) = self.info_url() {
            out.push_str(&format!("  See {url}\n"));
        }
        if let Some(fix) = self.fix_description() {
            out.push_str(&format!("  FIX: {fix}\n"));
        }
        out
    }

    pub fn report(&self) -> IssueReport {
        IssueReport {
            subject: self.subject,
            box_type: self.box_type,
            findings: self.findings.clone(),
            info_url: self.info_url(),
            fix: self.fix_description().map(str::to_owned),
        }
    }

    fn condense_key(&self) -> (bool, FourCC, Option<&str>, &[Finding]) {
        (
            matches!(self.subject, Subject::Track(_)),
            self.box_type,
            self.fix_description(),
            &self.findings,
        )
    }
}

fn subject_id(subject: Subject) -> String {
    match subject {
        Subject::Item(id) | Subject::Track(id) => id.to_string(),
        Subject::File => "file".to_owned(),
    }
}

/// Serializable view of an [`Issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReport {
    pub subject: Subject,
    pub box_type: FourCC,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

/// Groups issues with identical findings and fix, keeping the order of first appearance.
pub fn condense(issues: &[Issue]) -> Vec<(&Issue, Vec<&Issue>)> {
    let mut groups: Vec<(&Issue, Vec<&Issue>)> = Vec::new();
    let mut index = HashMap::new();
    for issue in issues {
        match index.get(&issue.condense_key()) {
            Some(&g) => {
                let (_, others): &mut (&Issue, Vec<&Issue>) = &mut groups[g];
                others.push(issue);
            }
            None => {
                index.insert(issue.condense_key(), groups.len());
                groups.push((issue, Vec::new()));
            }
        }
    }
    groups
}

/// Applies the fix of every issue in order. Issues without a fix are reported and skipped.
/// Returns the number of fixes applied.
pub fn apply_fixes(issues: Vec<Issue>, tree: &mut BoxTree) -> Result<usize> {
    let mut applied = 0;
    for issue in issues {
        if !issue.has_fix() {
            warn!("no fix available for {} '{}', skipping", issue.subject, issue.box_type);
            continue;
        }
        issue.apply_fix(tree)?;
        applied += 1;
    }
    Ok(applied)
}
