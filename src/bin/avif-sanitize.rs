use avif_sanitize::{
    apply_fixes,
    body::{BoxBody, Colr},
    issues::condense,
    validate_file, write_file_to_path, AvifFile, BoxTree, Error, Issue, IssueReport, NclxDefaults, NodeId,
};
use clap::{ArgAction, Parser};
use log::{info, LevelFilter};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

const ABOUT: &str = "Sanitize AVIF files without recompression.

Fixes some commonly identified container level issues in AVIF files. It is not
exhaustive and should not be considered a replacement for the AVIF compliance
warden available at https://gpac.github.io/ComplianceWarden-wasm/avif.html

Issues that require recompression are neither identified nor fixed.";

#[derive(Parser, Debug)]
#[command(version, about = "Sanitize AVIF files without recompression", long_about = ABOUT)]
struct Args {
    /// The source file
    src_file: PathBuf,

    /// The destination file (required unless --dry-run is set)
    dst_file: Option<PathBuf>,

    /// Don't rewrite the file, only check for known issues. Exits with code 2 if issues are found
    #[arg(short = 'o', long, action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Debug logging, box tree and issue listing
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Ask whether each issue should be fixed
    #[arg(short, long, action = ArgAction::SetTrue)]
    interactive: bool,

    /// Colour values used when adding a missing nclx 'colr' box, instead of 1 13 6 1
    #[arg(short, long, num_args = 4, value_names = ["P", "T", "M", "R"])]
    nclx_default: Option<Vec<u16>>,

    /// Print the issues as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Warn })
        .parse_default_env()
        .init();

    let code = run(&args)?;
    std::process::exit(code)
}

fn run(args: &Args) -> anyhow::Result<i32> {
    if !args.dry_run && args.dst_file.is_none() {
        eprintln!("'dst_file' must be specified if --dry-run is not set");
        return Ok(1);
    }
    if args.dry_run && args.interactive {
        eprintln!("'dry-run' and 'interactive' are mutually exclusive");
        return Ok(1);
    }
    if args.dst_file.as_ref() == Some(&args.src_file) {
        eprintln!("'src_file' and 'dst_file' must be different files");
        return Ok(1);
    }

    let defaults = match args.nclx_default.as_deref() {
        Some(&[p, t, m, r]) => NclxDefaults::from_values([p, t, m, r]),
        _ => NclxDefaults::default(),
    };

    let src = BufReader::new(File::open(&args.src_file)?);
    let mut avif = match AvifFile::parse(src) {
        Ok(avif) => avif,
        Err(Error::NotAvif(reason)) => {
            eprintln!("{}: not an AVIF file ({reason}). Cannot proceed.", args.src_file.display());
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    if args.verbose {
        for &root in avif.tree().roots() {
            print_box(avif.tree(), root, 0);
        }
    }

    let mut issues = validate_file(&mut avif, &defaults)?;

    if args.json {
        let reports: Vec<IssueReport> = issues.iter().map(Issue::report).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if args.interactive {
        issues = query_issues(issues)?;
    } else if args.verbose {
        for (issue, others) in condense(&issues) {
            print!("{}", issue.render(&others));
        }
    }

    if args.dry_run {
        return Ok(if issues.is_empty() { 0 } else { 2 });
    }

    let applied = apply_fixes(issues, avif.tree_mut())?;
    let Some(dst_path) = &args.dst_file else {
        return Ok(1);
    };
    write_file_to_path(&mut avif, dst_path)?;
    info!("applied {applied} fix(es), wrote {}", dst_path.display());
    Ok(0)
}

/// Prints each issue and keeps the ones the user wants fixed.
fn query_issues(issues: Vec<Issue>) -> anyhow::Result<Vec<Issue>> {
    let stdin = io::stdin();
    let mut keep = Vec::new();
    for issue in issues {
        print!("{}", issue.render(&[]));
        print!("Fix (Y/n)?: ");
        io::stdout().flush()?;
        let mut answer = String::new();
        stdin.lock().read_line(&mut answer)?;
        if answer.trim().eq_ignore_ascii_case("n") {
            println!("Skipping fix");
        } else {
            keep.push(issue);
        }
    }
    Ok(keep)
}

// ---------- Human-readable tree ----------

const PREVIEW_BYTES: usize = 16;

fn preview(data: &[u8]) -> String {
    let shown = &data[..data.len().min(PREVIEW_BYTES)];
    let more = if data.len() > PREVIEW_BYTES { "..." } else { "" };
    format!("{} bytes: {}{more}", data.len(), hex::encode(shown))
}

fn describe(body: &BoxBody) -> Option<String> {
    match body {
        BoxBody::Empty | BoxBody::Opaque | BoxBody::EntryCount(_) | BoxBody::LocalDataEntry => None,
        BoxBody::SampleEntry { .. } => None,
        BoxBody::Raw(data) => Some(preview(data)),
        BoxBody::Colr(Colr::Icc { kind, profile }) => Some(format!("{kind} {}", preview(profile))),
        BoxBody::Stco(entries) => Some(format!("{} chunk offsets", entries.len())),
        BoxBody::Co64(entries) => Some(format!("{} chunk offsets", entries.len())),
        BoxBody::Av1C(av1c) if !av1c.config_obus.is_empty() => Some(format!(
            "{:?}, config OBUs {}",
            av1c.config,
            preview(&av1c.config_obus)
        )),
        BoxBody::Av1C(av1c) => Some(format!("{:?}", av1c.config)),
        BoxBody::Hdlr(h) => Some(format!("handler '{}' name \"{}\"", h.handler_type, h.display_name())),
        other => Some(format!("{other:?}")),
    }
}

fn print_box(tree: &BoxTree, id: NodeId, depth: usize) {
    let indent = "  ".repeat(depth);
    let node = &tree[id];
    let kind = match (node.full, &node.children) {
        (Some(f), _) => format!(" (ver={}, flags=0x{:06x})", f.version, f.flags),
        (None, Some(_)) => " (container)".to_owned(),
        (None, None) => String::new(),
    };
    println!(
        "{indent}{:>6} {:>10} {}{kind}",
        format!("{:#x}", node.start),
        node.size,
        node.typ
    );
    if let Some(s) = describe(&node.body) {
        println!("{indent}        -> {s}");
    }
    for &kid in tree.children(id) {
        print_box(tree, kid, depth + 1);
    }
}
