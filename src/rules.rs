//! Validation rules. Each rule inspects the parsed file and returns issues whose fixes
//! go through the property graph and box tree mutators.

use crate::av1::SequenceHeader;
use crate::avif::{AvifFile, Item};
use crate::body::{Av1C, BoxBody, Ccst, Clap, Colr, Rational, TRACK_IN_MOVIE};
use crate::boxes::{BoxNode, BoxTree, FourCC, FullBoxHeader, NodeId};
use crate::error::{Error, Result};
use crate::issues::{Issue, Severity, Subject};
use crate::properties::{Property, PropertyFilter};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{Read, Seek};

const ALPHA_AUX_TYPE: &str = "urn:mpeg:mpegB:cicp:systems:auxiliary:alpha";

/// Colour values considered safe when an item carries no `nclx` box. Each list holds
/// the accepted values; the first one is used when a missing box is synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NclxDefaults {
    pub color_primaries: Vec<u16>,
    pub transfer_characteristics: Vec<u16>,
    pub matrix_coefficients: Vec<u16>,
    pub full_range: Vec<u16>,
}

impl Default for NclxDefaults {
    fn default() -> Self {
        Self {
            color_primaries: vec![1],
            transfer_characteristics: vec![13],
            matrix_coefficients: vec![6, 5],
            full_range: vec![1],
        }
    }
}

impl NclxDefaults {
    /// Single accepted value per field, in `primaries transfer matrix range` order.
    pub fn from_values([p, t, m, r]: [u16; 4]) -> Self {
        Self {
            color_primaries: vec![p],
            transfer_characteristics: vec![t],
            matrix_coefficients: vec![m],
            full_range: vec![r],
        }
    }

    fn fields(&self) -> [(&'static str, &[u16]); 4] {
        [
            ("color_primaries", &self.color_primaries),
            ("transfer_characteristics", &self.transfer_characteristics),
            ("matrix_coefficients", &self.matrix_coefficients),
            ("full_range_flag", &self.full_range),
        ]
    }
}

fn nclx_values(colr: &Colr) -> [u16; 4] {
    match colr {
        Colr::Nclx { color_primaries, transfer_characteristics, matrix_coefficients, full_range } => {
            [*color_primaries, *transfer_characteristics, *matrix_coefficients, *full_range as u16]
        }
        Colr::Icc { .. } => [2, 2, 2, 0],
    }
}

fn nclx_from_values([p, t, m, r]: [u16; 4]) -> Colr {
    Colr::Nclx {
        color_primaries: p,
        transfer_characteristics: t,
        matrix_coefficients: m,
        full_range: r != 0,
    }
}

fn v0() -> Option<FullBoxHeader> {
    Some(FullBoxHeader::default())
}

struct Validator<'a> {
    tree: &'a BoxTree,
    items: &'a [Item],
    headers: &'a HashMap<u32, SequenceHeader>,
    defaults: &'a NclxDefaults,
}

impl Validator<'_> {
    fn header(&self, item_id: u32) -> Result<&SequenceHeader> {
        self.headers
            .get(&item_id)
            .ok_or(Error::InvalidData("image item has no decodable AV1 Sequence Header"))
    }

    fn av01_item(&self, item: &Item) -> Result<Vec<Issue>> {
        let sh = self.header(item.id)?;
        let mut issues = Vec::new();
        issues.extend(self.av1c(item, sh)?);
        issues.extend(self.colr(item, sh.nclx()));
        issues.extend(self.pixi(item, sh.bits_per_channel()));
        issues.extend(self.lsel(item));
        issues.extend(self.ispe(item, sh.extents()));
        issues.extend(self.clap(item));
        Ok(issues)
    }

    fn grid_item(&self, item: &Item) -> Result<Vec<Issue>> {
        let Some(iref) = self.tree.find(&[b"meta", b"iref"]) else {
            return Ok(Vec::new());
        };
        let tiles = self
            .tree
            .children(iref)
            .iter()
            .filter(|&&r| self.tree[r].typ == b"dimg")
            .find_map(|&r| match &self.tree[r].body {
                BoxBody::SingleItemReference(r) if r.from_item_id == item.id => Some(&r.to_item_ids),
                _ => None,
            })
            .ok_or(Error::InvalidData("grid item has no 'dimg' tile references"))?;
        let (&first, rest) = tiles
            .split_first()
            .ok_or(Error::InvalidData("grid item references no tiles"))?;

        let first = self.header(first)?;
        let config = first.av1_config()?;
        for &tile in rest {
            if self.header(tile)?.av1_config()? != config {
                return Err(Error::InvalidData("not all tiles in a grid have the same av1C"));
            }
        }

        let mut issues = Vec::new();
        issues.extend(self.colr(item, first.nclx()));
        issues.extend(self.pixi(item, first.bits_per_channel()));
        Ok(issues)
    }

    fn av1c(&self, item: &Item, sh: &SequenceHeader) -> Result<Option<Issue>> {
        let generated = sh.av1_config()?;
        let mut issue = Issue::new(Subject::Item(item.id), b"av1C");
        let existing = item.property(self.tree, b"av1C").and_then(|p| match &self.tree[p].body {
            BoxBody::Av1C(av1c) => Some(av1c),
            _ => None,
        });

        let mut section = "bad-av1c";
        match existing {
            None => issue.add(Severity::Critical, "Image item lacks 'av1C' property."),
            Some(existing) => {
                if !existing.config_obus.is_empty() {
                    issue.add(Severity::Warning, "av1C in AVIF should not contain optional config OBUs");
                    section = "av1c-contains-optional-config-obus";
                }
                for ((key, have), (_, want)) in existing.config.fields().into_iter().zip(generated.fields()) {
                    if have != want {
                        issue.add(
                            Severity::Critical,
                            format!("av1C[{key}] does not match Sequence Header OBU. '{have}' != '{want}'."),
                        );
                        section = "bad-av1c";
                    }
                }
            }
        }
        if issue.is_empty() {
            return Ok(None);
        }

        let property = Property::new(
            b"av1C",
            None,
            BoxBody::Av1C(Av1C { config: generated, config_obus: Vec::new() }),
        );
        let item_id = item.id;
        issue.set_info_section(section);
        if existing.is_some() {
            issue.set_fix("Regenerate av1C from Sequence Header OBU", move |tree| {
                tree.replace_property(&property, item_id, &PropertyFilter::of_type(b"av1C"))
            });
        } else {
            issue.set_fix("Add av1C generated from Sequence Header OBU", move |tree| {
                tree.add_property(&property, item_id, true, None).map(|_| ())
            });
        }
        Ok(Some(issue))
    }

    fn colr(&self, item: &Item, generated: Colr) -> Option<Issue> {
        let mut has_nclx = false;
        let mut has_icc = false;
        let mut is_aux = false;
        for &(p, _) in &item.properties {
            match &self.tree[p].body {
                BoxBody::Colr(Colr::Nclx { .. }) => has_nclx = true,
                BoxBody::Colr(Colr::Icc { .. }) => has_icc = true,
                _ if self.tree[p].typ == b"auxC" => is_aux = true,
                _ => {}
            }
        }
        // TODO: decide which colour rules apply to auxiliary (alpha, depth) items
        if is_aux || has_nclx {
            return None;
        }

        let mut values = nclx_values(&generated);
        let missing = if has_icc { "nclx-colr box" } else { "any colr box" };
        let mut issue = Issue::new(Subject::Item(item.id), b"colr");
        for (i, (key, allowed)) in self.defaults.fields().into_iter().enumerate() {
            // primaries and transfer come from the ICC profile
            if has_icc && i < 2 {
                continue;
            }
            if !allowed.contains(&values[i]) {
                issue.add(
                    Severity::RenderingDifferences,
                    format!(
                        "Item lacks {missing} and Sequence Header OBU specifies {key} = {}. \
                         This may not render correctly in all implementations.",
                        values[i]
                    ),
                );
            }
        }
        if issue.is_empty() {
            return None;
        }

        if has_icc {
            values[0] = 2;
            values[1] = 2;
        } else {
            for (i, (_, allowed)) in self.defaults.fields().into_iter().enumerate().take(3) {
                if values[i] == 2 {
                    if let Some(&first) = allowed.first() {
                        values[i] = first;
                    }
                }
            }
        }

        let listed = values.map(|v| v.to_string()).join(",");
        let description = if has_icc {
            format!("Add second 'colr' box of type 'nclx' (in addition to existing ICC box), with values {listed}")
        } else {
            format!("Add 'colr' box of type 'nclx', with values {listed}")
        };
        let property = Property::new(b"colr", None, BoxBody::Colr(nclx_from_values(values)));
        let item_id = item.id;
        issue.set_info_section(if has_icc { "missing-nclx-colr-box" } else { "missing-colr-box" });
        issue.set_fix(description, move |tree| {
            tree.add_property(&property, item_id, true, None).map(|_| ())
        });
        Some(issue)
    }

    fn pixi(&self, item: &Item, bits_per_channel: Vec<u8>) -> Option<Issue> {
        let existing = item.property(self.tree, b"pixi").and_then(|p| match &self.tree[p].body {
            BoxBody::Pixi { bits_per_channel } => Some(bits_per_channel),
            _ => None,
        });
        if existing == Some(&bits_per_channel) {
            return None;
        }

        let mut issue = Issue::new(Subject::Item(item.id), b"pixi");
        match existing {
            None => issue.add(Severity::Warning, "No 'pixi' present. This is a requirement by MIAF."),
            Some(have) => issue.add(
                Severity::Warning,
                format!("'pixi' does not match AV1 Sequence Header OBU. {have:?} != {bits_per_channel:?}."),
            ),
        }

        let replace = existing.is_some();
        let property = Property::new(b"pixi", v0(), BoxBody::Pixi { bits_per_channel });
        let item_id = item.id;
        issue.set_info_section("missing-or-incorrect-pixi");
        let action = if replace { "Regenerate" } else { "Add" };
        issue.set_fix(format!("{action} pixi from Sequence Header OBU"), move |tree| {
            if replace {
                tree.replace_property(&property, item_id, &PropertyFilter::of_type(b"pixi"))
            } else {
                tree.add_property(&property, item_id, false, None).map(|_| ())
            }
        });
        Some(issue)
    }

    fn lsel(&self, item: &Item) -> Option<Issue> {
        let typ_present = |typ: &[u8; 4]| item.property(self.tree, typ).is_some();
        let multilayer = typ_present(b"a1lx") || typ_present(b"a1op");
        if !multilayer || typ_present(b"lsel") {
            return None;
        }

        let mut issue = Issue::new(Subject::Item(item.id), b"lsel");
        issue.add(
            Severity::Critical,
            "'a1lx' or 'a1op' property present, but 'lsel' not present. \
             'lsel' is required for multilayer content.",
        );
        let property = Property::new(b"lsel", None, BoxBody::Raw(vec![0xFF, 0xFF]));
        let item_id = item.id;
        issue.set_fix("Add 0xFFFF 'lsel' property.", move |tree| {
            tree.add_property(&property, item_id, true, None).map(|_| ())
        });
        Some(issue)
    }

    fn ispe(&self, item: &Item, (width, height): (u32, u32)) -> Option<Issue> {
        let mut ispe_index = None;
        let mut first_transform = None;
        for (i, &(p, _)) in item.properties.iter().enumerate() {
            let typ = self.tree[p].typ;
            if first_transform.is_none() && [b"clap", b"imir", b"irot"].iter().any(|t| typ == *t) {
                first_transform = Some(i);
            } else if typ == b"ispe" {
                ispe_index = Some(i);
            }
        }

        let item_id = item.id;
        let mut issue = Issue::new(Subject::Item(item_id), b"ispe");
        match (ispe_index, first_transform) {
            (None, _) => {
                issue.add(Severity::Critical, "Image item lacks 'ispe' property.");
                let property = Property::new(b"ispe", v0(), BoxBody::Ispe { width, height });
                issue.set_info_section("missing-ispe");
                issue.set_fix(format!("Add 'ispe' with dimensions {width}x{height}."), move |tree| {
                    tree.add_property(&property, item_id, true, Some(0)).map(|_| ())
                });
            }
            (Some(ispe), Some(transform)) if ispe > transform => {
                issue.add(Severity::Warning, "'ispe' property comes after transformational properties.");
                let property = Property::of(&self.tree[item.properties[ispe].0]);
                issue.set_info_section("ispe-comes-after-transformational-properties");
                issue.set_fix(
                    "Change order of property associations to place 'ispe' first.",
                    move |tree| {
                        let index = tree
                            .find_existing_property(&property)
                            .ok_or(Error::InvalidData("'ispe' property disappeared"))?;
                        tree.remove_associations(item_id, &PropertyFilter::of_type(b"ispe"))?;
                        tree.add_association(item_id, index, true, Some(0))
                    },
                );
            }
            _ => return None,
        }
        Some(issue)
    }

    fn clap(&self, item: &Item) -> Vec<Issue> {
        let mut ispe = None;
        let mut clap = None;
        let mut transformed_first = false;
        for &(p, _) in &item.properties {
            match &self.tree[p].body {
                _ if clap.is_none() && (self.tree[p].typ == b"imir" || self.tree[p].typ == b"irot") => {
                    transformed_first = true;
                }
                BoxBody::Ispe { width, height } => ispe = Some([*width as f64, *height as f64]),
                BoxBody::Clap(c) => clap = Some(*c),
                _ => {}
            }
        }

        let Some(clap) = clap else {
            return Vec::new();
        };
        let Some(image) = ispe else {
            warn!("item {}: found 'clap' but no 'ispe'; fix the file by adding 'ispe' first", item.id);
            return Vec::new();
        };
        if transformed_first {
            warn!("item {}: 'clap' comes after 'imir'/'irot', validating it is unsupported", item.id);
            return Vec::new();
        }

        let offset = [clap.h_offset.as_f64(), clap.v_offset.as_f64()];
        let dims = [clap.width.as_f64(), clap.height.as_f64()];
        let origin: [f64; 2] = std::array::from_fn(|i| offset[i] + (image[i] - dims[i]) / 2.0);
        let trunc = origin.map(f64::trunc);

        let item_id = item.id;
        let mut issues = Vec::new();
        if trunc.iter().any(|&v| v < 0.0) {
            let mut issue = Issue::new(Subject::Item(item_id), b"clap");
            issue.add(Severity::Critical, format!("'clap' origin is negative. {}x{}", origin[0], origin[1]));
            issues.push(issue);
        } else if origin.iter().zip(trunc).any(|(o, t)| (o - t).abs() > 0.0001) {
            let mut issue = Issue::new(Subject::Item(item_id), b"clap");
            let fits = (0..2).all(|i| origin[i] + dims[i] <= image[i]);
            let severity = if fits { Severity::Warning } else { Severity::Critical };
            issue.add(severity, format!("'clap' origin is not integer valued. {}x{}", origin[0], origin[1]));

            let fixed: [f64; 2] = std::array::from_fn(|i| trunc[i] + (dims[i] - image[i]) / 2.0);
            let property = Property::new(
                b"clap",
                None,
                BoxBody::Clap(Clap {
                    h_offset: Rational::new((fixed[0] * 2.0).round_ties_even() as i32, 2),
                    v_offset: Rational::new((fixed[1] * 2.0).round_ties_even() as i32, 2),
                    ..clap
                }),
            );
            issue.set_fix(format!("Truncate 'clap' origin to {}x{}", trunc[0], trunc[1]), move |tree| {
                tree.replace_property(&property, item_id, &PropertyFilter::of_type(b"clap"))
            });
            issues.push(issue);
        }

        if (0..2).any(|i| trunc[i] + dims[i] > image[i]) {
            let mut issue = Issue::new(Subject::Item(item_id), b"clap");
            issue.add(Severity::Critical, "'clap' property is out of bounds.");
            issues.push(issue);
        }
        issues
    }

    fn primary_item(&self) -> Result<Option<Issue>> {
        let Some(meta) = self.tree.find(&[b"meta"]) else {
            return Ok(None);
        };
        if self.tree.child(meta, b"pitm").is_some() {
            return Ok(None);
        }
        let item_id = self
            .items
            .iter()
            .find(|i| !i.hidden)
            .map(|i| i.id)
            .ok_or(Error::InvalidData("no non-hidden item to make primary"))?;

        let mut issue = Issue::new(Subject::Item(item_id), b"pitm");
        issue.add(Severity::Critical, "No primary item found.");
        issue.set_fix("Add primary item to first non-hidden item in file", move |tree| {
            let version = if item_id <= 0xFFFF { 0 } else { 1 };
            let pitm = BoxNode::new(
                FourCC(*b"pitm"),
                Some(FullBoxHeader::new(version, 0)),
                BoxBody::Pitm { item_id },
            );
            tree.append_child(meta, pitm);
            Ok(())
        });
        Ok(Some(issue))
    }

    fn track(&self, trak: NodeId) -> Vec<Issue> {
        let tree = self.tree;
        let (Some(tkhd), Some(hdlr)) = (tree.find_below(trak, &[b"tkhd"]), tree.find_below(trak, &[b"mdia", b"hdlr"]))
        else {
            return Vec::new();
        };
        let (BoxBody::Tkhd(header), BoxBody::Hdlr(handler)) = (&tree[tkhd].body, &tree[hdlr].body) else {
            return Vec::new();
        };
        let track = Subject::Track(header.track_id);
        let in_movie = tree[tkhd].full.is_some_and(|f| f.flags & TRACK_IN_MOVIE != 0);
        let sample_entry = tree.find_below(trak, &[b"mdia", b"minf", b"stbl", b"stsd", b"av01"]);
        let is_aux = tree.find_below(trak, &[b"tref", b"auxl"]).is_some();

        let mut issues = Vec::new();
        if is_aux {
            if handler.handler_type != b"auxv" {
                let mut issue = Issue::new(track, b"hdlr");
                issue.add(
                    Severity::Critical,
                    format!("Handler type for auxiliary track is '{}', not 'auxv'", handler.handler_type),
                );
                issue.set_info_section("incorrect-track-handler-type-for-auxiliary-track");
                issue.set_fix("Change handler type to auxv", move |tree| {
                    if let BoxBody::Hdlr(h) = &mut tree.get_mut(hdlr).body {
                        h.handler_type = FourCC(*b"auxv");
                    }
                    tree.mark_dirty(hdlr);
                    Ok(())
                });
                issues.push(issue);
            }
            if let Some(av01) = sample_entry.filter(|&e| tree.child(e, b"auxi").is_none()) {
                let mut issue = Issue::new(track, b"av01");
                issue.add(
                    Severity::Warning,
                    "'auxi' not present in sample entry. Most readers will assume track is alpha.",
                );
                issue.set_info_section("auxi-not-present-for-auxv-track");
                issue.set_fix("Add alpha 'auxi' box", move |tree| {
                    let auxi = BoxBody::Auxi { aux_track_type: ALPHA_AUX_TYPE.to_owned() };
                    tree.append_child(av01, BoxNode::new(FourCC(*b"auxi"), v0(), auxi));
                    Ok(())
                });
                issues.push(issue);
            }
            if in_movie {
                let mut issue = Issue::new(track, b"tkhd");
                issue.add(
                    Severity::Warning,
                    "Auxiliary track has track_in_movie flag set to true. \
                     Some parsers may treat this track as directly displayable.",
                );
                issue.set_info_section("incorrect-value-for-track_in_movie-flag");
                issue.set_fix("Set track_in_movie flag to false.", move |tree| {
                    set_track_in_movie(tree, tkhd, false);
                    Ok(())
                });
                issues.push(issue);
            }
            return issues;
        }

        // TODO: validate 'vide' tracks
        if handler.handler_type != b"pict" {
            return issues;
        }
        if !in_movie {
            let mut issue = Issue::new(track, b"tkhd");
            issue.add(
                Severity::Warning,
                "'pict' track has track_in_movie flag set to false. Some parsers may ignore this track.",
            );
            issue.set_info_section("incorrect-value-for-track_in_movie-flag");
            issue.set_fix("Set track_in_movie flag to true.", move |tree| {
                set_track_in_movie(tree, tkhd, true);
                Ok(())
            });
            issues.push(issue);
        }
        if let Some(av01) = sample_entry.filter(|&e| tree.child(e, b"ccst").is_none()) {
            let mut issue = Issue::new(track, b"av01");
            issue.add(Severity::Warning, "'ccst' not present in sample entry.");
            issue.set_info_section("ccst-not-present-for-pict-track");
            issue.set_fix("Add most permissive 'ccst' box", move |tree| {
                let ccst = Ccst { all_ref_pics_intra: false, intra_pred_used: true, max_ref_per_pic: 15 };
                tree.append_child(av01, BoxNode::new(FourCC(*b"ccst"), v0(), BoxBody::Ccst(ccst)));
                Ok(())
            });
            issues.push(issue);
        }
        issues
    }

    fn profile_brands(&self) -> Result<Vec<Issue>> {
        let tree = self.tree;
        let ftyp = tree.find(&[b"ftyp"]).ok_or(Error::MissingBox("ftyp"))?;
        let BoxBody::Ftyp(body) = &tree[ftyp].body else {
            return Err(Error::InvalidData("'ftyp' box was not decoded"));
        };

        let mut item_profile = -1;
        let mut item_level = -1;
        for item in self.items.iter().filter(|i| i.item_type == b"av01") {
            if let Some(sh) = self.headers.get(&item.id) {
                let config = sh.av1_config()?;
                item_profile = item_profile.max(config.seq_profile as i32);
                item_level = item_level.max(config.seq_level_idx_0 as i32);
            }
        }
        let mut seq_profile = -1;
        let mut seq_level = -1;
        for trak in tree.tracks() {
            let av1c = tree.find_below(trak, &[b"mdia", b"minf", b"stbl", b"stsd", b"av01", b"av1C"]);
            if let Some(BoxBody::Av1C(av1c)) = av1c.map(|id| &tree[id].body) {
                seq_profile = seq_profile.max(av1c.config.seq_profile as i32);
                seq_level = seq_level.max(av1c.config.seq_level_idx_0 as i32);
            }
        }
        let max_profile = item_profile.max(seq_profile);

        let mut issues = Vec::new();
        for brand in body.brands() {
            let (profile_limit, item_limit, seq_limit) = match &brand.0 {
                b"MA1B" => (0, 13, 13),
                b"MA1A" => (1, 16, 13),
                _ => continue,
            };
            let mut issue = Issue::new(Subject::File, b"ftyp");
            for (what, used, limit) in [
                ("profile", max_profile, profile_limit),
                ("item level", item_level, item_limit),
                ("sequence level", seq_level, seq_limit),
            ] {
                if used > limit {
                    issue.add(
                        Severity::Warning,
                        format!("Max {what} used exceeds highest allowed by {brand} brand. {used} > {limit}"),
                    );
                }
            }
            if issue.is_empty() {
                continue;
            }
            issue.set_info_section("incorrect-profile-brands");
            issue.set_fix(format!("Remove {brand} from brands in ftyp"), move |tree| {
                remove_brand(tree, ftyp, brand)
            });
            issues.push(issue);
        }
        Ok(issues)
    }
}

fn set_track_in_movie(tree: &mut BoxTree, tkhd: NodeId, on: bool) {
    let full = tree.get_mut(tkhd).full.get_or_insert_with(FullBoxHeader::default);
    if on {
        full.flags |= TRACK_IN_MOVIE;
    } else {
        full.flags &= !TRACK_IN_MOVIE;
    }
    tree.mark_dirty(tkhd);
}

fn remove_brand(tree: &mut BoxTree, ftyp: NodeId, brand: FourCC) -> Result<()> {
    let BoxBody::Ftyp(body) = &mut tree.get_mut(ftyp).body else {
        return Err(Error::InvalidData("'ftyp' box was not decoded"));
    };
    let avif = FourCC(*b"avif");
    if body.major == brand {
        body.major = avif;
        body.compatible.retain(|&b| b != avif && b != brand);
    } else {
        body.compatible.retain(|&b| b != brand);
    }
    tree.mark_dirty(ftyp);
    Ok(())
}

/// Runs every rule against the file. Issues are only collected here; nothing is modified.
pub fn validate_file<R: Read + Seek>(file: &mut AvifFile<R>, defaults: &NclxDefaults) -> Result<Vec<Issue>> {
    let items = file.items()?;

    let mut headers = HashMap::new();
    for item in items.iter().filter(|i| i.item_type == b"av01") {
        if item.location.is_none() {
            warn!("item {}: 'av01' item has no 'iloc' entry, skipping", item.id);
            continue;
        }
        match file.item_sequence_header(item)? {
            Some(sh) => {
                headers.insert(item.id, sh);
            }
            None => return Err(Error::InvalidData("'av01' item without a Sequence Header OBU")),
        }
    }

    let v = Validator { tree: file.tree(), items: &items, headers: &headers, defaults };
    let mut issues = Vec::new();
    for item in &items {
        match &item.item_type.0 {
            b"av01" if headers.contains_key(&item.id) => issues.extend(v.av01_item(item)?),
            b"grid" => issues.extend(v.grid_item(item)?),
            _ => {}
        }
    }
    issues.extend(v.primary_item()?);
    for trak in v.tree.tracks() {
        issues.extend(v.track(trak));
    }
    issues.extend(v.profile_brands()?);

    debug!("validation found {} issue(s)", issues.len());
    Ok(issues)
}
