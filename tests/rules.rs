mod common;

use avif_sanitize::body::{BoxBody, Ccst, Colr, Rational};
use avif_sanitize::issues::condense;
use avif_sanitize::{apply_fixes, validate_file, Error, FourCC, Issue, NclxDefaults, Severity, Subject};
use common::{bx, clap, iref_dimg, AvifSpec, ItemSpec, SeqParams, TrackSpec};

fn issues_of(bytes: &[u8]) -> Vec<Issue> {
    issues_with(bytes, &NclxDefaults::default())
}

fn issues_with(bytes: &[u8], defaults: &NclxDefaults) -> Vec<Issue> {
    let mut file = common::parse(bytes);
    validate_file(&mut file, defaults).expect("validation failed")
}

/// Validates, applies every fix and writes the result.
fn sanitize(bytes: &[u8]) -> Vec<u8> {
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::max()).try_init();
    let mut file = common::parse(bytes);
    let issues = validate_file(&mut file, &NclxDefaults::default()).expect("validation failed");
    apply_fixes(issues, file.tree_mut()).expect("fix failed");
    common::write(&mut file)
}

fn summary(issues: &[Issue]) -> Vec<(String, Severity)> {
    issues
        .iter()
        .map(|i| (i.box_type.to_string(), i.max_severity().unwrap()))
        .collect()
}

fn owned(list: &[(&str, Severity)]) -> Vec<(String, Severity)> {
    list.iter().map(|(t, s)| (t.to_string(), *s)).collect()
}

#[test]
fn clean_file_has_no_issues() {
    let p = SeqParams::default();
    assert!(issues_of(&AvifSpec::clean(&p).build()).is_empty());

    let mono = SeqParams { mono: true, high_bitdepth: true, ..SeqParams::default() };
    assert!(issues_of(&AvifSpec::clean(&mono).build()).is_empty());
}

#[test]
fn missing_ispe_is_added_first_and_essential() {
    let p = SeqParams::default();
    let (mut properties, _) = common::clean_properties(&p);
    properties.remove(1);
    let bytes = AvifSpec::single(&p, properties, vec![(1, true), (2, false), (3, true)]).build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("ispe", Severity::Critical)]));
    assert_eq!(issues[0].subject, Subject::Item(1));
    assert_eq!(issues[0].fix_description(), Some("Add 'ispe' with dimensions 64x48."));

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let items = file.items().unwrap();
    let item = &items[0];
    let (first, essential) = item.properties[0];
    assert!(matches!(tree[first].body, BoxBody::Ispe { width: 64, height: 48 }));
    assert!(essential);
    assert!(issues_of(&out).is_empty());
}

#[test]
fn missing_properties_are_derived_from_the_sequence_header() {
    let p = SeqParams { color: None, full_range: false, ..SeqParams::default() };
    let bytes = AvifSpec::single(&p, vec![common::av1c_for(&p)], vec![(1, true)]).build();

    let issues = issues_of(&bytes);
    assert_eq!(
        summary(&issues),
        owned(&[
            ("colr", Severity::RenderingDifferences),
            ("pixi", Severity::Warning),
            ("ispe", Severity::Critical),
        ])
    );
    let colr = &issues[0];
    assert_eq!(colr.findings.len(), 4);
    assert!(colr.findings[0].description.contains("color_primaries = 2"));
    assert!(colr.findings[3].description.contains("full_range_flag = 0"));
    assert_eq!(colr.fix_description(), Some("Add 'colr' box of type 'nclx', with values 1,13,6,0"));

    let out = sanitize(&bytes);
    assert!(issues_of(&out).is_empty(), "fixes are not idempotent");
    assert_eq!(sanitize(&out), out);

    let file = common::parse(&out);
    let tree = file.tree();
    let items = file.items().unwrap();
    let item = &items[0];
    let colr = item.property(tree, b"colr").unwrap();
    assert_eq!(
        tree[colr].body,
        BoxBody::Colr(Colr::Nclx {
            color_primaries: 1,
            transfer_characteristics: 13,
            matrix_coefficients: 6,
            full_range: false
        })
    );
    let pixi = item.property(tree, b"pixi").unwrap();
    assert_eq!(tree[pixi].body, BoxBody::Pixi { bits_per_channel: vec![8, 8, 8] });
    assert!(!item.properties.iter().find(|&&(p, _)| p == pixi).unwrap().1);
}

#[test]
fn custom_nclx_defaults() {
    let p = SeqParams { color: None, full_range: false, ..SeqParams::default() };
    let (mut properties, _) = common::clean_properties(&p);
    properties.pop();
    let bytes = AvifSpec::single(&p, properties, vec![(1, true), (2, false), (3, false)]).build();

    let defaults = NclxDefaults::from_values([9, 16, 9, 0]);
    let issues = issues_with(&bytes, &defaults);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].findings.len(), 3);
    assert_eq!(issues[0].fix_description(), Some("Add 'colr' box of type 'nclx', with values 9,16,9,0"));
}

#[test]
fn icc_profile_gets_a_second_nclx_box() {
    let p = SeqParams { color: None, ..SeqParams::default() };
    let (mut properties, associations) = common::clean_properties(&p);
    properties[3] = bx(b"colr", b"rICC\x01\x02\x03");
    let bytes = AvifSpec::single(&p, properties, associations).build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("colr", Severity::RenderingDifferences)]));
    assert_eq!(issues[0].findings.len(), 1);
    assert!(issues[0].findings[0].description.contains("lacks nclx-colr box"));
    assert!(issues[0].info_url().unwrap().ends_with("#missing-nclx-colr-box"));

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let colrs: Vec<&BoxBody> = file.items().unwrap()[0]
        .properties
        .iter()
        .map(|&(p, _)| &tree[p].body)
        .filter(|b| matches!(b, BoxBody::Colr(_)))
        .collect();
    assert_eq!(colrs.len(), 2);
    assert!(issues_of(&out).is_empty());
}

#[test]
fn mismatching_av1c_is_regenerated_in_place() {
    let p = SeqParams::default();
    let (mut properties, associations) = common::clean_properties(&p);
    properties[0] = common::av1c_for(&SeqParams { level: 9, ..p.clone() });
    let bytes = AvifSpec::single(&p, properties, associations).build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("av1C", Severity::Critical)]));
    assert_eq!(
        issues[0].findings[0].description,
        "av1C[seq_level_idx_0] does not match Sequence Header OBU. '9' != '5'."
    );

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let ipco = tree.find(&[b"meta", b"iprp", b"ipco"]).unwrap();
    assert_eq!(tree.children(ipco).len(), 4);
    let (first, essential) = file.items().unwrap()[0].properties[0];
    assert_eq!(tree[first].typ, FourCC(*b"av1C"));
    assert!(essential);
    assert!(issues_of(&out).is_empty());
}

#[test]
fn config_obus_in_av1c_are_dropped() {
    let p = SeqParams::default();
    let (mut properties, associations) = common::clean_properties(&p);
    let mut av1c = common::av1c_for(&p);
    av1c.extend_from_slice(&common::obu(1, &common::sequence_header_payload(&p)));
    properties[0] = bx(b"av1C", &av1c[8..]);
    let bytes = AvifSpec::single(&p, properties, associations).build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("av1C", Severity::Warning)]));
    assert!(issues[0].info_url().unwrap().ends_with("#av1c-contains-optional-config-obus"));

    let out = sanitize(&bytes);
    assert!(out.len() < bytes.len());
    assert!(issues_of(&out).is_empty());
}

#[test]
fn missing_av1c_is_added() {
    let p = SeqParams::default();
    let (mut properties, _) = common::clean_properties(&p);
    properties.remove(0);
    let bytes = AvifSpec::single(&p, properties, vec![(1, false), (2, false), (3, true)]).build();

    let issues = issues_of(&bytes);
    assert_eq!(issues[0].findings[0].description, "Image item lacks 'av1C' property.");
    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let items = file.items().unwrap();
    let item = &items[0];
    let av1c = item.property(file.tree(), b"av1C").unwrap();
    assert!(item.properties.iter().any(|&(p, e)| p == av1c && e));
    assert!(issues_of(&out).is_empty());
}

#[test]
fn ispe_is_moved_before_transforms() {
    let p = SeqParams::default();
    let (mut properties, _) = common::clean_properties(&p);
    properties.push(clap((64, 1), (48, 1), (0, 1), (0, 1)));
    let bytes = AvifSpec::single(&p, properties, vec![(1, true), (5, true), (2, false), (3, false), (4, true)]).build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("ispe", Severity::Warning)]));

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let types: Vec<String> = file.items().unwrap()[0]
        .properties
        .iter()
        .map(|&(p, _)| tree[p].typ.to_string())
        .collect();
    assert_eq!(types, ["ispe", "av1C", "clap", "pixi", "colr"]);
    assert!(issues_of(&out).is_empty());
}

#[test]
fn fractional_clap_origin_is_truncated() {
    let p = SeqParams::default();
    let (mut properties, mut associations) = common::clean_properties(&p);
    properties.push(clap((63, 1), (47, 1), (0, 1), (0, 1)));
    associations.push((5, true));
    let bytes = AvifSpec::single(&p, properties, associations).build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("clap", Severity::Warning)]));
    assert_eq!(issues[0].findings[0].description, "'clap' origin is not integer valued. 0.5x0.5");

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let clap = file.items().unwrap()[0].property(tree, b"clap").unwrap();
    let BoxBody::Clap(c) = &tree[clap].body else {
        panic!("clap not decoded");
    };
    assert_eq!(c.h_offset, Rational::new(-1, 2));
    assert_eq!(c.v_offset, Rational::new(-1, 2));
    assert_eq!(c.width, Rational::new(63, 1));
    assert!(issues_of(&out).is_empty());
}

#[test]
fn negative_clap_origin_has_no_fix() {
    let p = SeqParams::default();
    let (mut properties, mut associations) = common::clean_properties(&p);
    properties.push(clap((80, 1), (48, 1), (0, 1), (0, 1)));
    associations.push((5, true));
    let bytes = AvifSpec::single(&p, properties, associations).build();

    let mut file = common::parse(&bytes);
    let mut issues = validate_file(&mut file, &NclxDefaults::default()).unwrap();
    assert_eq!(summary(&issues), owned(&[("clap", Severity::Critical), ("clap", Severity::Critical)]));
    assert!(issues.iter().all(|i| !i.has_fix()));

    let first = issues.remove(0);
    assert!(matches!(first.apply_fix(file.tree_mut()), Err(Error::NoFix(_))));
    assert_eq!(apply_fixes(issues, file.tree_mut()).unwrap(), 0);
    assert!(!file.tree().is_modified());
}

#[test]
fn multilayer_items_need_lsel() {
    let p = SeqParams::default();
    let (mut properties, mut associations) = common::clean_properties(&p);
    properties.push(bx(b"a1op", &[0]));
    associations.push((5, true));
    let bytes = AvifSpec::single(&p, properties, associations).build();

    assert_eq!(summary(&issues_of(&bytes)), owned(&[("lsel", Severity::Critical)]));
    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let lsel = file.items().unwrap()[0].property(tree, b"lsel").unwrap();
    assert_eq!(tree[lsel].body, BoxBody::Raw(vec![0xFF, 0xFF]));
    assert!(issues_of(&out).is_empty());
}

#[test]
fn missing_primary_item_points_at_first_visible_item() {
    let p = SeqParams::default();
    let (properties, associations) = common::clean_properties(&p);
    let mut spec = AvifSpec::single(&p, properties, associations.clone());
    spec.items[0].hidden = true;
    spec.items.push(ItemSpec::av01(2, &p, associations));
    spec.pitm = None;
    let bytes = spec.build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("pitm", Severity::Critical)]));
    assert_eq!(issues[0].subject, Subject::Item(2));

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let pitm = file.tree().find(&[b"meta", b"pitm"]).expect("no pitm");
    assert_eq!(file.tree()[pitm].body, BoxBody::Pitm { item_id: 2 });
    assert!(issues_of(&out).is_empty());
}

#[test]
fn primary_item_needs_a_visible_item() {
    let p = SeqParams::default();
    let mut spec = AvifSpec::clean(&p);
    spec.items[0].hidden = true;
    spec.pitm = None;
    let mut file = common::parse(&spec.build());
    assert!(matches!(validate_file(&mut file, &NclxDefaults::default()), Err(Error::InvalidData(_))));
}

#[test]
fn item_without_sequence_header_is_fatal() {
    let p = SeqParams::default();
    let mut spec = AvifSpec::clean(&p);
    spec.items[0].payload = common::obu(2, &[]);
    let mut file = common::parse(&spec.build());
    assert!(matches!(validate_file(&mut file, &NclxDefaults::default()), Err(Error::InvalidData(_))));
}

#[test]
fn pict_track_flags_and_ccst() {
    let p = SeqParams::default();
    let mut spec = AvifSpec::clean(&p);
    let mut track = TrackSpec::pict(1, &p);
    track.track_in_movie = false;
    spec.tracks.push(track);
    let bytes = spec.build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("tkhd", Severity::Warning), ("av01", Severity::Warning)]));
    assert!(issues.iter().all(|i| i.subject == Subject::Track(1)));

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let trak = tree.tracks()[0];
    let tkhd = tree.find_below(trak, &[b"tkhd"]).unwrap();
    assert_eq!(tree[tkhd].full.unwrap().flags, 0x3);
    let ccst = tree
        .find_below(trak, &[b"mdia", b"minf", b"stbl", b"stsd", b"av01", b"ccst"])
        .expect("no ccst");
    assert_eq!(
        tree[ccst].body,
        BoxBody::Ccst(Ccst { all_ref_pics_intra: false, intra_pred_used: true, max_ref_per_pic: 15 })
    );
    assert!(issues_of(&out).is_empty());
}

#[test]
fn auxiliary_track_is_repaired() {
    let p = SeqParams::default();
    let mut spec = AvifSpec::clean(&p);
    spec.tracks.push(TrackSpec::pict(1, &p));
    let mut alpha = TrackSpec::pict(2, &SeqParams { mono: true, ..p.clone() });
    alpha.aux = true;
    spec.tracks.push(alpha);
    spec.tracks[0].sample_entry_children.push(common::full_bx(b"ccst", 0, 0, &[0x7C, 0, 0, 0]));
    let bytes = spec.build();

    let issues = issues_of(&bytes);
    assert_eq!(
        summary(&issues),
        owned(&[("hdlr", Severity::Critical), ("av01", Severity::Warning), ("tkhd", Severity::Warning)])
    );
    assert!(issues.iter().all(|i| i.subject == Subject::Track(2)));

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let tree = file.tree();
    let trak = tree.tracks()[1];
    let hdlr = tree.find_below(trak, &[b"mdia", b"hdlr"]).unwrap();
    assert!(matches!(&tree[hdlr].body, BoxBody::Hdlr(h) if h.handler_type == FourCC(*b"auxv")));
    let auxi = tree
        .find_below(trak, &[b"mdia", b"minf", b"stbl", b"stsd", b"av01", b"auxi"])
        .expect("no auxi");
    assert!(matches!(&tree[auxi].body, BoxBody::Auxi { aux_track_type } if aux_track_type.ends_with(":alpha")));
    let tkhd = tree.find_below(trak, &[b"tkhd"]).unwrap();
    assert_eq!(tree[tkhd].full.unwrap().flags, 0x1);
    assert!(issues_of(&out).is_empty());
}

#[test]
fn profile_brand_above_limit_is_removed() {
    let p = SeqParams { profile: 1, ..SeqParams::default() };
    let mut spec = AvifSpec::clean(&p);
    spec.compatible.push(b"MA1B");
    spec.compatible.push(b"MA1A");
    let bytes = spec.build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("ftyp", Severity::Warning)]));
    assert_eq!(issues[0].subject, Subject::File);
    assert_eq!(
        issues[0].findings[0].description,
        "Max profile used exceeds highest allowed by MA1B brand. 1 > 0"
    );

    let out = sanitize(&bytes);
    let file = common::parse(&out);
    let ftyp = file.tree().find(&[b"ftyp"]).unwrap();
    let BoxBody::Ftyp(f) = &file.tree()[ftyp].body else {
        panic!("ftyp not decoded");
    };
    let brands: Vec<String> = f.brands().map(|b| b.to_string()).collect();
    assert_eq!(brands, ["avif", "avif", "mif1", "miaf", "MA1A"]);
    assert!(issues_of(&out).is_empty());
}

#[test]
fn grid_items_are_checked_against_their_tiles() {
    let p = SeqParams::default();
    let (properties, associations) = common::clean_properties(&p);
    let mut spec = AvifSpec::single(&p, properties, associations.clone());
    spec.items[0].hidden = true;
    spec.items.push(ItemSpec { hidden: true, ..ItemSpec::av01(2, &p, associations) });
    spec.items.push(ItemSpec {
        id: 3,
        item_type: b"grid",
        payload: vec![0, 0, 0, 1, 0, 128, 0, 48],
        properties: vec![(2, true)],
        hidden: false,
    });
    spec.pitm = Some(3);
    spec.extra_meta.push(iref_dimg(3, &[1, 2]));
    let bytes = spec.build();

    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("pixi", Severity::Warning)]));
    assert_eq!(issues[0].subject, Subject::Item(3));
    assert!(issues_of(&sanitize(&bytes)).is_empty());

    // tiles with different coding parameters
    let mut other = p.clone();
    other.level = 9;
    spec.items[1].payload = common::av1_stream(&other);
    let mut file = common::parse(&spec.build());
    assert!(matches!(validate_file(&mut file, &NclxDefaults::default()), Err(Error::InvalidData(_))));
}

#[test]
fn listing_groups_identical_issues() {
    let p = SeqParams::default();
    let (mut properties, _) = common::clean_properties(&p);
    properties.remove(1);
    let associations = vec![(1, true), (2, false), (3, true)];
    let mut spec = AvifSpec::single(&p, properties, associations.clone());
    spec.items.push(ItemSpec::av01(2, &p, associations));
    let issues = issues_of(&spec.build());
    assert_eq!(issues.len(), 2);

    let groups = condense(&issues);
    assert_eq!(groups.len(), 1);
    let (issue, others) = &groups[0];
    assert_eq!(
        issue.render(others),
        "Item 1 (also applies to [2])\n  Box ispe\n    CRITICAL\n      Image item lacks 'ispe' property.\n  \
         See https://github.com/AOMediaCodec/av1-avif/wiki/Identified-issues-in-existing-AVIF-files#missing-ispe\n  \
         FIX: Add 'ispe' with dimensions 64x48.\n"
    );

    let json = serde_json::to_value(issue.report()).unwrap();
    assert_eq!(json["subject"], serde_json::json!({ "kind": "item", "id": 1 }));
    assert_eq!(json["box_type"], "ispe");
    assert_eq!(json["findings"][0]["severity"], "CRITICAL");
}

#[test]
fn srgb_stream_does_not_need_a_colour_box() {
    let p = SeqParams { profile: 1, color: Some((1, 13, 0)), ..SeqParams::default() };
    let (mut properties, _) = common::clean_properties(&p);
    properties.pop();
    let bytes = AvifSpec::single(&p, properties, vec![(1, true), (2, false), (3, false)]).build();
    // matrix 0 is outside the default accepted values
    let issues = issues_of(&bytes);
    assert_eq!(summary(&issues), owned(&[("colr", Severity::RenderingDifferences)]));
    assert_eq!(issues[0].findings.len(), 1);

    let accept = NclxDefaults { matrix_coefficients: vec![0], ..NclxDefaults::default() };
    assert!(issues_with(&bytes, &accept).is_empty());
}
