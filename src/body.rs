use crate::boxes::{FourCC, FullBoxHeader};
use crate::error::{Error, Result};
use crate::recipes::BodyKind;
use crate::util::{
    read_bytes, read_cstring, read_fourcc, read_sized, read_to_end, remaining, write_cstring,
    write_sized, BodyCursor,
};
use bitreader::BitReader;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;

/// Bytes of `SampleEntry` + `VisualSampleEntry` fields preceding the child boxes of `av01`.
pub const VISUAL_SAMPLE_ENTRY_LEN: usize = 8 + 70;

/// Decoded payload of a box, following its header and version/flags.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxBody {
    /// Pure container: the payload is the child sequence.
    Empty,
    /// Not decoded. The box is copied from the source as is.
    Opaque,
    /// Undecoded bytes kept in memory, so the box can be compared and rewritten.
    Raw(Vec<u8>),
    /// Entry count preceding a child sequence (`iinf`, `stsd`, `dref`).
    EntryCount(u32),
    Ftyp(Ftyp),
    Tkhd(Tkhd),
    Hdlr(Hdlr),
    Pitm { item_id: u32 },
    Av1C(Av1C),
    Iloc(Iloc),
    Infe(Infe),
    SingleItemReference(SingleItemReference),
    Ipma(Ipma),
    Colr(Colr),
    Pixi { bits_per_channel: Vec<u8> },
    Ispe { width: u32, height: u32 },
    Clap(Clap),
    Stco(Vec<u32>),
    Co64(Vec<u64>),
    /// A local data reference: `url ` with the self-contained flag and no location.
    LocalDataEntry,
    /// Raw `SampleEntry`/`VisualSampleEntry` fields of an `av01` sample entry.
    SampleEntry { prefix: Vec<u8> },
    Ccst(Ccst),
    Auxi { aux_track_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ftyp {
    pub major: FourCC,
    pub minor: u32,
    pub compatible: Vec<FourCC>,
}

impl Ftyp {
    /// Major brand followed by the compatible brands.
    pub fn brands(&self) -> impl Iterator<Item = FourCC> + '_ {
        std::iter::once(self.major).chain(self.compatible.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tkhd {
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: u16,
    pub alternate_group: u16,
    pub volume: u16,
    pub matrix: [u32; 9],
    /// 16.16 fixed point.
    pub width: u32,
    pub height: u32,
}

/// `tkhd` flag marking a track as part of the presentation.
pub const TRACK_IN_MOVIE: u32 = 0x2;

#[derive(Debug, Clone, PartialEq)]
pub struct Hdlr {
    pub pre_defined: u32,
    pub handler_type: FourCC,
    /// Name bytes as stored, terminator included.
    pub name: Vec<u8>,
}

impl Hdlr {
    /// Printable form of the name, up to the first NUL.
    pub fn display_name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// AV1 codec configuration record (AV1-ISOBMFF §2.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Av1Config {
    pub marker: u8,
    pub version: u8,
    pub seq_profile: u8,
    pub seq_level_idx_0: u8,
    pub seq_tier_0: u8,
    pub high_bitdepth: u8,
    pub twelve_bit: u8,
    pub monochrome: u8,
    pub chroma_subsampling_x: u8,
    pub chroma_subsampling_y: u8,
    pub chroma_sample_position: u8,
    /// `initial_presentation_delay_minus_one`, when present.
    pub initial_presentation_delay: Option<u8>,
}

impl Av1Config {
    /// Named fields, in bitstream order, for field-by-field comparison.
    pub fn fields(&self) -> [(&'static str, i32); 12] {
        [
            ("marker", self.marker as i32),
            ("version", self.version as i32),
            ("seq_profile", self.seq_profile as i32),
            ("seq_level_idx_0", self.seq_level_idx_0 as i32),
            ("seq_tier_0", self.seq_tier_0 as i32),
            ("high_bitdepth", self.high_bitdepth as i32),
            ("twelve_bit", self.twelve_bit as i32),
            ("monochrome", self.monochrome as i32),
            ("chroma_subsampling_x", self.chroma_subsampling_x as i32),
            ("chroma_subsampling_y", self.chroma_subsampling_y as i32),
            ("chroma_sample_position", self.chroma_sample_position as i32),
            (
                "initial_presentation_delay_present",
                self.initial_presentation_delay.is_some() as i32,
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Av1C {
    pub config: Av1Config,
    pub config_obus: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Iloc {
    pub offset_size: u8,
    pub length_size: u8,
    pub base_offset_size: u8,
    pub index_size: u8,
    pub items: Vec<IlocItem>,
}

impl Iloc {
    pub fn item(&self, item_id: u32) -> Option<&IlocItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IlocItem {
    pub item_id: u32,
    /// 0 = file offset, 1 = `idat`, 2 = item reference.
    pub construction_method: u8,
    pub base_offset: u64,
    pub extents: Vec<IlocExtent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IlocExtent {
    pub item_reference_index: Option<u64>,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Infe {
    pub item_id: u32,
    pub protection_index: u16,
    pub item_type: FourCC,
    pub name: String,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub uri_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleItemReference {
    pub wide_ids: bool,
    pub from_item_id: u32,
    pub to_item_ids: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    /// 1-based index into the `ipco` children.
    pub property_index: u16,
    pub essential: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ipma {
    pub associations: BTreeMap<u32, Vec<Association>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Colr {
    Nclx {
        color_primaries: u16,
        transfer_characteristics: u16,
        matrix_coefficients: u16,
        full_range: bool,
    },
    /// `rICC` or `prof`.
    Icc { kind: FourCC, profile: Vec<u8> },
}

/// Signed rational as stored in `clap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return f64::INFINITY;
        }
        self.num as f64 / self.den as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clap {
    pub width: Rational,
    pub height: Rational,
    pub h_offset: Rational,
    pub v_offset: Rational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ccst {
    pub all_ref_pics_intra: bool,
    pub intra_pred_used: bool,
    pub max_ref_per_pic: u8,
}

/// A file offset written while encoding a body, patched once payload positions are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetField {
    /// Position in the output buffer passed to [`BoxBody::encode`].
    pub pos: usize,
    pub width: u8,
    pub value: u64,
    /// Index of the field this one is relative to, in the same list.
    pub base: Option<usize>,
}

fn version(full: Option<FullBoxHeader>) -> u8 {
    full.map(|f| f.version).unwrap_or(0)
}

fn flags(full: Option<FullBoxHeader>) -> u32 {
    full.map(|f| f.flags).unwrap_or(0)
}

fn check_field_size(size: u8, what: &str) -> Result<u8> {
    match size {
        0 | 4 | 8 => Ok(size),
        _ => Err(Error::unsupported(format!("'iloc' {what} of {size} bytes"))),
    }
}

impl BoxBody {
    /// Decodes the body of a box. The cursor spans from the end of the version/flags
    /// word (or the box header) to the end of the box.
    pub fn decode(kind: BodyKind, cur: &mut BodyCursor<'_>, full: Option<FullBoxHeader>) -> Result<BoxBody> {
        let v = version(full);
        Ok(match kind {
            BodyKind::Ftyp => {
                let major = read_fourcc(cur)?;
                let minor = cur.read_u32::<BigEndian>()?;
                let mut compatible = Vec::with_capacity(remaining(cur) / 4);
                while remaining(cur) >= 4 {
                    compatible.push(read_fourcc(cur)?);
                }
                BoxBody::Ftyp(Ftyp { major, minor, compatible })
            }
            BodyKind::Tkhd => {
                let time_size = if v == 1 { 8 } else { 4 };
                let creation_time = read_sized(cur, time_size)?;
                let modification_time = read_sized(cur, time_size)?;
                let track_id = cur.read_u32::<BigEndian>()?;
                let _reserved = cur.read_u32::<BigEndian>()?;
                let duration = read_sized(cur, time_size)?;
                let _reserved = cur.read_u64::<BigEndian>()?;
                let layer = cur.read_u16::<BigEndian>()?;
                let alternate_group = cur.read_u16::<BigEndian>()?;
                let volume = cur.read_u16::<BigEndian>()?;
                let _reserved = cur.read_u16::<BigEndian>()?;
                let mut matrix = [0u32; 9];
                for m in matrix.iter_mut() {
                    *m = cur.read_u32::<BigEndian>()?;
                }
                let width = cur.read_u32::<BigEndian>()?;
                let height = cur.read_u32::<BigEndian>()?;
                BoxBody::Tkhd(Tkhd {
                    creation_time,
                    modification_time,
                    track_id,
                    duration,
                    layer,
                    alternate_group,
                    volume,
                    matrix,
                    width,
                    height,
                })
            }
            BodyKind::Hdlr => {
                let pre_defined = cur.read_u32::<BigEndian>()?;
                let handler_type = read_fourcc(cur)?;
                let _reserved = read_bytes(cur, 12)?;
                let name = read_to_end(cur);
                BoxBody::Hdlr(Hdlr { pre_defined, handler_type, name })
            }
            BodyKind::Pitm => {
                let item_id = read_sized(cur, if v == 0 { 2 } else { 4 })? as u32;
                BoxBody::Pitm { item_id }
            }
            BodyKind::Av1C => {
                let record = read_bytes(cur, 4)?;
                let mut bits = BitReader::new(&record);
                let marker = bits.read_u8(1)?;
                let version = bits.read_u8(7)?;
                let seq_profile = bits.read_u8(3)?;
                let seq_level_idx_0 = bits.read_u8(5)?;
                let seq_tier_0 = bits.read_u8(1)?;
                let high_bitdepth = bits.read_u8(1)?;
                let twelve_bit = bits.read_u8(1)?;
                let monochrome = bits.read_u8(1)?;
                let chroma_subsampling_x = bits.read_u8(1)?;
                let chroma_subsampling_y = bits.read_u8(1)?;
                let chroma_sample_position = bits.read_u8(2)?;
                let _reserved = bits.read_u8(3)?;
                let delay_present = bits.read_bool()?;
                let delay = bits.read_u8(4)?;
                BoxBody::Av1C(Av1C {
                    config: Av1Config {
                        marker,
                        version,
                        seq_profile,
                        seq_level_idx_0,
                        seq_tier_0,
                        high_bitdepth,
                        twelve_bit,
                        monochrome,
                        chroma_subsampling_x,
                        chroma_subsampling_y,
                        chroma_sample_position,
                        initial_presentation_delay: delay_present.then_some(delay),
                    },
                    config_obus: read_to_end(cur),
                })
            }
            BodyKind::Iloc => BoxBody::Iloc(decode_iloc(cur, v)?),
            BodyKind::Iinf => {
                if v > 1 {
                    return Err(Error::unsupported(format!("'iinf' version {v}")));
                }
                BoxBody::EntryCount(read_sized(cur, if v == 0 { 2 } else { 4 })? as u32)
            }
            BodyKind::Infe => {
                if !(2..=3).contains(&v) {
                    return Err(Error::unsupported(format!("'infe' version {v}")));
                }
                let item_id = read_sized(cur, if v == 2 { 2 } else { 4 })? as u32;
                let protection_index = cur.read_u16::<BigEndian>()?;
                let item_type = read_fourcc(cur)?;
                let name = read_cstring(cur);
                let mut infe = Infe {
                    item_id,
                    protection_index,
                    item_type,
                    name,
                    content_type: None,
                    content_encoding: None,
                    uri_type: None,
                };
                if item_type == b"mime" {
                    infe.content_type = Some(read_cstring(cur));
                    if remaining(cur) > 0 {
                        infe.content_encoding = Some(read_cstring(cur));
                    }
                } else if item_type == b"uri " {
                    infe.uri_type = Some(read_cstring(cur));
                }
                BoxBody::Infe(infe)
            }
            BodyKind::Iref => BoxBody::Empty,
            BodyKind::SingleItemReference { wide_ids } => {
                let id_size = if wide_ids { 4 } else { 2 };
                let from_item_id = read_sized(cur, id_size)? as u32;
                let count = cur.read_u16::<BigEndian>()?;
                let mut to_item_ids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    to_item_ids.push(read_sized(cur, id_size)? as u32);
                }
                BoxBody::SingleItemReference(SingleItemReference { wide_ids, from_item_id, to_item_ids })
            }
            BodyKind::Ipma => {
                let wide_index = flags(full) & 1 == 1;
                let id_size = if v < 1 { 2 } else { 4 };
                let entry_count = cur.read_u32::<BigEndian>()?;
                let mut associations = BTreeMap::new();
                for _ in 0..entry_count {
                    let item_id = read_sized(cur, id_size)? as u32;
                    let count = cur.read_u8()?;
                    let mut list = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let (essential, property_index) = if wide_index {
                            let raw = cur.read_u16::<BigEndian>()?;
                            (raw & 0x8000 != 0, raw & 0x7FFF)
                        } else {
                            let raw = cur.read_u8()?;
                            (raw & 0x80 != 0, (raw & 0x7F) as u16)
                        };
                        list.push(Association { property_index, essential });
                    }
                    associations.insert(item_id, list);
                }
                BoxBody::Ipma(Ipma { associations })
            }
            BodyKind::Colr => {
                let colour_type = read_fourcc(cur)?;
                match &colour_type.0 {
                    b"nclx" => {
                        let color_primaries = cur.read_u16::<BigEndian>()?;
                        let transfer_characteristics = cur.read_u16::<BigEndian>()?;
                        let matrix_coefficients = cur.read_u16::<BigEndian>()?;
                        let full_range = cur.read_u8()? >> 7 != 0;
                        BoxBody::Colr(Colr::Nclx {
                            color_primaries,
                            transfer_characteristics,
                            matrix_coefficients,
                            full_range,
                        })
                    }
                    b"rICC" | b"prof" => BoxBody::Colr(Colr::Icc {
                        kind: colour_type,
                        profile: read_to_end(cur),
                    }),
                    _ => return Err(Error::unsupported(format!("colr type '{colour_type}'"))),
                }
            }
            BodyKind::Pixi => {
                let channels = cur.read_u8()?;
                let bits_per_channel = read_bytes(cur, channels as usize)?;
                BoxBody::Pixi { bits_per_channel }
            }
            BodyKind::Ispe => {
                let width = cur.read_u32::<BigEndian>()?;
                let height = cur.read_u32::<BigEndian>()?;
                BoxBody::Ispe { width, height }
            }
            BodyKind::Clap => {
                let mut rational = || -> Result<Rational> {
                    let num = cur.read_i32::<BigEndian>()?;
                    let den = cur.read_i32::<BigEndian>()?;
                    Ok(Rational::new(num, den))
                };
                let width = rational()?;
                let height = rational()?;
                let h_offset = rational()?;
                let v_offset = rational()?;
                BoxBody::Clap(Clap { width, height, h_offset, v_offset })
            }
            BodyKind::Stco => {
                let count = cur.read_u32::<BigEndian>()?;
                let mut entries = Vec::with_capacity(count.min(1 << 16) as usize);
                for _ in 0..count {
                    entries.push(cur.read_u32::<BigEndian>()?);
                }
                BoxBody::Stco(entries)
            }
            BodyKind::Co64 => {
                let count = cur.read_u32::<BigEndian>()?;
                let mut entries = Vec::with_capacity(count.min(1 << 16) as usize);
                for _ in 0..count {
                    entries.push(cur.read_u64::<BigEndian>()?);
                }
                BoxBody::Co64(entries)
            }
            BodyKind::Stsd | BodyKind::Dref => BoxBody::EntryCount(cur.read_u32::<BigEndian>()?),
            BodyKind::DataEntryUrl => {
                let location = read_cstring(cur);
                if flags(full) != 1 || !location.is_empty() {
                    return Err(Error::unsupported("non-local data references"));
                }
                BoxBody::LocalDataEntry
            }
            BodyKind::Av01SampleEntry => BoxBody::SampleEntry {
                prefix: read_bytes(cur, VISUAL_SAMPLE_ENTRY_LEN)?,
            },
            BodyKind::Ccst => {
                let raw = cur.read_u32::<BigEndian>()?;
                BoxBody::Ccst(Ccst {
                    all_ref_pics_intra: raw >> 31 & 1 == 1,
                    intra_pred_used: raw >> 30 & 1 == 1,
                    max_ref_per_pic: (raw >> 26 & 0xF) as u8,
                })
            }
            BodyKind::Auxi => BoxBody::Auxi { aux_track_type: read_cstring(cur) },
            BodyKind::Raw => BoxBody::Raw(read_to_end(cur)),
        })
    }

    /// Number of child boxes announced by the body, if it announces one.
    pub fn expected_children(&self) -> Option<u32> {
        match self {
            BoxBody::EntryCount(n) => Some(*n),
            _ => None,
        }
    }

    /// Appends the encoded body to `out`. Children are written by the caller right after.
    /// Absolute file offsets are reported through `offsets` so they can be patched later.
    pub fn encode(
        &self,
        typ: FourCC,
        full: Option<FullBoxHeader>,
        child_count: usize,
        out: &mut Vec<u8>,
        offsets: &mut Vec<OffsetField>,
    ) -> Result<()> {
        let v = version(full);
        match self {
            BoxBody::Empty => {}
            BoxBody::Opaque => {
                return Err(Error::unsupported(format!("cannot regenerate undecoded '{typ}' box")));
            }
            BoxBody::Raw(data) => out.extend_from_slice(data),
            BoxBody::EntryCount(_) => {
                let width = if typ == b"iinf" && v == 0 { 2 } else { 4 };
                write_sized(out, child_count as u64, width)?;
            }
            BoxBody::Ftyp(ftyp) => {
                out.extend_from_slice(&ftyp.major.0);
                out.write_u32::<BigEndian>(ftyp.minor)?;
                for brand in &ftyp.compatible {
                    out.extend_from_slice(&brand.0);
                }
            }
            BoxBody::Tkhd(t) => {
                let time_size = if v == 1 { 8 } else { 4 };
                write_sized(out, t.creation_time, time_size)?;
                write_sized(out, t.modification_time, time_size)?;
                out.write_u32::<BigEndian>(t.track_id)?;
                out.write_u32::<BigEndian>(0)?;
                write_sized(out, t.duration, time_size)?;
                out.write_u64::<BigEndian>(0)?;
                out.write_u16::<BigEndian>(t.layer)?;
                out.write_u16::<BigEndian>(t.alternate_group)?;
                out.write_u16::<BigEndian>(t.volume)?;
                out.write_u16::<BigEndian>(0)?;
                for m in t.matrix {
                    out.write_u32::<BigEndian>(m)?;
                }
                out.write_u32::<BigEndian>(t.width)?;
                out.write_u32::<BigEndian>(t.height)?;
            }
            BoxBody::Hdlr(h) => {
                out.write_u32::<BigEndian>(h.pre_defined)?;
                out.extend_from_slice(&h.handler_type.0);
                out.extend_from_slice(&[0u8; 12]);
                out.extend_from_slice(&h.name);
            }
            BoxBody::Pitm { item_id } => write_sized(out, *item_id as u64, if v == 0 { 2 } else { 4 })?,
            BoxBody::Av1C(av1c) => {
                let c = &av1c.config;
                out.push(c.marker << 7 | (c.version & 0x7F));
                out.push(c.seq_profile << 5 | (c.seq_level_idx_0 & 0x1F));
                out.push(
                    c.seq_tier_0 << 7
                        | c.high_bitdepth << 6
                        | c.twelve_bit << 5
                        | c.monochrome << 4
                        | c.chroma_subsampling_x << 3
                        | c.chroma_subsampling_y << 2
                        | (c.chroma_sample_position & 0x3),
                );
                out.push(match c.initial_presentation_delay {
                    Some(delay) => 0x10 | (delay & 0xF),
                    None => 0,
                });
                out.extend_from_slice(&av1c.config_obus);
            }
            BoxBody::Iloc(iloc) => encode_iloc(iloc, v, out, offsets)?,
            BoxBody::Infe(infe) => {
                write_sized(out, infe.item_id as u64, if v == 2 { 2 } else { 4 })?;
                out.write_u16::<BigEndian>(infe.protection_index)?;
                out.extend_from_slice(&infe.item_type.0);
                write_cstring(out, &infe.name);
                for s in [&infe.content_type, &infe.content_encoding, &infe.uri_type].into_iter().flatten() {
                    write_cstring(out, s);
                }
            }
            BoxBody::SingleItemReference(r) => {
                let id_size = if r.wide_ids { 4 } else { 2 };
                write_sized(out, r.from_item_id as u64, id_size)?;
                out.write_u16::<BigEndian>(r.to_item_ids.len() as u16)?;
                for id in &r.to_item_ids {
                    write_sized(out, *id as u64, id_size)?;
                }
            }
            BoxBody::Ipma(ipma) => {
                let wide_index = flags(full) & 1 == 1;
                let id_size = if v < 1 { 2 } else { 4 };
                let max_index = if wide_index { 0x7FFF } else { 0x7F };
                out.write_u32::<BigEndian>(ipma.associations.len() as u32)?;
                for (item_id, list) in &ipma.associations {
                    write_sized(out, *item_id as u64, id_size)?;
                    let count = u8::try_from(list.len())
                        .map_err(|_| Error::unsupported(format!("item {item_id} has more than 255 properties")))?;
                    out.push(count);
                    for a in list {
                        if a.property_index > max_index {
                            return Err(Error::unsupported(format!(
                                "property index {} does not fit the 'ipma' entry size",
                                a.property_index
                            )));
                        }
                        if wide_index {
                            out.write_u16::<BigEndian>((a.essential as u16) << 15 | a.property_index)?;
                        } else {
                            out.push((a.essential as u8) << 7 | a.property_index as u8);
                        }
                    }
                }
            }
            BoxBody::Colr(Colr::Nclx {
                color_primaries,
                transfer_characteristics,
                matrix_coefficients,
                full_range,
            }) => {
                out.extend_from_slice(b"nclx");
                out.write_u16::<BigEndian>(*color_primaries)?;
                out.write_u16::<BigEndian>(*transfer_characteristics)?;
                out.write_u16::<BigEndian>(*matrix_coefficients)?;
                out.push((*full_range as u8) << 7);
            }
            BoxBody::Colr(Colr::Icc { kind, profile }) => {
                out.extend_from_slice(&kind.0);
                out.extend_from_slice(profile);
            }
            BoxBody::Pixi { bits_per_channel } => {
                out.push(bits_per_channel.len() as u8);
                out.extend_from_slice(bits_per_channel);
            }
            BoxBody::Ispe { width, height } => {
                out.write_u32::<BigEndian>(*width)?;
                out.write_u32::<BigEndian>(*height)?;
            }
            BoxBody::Clap(c) => {
                for r in [c.width, c.height, c.h_offset, c.v_offset] {
                    out.write_i32::<BigEndian>(r.num)?;
                    out.write_i32::<BigEndian>(r.den)?;
                }
            }
            BoxBody::Stco(entries) => {
                out.write_u32::<BigEndian>(entries.len() as u32)?;
                for e in entries {
                    offsets.push(OffsetField { pos: out.len(), width: 4, value: *e as u64, base: None });
                    out.write_u32::<BigEndian>(*e)?;
                }
            }
            BoxBody::Co64(entries) => {
                out.write_u32::<BigEndian>(entries.len() as u32)?;
                for e in entries {
                    offsets.push(OffsetField { pos: out.len(), width: 8, value: *e, base: None });
                    out.write_u64::<BigEndian>(*e)?;
                }
            }
            BoxBody::LocalDataEntry => {}
            BoxBody::SampleEntry { prefix } => out.extend_from_slice(prefix),
            BoxBody::Ccst(c) => {
                let raw = (c.all_ref_pics_intra as u32) << 31
                    | (c.intra_pred_used as u32) << 30
                    | ((c.max_ref_per_pic & 0xF) as u32) << 26;
                out.write_u32::<BigEndian>(raw)?;
            }
            BoxBody::Auxi { aux_track_type } => write_cstring(out, aux_track_type),
        }
        Ok(())
    }
}

fn decode_iloc(cur: &mut BodyCursor<'_>, v: u8) -> Result<Iloc> {
    if v > 2 {
        return Err(Error::unsupported(format!("'iloc' version {v}")));
    }
    let sizes = cur.read_u8()?;
    let offset_size = check_field_size(sizes >> 4, "offset_size")?;
    let length_size = check_field_size(sizes & 0xF, "length_size")?;
    let sizes = cur.read_u8()?;
    let base_offset_size = check_field_size(sizes >> 4, "base_offset_size")?;
    let index_size = if v > 0 {
        check_field_size(sizes & 0xF, "index_size")?
    } else {
        if sizes & 0xF != 0 {
            return Err(Error::unsupported("non-zero reserved bits in 'iloc'"));
        }
        0
    };
    let id_size = if v < 2 { 2 } else { 4 };
    let item_count = read_sized(cur, id_size)?;
    let mut items = Vec::with_capacity(item_count.min(1 << 12) as usize);
    for _ in 0..item_count {
        let item_id = read_sized(cur, id_size)? as u32;
        let construction_method = if v > 0 {
            let raw = cur.read_u16::<BigEndian>()?;
            if raw >> 4 != 0 {
                return Err(Error::unsupported("non-zero reserved bits in 'iloc'"));
            }
            (raw & 0xF) as u8
        } else {
            0
        };
        if cur.read_u16::<BigEndian>()? != 0 {
            return Err(Error::unsupported("non-zero data_reference_index in 'iloc'"));
        }
        let base_offset = read_sized(cur, base_offset_size)?;
        let extent_count = cur.read_u16::<BigEndian>()?;
        let mut extents = Vec::with_capacity(extent_count as usize);
        for _ in 0..extent_count {
            let item_reference_index = if index_size > 0 {
                Some(read_sized(cur, index_size)?)
            } else {
                None
            };
            let offset = read_sized(cur, offset_size)?;
            let length = read_sized(cur, length_size)?;
            extents.push(IlocExtent { item_reference_index, offset, length });
        }
        items.push(IlocItem { item_id, construction_method, base_offset, extents });
    }
    Ok(Iloc { offset_size, length_size, base_offset_size, index_size, items })
}

fn encode_iloc(iloc: &Iloc, v: u8, out: &mut Vec<u8>, offsets: &mut Vec<OffsetField>) -> Result<()> {
    let id_size = if v < 2 { 2 } else { 4 };
    out.push(iloc.offset_size << 4 | iloc.length_size);
    let index_size = if v > 0 { iloc.index_size } else { 0 };
    out.push(iloc.base_offset_size << 4 | index_size);
    write_sized(out, iloc.items.len() as u64, id_size)?;
    for item in &iloc.items {
        let in_file = item.construction_method == 0;
        write_sized(out, item.item_id as u64, id_size)?;
        if v > 0 {
            out.write_u16::<BigEndian>(item.construction_method as u16 & 0xF)?;
        }
        out.write_u16::<BigEndian>(0)?;

        let mut base = None;
        if iloc.base_offset_size > 0 {
            if in_file {
                base = Some(offsets.len());
                offsets.push(OffsetField {
                    pos: out.len(),
                    width: iloc.base_offset_size,
                    value: item.base_offset,
                    base: None,
                });
            }
            write_sized(out, item.base_offset, iloc.base_offset_size)?;
        }

        out.write_u16::<BigEndian>(item.extents.len() as u16)?;
        for extent in &item.extents {
            if v > 0 && iloc.index_size > 0 {
                write_sized(out, extent.item_reference_index.unwrap_or(0), iloc.index_size)?;
            }
            if iloc.offset_size > 0 {
                if in_file {
                    offsets.push(OffsetField {
                        pos: out.len(),
                        width: iloc.offset_size,
                        value: extent.offset,
                        base,
                    });
                }
                write_sized(out, extent.offset, iloc.offset_size)?;
            }
            write_sized(out, extent.length, iloc.length_size)?;
        }
    }
    Ok(())
}
