use crate::avif::AvifFile;
use crate::body::{BoxBody, OffsetField};
use crate::boxes::{BoxTree, FourCC, FullBoxHeader, NodeId};
use crate::error::{Error, Result};
use crate::util::{write_sized, SourceReader};
use byteorder::{BigEndian, ByteOrder};
use log::debug;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An absolute file offset written to the output, to be corrected once the final
/// position of every `mdat` is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderFileOffset {
    pub owner: NodeId,
    /// Position of the field in the output.
    pub file_pos: u64,
    pub width: u8,
    pub value: u64,
    /// Index of the placeholder this one is relative to.
    pub base: Option<usize>,
    pub dependents: Vec<usize>,
}

impl PlaceholderFileOffset {
    /// Source offsets this field points at: `value` itself, or `value` plus each dependent.
    pub fn offsets(&self, all: &[PlaceholderFileOffset]) -> Vec<u64> {
        if self.dependents.is_empty() {
            return vec![self.value];
        }
        self.dependents
            .iter()
            .map(|&d| self.value.saturating_add(all[d].value))
            .collect()
    }
}

/// Old and new position of a top-level `mdat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PayloadMove {
    old_start: u64,
    old_end: u64,
    new_start: u64,
}

impl PayloadMove {
    fn contains(&self, offset: u64) -> bool {
        self.old_start <= offset && offset < self.old_end
    }
}

/// Writes a box header with a 32-bit size placeholder and returns the start of the box.
fn begin_box(buf: &mut Vec<u8>, typ: FourCC, full: Option<FullBoxHeader>) -> usize {
    let start = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&typ.0);
    if let Some(f) = full {
        buf.push(f.version);
        buf.extend_from_slice(&f.flags.to_be_bytes()[1..]);
    }
    start
}

fn finish_box(buf: &mut [u8], start: usize, typ: FourCC) -> Result<()> {
    let size = u32::try_from(buf.len() - start)
        .map_err(|_| Error::unsupported(format!("regenerated '{typ}' box exceeds 32-bit size")))?;
    BigEndian::write_u32(&mut buf[start..start + 4], size);
    Ok(())
}

/// Serializes one box into `buf`. Clean boxes are copied from the source; dirty ones
/// are regenerated from their body and children. Offset fields are appended to
/// `fields` with positions relative to `buf`.
fn write_node<R: Read + Seek>(
    tree: &BoxTree,
    source: &mut SourceReader<R>,
    id: NodeId,
    buf: &mut Vec<u8>,
    fields: &mut Vec<(NodeId, OffsetField)>,
) -> Result<()> {
    let node = &tree[id];
    if !node.dirty || matches!(node.body, BoxBody::Opaque) {
        if node.is_synthesized() {
            return Err(Error::unsupported(format!("new '{}' box has no content", node.typ)));
        }
        buf.extend(source.read_slice(node.start, node.size)?);
        return Ok(());
    }

    let start = begin_box(buf, node.typ, node.full);
    let kids = tree.children(id);
    let mut local = Vec::new();
    node.body.encode(node.typ, node.full, kids.len(), buf, &mut local)?;
    let first = fields.len();
    fields.extend(
        local
            .into_iter()
            .map(|f| (id, OffsetField { base: f.base.map(|b| b + first), ..f })),
    );
    for &kid in kids {
        write_node(tree, source, kid, buf, fields)?;
    }
    finish_box(buf, start, node.typ)
}

/// Serializes a (possibly modified) [`AvifFile`] and patches the file offsets that moved.
pub struct AvifWriter<W> {
    out: W,
    placeholders: Vec<PlaceholderFileOffset>,
    payloads: Vec<PayloadMove>,
}

impl<W: Write + Seek> AvifWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, placeholders: Vec::new(), payloads: Vec::new() }
    }

    /// Writes every top-level box and returns the output.
    pub fn write<R: Read + Seek>(mut self, file: &mut AvifFile<R>) -> Result<W> {
        let (tree, source) = file.parts_mut();
        if tree.is_modified() {
            tree.mark_offset_boxes_dirty();
        }
        let tree: &BoxTree = tree;

        for &root in tree.roots() {
            let node = &tree[root];
            let pos = self.out.stream_position()?;
            if node.typ == b"mdat" {
                self.payloads.push(PayloadMove {
                    old_start: node.start,
                    old_end: node.end(),
                    new_start: pos,
                });
            }

            if !node.dirty {
                source.copy_range_to(&mut self.out, node.start, node.size)?;
                continue;
            }

            debug!("regenerating '{}' at output offset {pos}", node.typ);
            let mut buf = Vec::new();
            let mut fields = Vec::new();
            write_node(tree, source, root, &mut buf, &mut fields)?;
            self.register(pos, fields);
            self.out.write_all(&buf)?;
        }

        self.patch_offsets()?;
        Ok(self.out)
    }

    fn register(&mut self, box_pos: u64, fields: Vec<(NodeId, OffsetField)>) {
        let first = self.placeholders.len();
        for (owner, f) in fields {
            let index = self.placeholders.len();
            let base = f.base.map(|b| b + first);
            if let Some(b) = base {
                self.placeholders[b].dependents.push(index);
            }
            self.placeholders.push(PlaceholderFileOffset {
                owner,
                file_pos: box_pos + f.pos as u64,
                width: f.width,
                value: f.value,
                base,
                dependents: Vec::new(),
            });
        }
    }

    /// Points every placeholder at the new position of the `mdat` it referred to.
    fn patch_offsets(&mut self) -> Result<()> {
        let end = self.out.stream_position()?;
        for p in self.placeholders.iter().filter(|p| p.base.is_none()) {
            let offsets = p.offsets(&self.placeholders);

            let mut target = None;
            for m in &self.payloads {
                let inside = offsets.iter().filter(|&&o| m.contains(o)).count();
                if inside == offsets.len() {
                    target = Some(*m);
                    break;
                }
                if inside > 0 {
                    return Err(Error::OffsetSpansPayloads);
                }
            }
            let m = target.ok_or(Error::OffsetOutsidePayload(offsets[0]))?;

            let moved = p.value as i128 + (m.new_start as i128 - m.old_start as i128);
            let max = if p.width >= 8 { u64::MAX as i128 } else { (1i128 << (p.width as u32 * 8)) - 1 };
            if !(0..=max).contains(&moved) {
                return Err(Error::OffsetOverflow { value: moved, width: p.width });
            }
            if moved as u64 == p.value {
                continue;
            }

            let mut field = Vec::with_capacity(p.width as usize);
            write_sized(&mut field, moved as u64, p.width)?;
            self.out.seek(SeekFrom::Start(p.file_pos))?;
            self.out.write_all(&field)?;
            debug!("offset field at {} moved {} -> {moved}", p.file_pos, p.value);
        }
        self.out.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

/// Writes `file` to `out`, regenerating modified boxes.
pub fn write_file<R: Read + Seek, W: Write + Seek>(file: &mut AvifFile<R>, out: W) -> Result<W> {
    AvifWriter::new(out).write(file)
}

/// Sibling of `path` that receives the output until it is complete.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Writes `file` to `path`. The output is renamed into place only after every offset was
/// patched, so a failed write leaves `path` as it was.
pub fn write_file_to_path<R: Read + Seek>(file: &mut AvifFile<R>, path: &Path) -> Result<()> {
    let tmp = partial_path(path);
    let written = File::create(&tmp).map_err(Error::from).and_then(|f| {
        let mut out = write_file(file, BufWriter::new(f))?;
        out.flush()?;
        Ok(())
    });
    match written {
        Ok(()) => Ok(fs::rename(&tmp, path)?),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
