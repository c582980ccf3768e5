use crate::body::BoxBody;
use crate::boxes::{BoxHeader, BoxNode, BoxTree, FourCC, FullBoxHeader, NodeId};
use crate::error::{Error, Result};
use crate::recipes::{recipe_for, Context, Dispatch};
use crate::util::SourceReader;
use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, warn};
use std::io::{Cursor, ErrorKind, Read, Seek};

/// Deepest box nesting accepted before the input is rejected.
pub const MAX_BOX_DEPTH: usize = 32;

/// Reads a box header at the current position. `parent_end` bounds the box and
/// resolves the size-0 form ("extends to the end of the parent").
pub fn read_box_header<R: Read + Seek>(r: &mut R, parent_end: u64) -> Result<BoxHeader> {
    let start = r.stream_position()?;
    let size32 = r.read_u32::<BigEndian>()?;
    let mut typ = [0u8; 4];
    r.read_exact(&mut typ)?;
    let typ = FourCC(typ);

    let (size, header_size) = match size32 {
        1 => {
            if start + 16 > parent_end {
                return Err(Error::Truncated(typ));
            }
            (r.read_u64::<BigEndian>()?, 16)
        }
        0 => (parent_end - start, 8),
        n => (n as u64, 8),
    };

    if size < header_size {
        return Err(Error::InvalidSize { typ, start, size });
    }
    let end = start
        .checked_add(size)
        .ok_or(Error::InvalidSize { typ, start, size })?;
    if end > parent_end {
        return Err(Error::Overrun { typ, start, end, parent_end });
    }

    Ok(BoxHeader { size, typ, header_size, start })
}

fn read_full_box_header<R: Read>(r: &mut R) -> Result<FullBoxHeader> {
    let version = r.read_u8()?;
    let flags = r.read_u24::<BigEndian>()?;
    Ok(FullBoxHeader::new(version, flags))
}

/// Reports running out of body bytes as a truncated box rather than an I/O failure.
fn within(typ: FourCC, err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof => Error::Truncated(typ),
        other => other,
    }
}

/// A run of sibling boxes: the byte range they fill, the recipes that apply and how
/// deep they sit in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxSequence {
    pub start: u64,
    pub end: u64,
    pub ctx: Context,
    /// Entry count announced by the parent, if any; a different number of boxes is an error.
    pub expected: Option<u32>,
    pub depth: usize,
}

impl BoxSequence {
    /// The top-level boxes of a file of `len` bytes.
    pub fn top_level(len: u64) -> Self {
        Self { start: 0, end: len, ctx: Context::TopLevel, expected: None, depth: 0 }
    }

    fn nested(&self, start: u64, end: u64, ctx: Context, expected: Option<u32>) -> Self {
        Self { start, end, ctx, expected, depth: self.depth + 1 }
    }
}

/// Parses the boxes of `seq` and adds them to `tree` under `parent`.
/// Returns the ids of the parsed boxes in file order.
pub fn parse_box_sequence<R: Read + Seek>(
    src: &mut SourceReader<R>,
    tree: &mut BoxTree,
    parent: Option<NodeId>,
    seq: BoxSequence,
) -> Result<Vec<NodeId>> {
    let BoxSequence { start, end, ctx, expected, depth } = seq;
    if depth > MAX_BOX_DEPTH {
        return Err(Error::TooDeep(MAX_BOX_DEPTH));
    }

    src.seek_to(start)?;
    let mut ids = Vec::new();
    let mut pos = start;
    let mut mdat_count = 0;

    while pos + 8 <= end {
        let h = read_box_header(src.inner_mut(), end)?;
        let recipe = recipe_for(ctx, h.typ);
        let box_end = h.start + h.size;
        debug!(
            "{}'{}' \"{}\" size = {}, offset = {}",
            "  ".repeat(depth),
            h.typ,
            recipe.name,
            h.size,
            h.start
        );

        if h.typ == b"mdat" && ctx == Context::TopLevel {
            mdat_count += 1;
            if mdat_count > 1 {
                warn!("files with multiple 'mdat' boxes have not been tested");
            }
        }

        let full = match recipe.dispatch {
            Dispatch::Unsupported => return Err(Error::UnsupportedBox(h.typ)),
            _ if recipe.full_box => {
                if h.start + h.header_size + 4 > box_end {
                    return Err(Error::Truncated(h.typ));
                }
                Some(read_full_box_header(src.inner_mut())?)
            }
            _ => None,
        };

        let id = tree.push(BoxNode {
            typ: h.typ,
            start: h.start,
            size: h.size,
            header_size: h.header_size,
            full,
            body: BoxBody::Empty,
            children: None,
            dirty: false,
            parent,
        });
        let body_start = tree[id].body_start();

        let (body, children) = match recipe.dispatch {
            Dispatch::Opaque | Dispatch::Unsupported => (BoxBody::Opaque, None),
            Dispatch::Children(child_ctx) => {
                let kids = parse_box_sequence(src, tree, Some(id), seq.nested(body_start, box_end, child_ctx, None))?;
                (BoxBody::Empty, Some(kids))
            }
            Dispatch::Body(kind) => {
                let data = src.read_slice(body_start, box_end - body_start)?;
                let mut cur = Cursor::new(&data[..]);
                let body = BoxBody::decode(kind, &mut cur, full).map_err(|e| within(h.typ, e))?;
                let consumed = cur.position();

                match kind.child_context(full) {
                    Some(child_ctx) => {
                        let nested = seq.nested(body_start + consumed, box_end, child_ctx, body.expected_children());
                        let kids = parse_box_sequence(src, tree, Some(id), nested)?;
                        (body, Some(kids))
                    }
                    None => {
                        if consumed < data.len() as u64 {
                            warn!(
                                "did not read all data in '{}' at offset {} ({} byte(s) more)",
                                h.typ,
                                h.start,
                                data.len() as u64 - consumed
                            );
                        }
                        (body, None)
                    }
                }
            }
        };

        let node = tree.get_mut(id);
        node.body = body;
        node.children = children;

        ids.push(id);
        pos = box_end;
        src.seek_to(pos)?;
    }

    if pos < end {
        warn!("{} byte(s) of trailing data before offset {end} could not hold a box", end - pos);
    }

    if let Some(expected) = expected {
        if expected as usize != ids.len() {
            let typ = parent.map(|p| tree[p].typ).unwrap_or(FourCC(*b"    "));
            return Err(Error::ChildCount { typ, expected, actual: ids.len() });
        }
    }

    Ok(ids)
}

/// Parses a whole file into a box tree.
pub fn parse_file<R: Read + Seek>(src: &mut SourceReader<R>) -> Result<BoxTree> {
    let mut tree = BoxTree::new();
    let roots = parse_box_sequence(src, &mut tree, None, BoxSequence::top_level(src.len()))?;
    tree.set_roots(roots);
    Ok(tree)
}
