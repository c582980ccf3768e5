use crate::av1::{find_sequence_header, SequenceHeader};
use crate::body::{BoxBody, IlocItem};
use crate::boxes::{BoxTree, FourCC, NodeId};
use crate::error::{Error, Result};
use crate::parser::parse_file;
use crate::util::SourceReader;
use byteorder::{BigEndian, ByteOrder};
use log::debug;
use std::io::{Read, Seek};

/// `infe` flag marking an item that is not meant to be displayed.
pub const ITEM_HIDDEN: u32 = 0x1;

/// An image item with its location and resolved properties.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: u32,
    pub infe: NodeId,
    pub item_type: FourCC,
    pub hidden: bool,
    pub location: Option<IlocItem>,
    /// Associated `ipco` children, in association order, with their essential flag.
    pub properties: Vec<(NodeId, bool)>,
}

impl Item {
    /// First associated property of the given type.
    pub fn property(&self, tree: &BoxTree, typ: &[u8; 4]) -> Option<NodeId> {
        self.properties.iter().map(|&(p, _)| p).find(|&p| tree[p].typ == typ)
    }
}

/// A parsed AVIF file: the box tree plus the source it was read from.
pub struct AvifFile<R> {
    source: SourceReader<R>,
    tree: BoxTree,
}

impl<R: Read + Seek> AvifFile<R> {
    /// Parses the whole box structure. The file must start with an `ftyp` box.
    pub fn parse(reader: R) -> Result<Self> {
        let mut source = SourceReader::new(reader)?;
        if source.len() <= 8 {
            return Err(Error::NotAvif("file is too small"));
        }
        let head = source.read_slice(0, 8)?;
        if BigEndian::read_u32(&head[..4]) <= 8 {
            return Err(Error::NotAvif("first box is too small to be 'ftyp'"));
        }
        if &head[4..8] != b"ftyp" {
            return Err(Error::NotAvif("file does not start with 'ftyp' box"));
        }

        let tree = parse_file(&mut source)?;
        Ok(Self { source, tree })
    }

    pub fn tree(&self) -> &BoxTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut BoxTree {
        &mut self.tree
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut BoxTree, &mut SourceReader<R>) {
        (&mut self.tree, &mut self.source)
    }

    /// Items declared in `meta/iinf`, in declaration order.
    pub fn items(&self) -> Result<Vec<Item>> {
        let tree = &self.tree;
        let Some(iinf) = tree.find(&[b"meta", b"iinf"]) else {
            return Ok(Vec::new());
        };
        let iloc = tree.find(&[b"meta", b"iloc"]).and_then(|id| match &tree[id].body {
            BoxBody::Iloc(iloc) => Some(iloc),
            _ => None,
        });

        let mut items = Vec::new();
        for &infe_id in tree.children(iinf) {
            let node = &tree[infe_id];
            let BoxBody::Infe(infe) = &node.body else {
                continue;
            };
            items.push(Item {
                id: infe.item_id,
                infe: infe_id,
                item_type: infe.item_type,
                hidden: node.full.map(|f| f.flags & ITEM_HIDDEN != 0).unwrap_or(false),
                location: iloc.and_then(|l| l.item(infe.item_id)).cloned(),
                properties: tree.item_properties(infe.item_id)?,
            });
        }
        Ok(items)
    }

    /// Reads the payload of an item stored in the file (construction method 0).
    pub fn item_payload(&mut self, item: &Item) -> Result<Vec<u8>> {
        let loc = item
            .location
            .as_ref()
            .ok_or(Error::InvalidData("item has no 'iloc' entry"))?;
        if loc.construction_method != 0 {
            return Err(Error::unsupported(format!(
                "item {} uses construction method {}",
                item.id, loc.construction_method
            )));
        }

        let mut data = Vec::new();
        for extent in &loc.extents {
            let offset = loc
                .base_offset
                .checked_add(extent.offset)
                .ok_or(Error::InvalidData("item extent offset overflows"))?;
            // a zero length extends to the end of the file
            let length = match extent.length {
                0 => self.source.len().saturating_sub(offset),
                n => n,
            };
            let end = offset.checked_add(length).unwrap_or(u64::MAX);
            if end > self.source.len() {
                return Err(Error::InvalidData("item extent lies outside the file"));
            }
            data.extend(self.source.read_slice(offset, length)?);
        }
        debug!("item {}: {} payload byte(s)", item.id, data.len());
        Ok(data)
    }

    /// Decodes the Sequence Header OBU carried by an `av01` item.
    pub fn item_sequence_header(&mut self, item: &Item) -> Result<Option<SequenceHeader>> {
        let data = self.item_payload(item)?;
        find_sequence_header(&data)
    }
}
