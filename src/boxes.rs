use crate::body::BoxBody;
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else { None }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl serde::Serialize for FourCC {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

#[derive(Debug, Clone)]
pub struct BoxHeader {
    pub size: u64,          // total size including header, resolved when stored as 0
    pub typ: FourCC,
    pub header_size: u64,   // 8 or 16
    pub start: u64,         // file offset of header start
}

/// Version and flags of a FullBox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl FullBoxHeader {
    pub fn new(version: u8, flags: u32) -> Self {
        Self { version, flags }
    }
}

/// Index of a node inside a [`BoxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct BoxNode {
    pub typ: FourCC,
    /// Source range. Zero for boxes synthesized after parsing.
    pub start: u64,
    pub size: u64,
    pub header_size: u64,
    pub full: Option<FullBoxHeader>,
    pub body: BoxBody,
    pub children: Option<Vec<NodeId>>,
    pub dirty: bool,
    pub parent: Option<NodeId>,
}

impl BoxNode {
    /// A new box with no source range. It is written from its body when the tree is serialized.
    pub fn new(typ: FourCC, full: Option<FullBoxHeader>, body: BoxBody) -> Self {
        Self {
            typ,
            start: 0,
            size: 0,
            header_size: 0,
            full,
            body,
            children: None,
            dirty: true,
            parent: None,
        }
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// First byte after the box header and the version/flags word, if any.
    pub fn body_start(&self) -> u64 {
        self.start + self.header_size + if self.full.is_some() { 4 } else { 0 }
    }

    pub fn is_synthesized(&self) -> bool {
        self.size == 0
    }
}

/// Arena holding every box of a parsed file.
///
/// Children are referenced by [`NodeId`] and every node keeps the id of its parent,
/// so dirtiness can be pushed upwards without shared ownership.
#[derive(Debug, Default)]
pub struct BoxTree {
    nodes: Vec<BoxNode>,
    roots: Vec<NodeId>,
}

impl BoxTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub(crate) fn set_roots(&mut self, roots: Vec<NodeId>) {
        self.roots = roots;
    }

    pub fn get(&self, id: NodeId) -> &BoxNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut BoxNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push(&mut self, node: BoxNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Children of a node in file order; empty for leaves.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).children.as_deref().unwrap_or(&[])
    }

    /// Marks `id` and all of its ancestors as needing to be regenerated.
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.get_mut(c);
            node.dirty = true;
            cur = node.parent;
        }
    }

    /// Appends a new box as the last child of `parent` and marks it dirty.
    pub fn append_child(&mut self, parent: NodeId, mut node: BoxNode) -> NodeId {
        node.parent = Some(parent);
        let id = self.push(node);
        self.get_mut(parent).children.get_or_insert_with(Vec::new).push(id);
        self.mark_dirty(id);
        id
    }

    /// Drops the children of `parent` rejected by `keep(position, id)`.
    /// Dropped nodes stay in the arena but are no longer reachable.
    pub(crate) fn detach_children(&mut self, parent: NodeId, keep: impl Fn(usize, NodeId) -> bool) {
        if let Some(kids) = self.get_mut(parent).children.as_mut() {
            let mut idx = 0;
            kids.retain(|&k| {
                let kept = keep(idx, k);
                idx += 1;
                kept
            });
        }
        self.mark_dirty(parent);
    }

    /// First direct child of `parent` with the given type.
    pub fn child(&self, parent: NodeId, typ: &[u8; 4]) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&c| self.get(c).typ == typ)
    }

    /// Resolves a path of box types starting at the top level, e.g. `[b"meta", b"iprp", b"ipco"]`.
    pub fn find(&self, path: &[&[u8; 4]]) -> Option<NodeId> {
        self.find_in(&self.roots, path)
    }

    /// Resolves a path starting from a list of sibling boxes. The first match at each level wins.
    pub fn find_in(&self, siblings: &[NodeId], path: &[&[u8; 4]]) -> Option<NodeId> {
        let (first, rest) = path.split_first()?;
        let hit = siblings.iter().copied().find(|&s| self.get(s).typ == *first)?;
        if rest.is_empty() {
            Some(hit)
        } else {
            self.find_in(self.children(hit), rest)
        }
    }

    /// Resolves a path below `parent`.
    pub fn find_below(&self, parent: NodeId, path: &[&[u8; 4]]) -> Option<NodeId> {
        self.find_in(self.children(parent), path)
    }

    /// All top-level `moov/trak` boxes.
    pub fn tracks(&self) -> Vec<NodeId> {
        match self.find(&[b"moov"]) {
            Some(moov) => self
                .children(moov)
                .iter()
                .copied()
                .filter(|&t| self.get(t).typ == b"trak")
                .collect(),
            None => Vec::new(),
        }
    }

    /// True if anything in the tree has to be regenerated.
    pub fn is_modified(&self) -> bool {
        self.roots.iter().any(|&r| self.get(r).dirty)
    }

    /// Marks every box that stores absolute file offsets (`iloc`, `stco`, `co64`) as dirty.
    pub fn mark_offset_boxes_dirty(&mut self) {
        if let Some(iloc) = self.find(&[b"meta", b"iloc"]) {
            self.mark_dirty(iloc);
        }
        for trak in self.tracks() {
            for table in [b"stco", b"co64"] {
                if let Some(id) = self.find_below(trak, &[b"mdia", b"minf", b"stbl", table]) {
                    self.mark_dirty(id);
                }
            }
        }
    }
}

impl std::ops::Index<NodeId> for BoxTree {
    type Output = BoxNode;

    fn index(&self, id: NodeId) -> &BoxNode {
        self.get(id)
    }
}
