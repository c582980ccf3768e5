//! Item property graph: `ipco` holds shared property boxes, `ipma` maps each item to an
//! ordered list of 1-based property indices.

use crate::body::{Association, BoxBody, Ipma};
use crate::boxes::{BoxNode, BoxTree, FourCC, FullBoxHeader, NodeId};
use crate::error::{Error, Result};
use log::debug;

/// A property box by value.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub typ: FourCC,
    pub full: Option<FullBoxHeader>,
    pub body: BoxBody,
}

impl Property {
    pub fn new(typ: &[u8; 4], full: Option<FullBoxHeader>, body: BoxBody) -> Self {
        Self { typ: FourCC(*typ), full, body }
    }

    /// Copy of an existing property box.
    pub fn of(node: &BoxNode) -> Self {
        Self { typ: node.typ, full: node.full, body: node.body.clone() }
    }

    fn matches(&self, node: &BoxNode) -> bool {
        node.typ == self.typ && node.full == self.full && node.body == self.body
    }
}

/// Selects associations by property type and, optionally, exact header and body.
#[derive(Debug, Clone, Copy)]
pub struct PropertyFilter<'a> {
    pub typ: FourCC,
    pub full: Option<Option<FullBoxHeader>>,
    pub body: Option<&'a BoxBody>,
}

impl<'a> PropertyFilter<'a> {
    pub fn of_type(typ: &[u8; 4]) -> Self {
        Self { typ: FourCC(*typ), full: None, body: None }
    }

    pub fn exact(property: &'a Property) -> Self {
        Self { typ: property.typ, full: Some(property.full), body: Some(&property.body) }
    }

    fn matches(&self, node: &BoxNode) -> bool {
        node.typ == self.typ
            && self.full.is_none_or(|f| node.full == f)
            && self.body.is_none_or(|b| &node.body == b)
    }
}

fn ipma_body(node: &BoxNode) -> Result<&Ipma> {
    match &node.body {
        BoxBody::Ipma(ipma) => Ok(ipma),
        _ => Err(Error::InvalidData("'ipma' box was not decoded")),
    }
}

fn ipma_body_mut(node: &mut BoxNode) -> Result<&mut Ipma> {
    match &mut node.body {
        BoxBody::Ipma(ipma) => Ok(ipma),
        _ => Err(Error::InvalidData("'ipma' box was not decoded")),
    }
}

impl BoxTree {
    fn ipco(&self) -> Option<NodeId> {
        self.find(&[b"meta", b"iprp", b"ipco"])
    }

    fn ipma(&self) -> Option<NodeId> {
        self.find(&[b"meta", b"iprp", b"ipma"])
    }

    fn property_graph(&self) -> Result<(NodeId, NodeId)> {
        let ipco = self.ipco().ok_or(Error::MissingBox("ipco"))?;
        let ipma = self.ipma().ok_or(Error::MissingBox("ipma"))?;
        Ok((ipco, ipma))
    }

    /// Resolves a 1-based property index to its `ipco` child.
    fn property_at(&self, ipco: NodeId, index: u16) -> Result<NodeId> {
        let props = self.children(ipco);
        match (index as usize).checked_sub(1).and_then(|i| props.get(i)) {
            Some(&id) => Ok(id),
            None => Err(Error::PropertyIndexOutOfRange { index, count: props.len() }),
        }
    }

    /// Properties associated with an item, in association order. Empty when the file
    /// has no property boxes.
    pub fn item_properties(&self, item_id: u32) -> Result<Vec<(NodeId, bool)>> {
        let (Some(ipco), Some(ipma)) = (self.ipco(), self.ipma()) else {
            return Ok(Vec::new());
        };
        let ipma = ipma_body(&self[ipma])?;
        let Some(list) = ipma.associations.get(&item_id) else {
            return Ok(Vec::new());
        };
        list.iter()
            .map(|a| Ok((self.property_at(ipco, a.property_index)?, a.essential)))
            .collect()
    }

    /// 1-based index of a property box equal to `property`, if one exists.
    pub fn find_existing_property(&self, property: &Property) -> Option<u16> {
        let ipco = self.ipco()?;
        self.children(ipco)
            .iter()
            .position(|&p| property.matches(&self[p]))
            .and_then(|i| u16::try_from(i + 1).ok())
    }

    /// Index of an equal property, appending a new box to `ipco` if there is none.
    pub fn ensure_property(&mut self, property: &Property) -> Result<u16> {
        if let Some(index) = self.find_existing_property(property) {
            return Ok(index);
        }
        let (ipco, _) = self.property_graph()?;
        let node = BoxNode::new(property.typ, property.full, property.body.clone());
        self.append_child(ipco, node);
        let count = self.children(ipco).len();
        debug!("added '{}' property at index {count}", property.typ);
        u16::try_from(count).map_err(|_| Error::unsupported("too many item properties"))
    }

    /// Associates an item with a property. An existing association is left in place, only
    /// upgraded to essential when requested; a new one goes to `position` (default: last).
    pub fn add_association(
        &mut self,
        item_id: u32,
        property_index: u16,
        essential: bool,
        position: Option<usize>,
    ) -> Result<()> {
        let (ipco, ipma) = self.property_graph()?;
        self.property_at(ipco, property_index)?;

        let list = ipma_body_mut(self.get_mut(ipma))?
            .associations
            .entry(item_id)
            .or_default();
        let changed = match list.iter_mut().find(|a| a.property_index == property_index) {
            Some(existing) if essential && !existing.essential => {
                existing.essential = true;
                true
            }
            Some(_) => false,
            None => {
                let pos = position.unwrap_or(list.len()).min(list.len());
                list.insert(pos, Association { property_index, essential });
                true
            }
        };
        if changed {
            self.mark_dirty(ipma);
        }
        Ok(())
    }

    /// Removes every association of `item_id` with a property matching `filter`.
    ///
    /// Returns the position and essential flag of the first removed association, or
    /// `(None, true)` if nothing matched. Properties left without associations stay in
    /// `ipco` until [`BoxTree::compact_properties`] runs.
    pub fn remove_associations(
        &mut self,
        item_id: u32,
        filter: &PropertyFilter<'_>,
    ) -> Result<(Option<usize>, bool)> {
        let (ipco, ipma) = self.property_graph()?;
        let Some(list) = ipma_body(&self[ipma])?.associations.get(&item_id) else {
            return Ok((None, true));
        };

        let mut kept = Vec::with_capacity(list.len());
        let mut first_removed = None;
        for (pos, a) in list.iter().enumerate() {
            let prop = self.property_at(ipco, a.property_index)?;
            if filter.matches(&self[prop]) {
                first_removed.get_or_insert((pos, a.essential));
            } else {
                kept.push(*a);
            }
        }

        let Some((pos, essential)) = first_removed else {
            return Ok((None, true));
        };
        ipma_body_mut(self.get_mut(ipma))?.associations.insert(item_id, kept);
        self.mark_dirty(ipma);
        Ok((Some(pos), essential))
    }

    /// Swaps the item's associations matching `old` for `property`, keeping the position
    /// and essential flag of the first one replaced.
    pub fn replace_property(
        &mut self,
        property: &Property,
        item_id: u32,
        old: &PropertyFilter<'_>,
    ) -> Result<()> {
        let index = self.ensure_property(property)?;
        let (position, essential) = self.remove_associations(item_id, old)?;
        self.add_association(item_id, index, essential, position)?;
        self.compact_properties()
    }

    /// Adds a property if needed and associates the item with it.
    pub fn add_property(
        &mut self,
        property: &Property,
        item_id: u32,
        essential: bool,
        position: Option<usize>,
    ) -> Result<u16> {
        let index = self.ensure_property(property)?;
        self.add_association(item_id, index, essential, position)?;
        Ok(index)
    }

    /// Drops properties no item refers to and renumbers the remaining associations.
    pub fn compact_properties(&mut self) -> Result<()> {
        let (Some(ipco), Some(ipma)) = (self.ipco(), self.ipma()) else {
            return Ok(());
        };
        let count = self.children(ipco).len();
        let mut used = vec![0usize; count];
        for list in ipma_body(&self[ipma])?.associations.values() {
            for a in list {
                self.property_at(ipco, a.property_index)?;
                used[a.property_index as usize - 1] += 1;
            }
        }
        if used.iter().all(|&n| n > 0) {
            return Ok(());
        }

        // dropped[i] = number of unused properties at or before index i
        let dropped: Vec<u16> = used
            .iter()
            .scan(0u16, |acc, &n| {
                *acc += (n == 0) as u16;
                Some(*acc)
            })
            .collect();
        for list in ipma_body_mut(self.get_mut(ipma))?.associations.values_mut() {
            for a in list.iter_mut() {
                a.property_index -= dropped[a.property_index as usize - 1];
            }
        }
        debug!("unused item properties dropped: {}", used.iter().filter(|&&n| n == 0).count());
        self.detach_children(ipco, |pos, _| used[pos] > 0);
        self.mark_dirty(ipma);
        Ok(())
    }
}
