//! DTD nodes
//!
//! One view covers the DTD container (the DOCTYPE itself) and the four
//! declaration node kinds that live inside it. The sub-kind is derived
//! from the declaration's secondary discriminator on every access.

use std::ops::Deref;

use super::kind::{dtd_kind_of, DtdKind};
use super::{registry, NodeKind, XmlNode};
use crate::engine::dtd::scan_markup_decl;
use crate::engine::store::RawStore;
use crate::node::StoreRef;

/// A DTD or DTD declaration node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtdNode(pub(crate) XmlNode);

impl Deref for DtdNode {
    type Target = XmlNode;

    fn deref(&self) -> &XmlNode {
        &self.0
    }
}

impl DtdNode {
    /// Parses a single markup declaration — element, attribute, entity,
    /// or notation — from its full XML string.
    pub fn from_xml_string(declaration: &str) -> Option<DtdNode> {
        let store: StoreRef = std::rc::Rc::new(std::cell::RefCell::new(RawStore::new()));
        let id = {
            let mut s = store.borrow_mut();
            scan_markup_decl(&mut s, declaration)?.into_iter().next()?
        };
        registry::wrap(&store, id).as_dtd_node()
    }

    pub fn as_node(&self) -> &XmlNode {
        &self.0
    }

    pub fn into_node(self) -> XmlNode {
        self.0
    }

    /// The DTD sub-kind, derived from the declaration category and its
    /// structural discriminator. `None` for the DTD container itself.
    pub fn dtd_kind(&self) -> Option<DtdKind> {
        let store = self.store();
        let kind = dtd_kind_of(store.borrow().node(self.raw()));
        kind
    }

    /// True when the system id is set. Meaningful for entities and
    /// notations.
    pub fn is_external(&self) -> bool {
        self.system_id().is_some()
    }

    pub fn public_id(&self) -> Option<String> {
        let store = self.store();
        let id = store
            .borrow()
            .node(self.raw())
            .decl
            .as_deref()
            .and_then(|i| i.public_id.clone());
        id
    }

    pub fn set_public_id(&self, public_id: Option<&str>) {
        let store = self.store();
        let mut s = store.borrow_mut();
        let info = s
            .node_mut(self.raw())
            .decl
            .get_or_insert_with(Default::default);
        info.public_id = public_id.map(str::to_string);
    }

    pub fn system_id(&self) -> Option<String> {
        let store = self.store();
        let id = store
            .borrow()
            .node(self.raw())
            .decl
            .as_deref()
            .and_then(|i| i.system_id.clone());
        id
    }

    pub fn set_system_id(&self, system_id: Option<&str>) {
        let store = self.store();
        let mut s = store.borrow_mut();
        let info = s
            .node_mut(self.raw())
            .decl
            .get_or_insert_with(Default::default);
        info.system_id = system_id.map(str::to_string);
    }

    /// The NDATA notation name. Meaningful only for unparsed entities;
    /// `None` for everything else.
    pub fn notation_name(&self) -> Option<String> {
        if self.dtd_kind() != Some(DtdKind::Unparsed) {
            return None;
        }
        let store = self.store();
        let name = store
            .borrow()
            .node(self.raw())
            .decl
            .as_deref()
            .and_then(|i| i.notation_name.clone());
        name
    }

    pub fn set_notation_name(&self, name: Option<&str>) {
        if self.dtd_kind() != Some(DtdKind::Unparsed) {
            return;
        }
        let store = self.store();
        let mut s = store.borrow_mut();
        let info = s
            .node_mut(self.raw())
            .decl
            .get_or_insert_with(Default::default);
        info.notation_name = name.map(str::to_string);
    }

    /// The declaration nodes of a DTD container, in declaration order.
    pub fn declarations(&self) -> Vec<DtdNode> {
        if self.kind() != NodeKind::Dtd {
            return Vec::new();
        }
        self.children()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| child.as_dtd_node())
            .collect()
    }

    /// The first declaration with this name and kind.
    pub fn declaration(&self, name: &str, kind: NodeKind) -> Option<DtdNode> {
        self.declarations()
            .into_iter()
            .find(|decl| decl.kind() == kind && decl.name().as_deref() == Some(name))
    }
}
