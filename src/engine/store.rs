//! Raw parse tree storage
//!
//! The unmanaged side of the object model: a slab arena of raw nodes
//! addressed by `RawId`, with parent/child/sibling links, a separate
//! attribute ("property") chain and namespace-declaration chain on
//! elements, and a per-node opaque slot where the wrapper layer stores
//! its back-pointer. The wrapper layer never touches links directly;
//! every structural change goes through the methods here.
//!
//! Freed ids are recycled through a free list. Freeing is kind-dispatched
//! at the call site (document subtree, DTD subtree, property, generic
//! node) and idempotent: freeing a dead id is a no-op.

use std::any::Any;
use std::rc::Weak;

use super::dtd::DeclInfo;

/// Index of a raw node in its owning store.
pub type RawId = u32;

/// Document property bit: serialized as HTML.
pub const DOC_PROP_HTML: u32 = 1 << 0;
/// Document property bit: serialized as XHTML.
pub const DOC_PROP_XHTML: u32 = 1 << 1;
/// Document property bit: serialized as plain text.
pub const DOC_PROP_TEXT: u32 = 1 << 2;

/// The native type tag of a raw node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Document,
    Element,
    Attribute,
    Namespace,
    ProcessingInstruction,
    Comment,
    Text,
    CdataSection,
    Dtd,
    ElementDecl,
    AttributeDecl,
    EntityDecl,
    NotationDecl,
}

impl RawKind {
    /// Kinds that own an ordinary child sequence.
    pub fn accepts_children(self) -> bool {
        matches!(self, RawKind::Document | RawKind::Element | RawKind::Dtd)
    }
}

/// Document-level payload carried by `RawKind::Document` nodes.
#[derive(Debug, Clone, Default)]
pub struct DocInfo {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: bool,
    /// Bitfield of `DOC_PROP_*` flags.
    pub properties: u32,
    /// The document's DTD node, also linked into the child chain.
    pub dtd: Option<RawId>,
    /// URI of document origin.
    pub uri: Option<String>,
}

/// A single node of the raw tree.
#[derive(Debug, Default)]
pub struct RawNode {
    pub kind: Option<RawKind>,
    /// Element/PI/attribute/declaration name; namespace prefix.
    pub name: Option<String>,
    /// Text/comment/PI content; attribute value; namespace href;
    /// entity replacement text.
    pub content: Option<String>,
    /// Resolved namespace URI (elements and attributes).
    pub ns_uri: Option<String>,
    pub parent: Option<RawId>,
    pub first_child: Option<RawId>,
    pub last_child: Option<RawId>,
    pub prev_sibling: Option<RawId>,
    pub next_sibling: Option<RawId>,
    /// Head of the attribute chain (elements).
    pub properties: Option<RawId>,
    /// Head of the namespace-declaration chain (elements).
    pub ns_defs: Option<RawId>,
    /// Owning document node, if the node belongs to a document tree.
    pub doc: Option<RawId>,
    /// DTD declaration payload.
    pub decl: Option<Box<DeclInfo>>,
    pub doc_info: Option<Box<DocInfo>>,
    /// Opaque slot for the managed layer's back-pointer.
    pub wrapper: Option<Weak<dyn Any>>,
    alive: bool,
}

impl RawNode {
    fn new(kind: RawKind) -> Self {
        RawNode {
            kind: Some(kind),
            alive: true,
            doc_info: if kind == RawKind::Document {
                Some(Box::default())
            } else {
                None
            },
            ..RawNode::default()
        }
    }

    /// True when no live wrapper points at this node.
    fn wrapper_is_dead(&self) -> bool {
        match &self.wrapper {
            None => true,
            Some(weak) => weak.strong_count() == 0,
        }
    }
}

/// Arena of raw nodes. One store per tree of related nodes; standalone
/// nodes start in a store of their own and are adopted on insertion.
#[derive(Debug, Default)]
pub struct RawStore {
    nodes: Vec<RawNode>,
    free: Vec<RawId>,
}

impl RawStore {
    pub fn new() -> Self {
        RawStore::default()
    }

    pub fn create(&mut self, kind: RawKind) -> RawId {
        self.alloc(RawNode::new(kind))
    }

    fn alloc(&mut self, node: RawNode) -> RawId {
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as RawId
        }
    }

    pub fn is_alive(&self, id: RawId) -> bool {
        self.nodes
            .get(id as usize)
            .map(|n| n.alive)
            .unwrap_or(false)
    }

    pub fn node(&self, id: RawId) -> &RawNode {
        let node = &self.nodes[id as usize];
        debug_assert!(node.alive, "access to freed raw node {id}");
        node
    }

    pub fn node_mut(&mut self, id: RawId) -> &mut RawNode {
        let node = &mut self.nodes[id as usize];
        debug_assert!(node.alive, "access to freed raw node {id}");
        node
    }

    pub fn kind(&self, id: RawId) -> RawKind {
        self.node(id).kind.expect("live raw node always has a kind")
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    /// Appends `child` at the end of `parent`'s child chain.
    pub fn add_child(&mut self, parent: RawId, child: RawId) {
        debug_assert!(self.node(child).parent.is_none(), "child is already linked");
        self.append_child_link(parent, child);
        let doc = self.document_for_children_of(parent);
        self.node_mut(child).doc = doc;
        if self.kind(child) == RawKind::Dtd && self.kind(parent) == RawKind::Document {
            self.doc_info_mut(parent).dtd = Some(child);
        }
    }

    /// Links `new` immediately before `anchor` in the child chain.
    pub fn add_prev_sibling(&mut self, anchor: RawId, new: RawId) {
        debug_assert!(self.node(new).parent.is_none(), "node is already linked");
        let parent = self.node(anchor).parent;
        let prev = self.node(anchor).prev_sibling;
        self.node_mut(new).parent = parent;
        self.node_mut(new).prev_sibling = prev;
        self.node_mut(new).next_sibling = Some(anchor);
        self.node_mut(anchor).prev_sibling = Some(new);
        match prev {
            Some(p) => self.node_mut(p).next_sibling = Some(new),
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).first_child = Some(new);
                }
            }
        }
        if let Some(parent) = parent {
            let doc = self.document_for_children_of(parent);
            self.node_mut(new).doc = doc;
        }
    }

    /// Links `new` immediately after `anchor` in the child chain.
    pub fn add_next_sibling(&mut self, anchor: RawId, new: RawId) {
        debug_assert!(self.node(new).parent.is_none(), "node is already linked");
        let parent = self.node(anchor).parent;
        let next = self.node(anchor).next_sibling;
        self.node_mut(new).parent = parent;
        self.node_mut(new).next_sibling = next;
        self.node_mut(new).prev_sibling = Some(anchor);
        self.node_mut(anchor).next_sibling = Some(new);
        match next {
            Some(n) => self.node_mut(n).prev_sibling = Some(new),
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).last_child = Some(new);
                }
            }
        }
        if let Some(parent) = parent {
            let doc = self.document_for_children_of(parent);
            self.node_mut(new).doc = doc;
        }
    }

    /// Swaps `new` into `old`'s position in the child chain. `old` ends up
    /// unlinked but not freed.
    pub fn replace_node(&mut self, old: RawId, new: RawId) {
        debug_assert!(self.node(new).parent.is_none(), "replacement is already linked");
        let parent = self.node(old).parent;
        let prev = self.node(old).prev_sibling;
        let next = self.node(old).next_sibling;
        {
            let node = self.node_mut(new);
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = next;
        }
        match prev {
            Some(p) => self.node_mut(p).next_sibling = Some(new),
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).first_child = Some(new);
                }
            }
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = Some(new),
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).last_child = Some(new);
                }
            }
        }
        {
            let node = self.node_mut(old);
            node.parent = None;
            node.prev_sibling = None;
            node.next_sibling = None;
        }
        if let Some(parent) = parent {
            let doc = self.document_for_children_of(parent);
            self.node_mut(new).doc = doc;
        }
    }

    /// Unlinks a node from whatever chain it is in (child, property, or
    /// namespace chain of its parent). The node keeps its document pointer.
    pub fn unlink(&mut self, id: RawId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => {
                // This node is the head of one of its parent's chains.
                let kind = self.kind(id);
                let parent_node = self.node_mut(parent);
                match kind {
                    RawKind::Attribute => parent_node.properties = next,
                    RawKind::Namespace => parent_node.ns_defs = next,
                    _ => parent_node.first_child = next,
                }
            }
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => {
                let kind = self.kind(id);
                if !matches!(kind, RawKind::Attribute | RawKind::Namespace) {
                    self.node_mut(parent).last_child = prev;
                }
            }
        }
        if self.kind(id) == RawKind::Dtd && self.kind(parent) == RawKind::Document {
            self.doc_info_mut(parent).dtd = None;
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Appends an attribute to `element`'s property chain.
    pub fn add_property(&mut self, element: RawId, attr: RawId) {
        debug_assert_eq!(self.kind(attr), RawKind::Attribute);
        debug_assert!(self.node(attr).parent.is_none(), "attribute is already owned");
        let doc = self.node(element).doc;
        self.node_mut(attr).parent = Some(element);
        self.node_mut(attr).doc = doc;
        match self.chain_tail(self.node(element).properties) {
            Some(tail) => {
                self.node_mut(tail).next_sibling = Some(attr);
                self.node_mut(attr).prev_sibling = Some(tail);
            }
            None => self.node_mut(element).properties = Some(attr),
        }
    }

    /// Appends a namespace declaration to `element`'s namespace chain.
    pub fn add_ns_def(&mut self, element: RawId, ns: RawId) {
        debug_assert_eq!(self.kind(ns), RawKind::Namespace);
        debug_assert!(self.node(ns).parent.is_none(), "namespace is already owned");
        let doc = self.node(element).doc;
        self.node_mut(ns).parent = Some(element);
        self.node_mut(ns).doc = doc;
        match self.chain_tail(self.node(element).ns_defs) {
            Some(tail) => {
                self.node_mut(tail).next_sibling = Some(ns);
                self.node_mut(ns).prev_sibling = Some(tail);
            }
            None => self.node_mut(element).ns_defs = Some(ns),
        }
    }

    fn chain_tail(&self, head: Option<RawId>) -> Option<RawId> {
        let mut current = head?;
        while let Some(next) = self.node(current).next_sibling {
            current = next;
        }
        Some(current)
    }

    fn append_child_link(&mut self, parent: RawId, child: RawId) {
        self.node_mut(child).parent = Some(parent);
        match self.node(parent).last_child {
            Some(last) => {
                self.node_mut(last).next_sibling = Some(child);
                self.node_mut(child).prev_sibling = Some(last);
            }
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }

    fn document_for_children_of(&self, parent: RawId) -> Option<RawId> {
        if self.kind(parent) == RawKind::Document {
            Some(parent)
        } else {
            self.node(parent).doc
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Number of nodes in the child chain. O(n): the chain is walked on
    /// every call, so repeated indexed access should iterate instead.
    pub fn child_count(&self, id: RawId) -> usize {
        let mut count = 0;
        let mut current = self.node(id).first_child;
        while let Some(c) = current {
            count += 1;
            current = self.node(c).next_sibling;
        }
        count
    }

    pub fn child_at(&self, id: RawId, index: usize) -> Option<RawId> {
        let mut current = self.node(id).first_child;
        let mut at = 0;
        while let Some(c) = current {
            if at == index {
                return Some(c);
            }
            at += 1;
            current = self.node(c).next_sibling;
        }
        None
    }

    pub fn children_vec(&self, id: RawId) -> Vec<RawId> {
        let mut out = Vec::new();
        let mut current = self.node(id).first_child;
        while let Some(c) = current {
            out.push(c);
            current = self.node(c).next_sibling;
        }
        out
    }

    pub fn properties_vec(&self, id: RawId) -> Vec<RawId> {
        let mut out = Vec::new();
        let mut current = self.node(id).properties;
        while let Some(c) = current {
            out.push(c);
            current = self.node(c).next_sibling;
        }
        out
    }

    pub fn ns_defs_vec(&self, id: RawId) -> Vec<RawId> {
        let mut out = Vec::new();
        let mut current = self.node(id).ns_defs;
        while let Some(c) = current {
            out.push(c);
            current = self.node(c).next_sibling;
        }
        out
    }

    /// Finds an attribute by exact name, or by (local name, URI) when a
    /// URI is given.
    pub fn has_property(&self, element: RawId, name: &str, uri: Option<&str>) -> Option<RawId> {
        for attr in self.properties_vec(element) {
            let node = self.node(attr);
            let Some(attr_name) = node.name.as_deref() else {
                continue;
            };
            let matched = match uri {
                None => attr_name == name,
                Some(uri) => {
                    local_part(attr_name) == name && node.ns_uri.as_deref() == Some(uri)
                }
            };
            if matched {
                return Some(attr);
            }
        }
        None
    }

    /// The root element of a document: its single element child.
    pub fn root_element(&self, doc: RawId) -> Option<RawId> {
        self.children_vec(doc)
            .into_iter()
            .find(|&c| self.kind(c) == RawKind::Element)
    }

    pub fn doc_info(&self, doc: RawId) -> &DocInfo {
        self.node(doc)
            .doc_info
            .as_deref()
            .expect("document node always carries doc info")
    }

    pub fn doc_info_mut(&mut self, doc: RawId) -> &mut DocInfo {
        self.node_mut(doc)
            .doc_info
            .as_deref_mut()
            .expect("document node always carries doc info")
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// Sets node content. For kinds with a child sequence this replaces
    /// all children with a single text node (or none); for leaf kinds it
    /// sets the content field directly.
    pub fn set_node_content(&mut self, id: RawId, content: Option<&str>) {
        if self.kind(id).accepts_children() {
            for child in self.children_vec(id) {
                self.unlink(child);
                self.free_node(child);
            }
            if let Some(text) = content {
                let text_id = self.create(RawKind::Text);
                self.node_mut(text_id).content = Some(text.to_string());
                self.add_child(id, text_id);
            }
        } else {
            self.node_mut(id).content = content.map(str::to_string);
        }
    }

    // ------------------------------------------------------------------
    // Freeing
    // ------------------------------------------------------------------

    /// Frees a generic node and its entire subtree (children, attributes,
    /// namespace declarations). Idempotent.
    pub fn free_node(&mut self, id: RawId) {
        if !self.is_alive(id) {
            return;
        }
        debug_assert!(
            self.nodes[id as usize].wrapper_is_dead(),
            "freeing raw node {id} with a live wrapper"
        );
        for child in self.children_vec(id) {
            self.free_node(child);
        }
        for attr in self.properties_vec(id) {
            self.free_node(attr);
        }
        for ns in self.ns_defs_vec(id) {
            self.free_node(ns);
        }
        self.nodes[id as usize] = RawNode::default();
        self.free.push(id);
    }

    /// Frees an attribute released from its property chain.
    pub fn free_property(&mut self, id: RawId) {
        self.free_node(id);
    }

    /// Frees a DTD node together with its declaration children.
    pub fn free_dtd_subtree(&mut self, id: RawId) {
        self.free_node(id);
    }

    /// Frees a whole document tree.
    pub fn free_document(&mut self, id: RawId) {
        self.free_node(id);
    }

    /// Takes a node out of the arena, leaving a tombstone. Used by
    /// adoption; links must be rebuilt by the caller.
    fn take(&mut self, id: RawId) -> RawNode {
        debug_assert!(self.is_alive(id));
        let node = std::mem::take(&mut self.nodes[id as usize]);
        self.free.push(id);
        node
    }

    // ------------------------------------------------------------------
    // Adoption and copying
    // ------------------------------------------------------------------

    /// Moves the unlinked subtree rooted at `root` out of `src` and into
    /// this store, assigning `doc` as the owning document of every moved
    /// node. Wrapper back-pointers travel with the nodes; the managed
    /// layer re-binds them afterwards. Returns the new root id.
    pub fn adopt_subtree(&mut self, src: &mut RawStore, root: RawId, doc: Option<RawId>) -> RawId {
        debug_assert!(src.node(root).parent.is_none(), "adopting an attached subtree");
        self.adopt_one(src, root, doc)
    }

    fn adopt_one(&mut self, src: &mut RawStore, id: RawId, doc: Option<RawId>) -> RawId {
        let child_ids = src.children_vec(id);
        let prop_ids = src.properties_vec(id);
        let ns_ids = src.ns_defs_vec(id);
        let taken = src.take(id);
        let new_id = self.alloc(RawNode {
            kind: taken.kind,
            name: taken.name,
            content: taken.content,
            ns_uri: taken.ns_uri,
            doc,
            decl: taken.decl,
            doc_info: taken.doc_info,
            wrapper: taken.wrapper,
            alive: true,
            ..RawNode::default()
        });
        for child in child_ids {
            let new_child = self.adopt_one(src, child, doc);
            self.append_child_link(new_id, new_child);
        }
        for prop in prop_ids {
            let new_prop = self.adopt_one(src, prop, doc);
            self.node_mut(new_prop).parent = Some(new_id);
            match self.chain_tail(self.node(new_id).properties) {
                Some(tail) => {
                    self.node_mut(tail).next_sibling = Some(new_prop);
                    self.node_mut(new_prop).prev_sibling = Some(tail);
                }
                None => self.node_mut(new_id).properties = Some(new_prop),
            }
        }
        for ns in ns_ids {
            let new_ns = self.adopt_one(src, ns, doc);
            self.node_mut(new_ns).parent = Some(new_id);
            match self.chain_tail(self.node(new_id).ns_defs) {
                Some(tail) => {
                    self.node_mut(tail).next_sibling = Some(new_ns);
                    self.node_mut(new_ns).prev_sibling = Some(tail);
                }
                None => self.node_mut(new_id).ns_defs = Some(new_ns),
            }
        }
        new_id
    }

    /// Deep-copies a subtree within this store. The copy carries no
    /// wrapper back-pointers and is unlinked.
    pub fn copy_subtree(&mut self, root: RawId) -> RawId {
        let child_ids = self.children_vec(root);
        let prop_ids = self.properties_vec(root);
        let ns_ids = self.ns_defs_vec(root);
        let source = self.node(root);
        let copied = RawNode {
            kind: source.kind,
            name: source.name.clone(),
            content: source.content.clone(),
            ns_uri: source.ns_uri.clone(),
            decl: source.decl.clone(),
            doc_info: source.doc_info.clone(),
            alive: true,
            ..RawNode::default()
        };
        let new_id = self.alloc(copied);
        for child in child_ids {
            let new_child = self.copy_subtree(child);
            self.append_child_link(new_id, new_child);
        }
        for prop in prop_ids {
            let new_prop = self.copy_subtree(prop);
            self.node_mut(new_prop).parent = Some(new_id);
            match self.chain_tail(self.node(new_id).properties) {
                Some(tail) => {
                    self.node_mut(tail).next_sibling = Some(new_prop);
                    self.node_mut(new_prop).prev_sibling = Some(tail);
                }
                None => self.node_mut(new_id).properties = Some(new_prop),
            }
        }
        for ns in ns_ids {
            let new_ns = self.copy_subtree(ns);
            self.node_mut(new_ns).parent = Some(new_id);
            match self.chain_tail(self.node(new_id).ns_defs) {
                Some(tail) => {
                    self.node_mut(tail).next_sibling = Some(new_ns);
                    self.node_mut(new_ns).prev_sibling = Some(tail);
                }
                None => self.node_mut(new_id).ns_defs = Some(new_ns),
            }
        }
        new_id
    }
}

/// The part after the first `:`, or the whole name when there is none.
pub fn local_part(name: &str) -> &str {
    match name.find(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(store: &mut RawStore, name: &str) -> RawId {
        let id = store.create(RawKind::Element);
        store.node_mut(id).name = Some(name.to_string());
        id
    }

    #[test]
    fn test_link_and_count() {
        let mut store = RawStore::new();
        let root = element(&mut store, "root");
        let a = element(&mut store, "a");
        let b = element(&mut store, "b");
        store.add_child(root, a);
        store.add_child(root, b);
        assert_eq!(store.child_count(root), 2);
        assert_eq!(store.child_at(root, 0), Some(a));
        assert_eq!(store.child_at(root, 1), Some(b));
        assert_eq!(store.node(b).prev_sibling, Some(a));
    }

    #[test]
    fn test_unlink_fixes_chain() {
        let mut store = RawStore::new();
        let root = element(&mut store, "root");
        let a = element(&mut store, "a");
        let b = element(&mut store, "b");
        let c = element(&mut store, "c");
        store.add_child(root, a);
        store.add_child(root, b);
        store.add_child(root, c);
        store.unlink(b);
        assert_eq!(store.children_vec(root), vec![a, c]);
        assert_eq!(store.node(a).next_sibling, Some(c));
        assert!(store.node(b).parent.is_none());
    }

    #[test]
    fn test_insert_before_head_updates_first_child() {
        let mut store = RawStore::new();
        let root = element(&mut store, "root");
        let a = element(&mut store, "a");
        let b = element(&mut store, "b");
        store.add_child(root, a);
        store.add_prev_sibling(a, b);
        assert_eq!(store.children_vec(root), vec![b, a]);
        assert_eq!(store.node(root).first_child, Some(b));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut store = RawStore::new();
        let root = element(&mut store, "root");
        let a = element(&mut store, "a");
        let b = element(&mut store, "b");
        let c = element(&mut store, "c");
        let x = element(&mut store, "x");
        store.add_child(root, a);
        store.add_child(root, b);
        store.add_child(root, c);
        store.replace_node(b, x);
        assert_eq!(store.children_vec(root), vec![a, x, c]);
        assert!(store.node(b).parent.is_none());
    }

    #[test]
    fn test_property_chain() {
        let mut store = RawStore::new();
        let elem = element(&mut store, "e");
        let attr = store.create(RawKind::Attribute);
        store.node_mut(attr).name = Some("id".to_string());
        store.node_mut(attr).content = Some("1".to_string());
        store.add_property(elem, attr);
        assert_eq!(store.has_property(elem, "id", None), Some(attr));
        assert_eq!(store.child_count(elem), 0);
        store.unlink(attr);
        assert_eq!(store.has_property(elem, "id", None), None);
    }

    #[test]
    fn test_free_recycles_ids() {
        let mut store = RawStore::new();
        let root = element(&mut store, "root");
        let child = element(&mut store, "child");
        store.add_child(root, child);
        store.free_node(root);
        assert!(!store.is_alive(root));
        assert!(!store.is_alive(child));
        let recycled = store.create(RawKind::Text);
        assert!(recycled == root || recycled == child);
    }

    #[test]
    fn test_adopt_moves_subtree() {
        let mut target = RawStore::new();
        let doc = target.create(RawKind::Document);
        let mut src = RawStore::new();
        let root = element(&mut src, "moved");
        let child = element(&mut src, "inner");
        src.add_child(root, child);
        let new_root = target.adopt_subtree(&mut src, root, Some(doc));
        assert!(!src.is_alive(root));
        assert_eq!(target.node(new_root).name.as_deref(), Some("moved"));
        assert_eq!(target.child_count(new_root), 1);
        assert_eq!(target.node(new_root).doc, Some(doc));
        let inner = target.child_at(new_root, 0).unwrap();
        assert_eq!(target.node(inner).doc, Some(doc));
    }

    #[test]
    fn test_copy_subtree_is_detached() {
        let mut store = RawStore::new();
        let root = element(&mut store, "root");
        let child = element(&mut store, "child");
        store.add_child(root, child);
        let copy = store.copy_subtree(root);
        assert_ne!(copy, root);
        assert!(store.node(copy).parent.is_none());
        assert_eq!(store.child_count(copy), 1);
        // The original is untouched.
        assert_eq!(store.child_count(root), 1);
    }

    #[test]
    fn test_set_content_on_element_makes_text_child() {
        let mut store = RawStore::new();
        let elem = element(&mut store, "e");
        store.set_node_content(elem, Some("hello"));
        assert_eq!(store.child_count(elem), 1);
        let text = store.child_at(elem, 0).unwrap();
        assert_eq!(store.kind(text), RawKind::Text);
        assert_eq!(store.node(text).content.as_deref(), Some("hello"));
    }
}
