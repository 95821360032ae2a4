//! Managed wrapper nodes
//!
//! `XmlNode` is the object callers hold: a reference-counted wrapper over
//! one raw node, kept in bijective correspondence with the raw tree. A
//! wrapper's kind is recomputed from the raw node on every access, every
//! structural mutation is pushed into the raw tree synchronously, and a
//! wrapper appears in its parent's child set exactly as long as its raw
//! node is linked under that parent.
//!
//! Dropping the last handle to a wrapper releases its raw node according
//! to kind (document tree, DTD subtree, property, generic subtree) —
//! unless the raw node is still linked under a live parent, in which
//! case the parent tree keeps owning it.

mod document;
mod dtd;
mod element;
mod kind;
mod registry;

pub use document::Document;
pub use dtd::DtdNode;
pub use element::Element;
pub use kind::{DtdKind, NodeKind};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::engine::serialize;
use crate::engine::store::{RawId, RawKind, RawStore};
use crate::error::Error;
use crate::options::Options;

pub(crate) type StoreRef = Rc<RefCell<RawStore>>;

/// Namespaces every document knows without declaration, keyed by prefix.
const PREDEFINED_NAMESPACES: [(&str, &str); 3] = [
    ("xml", "http://www.w3.org/XML/1998/namespace"),
    ("xs", "http://www.w3.org/2001/XMLSchema"),
    ("xsi", "http://www.w3.org/2001/XMLSchema-instance"),
];

pub(crate) struct NodeInner {
    /// The store holding the raw node. Replaced when the node is adopted
    /// into another tree.
    pub(crate) store: RefCell<StoreRef>,
    pub(crate) raw: Cell<RawId>,
    /// Attached children (including attributes and namespace
    /// declarations). Presence here is what keeps a child wrapper alive
    /// while its raw node is linked under this one.
    pub(crate) child_nodes: RefCell<Vec<XmlNode>>,
    pub(crate) object_value: RefCell<Option<String>>,
    /// Wrapper-local metadata; never persisted into the raw tree.
    pub(crate) mime_type: RefCell<Option<String>>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        // Detach attached children first so each child wrapper releases
        // its own subtree (or survives as an orphan if someone else still
        // holds it).
        let children = std::mem::take(&mut *self.child_nodes.borrow_mut());
        for child in &children {
            child.detach();
        }
        drop(children);

        let store = self.store.borrow().clone();
        let id = self.raw.get();
        let mut s = store.borrow_mut();
        if !s.is_alive(id) {
            return;
        }
        s.node_mut(id).wrapper = None;
        // A raw node still linked under a parent is owned by that tree.
        if s.node(id).parent.is_some() {
            return;
        }
        match s.kind(id) {
            RawKind::Document => s.free_document(id),
            RawKind::Dtd => s.free_dtd_subtree(id),
            RawKind::Attribute => s.free_property(id),
            _ => s.free_node(id),
        }
    }
}

/// A node of the managed tree. Cloning clones the handle; two handles to
/// the same underlying node compare equal.
#[derive(Clone)]
pub struct XmlNode {
    pub(crate) inner: Rc<NodeInner>,
}

impl PartialEq for XmlNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for XmlNode {}

impl fmt::Debug for XmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlNode")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl XmlNode {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    fn standalone(kind: RawKind, setup: impl FnOnce(&mut RawStore, RawId)) -> XmlNode {
        let store: StoreRef = Rc::new(RefCell::new(RawStore::new()));
        let id = {
            let mut s = store.borrow_mut();
            let id = s.create(kind);
            setup(&mut s, id);
            id
        };
        registry::wrap(&store, id)
    }

    /// A text node.
    pub fn text(value: &str) -> XmlNode {
        XmlNode::standalone(RawKind::Text, |s, id| {
            s.node_mut(id).content = Some(value.to_string());
        })
    }

    /// A CDATA text node.
    pub fn cdata(value: &str) -> XmlNode {
        XmlNode::standalone(RawKind::CdataSection, |s, id| {
            s.node_mut(id).content = Some(value.to_string());
        })
    }

    /// A comment, `<!--value-->`.
    pub fn comment(value: &str) -> XmlNode {
        XmlNode::standalone(RawKind::Comment, |s, id| {
            s.node_mut(id).content = Some(value.to_string());
        })
    }

    /// A processing instruction, `<?name value?>`.
    pub fn processing_instruction(name: &str, value: &str) -> XmlNode {
        XmlNode::standalone(RawKind::ProcessingInstruction, |s, id| {
            s.node_mut(id).name = Some(name.to_string());
            s.node_mut(id).content = Some(value.to_string());
        })
    }

    /// An attribute, `name="value"`.
    pub fn attribute(name: &str, value: &str) -> XmlNode {
        XmlNode::standalone(RawKind::Attribute, |s, id| {
            s.node_mut(id).name = Some(name.to_string());
            s.node_mut(id).content = Some(value.to_string());
        })
    }

    /// An attribute whose full qualified name is specified.
    pub fn attribute_with_uri(name: &str, uri: &str, value: &str) -> XmlNode {
        XmlNode::standalone(RawKind::Attribute, |s, id| {
            s.node_mut(id).name = Some(name.to_string());
            s.node_mut(id).content = Some(value.to_string());
            s.node_mut(id).ns_uri = Some(uri.to_string());
        })
    }

    /// A namespace declaration, `xmlns:prefix="uri"`. An empty prefix
    /// declares the default namespace.
    pub fn namespace(prefix: &str, uri: &str) -> XmlNode {
        XmlNode::standalone(RawKind::Namespace, |s, id| {
            s.node_mut(id).name = Some(prefix.to_string());
            s.node_mut(id).content = Some(uri.to_string());
        })
    }

    /// The predefined namespace for one of the well-known prefixes
    /// (`xml`, `xs`, `xsi`).
    pub fn predefined_namespace(prefix: &str) -> Option<XmlNode> {
        PREDEFINED_NAMESPACES
            .iter()
            .find(|(p, _)| *p == prefix)
            .map(|(p, u)| XmlNode::namespace(p, u))
    }

    pub(crate) fn predefined_prefix_for_uri(uri: &str) -> Option<&'static str> {
        PREDEFINED_NAMESPACES
            .iter()
            .find(|(_, u)| *u == uri)
            .map(|(p, _)| *p)
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    pub(crate) fn store(&self) -> StoreRef {
        self.inner.store.borrow().clone()
    }

    pub(crate) fn raw(&self) -> RawId {
        self.inner.raw.get()
    }

    pub(crate) fn register_child(&self, child: &XmlNode) {
        self.inner.child_nodes.borrow_mut().push(child.clone());
    }

    fn raw_kind(&self) -> RawKind {
        let store = self.store();
        let kind = store.borrow().kind(self.raw());
        kind
    }

    /// Moves `child`'s raw subtree into this node's store when the two
    /// live in different trees, re-binding every wrapper in the moved
    /// subtree to its new id.
    pub(crate) fn adopt_if_foreign(&self, child: &XmlNode) {
        let target = self.store();
        let source = child.store();
        if Rc::ptr_eq(&target, &source) {
            return;
        }
        trace!("adopting foreign subtree");
        let doc = {
            let t = target.borrow();
            let raw = self.raw();
            if t.kind(raw) == RawKind::Document {
                Some(raw)
            } else {
                t.node(raw).doc
            }
        };
        let new_root = {
            let mut t = target.borrow_mut();
            let mut s = source.borrow_mut();
            t.adopt_subtree(&mut s, child.raw(), doc)
        };
        rebind_wrappers(&target, new_root);
    }

    // ------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------

    /// The node's kind, recomputed from the raw node on every access.
    pub fn kind(&self) -> NodeKind {
        kind::kind_of(self.raw_kind())
    }

    /// True for CDATA text nodes.
    pub fn is_cdata(&self) -> bool {
        self.raw_kind() == RawKind::CdataSection
    }

    fn accepts_children(&self) -> bool {
        self.raw_kind().accepts_children()
    }

    /// Typed element view, when this node is an element.
    pub fn as_element(&self) -> Option<Element> {
        (self.kind() == NodeKind::Element).then(|| Element(self.clone()))
    }

    /// Typed document view, when this node is a document.
    pub fn as_document(&self) -> Option<Document> {
        (self.kind() == NodeKind::Document).then(|| Document(self.clone()))
    }

    /// Typed DTD-family view, when this node is a DTD or declaration.
    pub fn as_dtd_node(&self) -> Option<DtdNode> {
        matches!(
            self.kind(),
            NodeKind::Dtd
                | NodeKind::EntityDeclaration
                | NodeKind::AttributeDeclaration
                | NodeKind::ElementDeclaration
                | NodeKind::NotationDeclaration
        )
        .then(|| DtdNode(self.clone()))
    }

    // ------------------------------------------------------------------
    // Names and values
    // ------------------------------------------------------------------

    /// The node name. Comments and text have none; a namespace's name is
    /// its prefix.
    pub fn name(&self) -> Option<String> {
        let store = self.store();
        match self.kind() {
            NodeKind::Comment | NodeKind::Text | NodeKind::Invalid => None,
            NodeKind::Namespace => {
                let name = store.borrow().node(self.raw()).name.clone();
                Some(name.unwrap_or_default())
            }
            _ => store.borrow().node(self.raw()).name.clone(),
        }
    }

    /// Renames the node. Ignored for documents.
    pub fn set_name(&self, name: &str) {
        match self.kind() {
            NodeKind::Document | NodeKind::Invalid => {}
            _ => {
                let store = self.store();
                store.borrow_mut().node_mut(self.raw()).name = Some(name.to_string());
            }
        }
    }

    /// The local part of the node's name: `bar` for `foo:bar`.
    pub fn local_name(&self) -> Option<String> {
        self.name()
            .map(|name| Self::local_name_for_name(&name).to_string())
    }

    /// The prefix of the node's name: `foo` for `foo:bar`.
    pub fn prefix(&self) -> Option<String> {
        self.name()
            .map(|name| Self::prefix_for_name(&name).to_string())
    }

    /// Splits a qualified name at its first `:`. A name without a colon
    /// has an empty prefix.
    pub fn split_qname(name: &str) -> (&str, &str) {
        match name.find(':') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("", name),
        }
    }

    /// The local name `bar` in `foo:bar`.
    pub fn local_name_for_name(name: &str) -> &str {
        Self::split_qname(name).1
    }

    /// The prefix `foo` in `foo:bar`, or `""`.
    pub fn prefix_for_name(name: &str) -> &str {
        Self::split_qname(name).0
    }

    /// The namespace URI of this element or attribute, or the URI of
    /// document origin for documents.
    pub fn uri(&self) -> Option<String> {
        let store = self.store();
        let s = store.borrow();
        match self.kind() {
            NodeKind::Document => s.doc_info(self.raw()).uri.clone(),
            NodeKind::Element | NodeKind::Attribute => s.node(self.raw()).ns_uri.clone(),
            _ => None,
        }
    }

    pub fn set_uri(&self, uri: Option<&str>) {
        let store = self.store();
        let mut s = store.borrow_mut();
        match self.kind() {
            NodeKind::Document => s.doc_info_mut(self.raw()).uri = uri.map(str::to_string),
            NodeKind::Element | NodeKind::Attribute => {
                s.node_mut(self.raw()).ns_uri = uri.map(str::to_string);
            }
            _ => {}
        }
    }

    /// The string value of the node. Elements and documents concatenate
    /// the string values of their children in document order with no
    /// intervening spaces; namespaces report their href; invalid nodes
    /// report nothing.
    pub fn string_value(&self) -> Option<String> {
        match self.kind() {
            NodeKind::Invalid => None,
            NodeKind::EntityDeclaration | NodeKind::Namespace => {
                let store = self.store();
                let content = store.borrow().node(self.raw()).content.clone();
                Some(content.unwrap_or_default())
            }
            NodeKind::Element | NodeKind::Document => {
                let children = self.children().unwrap_or_default();
                Some(
                    children
                        .iter()
                        .filter_map(XmlNode::string_value)
                        .collect::<String>(),
                )
            }
            _ => {
                let store = self.store();
                let content = store.borrow().node(self.raw()).content.clone();
                content
            }
        }
    }

    /// Sets the content of the node. On a node with children this removes
    /// every existing child except attributes and namespace declarations,
    /// then installs a single text child.
    pub fn set_string_value(&self, value: Option<&str>) {
        match self.kind() {
            NodeKind::Invalid => {}
            NodeKind::Namespace | NodeKind::Comment | NodeKind::Text => {
                let store = self.store();
                store
                    .borrow_mut()
                    .node_mut(self.raw())
                    .content = value.map(str::to_string);
            }
            _ => {
                let to_detach: Vec<XmlNode> = self
                    .inner
                    .child_nodes
                    .borrow()
                    .iter()
                    .filter(|c| {
                        !matches!(c.kind(), NodeKind::Attribute | NodeKind::Namespace)
                    })
                    .cloned()
                    .collect();
                for child in &to_detach {
                    child.detach();
                }
                drop(to_detach);
                let store = self.store();
                store.borrow_mut().set_node_content(self.raw(), value);
            }
        }
    }

    /// The object value: a caller-supplied string shadowing the string
    /// value, or the string value itself when none was set.
    pub fn object_string_value(&self) -> Option<String> {
        self.inner
            .object_value
            .borrow()
            .clone()
            .or_else(|| self.string_value())
    }

    pub fn set_object_string_value(&self, value: Option<&str>) {
        *self.inner.object_value.borrow_mut() = value.map(str::to_string);
        self.set_string_value(value);
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// The parent node, wrapped on demand.
    pub fn parent(&self) -> Option<XmlNode> {
        let store = self.store();
        let parent = { store.borrow().node(self.raw()).parent }?;
        Some(registry::wrap(&store, parent))
    }

    /// The document this node belongs to, resolved through the raw
    /// node's document pointer.
    pub fn root_document(&self) -> Option<Document> {
        if self.kind() == NodeKind::Document {
            return self.as_document();
        }
        let store = self.store();
        let doc = { store.borrow().node(self.raw()).doc }?;
        registry::wrap(&store, doc).as_document()
    }

    /// The child nodes, for documents, elements, and DTDs; `None` for
    /// every other kind.
    pub fn children(&self) -> Option<Vec<XmlNode>> {
        if !self.accepts_children() {
            return None;
        }
        let store = self.store();
        let ids = { store.borrow().children_vec(self.raw()) };
        Some(ids.into_iter().map(|id| registry::wrap(&store, id)).collect())
    }

    /// Number of children. Computed by walking the raw sibling chain, so
    /// repeated indexed access should iterate instead.
    pub fn child_count(&self) -> usize {
        if !self.accepts_children() {
            return 0;
        }
        let store = self.store();
        let count = store.borrow().child_count(self.raw());
        count
    }

    /// The child at `index`, or `None` past the end.
    pub fn child_at(&self, index: usize) -> Option<XmlNode> {
        if !self.accepts_children() {
            return None;
        }
        let store = self.store();
        let id = { store.borrow().child_at(self.raw(), index) }?;
        Some(registry::wrap(&store, id))
    }

    pub fn next_sibling(&self) -> Option<XmlNode> {
        if self.kind() == NodeKind::Invalid {
            return None;
        }
        let store = self.store();
        let id = { store.borrow().node(self.raw()).next_sibling }?;
        Some(registry::wrap(&store, id))
    }

    pub fn previous_sibling(&self) -> Option<XmlNode> {
        if self.kind() == NodeKind::Invalid {
            return None;
        }
        let store = self.store();
        let id = { store.borrow().node(self.raw()).prev_sibling }?;
        Some(registry::wrap(&store, id))
    }

    /// The next node in document order: first child, else next sibling,
    /// else the nearest ancestor's next sibling.
    pub fn next_node(&self) -> Option<XmlNode> {
        if let Some(first) = self.children().and_then(|c| c.into_iter().next()) {
            return Some(first);
        }
        let mut current = self.clone();
        loop {
            if let Some(sibling) = current.next_sibling() {
                return Some(sibling);
            }
            current = current.parent()?;
        }
    }

    /// The location path to this node, e.g. `foo/bar[2]/baz`. `None` for
    /// nodes outside any document.
    pub fn x_path(&self) -> Option<String> {
        if self.kind() == NodeKind::Document {
            return Some(String::new());
        }
        {
            let store = self.store();
            let in_doc = store.borrow().node(self.raw()).doc.is_some();
            if !in_doc {
                return None;
            }
        }
        let mut segments = Vec::new();
        let mut current = self.clone();
        loop {
            if current.kind() == NodeKind::Document {
                break;
            }
            segments.push(current.path_segment());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments.reverse();
        Some(segments.join("/"))
    }

    fn path_segment(&self) -> String {
        match self.kind() {
            NodeKind::Text => "text()".to_string(),
            NodeKind::Comment => "comment()".to_string(),
            NodeKind::Attribute => format!("@{}", self.name().unwrap_or_default()),
            _ => {
                let name = self.name().unwrap_or_default();
                let mut position = 1;
                let mut same_name = 0;
                if let Some(siblings) = self.parent().and_then(|p| p.children()) {
                    for sibling in &siblings {
                        if sibling.kind() == self.kind() && sibling.name().as_deref() == Some(&name)
                        {
                            same_name += 1;
                            if sibling == self {
                                position = same_name;
                            }
                        }
                    }
                }
                if same_name > 1 {
                    format!("{name}[{position}]")
                } else {
                    name
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Tree mutation
    // ------------------------------------------------------------------

    /// Inserts a child at `index`.
    ///
    /// # Panics
    ///
    /// When this node cannot have children, `index > child_count()`, or
    /// `child` already has a parent.
    pub fn insert_child(&self, child: &XmlNode, index: usize) {
        assert!(
            self.accepts_children(),
            "nodes of kind {:?} cannot have children",
            self.kind()
        );
        let count = self.child_count();
        assert!(index <= count, "child index {index} out of bounds ({count} children)");
        assert!(
            child.parent().is_none(),
            "cannot insert a child that already has a parent; detach or copy it first"
        );
        self.adopt_if_foreign(child);
        let store = self.store();
        {
            let mut s = store.borrow_mut();
            let raw = self.raw();
            let child_raw = child.raw();
            if index == 0 {
                match s.node(raw).first_child {
                    Some(first) => s.add_prev_sibling(first, child_raw),
                    None => s.add_child(raw, child_raw),
                }
            } else {
                let anchor = s
                    .child_at(raw, index - 1)
                    .expect("index validated against child count");
                s.add_next_sibling(anchor, child_raw);
            }
        }
        self.register_child(child);
    }

    /// Inserts several children starting at `index`, preserving order.
    pub fn insert_children(&self, children: &[XmlNode], index: usize) {
        for (offset, child) in children.iter().enumerate() {
            self.insert_child(child, index + offset);
        }
    }

    /// Removes the child at `index` from the tree. The child's raw
    /// subtree is released once no wrapper references it.
    ///
    /// # Panics
    ///
    /// When `index` is out of bounds.
    pub fn remove_child(&self, index: usize) {
        let child = self
            .child_at(index)
            .unwrap_or_else(|| panic!("child index {index} out of bounds"));
        child.detach();
    }

    /// Removes all existing children and replaces them with `children`,
    /// in order. `None` leaves the node childless. The whole replacement
    /// batch is validated before anything is unlinked, so a precondition
    /// failure leaves the tree unchanged.
    ///
    /// # Panics
    ///
    /// When a replacement child is attached to some other parent.
    pub fn set_children(&self, children: Option<&[XmlNode]>) {
        assert!(
            self.accepts_children(),
            "nodes of kind {:?} cannot have children",
            self.kind()
        );
        if let Some(children) = children {
            for child in children {
                let parent = child.parent();
                assert!(
                    parent.is_none() || parent.as_ref() == Some(self),
                    "cannot adopt a child attached to another parent"
                );
            }
        }
        self.remove_all_children();
        if let Some(children) = children {
            for child in children {
                self.add_child(child);
            }
        }
    }

    fn remove_all_children(&self) {
        let store = self.store();
        let ids = { store.borrow().children_vec(self.raw()) };
        for id in ids {
            match registry::lookup(&store, id) {
                // Wrapped children survive as orphans while referenced.
                Some(child) => child.detach(),
                // Unwrapped subtrees have no other owner; release now.
                None => {
                    let mut s = store.borrow_mut();
                    s.unlink(id);
                    s.free_node(id);
                }
            }
        }
    }

    /// Appends a child after the existing children.
    ///
    /// # Panics
    ///
    /// When this node cannot have children or `child` has a parent.
    pub fn add_child(&self, child: &XmlNode) {
        assert!(
            self.accepts_children(),
            "nodes of kind {:?} cannot have children",
            self.kind()
        );
        assert!(
            child.parent().is_none(),
            "cannot add a child that already has a parent; detach or copy it first"
        );
        self.adopt_if_foreign(child);
        let store = self.store();
        store.borrow_mut().add_child(self.raw(), child.raw());
        self.register_child(child);
    }

    /// Atomically swaps the child at `index` for `node`.
    ///
    /// # Panics
    ///
    /// When `index` is out of bounds or `node` has a parent.
    pub fn replace_child(&self, index: usize, node: &XmlNode) {
        let old = self
            .child_at(index)
            .unwrap_or_else(|| panic!("child index {index} out of bounds"));
        assert!(
            node.parent().is_none(),
            "cannot insert a replacement that already has a parent"
        );
        self.adopt_if_foreign(node);
        let store = self.store();
        store.borrow_mut().replace_node(old.raw(), node.raw());
        self.inner
            .child_nodes
            .borrow_mut()
            .retain(|c| *c != old);
        self.register_child(node);
    }

    /// Detaches this node from its parent without destroying it. The
    /// node may be reinserted elsewhere or discarded. Detaching an
    /// unattached node is a no-op.
    pub fn detach(&self) {
        let store = self.store();
        let parent = { store.borrow().node(self.raw()).parent };
        let Some(parent_id) = parent else {
            return;
        };
        store.borrow_mut().unlink(self.raw());
        if let Some(parent_node) = registry::lookup(&store, parent_id) {
            parent_node
                .inner
                .child_nodes
                .borrow_mut()
                .retain(|c| c != self);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Maps the raw results of the opaque XPath collaborator back into
    /// identity-stable wrappers, using this node as the context item.
    pub fn nodes_for_xpath(
        &self,
        evaluator: &dyn XPathEvaluator,
        query: &str,
    ) -> Result<Vec<XmlNode>, Error> {
        let store = self.store();
        let ids = {
            let s = store.borrow();
            evaluator
                .evaluate(&s, self.raw(), query)
                .map_err(|message| Error::Xpath { message })?
        };
        Ok(ids
            .into_iter()
            .map(|id| registry::wrap(&store, id))
            .collect())
    }

    /// XQuery application is excluded by design.
    pub fn objects_for_xquery(&self, _query: &str) -> Result<Vec<XmlNode>, Error> {
        Err(Error::Unsupported("XQuery"))
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// The representation of this node as it would appear in an XML
    /// document, with default options.
    pub fn xml_string(&self) -> String {
        self.xml_string_with_options(Options::NONE)
    }

    /// Serializes this node with output options applied. Reads the raw
    /// tree directly.
    pub fn xml_string_with_options(&self, options: Options) -> String {
        let store = self.store();
        let out = serialize::node_to_string(&store.borrow(), self.raw(), options);
        out
    }

    /// W3C canonical form fragment. Defined for text nodes (escaping
    /// `&`, `<`, `>`, and carriage returns) and comments (emitted only
    /// when `comments` is true); every other kind produces empty output.
    pub fn canonical_xml_string_preserving_comments(&self, comments: bool) -> String {
        match self.kind() {
            NodeKind::Text => {
                serialize::escape_text(&self.string_value().unwrap_or_default())
            }
            NodeKind::Comment => {
                if comments {
                    format!("<!--{}-->", self.string_value().unwrap_or_default())
                } else {
                    String::new()
                }
            }
            _ => String::new(),
        }
    }
}

/// The opaque XPath collaborator: evaluates a query against a raw
/// context node and returns raw result nodes.
pub trait XPathEvaluator {
    fn evaluate(
        &self,
        store: &RawStore,
        context: RawId,
        query: &str,
    ) -> Result<Vec<RawId>, String>;
}

/// Re-binds every wrapper found in an adopted subtree to its new store
/// and id.
fn rebind_wrappers(store: &StoreRef, root: RawId) {
    let mut ids = Vec::new();
    collect_subtree(&store.borrow(), root, &mut ids);
    for id in ids {
        if let Some(node) = registry::lookup(store, id) {
            *node.inner.store.borrow_mut() = store.clone();
            node.inner.raw.set(id);
        }
    }
}

fn collect_subtree(store: &RawStore, id: RawId, out: &mut Vec<RawId>) {
    out.push(id);
    for child in store.children_vec(id) {
        collect_subtree(store, child, out);
    }
    for attr in store.properties_vec(id) {
        collect_subtree(store, attr, out);
    }
    for ns in store.ns_defs_vec(id) {
        collect_subtree(store, ns, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::document::Document;
    use pretty_assertions::assert_eq;

    fn parsed(input: &str) -> Document {
        Document::parse_str(input, Options::NONE).expect("test input should parse")
    }

    #[test]
    fn test_identity_across_traversal_paths() {
        let doc = parsed("<r><a/><b/></r>");
        let root = doc.root_element().unwrap();
        // Reach <b> via indexing and via sibling traversal.
        let via_index = root.child_at(1).unwrap();
        let via_sibling = root.child_at(0).unwrap().next_sibling().unwrap();
        assert!(via_index == via_sibling);
        assert!(Rc::ptr_eq(&via_index.inner, &via_sibling.inner));
    }

    #[test]
    fn test_attachment_consistency() {
        let doc = parsed("<r/>");
        let root = doc.root_element().unwrap();
        let child = Element::new("child");
        let before = root.child_count();
        root.add_child(child.as_node());
        assert_eq!(root.child_count(), before + 1);
        assert_eq!(child.parent().as_ref(), Some(root.as_node()));

        child.detach();
        assert!(child.parent().is_none());
        assert_eq!(root.child_count(), before);
        assert!(!root.children().unwrap().iter().any(|c| c == child.as_node()));
    }

    #[test]
    fn test_insert_child_positions() {
        let doc = parsed("<r><a/><c/></r>");
        let root = doc.root_element().unwrap();
        let b = Element::new("b");
        root.insert_child(b.as_node(), 1);
        let names: Vec<_> = root
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let first = Element::new("first");
        root.insert_child(first.as_node(), 0);
        assert_eq!(root.child_at(0).unwrap().name().as_deref(), Some("first"));

        let last = Element::new("last");
        root.insert_child(last.as_node(), root.child_count());
        assert_eq!(root.child_at(4).unwrap().name().as_deref(), Some("last"));
    }

    #[test]
    #[should_panic(expected = "already has a parent")]
    fn test_double_ownership_rejected() {
        let doc = parsed("<r><a/></r>");
        let root = doc.root_element().unwrap();
        let attached = root.child_at(0).unwrap();
        let other = Element::new("other");
        other.add_child(&attached);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_insert_index_out_of_bounds() {
        let doc = parsed("<r/>");
        let root = doc.root_element().unwrap();
        let child = Element::new("child");
        root.insert_child(child.as_node(), 1);
    }

    #[test]
    fn test_remove_child() {
        let doc = parsed("<r><a/><b/><c/></r>");
        let root = doc.root_element().unwrap();
        root.remove_child(1);
        let names: Vec<_> = root
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_replace_child() {
        let doc = parsed("<r><a/><b/></r>");
        let root = doc.root_element().unwrap();
        let x = Element::new("x");
        root.replace_child(0, x.as_node());
        let names: Vec<_> = root
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name().unwrap())
            .collect();
        assert_eq!(names, vec!["x", "b"]);
        assert_eq!(root.child_count(), 2);
    }

    #[test]
    fn test_set_children_replaces_everything() {
        let doc = parsed("<r><a/><b/></r>");
        let root = doc.root_element().unwrap();
        let x = Element::new("x");
        let y = Element::new("y");
        root.set_children(Some(&[x.into_node(), y.into_node()]));
        let names: Vec<_> = root
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name().unwrap())
            .collect();
        assert_eq!(names, vec!["x", "y"]);

        root.set_children(None);
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    #[should_panic(expected = "attached to another parent")]
    fn test_set_children_rejects_attached_replacement() {
        let doc = parsed("<r><a/></r>");
        let other = parsed("<o><stolen/></o>");
        let stolen = other.root_element().unwrap().child_at(0).unwrap();
        doc.root_element().unwrap().set_children(Some(&[stolen]));
    }

    #[test]
    fn test_detach_and_reinsert_elsewhere() {
        let doc = parsed("<r><movable><inner/></movable></r>");
        let root = doc.root_element().unwrap();
        let movable = root.child_at(0).unwrap();
        movable.detach();
        assert!(movable.parent().is_none());

        let other = parsed("<other/>");
        let other_root = other.root_element().unwrap();
        other_root.add_child(&movable);
        assert_eq!(movable.parent().as_ref(), Some(other_root.as_node()));
        // The wrapped subtree keeps its identity across the adoption.
        assert_eq!(movable.child_at(0).unwrap().name().as_deref(), Some("inner"));
        assert_eq!(
            other.xml_string(),
            "<?xml version=\"1.0\"?>\n<other><movable><inner></inner></movable></other>"
        );
    }

    #[test]
    fn test_string_value_concatenates_descendants() {
        let doc = parsed("<r>a<b>b1</b>c</r>");
        let root = doc.root_element().unwrap();
        assert_eq!(root.string_value().as_deref(), Some("ab1c"));
    }

    #[test]
    fn test_set_string_value_replaces_children() {
        let doc = parsed("<r><a/><b/></r>");
        let root = doc.root_element().unwrap();
        root.set_string_value(Some("plain"));
        assert_eq!(root.child_count(), 1);
        assert_eq!(root.string_value().as_deref(), Some("plain"));
    }

    #[test]
    fn test_name_rules() {
        let text = XmlNode::text("x");
        assert_eq!(text.name(), None);
        let comment = XmlNode::comment("c");
        assert_eq!(comment.name(), None);
        let ns = XmlNode::namespace("p", "urn:p");
        assert_eq!(ns.name().as_deref(), Some("p"));
        assert_eq!(ns.string_value().as_deref(), Some("urn:p"));
    }

    #[test]
    fn test_qname_split() {
        assert_eq!(XmlNode::split_qname("foo:bar"), ("foo", "bar"));
        assert_eq!(XmlNode::split_qname("bar"), ("", "bar"));
        assert_eq!(XmlNode::split_qname("a:b:c"), ("a", "b:c"));
    }

    #[test]
    fn test_canonical_strings() {
        let text = XmlNode::text("a & b < c\r");
        assert_eq!(
            text.canonical_xml_string_preserving_comments(false),
            "a &amp; b &lt; c&#xD;"
        );
        let comment = XmlNode::comment("note");
        assert_eq!(
            comment.canonical_xml_string_preserving_comments(true),
            "<!--note-->"
        );
        assert_eq!(comment.canonical_xml_string_preserving_comments(false), "");
        let element = Element::new("e");
        assert_eq!(
            element.canonical_xml_string_preserving_comments(true),
            ""
        );
    }

    #[test]
    fn test_x_path_positions() {
        let doc = parsed("<foo><bar/><bar><baz/></bar></foo>");
        let root = doc.root_element().unwrap();
        let second_bar = root.child_at(1).unwrap();
        let baz = second_bar.child_at(0).unwrap();
        assert_eq!(baz.x_path().as_deref(), Some("foo/bar[2]/baz"));
        let detached = Element::new("loose");
        assert_eq!(detached.x_path(), None);
    }

    #[test]
    fn test_xquery_is_unsupported() {
        let doc = parsed("<r/>");
        let err = doc.objects_for_xquery("for $x in .").unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_xpath_results_map_to_identity_stable_wrappers() {
        struct FirstChild;
        impl XPathEvaluator for FirstChild {
            fn evaluate(
                &self,
                store: &RawStore,
                context: RawId,
                _query: &str,
            ) -> Result<Vec<RawId>, String> {
                Ok(store.children_vec(context).into_iter().take(1).collect())
            }
        }
        let doc = parsed("<r><a/></r>");
        let root = doc.root_element().unwrap();
        let held = root.child_at(0).unwrap();
        let results = root.nodes_for_xpath(&FirstChild, "a[1]").unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0] == held);
    }

    #[test]
    fn test_object_string_value_shadows() {
        let element = Element::new("e");
        element.set_object_string_value(Some("42"));
        assert_eq!(element.object_string_value().as_deref(), Some("42"));
        assert_eq!(element.string_value().as_deref(), Some("42"));
    }
}
