//! Element nodes
//!
//! The element view adds the attribute and namespace models on top of
//! `XmlNode`. Attributes and namespace declarations live on side chains
//! of the raw element — reachable through the element but not part of
//! the ordinary child sequence — while their wrappers are owned through
//! the element's child set like any other attached node.
//!
//! Duplicate handling differs deliberately between the two models:
//! adding an attribute replaces an existing attribute of the same name
//! (last write wins), adding a namespace whose prefix is already
//! declared is a no-op (first declaration wins).

use std::ops::Deref;

use super::{registry, NodeKind, XmlNode};
use crate::engine::store::RawKind;

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element(pub(crate) XmlNode);

impl Deref for Element {
    type Target = XmlNode;

    fn deref(&self) -> &XmlNode {
        &self.0
    }
}

impl Element {
    /// An element `<name></name>`.
    pub fn new(name: &str) -> Element {
        Element(XmlNode::standalone(RawKind::Element, |s, id| {
            s.node_mut(id).name = Some(name.to_string());
        }))
    }

    /// An element whose full qualified name is specified.
    pub fn with_uri(name: &str, uri: &str) -> Element {
        Element(XmlNode::standalone(RawKind::Element, |s, id| {
            s.node_mut(id).name = Some(name.to_string());
            s.node_mut(id).ns_uri = Some(uri.to_string());
        }))
    }

    /// An element with a single text node child, `<name>value</name>`.
    pub fn with_string_value(name: &str, value: &str) -> Element {
        let element = Element::new(name);
        element.add_child(&XmlNode::text(value));
        element
    }

    pub fn as_node(&self) -> &XmlNode {
        &self.0
    }

    pub fn into_node(self) -> XmlNode {
        self.0
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// The attributes in declaration order, or `None` when there are
    /// none.
    pub fn attributes(&self) -> Option<Vec<XmlNode>> {
        let store = self.store();
        let ids = { store.borrow().properties_vec(self.raw()) };
        if ids.is_empty() {
            return None;
        }
        Some(ids.into_iter().map(|id| registry::wrap(&store, id)).collect())
    }

    /// Replaces all attributes with `attributes`, in order. Within the
    /// new list the usual add semantics apply, so a later duplicate name
    /// wins.
    pub fn set_attributes(&self, attributes: Option<&[XmlNode]>) {
        self.remove_attributes();
        let Some(attributes) = attributes else {
            return;
        };
        for attribute in attributes {
            self.add_attribute(attribute);
        }
    }

    /// Replaces all attributes from name/value pairs.
    pub fn set_attributes_with(&self, attributes: &[(&str, &str)]) {
        self.remove_attributes();
        for (name, value) in attributes {
            self.add_attribute(&XmlNode::attribute(name, value));
        }
    }

    /// Adds an attribute. An existing attribute with the same name is
    /// removed first, so the newest addition wins.
    ///
    /// # Panics
    ///
    /// When the attribute has no name or already has an owner.
    pub fn add_attribute(&self, attribute: &XmlNode) {
        let name = attribute.name().expect("attributes must have a name");
        assert!(
            attribute.parent().is_none(),
            "cannot add an attribute that already has an owner"
        );
        self.remove_attribute(&name);
        self.adopt_if_foreign(attribute);
        let store = self.store();
        store.borrow_mut().add_property(self.raw(), attribute.raw());
        self.register_child(attribute);
    }

    /// Removes the attribute with this name, if present. The raw
    /// property is released once no wrapper references it.
    pub fn remove_attribute(&self, name: &str) {
        let store = self.store();
        let found = { store.borrow().has_property(self.raw(), name, None) };
        if let Some(id) = found {
            // Wrapping first keeps the raw property alive under whoever
            // still holds a reference to it.
            registry::wrap(&store, id).detach();
        }
    }

    fn remove_attributes(&self) {
        let store = self.store();
        let ids = { store.borrow().properties_vec(self.raw()) };
        for id in ids {
            match registry::lookup(&store, id) {
                Some(attribute) => attribute.detach(),
                None => {
                    let mut s = store.borrow_mut();
                    s.unlink(id);
                    s.free_property(id);
                }
            }
        }
    }

    /// The attribute matching this name.
    pub fn attribute_for_name(&self, name: &str) -> Option<XmlNode> {
        let store = self.store();
        let id = { store.borrow().has_property(self.raw(), name, None) }?;
        Some(registry::wrap(&store, id))
    }

    /// The attribute matching this (local name, URI) pair.
    pub fn attribute_for_local_name_uri(&self, local_name: &str, uri: &str) -> Option<XmlNode> {
        let store = self.store();
        let id = { store.borrow().has_property(self.raw(), local_name, Some(uri)) }?;
        Some(registry::wrap(&store, id))
    }

    // ------------------------------------------------------------------
    // Namespaces
    // ------------------------------------------------------------------

    /// The namespace declarations on this element, or `None` when there
    /// are none.
    pub fn namespaces(&self) -> Option<Vec<XmlNode>> {
        let store = self.store();
        let ids = { store.borrow().ns_defs_vec(self.raw()) };
        if ids.is_empty() {
            return None;
        }
        Some(ids.into_iter().map(|id| registry::wrap(&store, id)).collect())
    }

    /// Replaces all namespace declarations. Within the new list the
    /// usual add semantics apply, so the first of two duplicate prefixes
    /// wins.
    pub fn set_namespaces(&self, namespaces: Option<&[XmlNode]>) {
        self.remove_namespaces();
        let Some(namespaces) = namespaces else {
            return;
        };
        for namespace in namespaces {
            self.add_namespace(namespace);
        }
    }

    /// Adds a namespace declaration. A declaration whose prefix is
    /// already present is not added.
    pub fn add_namespace(&self, namespace: &XmlNode) {
        let prefix = namespace.name().unwrap_or_default();
        let declared = self
            .namespaces()
            .unwrap_or_default()
            .iter()
            .any(|ns| ns.name().unwrap_or_default() == prefix);
        if declared {
            return;
        }
        self.adopt_if_foreign(namespace);
        let store = self.store();
        store.borrow_mut().add_ns_def(self.raw(), namespace.raw());
        self.register_child(namespace);
    }

    /// Removes the namespace declaration with this prefix, if present.
    pub fn remove_namespace(&self, prefix: &str) {
        let store = self.store();
        let found = {
            let s = store.borrow();
            s.ns_defs_vec(self.raw())
                .into_iter()
                .find(|&id| s.node(id).name.as_deref().unwrap_or("") == prefix)
        };
        if let Some(id) = found {
            registry::wrap(&store, id).detach();
        }
    }

    fn remove_namespaces(&self) {
        let store = self.store();
        let ids = { store.borrow().ns_defs_vec(self.raw()) };
        for id in ids {
            match registry::lookup(&store, id) {
                Some(namespace) => namespace.detach(),
                None => {
                    let mut s = store.borrow_mut();
                    s.unlink(id);
                    s.free_node(id);
                }
            }
        }
    }

    /// The namespace declared on this element for `prefix`.
    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<XmlNode> {
        self.namespaces()
            .unwrap_or_default()
            .into_iter()
            .find(|ns| ns.name().unwrap_or_default() == prefix)
    }

    /// Resolves the prefix of `name` against this element's ancestor
    /// namespace chain, falling back to the predefined catalog for
    /// non-empty prefixes.
    pub fn resolve_namespace_for_name(&self, name: &str) -> Option<XmlNode> {
        let (prefix, _) = XmlNode::split_qname(name);
        let mut current = Some(self.clone());
        while let Some(examined) = current {
            if let Some(namespace) = examined.namespace_for_prefix(prefix) {
                return Some(namespace);
            }
            current = examined
                .parent()
                .and_then(|p| p.as_element());
        }
        if !prefix.is_empty() {
            return XmlNode::predefined_namespace(prefix);
        }
        None
    }

    /// Resolves a namespace URI to its declared prefix, walking the same
    /// ancestor chain and falling back to the predefined catalog.
    pub fn resolve_prefix_for_namespace_uri(&self, uri: &str) -> Option<String> {
        let mut current = Some(self.clone());
        while let Some(examined) = current {
            let found = examined
                .namespaces()
                .unwrap_or_default()
                .into_iter()
                .find(|ns| ns.string_value().as_deref() == Some(uri));
            if let Some(namespace) = found {
                return namespace.name();
            }
            current = examined
                .parent()
                .and_then(|p| p.as_element());
        }
        XmlNode::predefined_prefix_for_uri(uri).map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Child element lookup
    // ------------------------------------------------------------------

    /// Direct child elements whose effective qualified name matches
    /// `name`, in document order. When the name's prefix resolves to a
    /// URI, children match either by exact name string or by
    /// (local name, URI) pair; otherwise only by exact name string.
    pub fn elements_for_name(&self, name: &str) -> Vec<Element> {
        let (_, local) = XmlNode::split_qname(name);
        let uri = self
            .resolve_namespace_for_name(name)
            .and_then(|ns| ns.string_value());
        self.child_elements()
            .into_iter()
            .filter(|element| {
                if element.name().as_deref() == Some(name) {
                    return true;
                }
                match uri.as_deref() {
                    Some(uri) => {
                        element.local_name().as_deref() == Some(local)
                            && element.uri().as_deref() == Some(uri)
                    }
                    None => false,
                }
            })
            .collect()
    }

    /// Direct child elements matching this (local name, URI) pair.
    pub fn elements_for_local_name_uri(&self, local_name: &str, uri: &str) -> Vec<Element> {
        self.child_elements()
            .into_iter()
            .filter(|element| {
                element.local_name().as_deref() == Some(local_name)
                    && element.uri().as_deref() == Some(uri)
            })
            .collect()
    }

    /// The first child element matching `name`.
    pub fn element_for_name(&self, name: &str) -> Option<Element> {
        self.elements_for_name(name).into_iter().next()
    }

    fn child_elements(&self) -> Vec<Element> {
        self.children()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| child.as_element())
            .collect()
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    /// Coalesces adjacent text node children into single text nodes,
    /// recursing into child elements first. CDATA sections are kept as
    /// separate nodes when `preserve` is true and merged like ordinary
    /// text when false. A node with exactly one child is left untouched.
    pub fn normalize_adjacent_text_nodes_preserving_cdata(&self, preserve: bool) {
        if self.child_count() == 1 {
            return;
        }

        let mut text = String::new();
        let mut merged: Vec<XmlNode> = Vec::new();
        for child in self.children().unwrap_or_default() {
            let is_text = child.kind() == NodeKind::Text;
            let keep_cdata = preserve && is_text && child.is_cdata();
            if is_text && !keep_cdata {
                if let Some(value) = child.string_value() {
                    text.push_str(&value);
                }
            } else {
                if !text.is_empty() {
                    merged.push(XmlNode::text(&text));
                    text.clear();
                }
                if let Some(element) = child.as_element() {
                    element.normalize_adjacent_text_nodes_preserving_cdata(preserve);
                }
                merged.push(child);
            }
        }
        if !text.is_empty() {
            merged.push(XmlNode::text(&text));
        }

        self.set_children(Some(&merged));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Document;
    use crate::options::Options;
    use pretty_assertions::assert_eq;

    fn parsed(input: &str) -> Document {
        Document::parse_str(input, Options::NONE).expect("test input should parse")
    }

    #[test]
    fn test_attribute_last_write_wins() {
        let element = Element::new("e");
        element.add_attribute(&XmlNode::attribute("id", "1"));
        element.add_attribute(&XmlNode::attribute("id", "2"));
        let attributes = element.attributes().unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].string_value().as_deref(), Some("2"));
    }

    #[test]
    fn test_attributes_empty_is_none() {
        let element = Element::new("e");
        assert!(element.attributes().is_none());
        element.add_attribute(&XmlNode::attribute("a", "1"));
        assert_eq!(element.attributes().unwrap().len(), 1);
        element.remove_attribute("a");
        assert!(element.attributes().is_none());
    }

    #[test]
    fn test_set_attributes_with_pairs() {
        let element = Element::new("e");
        element.add_attribute(&XmlNode::attribute("old", "x"));
        element.set_attributes_with(&[("a", "1"), ("b", "2")]);
        let names: Vec<_> = element
            .attributes()
            .unwrap()
            .iter()
            .map(|a| a.name().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_attribute_lookup_by_local_name_and_uri() {
        let element = Element::new("e");
        element.add_attribute(&XmlNode::attribute_with_uri("x:lang", "urn:x", "en"));
        let found = element.attribute_for_local_name_uri("lang", "urn:x").unwrap();
        assert_eq!(found.string_value().as_deref(), Some("en"));
        assert!(element.attribute_for_local_name_uri("lang", "urn:y").is_none());
        assert!(element.attribute_for_name("x:lang").is_some());
    }

    #[test]
    fn test_namespace_first_declaration_wins() {
        let element = Element::new("e");
        element.add_namespace(&XmlNode::namespace("p", "urn:first"));
        element.add_namespace(&XmlNode::namespace("p", "urn:second"));
        let namespaces = element.namespaces().unwrap();
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespaces[0].string_value().as_deref(), Some("urn:first"));
    }

    #[test]
    fn test_remove_namespace() {
        let element = Element::new("e");
        element.add_namespace(&XmlNode::namespace("p", "urn:p"));
        element.add_namespace(&XmlNode::namespace("q", "urn:q"));
        element.remove_namespace("p");
        let namespaces = element.namespaces().unwrap();
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespaces[0].name().as_deref(), Some("q"));
    }

    #[test]
    fn test_resolve_namespace_walks_ancestors() {
        let doc = parsed("<r xmlns:p=\"urn:p\"><mid><leaf/></mid></r>");
        let root = doc.root_element().unwrap();
        let leaf = root
            .child_at(0)
            .unwrap()
            .child_at(0)
            .unwrap()
            .as_element()
            .unwrap();
        let namespace = leaf.resolve_namespace_for_name("p:anything").unwrap();
        assert_eq!(namespace.string_value().as_deref(), Some("urn:p"));
        assert_eq!(
            leaf.resolve_prefix_for_namespace_uri("urn:p").as_deref(),
            Some("p")
        );
    }

    #[test]
    fn test_resolve_falls_back_to_predefined_catalog() {
        let element = Element::new("e");
        let xml = element.resolve_namespace_for_name("xml:lang").unwrap();
        assert_eq!(
            xml.string_value().as_deref(),
            Some("http://www.w3.org/XML/1998/namespace")
        );
        assert!(element.resolve_namespace_for_name("nope:x").is_none());
        assert!(element.resolve_namespace_for_name("unprefixed").is_none());
        assert_eq!(
            element
                .resolve_prefix_for_namespace_uri("http://www.w3.org/2001/XMLSchema-instance")
                .as_deref(),
            Some("xsi")
        );
    }

    #[test]
    fn test_elements_for_name_exact_match() {
        let doc = parsed("<r><a/><b/><a/></r>");
        let root = doc.root_element().unwrap();
        let found = root.elements_for_name("a");
        assert_eq!(found.len(), 2);
        assert!(root.elements_for_name("missing").is_empty());
    }

    #[test]
    fn test_elements_for_name_matches_by_uri_when_prefix_resolves() {
        // The child declares its own prefix for the same URI the parent
        // binds to `p`, so a `p:item` query must match `q:item` by
        // (local name, URI).
        let doc = parsed(
            "<r xmlns:p=\"urn:things\"><q:item xmlns:q=\"urn:things\"/><p:item/><other/></r>",
        );
        let root = doc.root_element().unwrap();
        let found = root.elements_for_name("p:item");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_elements_for_local_name_uri() {
        let doc = parsed(
            "<r xmlns:p=\"urn:things\" xmlns:o=\"urn:other\"><p:item/><o:item/></r>",
        );
        let root = doc.root_element().unwrap();
        let found = root.elements_for_local_name_uri("item", "urn:things");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name().as_deref(), Some("p:item"));
    }

    #[test]
    fn test_normalize_merges_adjacent_text() {
        let element = Element::new("e");
        element.add_child(&XmlNode::text("a"));
        element.add_child(&XmlNode::text("b"));
        element.add_child(&XmlNode::comment("x"));
        element.add_child(&XmlNode::text("c"));
        element.normalize_adjacent_text_nodes_preserving_cdata(false);

        let children = element.children().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].string_value().as_deref(), Some("ab"));
        assert_eq!(children[1].kind(), NodeKind::Comment);
        assert_eq!(children[2].string_value().as_deref(), Some("c"));
    }

    #[test]
    fn test_normalize_preserves_cdata_when_asked() {
        let element = Element::new("e");
        element.add_child(&XmlNode::text("a"));
        element.add_child(&XmlNode::cdata("cd"));
        element.add_child(&XmlNode::text("b"));

        element.normalize_adjacent_text_nodes_preserving_cdata(true);
        let children = element.children().unwrap();
        assert_eq!(children.len(), 3);
        assert!(children[1].is_cdata());

        element.normalize_adjacent_text_nodes_preserving_cdata(false);
        let children = element.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].string_value().as_deref(), Some("acdb"));
    }

    #[test]
    fn test_normalize_single_child_untouched() {
        let element = Element::new("e");
        element.add_child(&XmlNode::text(""));
        element.normalize_adjacent_text_nodes_preserving_cdata(false);
        assert_eq!(element.child_count(), 1);
    }

    #[test]
    fn test_normalize_recurses_into_child_elements() {
        let doc = parsed("<r><inner>a<b/>c</inner><tail/></r>");
        let root = doc.root_element().unwrap();
        root.normalize_adjacent_text_nodes_preserving_cdata(false);
        let inner = root.child_at(0).unwrap();
        assert_eq!(inner.child_count(), 3);
    }

    #[test]
    fn test_with_string_value() {
        let element = Element::with_string_value("greeting", "hi");
        assert_eq!(element.string_value().as_deref(), Some("hi"));
        assert_eq!(element.child_count(), 1);
    }
}
