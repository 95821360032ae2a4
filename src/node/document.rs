//! Document nodes
//!
//! The document view owns document-level state: the XML declaration
//! fields, content kind, the single root element, and the DTD. It is
//! also the construction entry point — a pull-based byte source feeds
//! the engine, which either produces a tree or nothing at all.

use std::ops::Deref;

use tracing::{debug, warn};

use super::{registry, DtdNode, Element, XmlNode};
use crate::engine::build;
use crate::engine::dtd as engine_dtd;
use crate::engine::serialize;
use crate::engine::source::{BufferSource, ByteSource};
use crate::engine::store::{
    RawKind, DOC_PROP_HTML, DOC_PROP_TEXT, DOC_PROP_XHTML,
};
use crate::error::Error;
use crate::node::StoreRef;
use crate::options::{ContentKind, Options};

/// A document node: at most one root element and at most one DTD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(pub(crate) XmlNode);

impl Deref for Document {
    type Target = XmlNode;

    fn deref(&self) -> &XmlNode {
        &self.0
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    /// An empty document. Not standalone, matching engine defaults.
    pub fn new() -> Document {
        Document::with_root_element(None)
    }

    /// A document with a single child, the root element.
    ///
    /// # Panics
    ///
    /// When the element already has a parent.
    pub fn with_root_element(root: Option<Element>) -> Document {
        if let Some(root) = root.as_ref() {
            assert!(root.parent().is_none(), "root element must not have a parent");
        }
        let node = XmlNode::standalone(RawKind::Document, |_, _| {});
        let document = Document(node);
        if let Some(root) = root {
            document.add_child(root.as_node());
        }
        document
    }

    // ------------------------------------------------------------------
    // Construction from input
    // ------------------------------------------------------------------

    /// Constructs a document by pulling a byte source to EOF. Never
    /// materializes more than the engine's internal buffer beyond the
    /// source's own chunks, making it the right path for large or
    /// network-backed input. `None` when the engine cannot produce a
    /// tree, or when `DOCUMENT_VALIDATE` is set and validation fails.
    pub fn from_source(source: &mut dyn ByteSource, options: Options) -> Option<Document> {
        let (store, doc) = build::document_from_source(source, options)?;
        Document::finish(store, doc, options)
    }

    /// Constructs a document from a complete in-memory buffer.
    pub fn parse_bytes(bytes: &[u8], options: Options) -> Option<Document> {
        let mut source = BufferSource::new(bytes);
        Document::from_source(&mut source, options)
    }

    /// Constructs a document from text.
    pub fn parse_str(text: &str, options: Options) -> Option<Document> {
        Document::parse_bytes(text.as_bytes(), options)
    }

    fn finish(
        store: crate::engine::store::RawStore,
        doc: crate::engine::store::RawId,
        options: Options,
    ) -> Option<Document> {
        let store: StoreRef = std::rc::Rc::new(std::cell::RefCell::new(store));
        let document = registry::wrap(&store, doc).as_document()?;
        if options.contains(Options::DOCUMENT_TIDY_HTML) {
            document.set_content_kind(ContentKind::Xhtml);
        }
        if options.contains(Options::DOCUMENT_VALIDATE) {
            if let Err(err) = document.validate() {
                warn!(error = %err, "document failed validation on load");
                return None;
            }
        }
        Some(document)
    }

    pub fn as_node(&self) -> &XmlNode {
        &self.0
    }

    pub fn into_node(self) -> XmlNode {
        self.0
    }

    // ------------------------------------------------------------------
    // Document state
    // ------------------------------------------------------------------

    /// The IANA character encoding, e.g. `UTF-8`.
    pub fn character_encoding(&self) -> Option<String> {
        let store = self.store();
        let encoding = store.borrow().doc_info(self.raw()).encoding.clone();
        encoding
    }

    pub fn set_character_encoding(&self, encoding: Option<&str>) {
        let store = self.store();
        store.borrow_mut().doc_info_mut(self.raw()).encoding = encoding.map(str::to_string);
    }

    /// The XML version.
    pub fn version(&self) -> Option<String> {
        let store = self.store();
        let version = store.borrow().doc_info(self.raw()).version.clone();
        version
    }

    /// Sets the XML version.
    ///
    /// # Panics
    ///
    /// When the version is set to anything other than `1.0` or `1.1`.
    pub fn set_version(&self, version: Option<&str>) {
        if let Some(version) = version {
            assert!(
                version == "1.0" || version == "1.1",
                "XML version must be 1.0 or 1.1"
            );
        }
        let store = self.store();
        store.borrow_mut().doc_info_mut(self.raw()).version = version.map(str::to_string);
    }

    /// Whether the document declares itself standalone.
    pub fn is_standalone(&self) -> bool {
        let store = self.store();
        let standalone = store.borrow().doc_info(self.raw()).standalone;
        standalone
    }

    pub fn set_standalone(&self, standalone: bool) {
        let store = self.store();
        store.borrow_mut().doc_info_mut(self.raw()).standalone = standalone;
    }

    /// The kind of document, derived from the raw document's property
    /// bits.
    pub fn content_kind(&self) -> ContentKind {
        let store = self.store();
        let kind = serialize::content_kind(&store.borrow(), self.raw());
        kind
    }

    pub fn set_content_kind(&self, kind: ContentKind) {
        let store = self.store();
        let mut s = store.borrow_mut();
        let properties = &mut s.doc_info_mut(self.raw()).properties;
        *properties &= !(DOC_PROP_HTML | DOC_PROP_XHTML | DOC_PROP_TEXT);
        match kind {
            ContentKind::Html => *properties |= DOC_PROP_HTML,
            ContentKind::Xhtml => *properties |= DOC_PROP_XHTML,
            ContentKind::Text => *properties |= DOC_PROP_TEXT,
            ContentKind::Xml => {}
        }
    }

    /// The MIME type, e.g. `text/xml`. Wrapper-local metadata: it is
    /// never written into the raw tree and does not survive
    /// serialization.
    pub fn mime_type(&self) -> Option<String> {
        self.0.inner.mime_type.borrow().clone()
    }

    pub fn set_mime_type(&self, mime_type: Option<&str>) {
        *self.0.inner.mime_type.borrow_mut() = mime_type.map(str::to_string);
    }

    // ------------------------------------------------------------------
    // Root element and DTD
    // ------------------------------------------------------------------

    /// The root element.
    pub fn root_element(&self) -> Option<Element> {
        let store = self.store();
        let root = { store.borrow().root_element(self.raw()) }?;
        registry::wrap(&store, root).as_element()
    }

    /// Sets the root element, removing all other children including
    /// comments and processing instructions that predate the root.
    ///
    /// # Panics
    ///
    /// When the element already has a parent.
    pub fn set_root_element(&self, root: &Element) {
        assert!(root.parent().is_none(), "root element must not have a parent");
        self.set_children(None);
        self.add_child(root.as_node());
    }

    /// The associated DTD.
    pub fn dtd(&self) -> Option<DtdNode> {
        let store = self.store();
        let dtd = { store.borrow().doc_info(self.raw()).dtd }?;
        registry::wrap(&store, dtd).as_dtd_node()
    }

    /// Replaces the associated DTD with a copy of `dtd` (`None` removes
    /// it). The old DTD is unlinked if somebody still wraps it, freed
    /// outright otherwise.
    pub fn set_dtd(&self, dtd: Option<&DtdNode>) {
        let store = self.store();
        let current = { store.borrow().doc_info(self.raw()).dtd };
        if let Some(current) = current {
            match registry::lookup(&store, current) {
                Some(wrapped) => wrapped.detach(),
                None => {
                    let mut s = store.borrow_mut();
                    s.unlink(current);
                    s.free_dtd_subtree(current);
                }
            }
        }

        let Some(dtd) = dtd else {
            return;
        };

        // Link in a copy, leaving the caller's DTD untouched.
        let source = dtd.store();
        let copy = {
            let mut src = source.borrow_mut();
            src.copy_subtree(dtd.raw())
        };
        let copy = if std::rc::Rc::ptr_eq(&store, &source) {
            copy
        } else {
            let mut t = store.borrow_mut();
            let mut src = source.borrow_mut();
            t.adopt_subtree(&mut src, copy, Some(self.raw()))
        };
        {
            let mut s = store.borrow_mut();
            let doc = self.raw();
            match s.node(doc).first_child {
                Some(first) => s.add_prev_sibling(first, copy),
                None => s.add_child(doc, copy),
            }
            s.node_mut(copy).doc = Some(doc);
            s.doc_info_mut(doc).dtd = Some(copy);
        }
        // Wrapping registers the copy into this document's child set.
        let _ = registry::wrap(&store, copy);
    }

    // ------------------------------------------------------------------
    // Validation and output
    // ------------------------------------------------------------------

    /// Validates the document against its DTD. The error carries the
    /// engine-supplied diagnostic; the tree is never modified.
    pub fn validate(&self) -> Result<(), Error> {
        let store = self.store();
        let result = engine_dtd::validate_document(&store.borrow(), self.raw());
        result.map_err(|message| {
            debug!(error = %message, "validation failed");
            Error::Validation { message }
        })
    }

    /// The serialized document encoded as UTF-8 bytes.
    pub fn xml_data(&self, options: Options) -> Vec<u8> {
        self.xml_string_with_options(options).into_bytes()
    }

    /// XSLT application is excluded by design.
    pub fn by_applying_xslt(
        &self,
        _xslt: &str,
        _arguments: &[(&str, &str)],
    ) -> Result<Document, Error> {
        Err(Error::Unsupported("XSLT"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use pretty_assertions::assert_eq;

    fn parsed(input: &str) -> Document {
        Document::parse_str(input, Options::NONE).expect("test input should parse")
    }

    #[test]
    fn test_round_trip() {
        let doc = parsed("<note><to>A</to><from>B</from></note>");
        let root = doc.root_element().unwrap();
        assert_eq!(root.name().as_deref(), Some("note"));
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.child_at(0).unwrap().string_value().as_deref(), Some("A"));
        assert_eq!(root.child_at(1).unwrap().string_value().as_deref(), Some("B"));

        let out = doc.xml_string();
        assert!(out.contains("<note><to>A</to><from>B</from></note>"));
    }

    #[test]
    fn test_malformed_input_yields_absent_document() {
        assert!(Document::parse_str("<unclosed>", Options::NONE).is_none());
        assert!(Document::parse_str("plain text", Options::NONE).is_none());
    }

    #[test]
    fn test_streaming_equivalence() {
        struct Chunked<'a> {
            bytes: &'a [u8],
            pos: usize,
            chunk: usize,
        }
        impl ByteSource for Chunked<'_> {
            fn read(&mut self, buf: &mut [u8]) -> isize {
                let n = self.chunk.min(buf.len()).min(self.bytes.len() - self.pos);
                buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
                self.pos += n;
                n as isize
            }
        }

        let input = "<list><item>1</item><item>2</item><item>3</item></list>";
        let buffered = Document::parse_str(input, Options::NONE).unwrap();
        for chunk in [1usize, 7, 4096] {
            let mut source = Chunked { bytes: input.as_bytes(), pos: 0, chunk };
            let streamed = Document::from_source(&mut source, Options::NONE).unwrap();
            assert_eq!(
                streamed.root_element().unwrap().name(),
                buffered.root_element().unwrap().name()
            );
            assert_eq!(
                streamed.root_element().unwrap().child_count(),
                buffered.root_element().unwrap().child_count()
            );
        }
    }

    #[test]
    fn test_set_root_element_clears_all_children() {
        let doc = parsed("<?p data?><!--lead--><old/>");
        assert_eq!(doc.child_count(), 3);
        let replacement = Element::new("new");
        doc.set_root_element(&replacement);
        assert_eq!(doc.child_count(), 1);
        assert_eq!(doc.root_element().unwrap().name().as_deref(), Some("new"));
    }

    #[test]
    fn test_with_root_element() {
        let doc = Document::with_root_element(Some(Element::new("root")));
        assert_eq!(doc.root_element().unwrap().name().as_deref(), Some("root"));
        assert!(!doc.is_standalone());
        assert_eq!(doc.kind(), NodeKind::Document);
    }

    #[test]
    #[should_panic(expected = "1.0 or 1.1")]
    fn test_version_precondition() {
        let doc = Document::new();
        doc.set_version(Some("2.0"));
    }

    #[test]
    fn test_version_and_encoding_round_trip() {
        let doc = parsed("<?xml version=\"1.1\" encoding=\"UTF-8\"?><r/>");
        assert_eq!(doc.version().as_deref(), Some("1.1"));
        assert_eq!(doc.character_encoding().as_deref(), Some("UTF-8"));
        doc.set_version(Some("1.0"));
        doc.set_character_encoding(None);
        assert_eq!(doc.xml_string(), "<?xml version=\"1.0\"?>\n<r></r>");
    }

    #[test]
    fn test_content_kind_affects_empty_tags() {
        let doc = parsed("<body><br/></body>");
        assert_eq!(doc.content_kind(), ContentKind::Xml);
        doc.set_content_kind(ContentKind::Html);
        assert_eq!(doc.content_kind(), ContentKind::Html);
        let root = doc.root_element().unwrap();
        assert_eq!(root.xml_string(), "<body><br></body>");
    }

    #[test]
    fn test_mime_type_is_wrapper_local() {
        let doc = parsed("<r/>");
        doc.set_mime_type(Some("text/xml"));
        assert_eq!(doc.mime_type().as_deref(), Some("text/xml"));
        // Not persisted into the raw tree, so serialization is unchanged.
        assert!(!doc.xml_string().contains("text/xml"));
        let reparsed = Document::parse_str(&doc.xml_string(), Options::NONE).unwrap();
        assert_eq!(reparsed.mime_type(), None);
    }

    #[test]
    fn test_dtd_get_and_set_copies() {
        let doc = parsed("<!DOCTYPE r [<!ELEMENT r EMPTY>]><r/>");
        let dtd = doc.dtd().expect("parsed document should expose its dtd");
        assert_eq!(dtd.name().as_deref(), Some("r"));

        let other = parsed("<r/>");
        assert!(other.dtd().is_none());
        other.set_dtd(Some(&dtd));
        let copied = other.dtd().unwrap();
        assert_eq!(copied.name().as_deref(), Some("r"));
        // A copy was linked, not the caller's node.
        assert!(copied.as_node() != dtd.as_node());
        // The source document still has its own DTD.
        assert!(doc.dtd().is_some());

        other.set_dtd(None);
        assert!(other.dtd().is_none());
    }

    #[test]
    fn test_validate_success_and_failure() {
        let valid = parsed(
            "<!DOCTYPE note [<!ELEMENT note (#PCDATA)*>]><note>ok</note>",
        );
        assert!(valid.validate().is_ok());

        let invalid = parsed(
            "<!DOCTYPE r [<!ELEMENT r EMPTY>]><r><child/></r>",
        );
        let err = invalid.validate().unwrap_err();
        assert!(err.to_string().contains("EMPTY"));
        // The tree is not corrupted by a failed validation.
        assert_eq!(invalid.root_element().unwrap().child_count(), 1);
    }

    #[test]
    fn test_validate_on_load_option() {
        let input = "<!DOCTYPE r [<!ELEMENT r EMPTY>]><r><child/></r>";
        assert!(Document::parse_str(input, Options::NONE).is_some());
        assert!(Document::parse_str(input, Options::DOCUMENT_VALIDATE).is_none());
    }

    #[test]
    fn test_xslt_is_unsupported() {
        let doc = parsed("<r/>");
        let err = doc.by_applying_xslt("<xsl/>", &[]).unwrap_err();
        assert!(matches!(err, Error::Unsupported("XSLT")));
    }

    #[test]
    fn test_xml_data_is_utf8_bytes() {
        let doc = parsed("<r/>");
        let data = doc.xml_data(Options::NONE);
        assert_eq!(data, doc.xml_string().into_bytes());
    }
}
