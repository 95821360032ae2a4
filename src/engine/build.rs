//! Tree construction
//!
//! Drains a byte source, tokenizes with `xmlparser`, and builds the raw
//! tree. Tokenization is the collaborator engine's concern; this module
//! only assembles nodes. Returns `None` whenever no tree with a root
//! element can be produced.

use std::collections::HashMap;

use tracing::debug;
use xmlparser::{ElementEnd, ExternalId, Token, Tokenizer};

use super::dtd;
use super::source::ByteSource;
use super::store::{RawId, RawKind, RawStore};
use crate::options::Options;

/// Chunk size used when pulling from a byte source.
const READ_CHUNK: usize = 4096;

/// Namespace URI bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Pulls a byte source to EOF and constructs a document tree. The source
/// is closed exactly once. Peak memory is bounded by the engine's
/// internal buffer, which accumulates the pulled bytes for tokenization.
pub fn document_from_source(
    source: &mut dyn ByteSource,
    options: Options,
) -> Option<(RawStore, RawId)> {
    let mut bytes = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut failed = false;
    loop {
        let n = source.read(&mut chunk);
        if n < 0 {
            debug!(status = n, "byte source read failed");
            failed = true;
            break;
        }
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n as usize]);
    }
    let status = source.close();
    if failed || status != 0 {
        return None;
    }
    document_from_bytes(&bytes, options)
}

/// Constructs a document tree from a complete in-memory buffer.
pub fn document_from_bytes(bytes: &[u8], options: Options) -> Option<(RawStore, RawId)> {
    let text = std::str::from_utf8(bytes).ok()?;
    build(text.trim_start_matches('\u{feff}'), options)
}

struct PendingElement {
    prefix: String,
    local: String,
    // (prefix, local, value) triples in document order.
    attributes: Vec<(String, String, String)>,
}

fn build(text: &str, options: Options) -> Option<(RawStore, RawId)> {
    let mut store = RawStore::new();
    let doc = store.create(RawKind::Document);

    let mut stack: Vec<RawId> = vec![doc];
    let mut open_names: Vec<String> = Vec::new();
    // Namespace scopes: one frame per open element, plus the default frame.
    let mut scopes: Vec<Vec<(String, String)>> = vec![Vec::new()];
    let mut defaults: Vec<Option<String>> = vec![None];
    let mut pending: Option<PendingElement> = None;
    let mut dtd_state: Option<(RawId, usize)> = None;
    let mut entities: HashMap<String, String> = HashMap::new();
    let mut seen_root = false;

    for token in Tokenizer::from(text) {
        let token = match token {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, "tokenizer rejected input");
                return None;
            }
        };
        match token {
            Token::Declaration {
                version,
                encoding,
                standalone,
                ..
            } => {
                let info = store.doc_info_mut(doc);
                info.version = Some(version.as_str().to_string());
                info.encoding = encoding.map(|e| e.as_str().to_string());
                info.standalone = standalone.unwrap_or(false);
            }

            Token::DtdStart {
                name, external_id, span,
            } => {
                let id = new_dtd(&mut store, name.as_str(), external_id);
                dtd_state = Some((id, span.end()));
            }

            Token::EmptyDtd {
                name, external_id, ..
            } => {
                let id = new_dtd(&mut store, name.as_str(), external_id);
                store.add_child(doc, id);
            }

            // Declarations are recovered from the subset slice below; the
            // tokenizer's own entity events are redundant with that scan.
            Token::EntityDeclaration { .. } => {}

            Token::DtdEnd { span } => {
                if let Some((id, subset_start)) = dtd_state.take() {
                    let subset = &text[subset_start..span.start()];
                    dtd::scan_internal_subset(&mut store, id, subset);
                    for decl in store.children_vec(id) {
                        if store.kind(decl) == RawKind::EntityDecl {
                            if let (Some(name), Some(value)) = (
                                store.node(decl).name.clone(),
                                store.node(decl).content.clone(),
                            ) {
                                entities.insert(name, value);
                            }
                        }
                    }
                    store.add_child(doc, id);
                }
            }

            Token::ProcessingInstruction {
                target, content, ..
            } => {
                let id = store.create(RawKind::ProcessingInstruction);
                store.node_mut(id).name = Some(target.as_str().to_string());
                store.node_mut(id).content = content.map(|c| c.as_str().to_string());
                let parent = *stack.last()?;
                store.add_child(parent, id);
            }

            Token::Comment { text, .. } => {
                let id = store.create(RawKind::Comment);
                store.node_mut(id).content = Some(text.as_str().to_string());
                let parent = *stack.last()?;
                store.add_child(parent, id);
            }

            Token::ElementStart { prefix, local, .. } => {
                pending = Some(PendingElement {
                    prefix: prefix.as_str().to_string(),
                    local: local.as_str().to_string(),
                    attributes: Vec::new(),
                });
            }

            Token::Attribute {
                prefix, local, value, ..
            } => {
                let element = pending.as_mut()?;
                element.attributes.push((
                    prefix.as_str().to_string(),
                    local.as_str().to_string(),
                    unescape(value.as_str(), &entities),
                ));
            }

            Token::ElementEnd { end, .. } => match end {
                ElementEnd::Open | ElementEnd::Empty => {
                    let element = pending.take()?;
                    let parent = *stack.last()?;
                    if parent == doc {
                        if seen_root {
                            debug!("document has multiple root elements");
                            return None;
                        }
                        seen_root = true;
                    }
                    let name = element.local.clone();
                    let id = materialize(&mut store, element, &mut scopes, &mut defaults);
                    store.add_child(parent, id);
                    if matches!(end, ElementEnd::Open) {
                        stack.push(id);
                        open_names.push(name);
                    } else {
                        scopes.pop();
                        defaults.pop();
                    }
                }
                ElementEnd::Close(_, local) => {
                    match open_names.pop() {
                        Some(open) if open == local.as_str() => {}
                        other => {
                            debug!(expected = ?other, got = local.as_str(), "mismatched end tag");
                            return None;
                        }
                    }
                    stack.pop();
                    scopes.pop();
                    defaults.pop();
                }
            },

            Token::Text { text } => {
                let content = text.as_str();
                let blank = content.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'));
                if blank && !options.contains(Options::PRESERVE_WHITESPACE) {
                    continue;
                }
                let parent = *stack.last()?;
                if parent == doc && blank {
                    continue;
                }
                let id = store.create(RawKind::Text);
                store.node_mut(id).content = Some(unescape(content, &entities));
                store.add_child(parent, id);
            }

            Token::Cdata { text, .. } => {
                let id = store.create(RawKind::CdataSection);
                store.node_mut(id).content = Some(text.as_str().to_string());
                let parent = *stack.last()?;
                store.add_child(parent, id);
            }
        }
    }

    if stack.len() != 1 {
        debug!(depth = stack.len(), "input ended with unclosed elements");
        return None;
    }
    if store.root_element(doc).is_none() {
        debug!("no recoverable root element");
        return None;
    }
    debug!(root = ?store.node(store.root_element(doc)?).name, "document constructed");
    Some((store, doc))
}

fn new_dtd(store: &mut RawStore, name: &str, external_id: Option<ExternalId>) -> RawId {
    let id = store.create(RawKind::Dtd);
    store.node_mut(id).name = Some(name.to_string());
    match external_id {
        Some(ExternalId::System(system)) => {
            let decl = store.node_mut(id).decl.get_or_insert_with(Default::default);
            decl.system_id = Some(system.as_str().to_string());
        }
        Some(ExternalId::Public(public, system)) => {
            let decl = store.node_mut(id).decl.get_or_insert_with(Default::default);
            decl.public_id = Some(public.as_str().to_string());
            decl.system_id = Some(system.as_str().to_string());
        }
        None => {}
    }
    id
}

/// Builds the element raw node, its namespace declarations, and its
/// attributes, resolving prefixes against the current scope chain.
fn materialize(
    store: &mut RawStore,
    element: PendingElement,
    scopes: &mut Vec<Vec<(String, String)>>,
    defaults: &mut Vec<Option<String>>,
) -> RawId {
    let mut declared: Vec<(String, String)> = Vec::new();
    let mut default_ns: Option<String> = None;
    for (prefix, local, value) in &element.attributes {
        if prefix == "xmlns" {
            declared.push((local.clone(), value.clone()));
        } else if prefix.is_empty() && local == "xmlns" {
            default_ns = Some(value.clone());
        }
    }
    scopes.push(declared);
    defaults.push(default_ns);

    let id = store.create(RawKind::Element);
    store.node_mut(id).name = Some(qualified(&element.prefix, &element.local));
    store.node_mut(id).ns_uri = if element.prefix.is_empty() {
        defaults.iter().rev().find_map(|d| d.clone())
    } else {
        resolve_prefix(&element.prefix, scopes)
    };

    for (prefix, uri) in store_scope(scopes) {
        let ns = store.create(RawKind::Namespace);
        store.node_mut(ns).name = Some(prefix);
        store.node_mut(ns).content = Some(uri);
        store.add_ns_def(id, ns);
    }
    if let Some(Some(uri)) = defaults.last() {
        let ns = store.create(RawKind::Namespace);
        store.node_mut(ns).name = Some(String::new());
        store.node_mut(ns).content = Some(uri.clone());
        store.add_ns_def(id, ns);
    }

    for (prefix, local, value) in element.attributes {
        if prefix == "xmlns" || (prefix.is_empty() && local == "xmlns") {
            continue;
        }
        let attr = store.create(RawKind::Attribute);
        store.node_mut(attr).name = Some(qualified(&prefix, &local));
        store.node_mut(attr).content = Some(value);
        if !prefix.is_empty() {
            store.node_mut(attr).ns_uri = resolve_prefix(&prefix, scopes);
        }
        store.add_property(id, attr);
    }
    id
}

fn store_scope(scopes: &[Vec<(String, String)>]) -> Vec<(String, String)> {
    scopes.last().cloned().unwrap_or_default()
}

fn resolve_prefix(prefix: &str, scopes: &[Vec<(String, String)>]) -> Option<String> {
    if prefix == "xml" {
        return Some(XML_NAMESPACE.to_string());
    }
    for scope in scopes.iter().rev() {
        for (declared, uri) in scope.iter().rev() {
            if declared == prefix {
                return Some(uri.clone());
            }
        }
    }
    None
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}:{local}")
    }
}

/// Expands character references and known entity references. Unknown
/// references pass through literally.
fn unescape(text: &str, entities: &HashMap<String, String>) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let replacement: Option<String> = match entity {
            "amp" => Some("&".to_string()),
            "lt" => Some("<".to_string()),
            "gt" => Some(">".to_string()),
            "quot" => Some("\"".to_string()),
            "apos" => Some("'".to_string()),
            _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            }
            _ if entity.starts_with('#') => entity[1..]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from),
            _ => entities.get(entity).cloned(),
        };
        match replacement {
            Some(replacement) => {
                out.push_str(&replacement);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::source::BufferSource;

    fn parse(input: &str) -> (RawStore, RawId) {
        document_from_bytes(input.as_bytes(), Options::NONE).expect("input should parse")
    }

    #[test]
    fn test_simple_document() {
        let (store, doc) = parse("<note><to>A</to><from>B</from></note>");
        let root = store.root_element(doc).unwrap();
        assert_eq!(store.node(root).name.as_deref(), Some("note"));
        assert_eq!(store.child_count(root), 2);
    }

    #[test]
    fn test_declaration_captured() {
        let (store, doc) =
            parse("<?xml version=\"1.1\" encoding=\"UTF-8\" standalone=\"yes\"?><r/>");
        let info = store.doc_info(doc);
        assert_eq!(info.version.as_deref(), Some("1.1"));
        assert_eq!(info.encoding.as_deref(), Some("UTF-8"));
        assert!(info.standalone);
    }

    #[test]
    fn test_whitespace_dropped_by_default() {
        let (store, doc) = parse("<r>\n  <a/>\n</r>");
        let root = store.root_element(doc).unwrap();
        assert_eq!(store.child_count(root), 1);

        let (store, doc) = document_from_bytes(
            b"<r>\n  <a/>\n</r>",
            Options::PRESERVE_WHITESPACE,
        )
        .unwrap();
        let root = store.root_element(doc).unwrap();
        assert_eq!(store.child_count(root), 3);
    }

    #[test]
    fn test_namespace_resolution() {
        let (store, doc) = parse(
            "<r xmlns=\"urn:default\" xmlns:x=\"urn:x\"><x:a/><b/></r>",
        );
        let root = store.root_element(doc).unwrap();
        assert_eq!(store.node(root).ns_uri.as_deref(), Some("urn:default"));
        let children = store.children_vec(root);
        assert_eq!(store.node(children[0]).ns_uri.as_deref(), Some("urn:x"));
        assert_eq!(store.node(children[1]).ns_uri.as_deref(), Some("urn:default"));
        assert_eq!(store.ns_defs_vec(root).len(), 2);
    }

    #[test]
    fn test_entities_expanded() {
        let (store, doc) = parse(
            "<!DOCTYPE r [<!ENTITY who \"world\">]><r>hello &who; &amp; &#33;</r>",
        );
        let root = store.root_element(doc).unwrap();
        let text = store.child_at(root, 0).unwrap();
        assert_eq!(
            store.node(text).content.as_deref(),
            Some("hello world & !")
        );
    }

    #[test]
    fn test_dtd_linked_into_document() {
        let (store, doc) = parse(
            "<!DOCTYPE note [<!ELEMENT note (#PCDATA)>]><note>x</note>",
        );
        let dtd = store.doc_info(doc).dtd.expect("dtd should be linked");
        assert_eq!(store.kind(dtd), RawKind::Dtd);
        assert_eq!(store.node(dtd).name.as_deref(), Some("note"));
        assert_eq!(store.child_count(dtd), 1);
    }

    #[test]
    fn test_malformed_input_is_absent() {
        assert!(document_from_bytes(b"<a><b></a>", Options::NONE).is_none());
        assert!(document_from_bytes(b"no markup here", Options::NONE).is_none());
        assert!(document_from_bytes(b"<a/><b/>", Options::NONE).is_none());
        assert!(document_from_bytes(b"", Options::NONE).is_none());
    }

    #[test]
    fn test_source_equivalence_across_chunk_sizes() {
        let input = "<r><a>1</a><b>2</b><c/></r>".repeat(20);
        let input = format!("<all>{input}</all>");

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

        let mut whole = BufferSource::new(input.as_bytes());
        let (store_a, doc_a) = document_from_source(&mut whole, Options::NONE).unwrap();
        let mut tiny = Chunked { bytes: input.as_bytes(), pos: 0, chunk: 1 };
        let (store_b, doc_b) = document_from_source(&mut tiny, Options::NONE).unwrap();

        let root_a = store_a.root_element(doc_a).unwrap();
        let root_b = store_b.root_element(doc_b).unwrap();
        assert_eq!(store_a.node(root_a).name, store_b.node(root_b).name);
        assert_eq!(store_a.child_count(root_a), store_b.child_count(root_b));
    }

    #[test]
    fn test_failing_source_is_absent() {
        struct Failing;
        impl ByteSource for Failing {
            fn read(&mut self, _: &mut [u8]) -> isize {
                -1
            }
        }
        assert!(document_from_source(&mut Failing, Options::NONE).is_none());
    }
}
