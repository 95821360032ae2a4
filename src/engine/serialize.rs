//! Serialization
//!
//! Reads the raw tree directly (bypassing the wrapper layer) and writes
//! XML text, honoring the output option bitset: pretty-printing, quote
//! style, empty-element shape, content escaping, and the HTML void-tag
//! shape for documents with HTML content kind.

use super::dtd::{AttributeDeclKind, DeclInfo, ElementContentKind};
use super::store::{
    RawId, RawKind, RawStore, DOC_PROP_HTML, DOC_PROP_TEXT, DOC_PROP_XHTML,
};
use crate::options::{ContentKind, Options};

const INDENT: &str = "    ";

/// Serializes any raw node. Entry point for both wrapper `xml_string`
/// calls and document data output.
pub fn node_to_string(store: &RawStore, id: RawId, options: Options) -> String {
    let mut out = String::new();
    let kind = content_kind(store, id);
    write_node(store, id, options, kind, 0, &mut out);
    out
}

/// Content kind derived from the owning document's property bits.
pub fn content_kind(store: &RawStore, id: RawId) -> ContentKind {
    let doc = if store.kind(id) == RawKind::Document {
        Some(id)
    } else {
        store.node(id).doc
    };
    match doc {
        Some(doc) => {
            let properties = store.doc_info(doc).properties;
            if properties & DOC_PROP_HTML != 0 {
                ContentKind::Html
            } else if properties & DOC_PROP_XHTML != 0 {
                ContentKind::Xhtml
            } else if properties & DOC_PROP_TEXT != 0 {
                ContentKind::Text
            } else {
                ContentKind::Xml
            }
        }
        None => ContentKind::Xml,
    }
}

fn write_node(
    store: &RawStore,
    id: RawId,
    options: Options,
    kind: ContentKind,
    depth: usize,
    out: &mut String,
) {
    match store.kind(id) {
        RawKind::Document => write_document(store, id, options, kind, out),
        RawKind::Element => write_element(store, id, options, kind, depth, out),
        RawKind::Text => {
            let content = store.node(id).content.as_deref().unwrap_or("");
            if options.contains(Options::NEVER_ESCAPE_CONTENTS) {
                out.push_str(content);
            } else {
                out.push_str(&escape_text(content));
            }
        }
        RawKind::CdataSection => {
            out.push_str("<![CDATA[");
            out.push_str(store.node(id).content.as_deref().unwrap_or(""));
            out.push_str("]]>");
        }
        RawKind::Comment => {
            out.push_str("<!--");
            out.push_str(store.node(id).content.as_deref().unwrap_or(""));
            out.push_str("-->");
        }
        RawKind::ProcessingInstruction => {
            out.push_str("<?");
            out.push_str(store.node(id).name.as_deref().unwrap_or(""));
            if let Some(content) = store.node(id).content.as_deref() {
                out.push(' ');
                out.push_str(content);
            }
            out.push_str("?>");
        }
        RawKind::Attribute => write_attribute(store, id, options, out),
        RawKind::Namespace => write_namespace(store, id, options, out),
        RawKind::Dtd => write_dtd(store, id, options, out),
        RawKind::ElementDecl
        | RawKind::AttributeDecl
        | RawKind::EntityDecl
        | RawKind::NotationDecl => write_declaration(store, id, out),
    }
}

fn write_document(
    store: &RawStore,
    doc: RawId,
    options: Options,
    kind: ContentKind,
    out: &mut String,
) {
    if kind == ContentKind::Text {
        text_value(store, doc, out);
        return;
    }

    let info = store.doc_info(doc);
    out.push_str("<?xml version=\"");
    out.push_str(info.version.as_deref().unwrap_or("1.0"));
    out.push('"');
    if let Some(encoding) = info.encoding.as_deref() {
        out.push_str(" encoding=\"");
        out.push_str(encoding);
        out.push('"');
    }
    if info.standalone {
        out.push_str(" standalone=\"yes\"");
    }
    out.push_str("?>");

    if options.contains(Options::INCLUDE_CONTENT_TYPE_DECLARATION)
        && matches!(kind, ContentKind::Html | ContentKind::Xhtml)
    {
        out.push('\n');
        out.push_str("<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\">");
    }

    for child in store.children_vec(doc) {
        out.push('\n');
        write_node(store, child, options, kind, 0, out);
    }
}

fn write_element(
    store: &RawStore,
    id: RawId,
    options: Options,
    kind: ContentKind,
    depth: usize,
    out: &mut String,
) {
    let name = store.node(id).name.as_deref().unwrap_or("").to_string();
    out.push('<');
    out.push_str(&name);
    for ns in store.ns_defs_vec(id) {
        out.push(' ');
        write_namespace(store, ns, options, out);
    }
    for attr in store.properties_vec(id) {
        out.push(' ');
        write_attribute(store, attr, options, out);
    }

    let children = store.children_vec(id);
    if children.is_empty() {
        if kind == ContentKind::Html {
            // Empty tags without a close tag, e.g. <br>.
            out.push('>');
        } else if options.contains(Options::COMPACT_EMPTY_ELEMENT) {
            out.push_str("/>");
        } else {
            out.push_str("></");
            out.push_str(&name);
            out.push('>');
        }
        return;
    }

    out.push('>');
    let pretty = options.contains(Options::PRETTY_PRINT)
        && children
            .iter()
            .any(|&c| !matches!(store.kind(c), RawKind::Text | RawKind::CdataSection));
    for child in &children {
        if pretty {
            out.push('\n');
            for _ in 0..=depth {
                out.push_str(INDENT);
            }
        }
        write_node(store, *child, options, kind, depth + 1, out);
    }
    if pretty {
        out.push('\n');
        for _ in 0..depth {
            out.push_str(INDENT);
        }
    }
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

fn write_attribute(store: &RawStore, id: RawId, options: Options, out: &mut String) {
    let quote = if options.contains(Options::USE_SINGLE_QUOTES) {
        '\''
    } else {
        '"'
    };
    out.push_str(store.node(id).name.as_deref().unwrap_or(""));
    out.push('=');
    out.push(quote);
    out.push_str(&escape_attribute(
        store.node(id).content.as_deref().unwrap_or(""),
        quote,
    ));
    out.push(quote);
}

fn write_namespace(store: &RawStore, id: RawId, options: Options, out: &mut String) {
    let quote = if options.contains(Options::USE_SINGLE_QUOTES) {
        '\''
    } else {
        '"'
    };
    let prefix = store.node(id).name.as_deref().unwrap_or("");
    if prefix.is_empty() {
        out.push_str("xmlns");
    } else {
        out.push_str("xmlns:");
        out.push_str(prefix);
    }
    out.push('=');
    out.push(quote);
    out.push_str(&escape_attribute(
        store.node(id).content.as_deref().unwrap_or(""),
        quote,
    ));
    out.push(quote);
}

fn write_dtd(store: &RawStore, id: RawId, _options: Options, out: &mut String) {
    out.push_str("<!DOCTYPE ");
    out.push_str(store.node(id).name.as_deref().unwrap_or(""));
    if let Some(info) = store.node(id).decl.as_deref() {
        write_external_id(info, out);
    }
    let decls = store.children_vec(id);
    if !decls.is_empty() {
        out.push_str(" [");
        for decl in decls {
            out.push('\n');
            write_declaration(store, decl, out);
        }
        out.push_str("\n]");
    }
    out.push('>');
}

fn write_external_id(info: &DeclInfo, out: &mut String) {
    match (info.public_id.as_deref(), info.system_id.as_deref()) {
        (Some(public), Some(system)) => {
            out.push_str(" PUBLIC \"");
            out.push_str(public);
            out.push_str("\" \"");
            out.push_str(system);
            out.push('"');
        }
        (None, Some(system)) => {
            out.push_str(" SYSTEM \"");
            out.push_str(system);
            out.push('"');
        }
        _ => {}
    }
}

fn write_declaration(store: &RawStore, id: RawId, out: &mut String) {
    let node = store.node(id);
    let name = node.name.as_deref().unwrap_or("");
    let info = node.decl.as_deref();
    match store.kind(id) {
        RawKind::ElementDecl => {
            out.push_str("<!ELEMENT ");
            out.push_str(name);
            let model = info.and_then(|i| match i.element_kind {
                Some(ElementContentKind::Empty) => Some("EMPTY".to_string()),
                Some(ElementContentKind::Any) => Some("ANY".to_string()),
                _ => i.content_model.clone(),
            });
            if let Some(model) = model {
                out.push(' ');
                out.push_str(&model);
            }
            out.push('>');
        }
        RawKind::AttributeDecl => {
            out.push_str("<!ATTLIST ");
            if let Some(owner) = info.and_then(|i| i.owner_element.as_deref()) {
                out.push_str(owner);
                out.push(' ');
            }
            out.push_str(name);
            out.push(' ');
            out.push_str(&attribute_type_text(info));
            match info {
                Some(i) if i.required => out.push_str(" #REQUIRED"),
                Some(i) => match i.default_value.as_deref() {
                    Some(default) => {
                        out.push_str(" \"");
                        out.push_str(default);
                        out.push('"');
                    }
                    None => out.push_str(" #IMPLIED"),
                },
                None => out.push_str(" #IMPLIED"),
            }
            out.push('>');
        }
        RawKind::EntityDecl => {
            out.push_str("<!ENTITY ");
            if let Some(i) = info {
                use super::dtd::EntityKind;
                if matches!(
                    i.entity_kind,
                    Some(EntityKind::InternalParameter | EntityKind::ExternalParameter)
                ) {
                    out.push_str("% ");
                }
            }
            out.push_str(name);
            if let Some(i) = info.filter(|i| i.system_id.is_some()) {
                write_external_id(i, out);
                if let Some(notation) = i.notation_name.as_deref() {
                    out.push_str(" NDATA ");
                    out.push_str(notation);
                }
            } else {
                out.push_str(" \"");
                out.push_str(node.content.as_deref().unwrap_or(""));
                out.push('"');
            }
            out.push('>');
        }
        RawKind::NotationDecl => {
            out.push_str("<!NOTATION ");
            out.push_str(name);
            if let Some(i) = info {
                write_external_id(i, out);
            }
            out.push('>');
        }
        _ => {}
    }
}

fn attribute_type_text(info: Option<&DeclInfo>) -> String {
    let Some(info) = info else {
        return "CDATA".to_string();
    };
    match info.attribute_kind {
        Some(AttributeDeclKind::Id) => "ID".to_string(),
        Some(AttributeDeclKind::IdRef) => "IDREF".to_string(),
        Some(AttributeDeclKind::IdRefs) => "IDREFS".to_string(),
        Some(AttributeDeclKind::Entity) => "ENTITY".to_string(),
        Some(AttributeDeclKind::Entities) => "ENTITIES".to_string(),
        Some(AttributeDeclKind::NmToken) => "NMTOKEN".to_string(),
        Some(AttributeDeclKind::NmTokens) => "NMTOKENS".to_string(),
        Some(AttributeDeclKind::Notation) => {
            format!("NOTATION ({})", info.allowed_values.join("|"))
        }
        Some(AttributeDeclKind::Enumeration) => {
            format!("({})", info.allowed_values.join("|"))
        }
        _ => "CDATA".to_string(),
    }
}

/// Concatenated text content of a subtree, in document order.
fn text_value(store: &RawStore, id: RawId, out: &mut String) {
    match store.kind(id) {
        RawKind::Text | RawKind::CdataSection => {
            out.push_str(store.node(id).content.as_deref().unwrap_or(""));
        }
        _ => {
            for child in store.children_vec(id) {
                text_value(store, child, out);
            }
        }
    }
}

/// Escapes `&`, `<`, `>`, and carriage returns in text content.
pub fn escape_text(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while pos < bytes.len() {
        let tail = &bytes[pos..];
        let marker = memchr::memchr3(b'&', b'<', b'>', tail);
        let cr = memchr::memchr(b'\r', tail);
        let offset = match (marker, cr) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => {
                out.push_str(&text[pos..]);
                break;
            }
        };
        out.push_str(&text[pos..pos + offset]);
        match bytes[pos + offset] {
            b'&' => out.push_str("&amp;"),
            b'<' => out.push_str("&lt;"),
            b'>' => out.push_str("&gt;"),
            _ => out.push_str("&#xD;"),
        }
        pos += offset + 1;
    }
    out
}

/// Escapes attribute values for the chosen quote character.
fn escape_attribute(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' if quote == '"' => out.push_str("&quot;"),
            '\'' if quote == '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
