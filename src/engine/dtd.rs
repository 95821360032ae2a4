//! DTD declarations
//!
//! Scans the internal subset of a DOCTYPE into raw declaration nodes
//! (element, attribute-list, entity, notation) carrying the secondary
//! discriminators the managed layer exposes as DTD sub-kinds, and
//! validates a document tree against those declarations.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::store::{local_part, RawId, RawKind, RawStore};

/// Structure kind of an element declaration's content specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementContentKind {
    Undefined,
    Empty,
    Any,
    Mixed,
    Element,
}

/// Category of an entity declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    InternalGeneral,
    ExternalGeneralParsed,
    ExternalGeneralUnparsed,
    InternalParameter,
    ExternalParameter,
    InternalPredefined,
}

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeDeclKind {
    Cdata,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Enumeration,
    Notation,
}

/// Payload of a DTD-family raw node. Which fields are populated depends
/// on the node's kind.
#[derive(Debug, Clone, Default)]
pub struct DeclInfo {
    pub element_kind: Option<ElementContentKind>,
    /// Raw content model text of an element declaration.
    pub content_model: Option<String>,
    /// Element names allowed by a mixed content model.
    pub mixed_names: Vec<String>,
    pub entity_kind: Option<EntityKind>,
    pub attribute_kind: Option<AttributeDeclKind>,
    /// Element an attribute declaration belongs to.
    pub owner_element: Option<String>,
    pub default_value: Option<String>,
    pub required: bool,
    /// Enumeration or notation alternatives of an attribute declaration.
    pub allowed_values: Vec<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// NDATA name of an unparsed entity.
    pub notation_name: Option<String>,
}

/// Scans a DOCTYPE internal subset, linking one raw declaration node per
/// declaration under `dtd`. Unrecognized markup is skipped.
pub fn scan_internal_subset(store: &mut RawStore, dtd: RawId, subset: &str) {
    let bytes = subset.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        pos = skip_ws(bytes, pos);
        if pos >= bytes.len() {
            break;
        }
        if bytes[pos..].starts_with(b"<!--") {
            pos = skip_past(bytes, pos, b"-->");
        } else if bytes[pos..].starts_with(b"<?") {
            pos = skip_past(bytes, pos, b"?>");
        } else if bytes[pos] == b'<' {
            let end = skip_past(bytes, pos, b">");
            if let Some(decls) = scan_markup_decl(store, &subset[pos..end]) {
                for decl in decls {
                    store.add_child(dtd, decl);
                }
            }
            pos = end;
        } else {
            // Parameter-entity references and stray characters.
            pos += 1;
        }
    }
}

/// Parses a single markup declaration (`<!ELEMENT ...>` etc.) into raw
/// nodes in `store`. An ATTLIST produces one node per attribute defined.
pub fn scan_markup_decl(store: &mut RawStore, decl: &str) -> Option<Vec<RawId>> {
    let decl = decl.trim();
    let body = decl.strip_prefix("<!")?.strip_suffix('>')?;
    if let Some(rest) = body.strip_prefix("ELEMENT") {
        scan_element_decl(store, rest).map(|id| vec![id])
    } else if let Some(rest) = body.strip_prefix("ATTLIST") {
        Some(scan_attlist_decl(store, rest))
    } else if let Some(rest) = body.strip_prefix("ENTITY") {
        scan_entity_decl(store, rest).map(|id| vec![id])
    } else if let Some(rest) = body.strip_prefix("NOTATION") {
        scan_notation_decl(store, rest).map(|id| vec![id])
    } else {
        None
    }
}

// ----------------------------------------------------------------------
// Individual declarations
// ----------------------------------------------------------------------

fn scan_element_decl(store: &mut RawStore, rest: &str) -> Option<RawId> {
    let mut scanner = Scanner::new(rest);
    let name = scanner.name()?;
    scanner.skip_ws();
    let model = scanner.remainder().trim().to_string();

    let (kind, mixed) = if model.is_empty() {
        (ElementContentKind::Undefined, Vec::new())
    } else if model == "EMPTY" {
        (ElementContentKind::Empty, Vec::new())
    } else if model == "ANY" {
        (ElementContentKind::Any, Vec::new())
    } else if model.starts_with('(') && model[1..].trim_start().starts_with("#PCDATA") {
        (ElementContentKind::Mixed, mixed_names(&model))
    } else if model.starts_with('(') {
        (ElementContentKind::Element, Vec::new())
    } else {
        (ElementContentKind::Undefined, Vec::new())
    };

    let id = store.create(RawKind::ElementDecl);
    store.node_mut(id).name = Some(name);
    store.node_mut(id).decl = Some(Box::new(DeclInfo {
        element_kind: Some(kind),
        content_model: if model.is_empty() { None } else { Some(model) },
        mixed_names: mixed,
        ..DeclInfo::default()
    }));
    Some(id)
}

/// Element names out of a mixed content model: `(#PCDATA|a|b)*`.
fn mixed_names(model: &str) -> Vec<String> {
    model
        .trim_start_matches('(')
        .trim_end_matches('*')
        .trim_end_matches(')')
        .split('|')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "#PCDATA")
        .map(str::to_string)
        .collect()
}

fn scan_attlist_decl(store: &mut RawStore, rest: &str) -> Vec<RawId> {
    let mut out = Vec::new();
    let mut scanner = Scanner::new(rest);
    let Some(element) = scanner.name() else {
        return out;
    };
    while let Some(attr_name) = scanner.name() {
        scanner.skip_ws();
        let (kind, allowed) = match () {
            // Multi-character keywords must be tried longest-first.
            _ if scanner.eat("CDATA") => (AttributeDeclKind::Cdata, Vec::new()),
            _ if scanner.eat("IDREFS") => (AttributeDeclKind::IdRefs, Vec::new()),
            _ if scanner.eat("IDREF") => (AttributeDeclKind::IdRef, Vec::new()),
            _ if scanner.eat("ID") => (AttributeDeclKind::Id, Vec::new()),
            _ if scanner.eat("ENTITIES") => (AttributeDeclKind::Entities, Vec::new()),
            _ if scanner.eat("ENTITY") => (AttributeDeclKind::Entity, Vec::new()),
            _ if scanner.eat("NMTOKENS") => (AttributeDeclKind::NmTokens, Vec::new()),
            _ if scanner.eat("NMTOKEN") => (AttributeDeclKind::NmToken, Vec::new()),
            _ if scanner.eat("NOTATION") => {
                (AttributeDeclKind::Notation, scanner.alternatives())
            }
            _ => (AttributeDeclKind::Enumeration, scanner.alternatives()),
        };
        scanner.skip_ws();
        let mut required = false;
        let mut default_value = None;
        if scanner.eat("#REQUIRED") {
            required = true;
        } else if scanner.eat("#IMPLIED") {
            // No default.
        } else {
            if scanner.eat("#FIXED") {
                scanner.skip_ws();
            }
            default_value = scanner.quoted();
        }

        let id = store.create(RawKind::AttributeDecl);
        store.node_mut(id).name = Some(attr_name);
        store.node_mut(id).content = default_value.clone();
        store.node_mut(id).decl = Some(Box::new(DeclInfo {
            attribute_kind: Some(kind),
            owner_element: Some(element.clone()),
            default_value,
            required,
            allowed_values: allowed,
            ..DeclInfo::default()
        }));
        out.push(id);
    }
    out
}

fn scan_entity_decl(store: &mut RawStore, rest: &str) -> Option<RawId> {
    let mut scanner = Scanner::new(rest);
    scanner.skip_ws();
    let parameter = scanner.eat("%");
    let name = scanner.name()?;
    scanner.skip_ws();

    let mut info = DeclInfo::default();
    let mut content = None;
    if scanner.eat("SYSTEM") {
        scanner.skip_ws();
        info.system_id = scanner.quoted();
    } else if scanner.eat("PUBLIC") {
        scanner.skip_ws();
        info.public_id = scanner.quoted();
        scanner.skip_ws();
        info.system_id = scanner.quoted();
    } else {
        content = scanner.quoted();
    }
    scanner.skip_ws();
    if scanner.eat("NDATA") {
        scanner.skip_ws();
        info.notation_name = scanner.name();
    }

    let external = info.system_id.is_some();
    info.entity_kind = Some(match (parameter, external, info.notation_name.is_some()) {
        (true, true, _) => EntityKind::ExternalParameter,
        (true, false, _) => EntityKind::InternalParameter,
        (false, true, true) => EntityKind::ExternalGeneralUnparsed,
        (false, true, false) => EntityKind::ExternalGeneralParsed,
        (false, false, _) => EntityKind::InternalGeneral,
    });

    let id = store.create(RawKind::EntityDecl);
    store.node_mut(id).name = Some(name);
    store.node_mut(id).content = content;
    store.node_mut(id).decl = Some(Box::new(info));
    Some(id)
}

fn scan_notation_decl(store: &mut RawStore, rest: &str) -> Option<RawId> {
    let mut scanner = Scanner::new(rest);
    let name = scanner.name()?;
    scanner.skip_ws();

    let mut info = DeclInfo::default();
    if scanner.eat("SYSTEM") {
        scanner.skip_ws();
        info.system_id = scanner.quoted();
    } else if scanner.eat("PUBLIC") {
        scanner.skip_ws();
        info.public_id = scanner.quoted();
        scanner.skip_ws();
        info.system_id = scanner.quoted();
    }

    let id = store.create(RawKind::NotationDecl);
    store.node_mut(id).name = Some(name);
    store.node_mut(id).decl = Some(Box::new(info));
    Some(id)
}

// ----------------------------------------------------------------------
// Validation
// ----------------------------------------------------------------------

/// Validates a document tree against its DTD. Returns the first failure
/// as a diagnostic message. A document without a DTD is trivially valid.
pub fn validate_document(store: &RawStore, doc: RawId) -> Result<(), String> {
    let Some(dtd) = store.doc_info(doc).dtd else {
        return Ok(());
    };

    let mut elements: HashMap<&str, &DeclInfo> = HashMap::new();
    let mut attlists: HashMap<&str, Vec<(&str, &DeclInfo)>> = HashMap::new();
    let mut entities: HashMap<&str, &str> = HashMap::new();
    let mut notations: HashSet<&str> = HashSet::new();
    for decl in store.children_vec(dtd) {
        let node = store.node(decl);
        let (Some(name), Some(info)) = (node.name.as_deref(), node.decl.as_deref()) else {
            continue;
        };
        match store.kind(decl) {
            RawKind::ElementDecl => {
                elements.insert(name, info);
            }
            RawKind::AttributeDecl => {
                if let Some(owner) = info.owner_element.as_deref() {
                    attlists.entry(owner).or_default().push((name, info));
                }
            }
            RawKind::EntityDecl => {
                entities.insert(name, node.content.as_deref().unwrap_or(""));
            }
            RawKind::NotationDecl => {
                notations.insert(name);
            }
            _ => {}
        }
    }

    check_entity_recursion(&entities)?;

    if let Some(dtd_name) = store.node(dtd).name.as_deref() {
        if let Some(root) = store.root_element(doc) {
            let root_name = store.node(root).name.as_deref().unwrap_or("");
            if root_name != dtd_name {
                return Err(format!(
                    "root element '{root_name}' does not match DOCTYPE name '{dtd_name}'"
                ));
            }
        }
    }

    if elements.is_empty() {
        return Ok(());
    }
    if let Some(root) = store.root_element(doc) {
        validate_element(store, root, &elements, &attlists, &notations)?;
    }
    Ok(())
}

fn validate_element(
    store: &RawStore,
    element: RawId,
    elements: &HashMap<&str, &DeclInfo>,
    attlists: &HashMap<&str, Vec<(&str, &DeclInfo)>>,
    notations: &HashSet<&str>,
) -> Result<(), String> {
    let name = store.node(element).name.as_deref().unwrap_or("");
    let Some(decl) = elements.get(name) else {
        debug!(element = name, "element has no declaration");
        return Err(format!("no declaration for element '{name}'"));
    };

    let declared = attlists.get(name).map(Vec::as_slice).unwrap_or(&[]);
    for (attr_name, attr_decl) in declared {
        let present = store.has_property(element, attr_name, None);
        match present {
            None if attr_decl.required => {
                return Err(format!(
                    "required attribute '{attr_name}' missing on element '{name}'"
                ));
            }
            Some(attr) => {
                let value = store.node(attr).content.as_deref().unwrap_or("");
                match attr_decl.attribute_kind {
                    Some(AttributeDeclKind::Enumeration) => {
                        if !attr_decl.allowed_values.iter().any(|v| v == value) {
                            return Err(format!(
                                "value '{value}' of attribute '{attr_name}' is not among its enumeration"
                            ));
                        }
                    }
                    Some(AttributeDeclKind::Notation) => {
                        if !attr_decl.allowed_values.iter().any(|v| v == value)
                            || !notations.contains(value)
                        {
                            return Err(format!(
                                "value '{value}' of attribute '{attr_name}' is not a declared notation"
                            ));
                        }
                    }
                    _ => {}
                }
            }
            None => {}
        }
    }
    for attr in store.properties_vec(element) {
        let attr_name = store.node(attr).name.as_deref().unwrap_or("");
        if attr_name.starts_with("xmlns") {
            continue;
        }
        if !declared.iter().any(|(n, _)| local_part(attr_name) == local_part(n)) {
            return Err(format!(
                "attribute '{attr_name}' is not declared for element '{name}'"
            ));
        }
    }

    let element_kind = decl.element_kind.unwrap_or(ElementContentKind::Undefined);
    for child in store.children_vec(element) {
        match store.kind(child) {
            RawKind::Element => {
                match element_kind {
                    ElementContentKind::Empty => {
                        return Err(format!("element '{name}' is declared EMPTY"));
                    }
                    ElementContentKind::Mixed => {
                        let child_name = store.node(child).name.as_deref().unwrap_or("");
                        if !decl.mixed_names.iter().any(|n| n == child_name) {
                            return Err(format!(
                                "element '{child_name}' is not allowed in mixed content of '{name}'"
                            ));
                        }
                    }
                    _ => {}
                }
                validate_element(store, child, elements, attlists, notations)?;
            }
            RawKind::Text | RawKind::CdataSection => {
                if element_kind == ElementContentKind::Empty {
                    return Err(format!("element '{name}' is declared EMPTY"));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Rejects entity declarations that reference themselves, directly or
/// through other entities.
fn check_entity_recursion(entities: &HashMap<&str, &str>) -> Result<(), String> {
    for name in entities.keys() {
        let mut visited = HashSet::new();
        let mut stack = vec![*name];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                if current == *name {
                    return Err(format!(
                        "entity '{name}' references itself (directly or indirectly)"
                    ));
                }
                continue;
            }
            if let Some(value) = entities.get(current) {
                for reference in entity_references(value) {
                    if let Some((key, _)) = entities.get_key_value(reference) {
                        stack.push(*key);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Names of general entities referenced in a replacement text.
fn entity_references(value: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let bytes = value.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'&' && pos + 1 < bytes.len() && bytes[pos + 1] != b'#' {
            let start = pos + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != b';' {
                end += 1;
            }
            if end < bytes.len() {
                refs.push(&value[start..end]);
                pos = end;
            }
        }
        pos += 1;
    }
    refs
}

// ----------------------------------------------------------------------
// Scanner
// ----------------------------------------------------------------------

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn skip_ws(&mut self) {
        self.pos = skip_ws(self.bytes(), self.pos);
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.input[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        let bytes = self.bytes();
        while self.pos < bytes.len() && is_name_char(bytes[self.pos]) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(self.input[start..self.pos].to_string())
        }
    }

    fn quoted(&mut self) -> Option<String> {
        self.skip_ws();
        let bytes = self.bytes();
        let quote = *bytes.get(self.pos)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        self.pos += 1;
        let start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != quote {
            self.pos += 1;
        }
        let value = self.input[start..self.pos].to_string();
        if self.pos < bytes.len() {
            self.pos += 1;
        }
        Some(value)
    }

    /// A parenthesized alternative list: `(a | b | c)`.
    fn alternatives(&mut self) -> Vec<String> {
        self.skip_ws();
        if !self.eat("(") {
            return Vec::new();
        }
        let bytes = self.bytes();
        let start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != b')' {
            self.pos += 1;
        }
        let inner = &self.input[start..self.pos];
        if self.pos < bytes.len() {
            self.pos += 1;
        }
        inner
            .split('|')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn remainder(&self) -> &'a str {
        &self.input[self.pos..]
    }
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\n' | b'\r') {
        pos += 1;
    }
    pos
}

fn skip_past(bytes: &[u8], mut pos: usize, terminator: &[u8]) -> usize {
    while pos < bytes.len() {
        if bytes[pos..].starts_with(terminator) {
            return pos + terminator.len();
        }
        pos += 1;
    }
    bytes.len()
}

#[inline]
fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_one(input: &str) -> (RawStore, RawId) {
        let mut store = RawStore::new();
        let ids = scan_markup_decl(&mut store, input).expect("declaration should parse");
        assert_eq!(ids.len(), 1);
        (store, ids[0])
    }

    #[test]
    fn test_element_decl_kinds() {
        let (store, id) = scan_one("<!ELEMENT br EMPTY>");
        assert_eq!(store.kind(id), RawKind::ElementDecl);
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.element_kind, Some(ElementContentKind::Empty));

        let (store, id) = scan_one("<!ELEMENT anything ANY>");
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.element_kind, Some(ElementContentKind::Any));

        let (store, id) = scan_one("<!ELEMENT p (#PCDATA | em | strong)*>");
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.element_kind, Some(ElementContentKind::Mixed));
        assert_eq!(info.mixed_names, vec!["em", "strong"]);

        let (store, id) = scan_one("<!ELEMENT note (to, from, body)>");
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.element_kind, Some(ElementContentKind::Element));
    }

    #[test]
    fn test_attlist_produces_one_node_per_attribute() {
        let mut store = RawStore::new();
        let ids = scan_markup_decl(
            &mut store,
            "<!ATTLIST task id ID #REQUIRED state (open|closed) \"open\">",
        )
        .unwrap();
        assert_eq!(ids.len(), 2);
        let id_info = store.node(ids[0]).decl.as_ref().unwrap();
        assert_eq!(id_info.attribute_kind, Some(AttributeDeclKind::Id));
        assert!(id_info.required);
        let state_info = store.node(ids[1]).decl.as_ref().unwrap();
        assert_eq!(state_info.attribute_kind, Some(AttributeDeclKind::Enumeration));
        assert_eq!(state_info.allowed_values, vec!["open", "closed"]);
        assert_eq!(state_info.default_value.as_deref(), Some("open"));
    }

    #[test]
    fn test_entity_kinds() {
        let (store, id) = scan_one("<!ENTITY copy \"(c)\">");
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.entity_kind, Some(EntityKind::InternalGeneral));
        assert_eq!(store.node(id).content.as_deref(), Some("(c)"));

        let (store, id) = scan_one("<!ENTITY % common SYSTEM \"common.ent\">");
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.entity_kind, Some(EntityKind::ExternalParameter));

        let (store, id) = scan_one("<!ENTITY logo SYSTEM \"logo.gif\" NDATA gif>");
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.entity_kind, Some(EntityKind::ExternalGeneralUnparsed));
        assert_eq!(info.notation_name.as_deref(), Some("gif"));
    }

    #[test]
    fn test_notation_decl() {
        let (store, id) = scan_one("<!NOTATION gif PUBLIC \"gif viewer\" \"viewer.exe\">");
        assert_eq!(store.kind(id), RawKind::NotationDecl);
        let info = store.node(id).decl.as_ref().unwrap();
        assert_eq!(info.public_id.as_deref(), Some("gif viewer"));
        assert_eq!(info.system_id.as_deref(), Some("viewer.exe"));
    }

    #[test]
    fn test_subset_scan_skips_comments() {
        let mut store = RawStore::new();
        let dtd = store.create(RawKind::Dtd);
        scan_internal_subset(
            &mut store,
            dtd,
            "<!-- entities --> <!ENTITY a \"1\"> <!ELEMENT root (#PCDATA)>",
        );
        assert_eq!(store.child_count(dtd), 2);
    }

    #[test]
    fn test_entity_recursion_detected() {
        let mut entities = HashMap::new();
        entities.insert("a", "&b;");
        entities.insert("b", "&a;");
        assert!(check_entity_recursion(&entities).is_err());

        let mut ok = HashMap::new();
        ok.insert("a", "plain");
        assert!(check_entity_recursion(&ok).is_ok());
    }
}
