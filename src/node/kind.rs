//! Node kind model
//!
//! Pure, total mapping from native type tags to the closed wrapper kind
//! set, and from DTD declaration discriminators to the DTD sub-kind set.
//! Kinds are never cached by the wrapper layer; they are recomputed from
//! the raw node on every access so they always reflect engine truth.

use crate::engine::dtd::{AttributeDeclKind, ElementContentKind, EntityKind};
use crate::engine::store::{RawKind, RawNode};

/// The closed classification of a wrapper node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Dead-end: no string value, no children, no siblings.
    Invalid,
    Document,
    Element,
    Attribute,
    Namespace,
    ProcessingInstruction,
    Comment,
    Text,
    Dtd,
    EntityDeclaration,
    AttributeDeclaration,
    ElementDeclaration,
    NotationDeclaration,
}

/// Finer classification of DTD-family nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtdKind {
    // Entity declarations.
    General,
    Parsed,
    Unparsed,
    Parameter,
    Predefined,
    // Attribute declarations.
    CdataAttribute,
    IdAttribute,
    IdRefAttribute,
    IdRefsAttribute,
    EntityAttribute,
    EntitiesAttribute,
    NmTokenAttribute,
    NmTokensAttribute,
    EnumerationAttribute,
    NotationAttribute,
    // Element declarations.
    UndefinedDeclaration,
    EmptyDeclaration,
    AnyDeclaration,
    MixedDeclaration,
    ElementDeclaration,
}

/// Maps a native type tag to the wrapper kind. Total: both text and
/// CDATA sections surface as `Text`.
pub fn kind_of(raw: RawKind) -> NodeKind {
    match raw {
        RawKind::Document => NodeKind::Document,
        RawKind::Element => NodeKind::Element,
        RawKind::Attribute => NodeKind::Attribute,
        RawKind::Namespace => NodeKind::Namespace,
        RawKind::ProcessingInstruction => NodeKind::ProcessingInstruction,
        RawKind::Comment => NodeKind::Comment,
        RawKind::Text | RawKind::CdataSection => NodeKind::Text,
        RawKind::Dtd => NodeKind::Dtd,
        RawKind::EntityDecl => NodeKind::EntityDeclaration,
        RawKind::AttributeDecl => NodeKind::AttributeDeclaration,
        RawKind::ElementDecl => NodeKind::ElementDeclaration,
        RawKind::NotationDecl => NodeKind::NotationDeclaration,
    }
}

/// Maps a raw DTD-family node to its sub-kind via the secondary
/// discriminator carried in its declaration payload. `None` for nodes
/// outside the DTD family.
pub fn dtd_kind_of(raw: &RawNode) -> Option<DtdKind> {
    let kind = raw.kind?;
    let info = raw.decl.as_deref();
    match kind {
        RawKind::ElementDecl => {
            let content = info
                .and_then(|i| i.element_kind)
                .unwrap_or(ElementContentKind::Undefined);
            Some(match content {
                ElementContentKind::Undefined => DtdKind::UndefinedDeclaration,
                ElementContentKind::Empty => DtdKind::EmptyDeclaration,
                ElementContentKind::Any => DtdKind::AnyDeclaration,
                ElementContentKind::Mixed => DtdKind::MixedDeclaration,
                ElementContentKind::Element => DtdKind::ElementDeclaration,
            })
        }
        RawKind::EntityDecl => {
            let entity = info
                .and_then(|i| i.entity_kind)
                .unwrap_or(EntityKind::InternalGeneral);
            Some(match entity {
                EntityKind::InternalGeneral | EntityKind::ExternalGeneralParsed => {
                    DtdKind::General
                }
                EntityKind::ExternalGeneralUnparsed => DtdKind::Unparsed,
                EntityKind::InternalParameter | EntityKind::ExternalParameter => {
                    DtdKind::Parameter
                }
                EntityKind::InternalPredefined => DtdKind::Predefined,
            })
        }
        RawKind::AttributeDecl => {
            let attribute = info
                .and_then(|i| i.attribute_kind)
                .unwrap_or(AttributeDeclKind::Cdata);
            Some(match attribute {
                AttributeDeclKind::Cdata => DtdKind::CdataAttribute,
                AttributeDeclKind::Id => DtdKind::IdAttribute,
                AttributeDeclKind::IdRef => DtdKind::IdRefAttribute,
                AttributeDeclKind::IdRefs => DtdKind::IdRefsAttribute,
                AttributeDeclKind::Entity => DtdKind::EntityAttribute,
                AttributeDeclKind::Entities => DtdKind::EntitiesAttribute,
                AttributeDeclKind::NmToken => DtdKind::NmTokenAttribute,
                AttributeDeclKind::NmTokens => DtdKind::NmTokensAttribute,
                AttributeDeclKind::Enumeration => DtdKind::EnumerationAttribute,
                AttributeDeclKind::Notation => DtdKind::NotationAttribute,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::RawStore;

    #[test]
    fn test_text_and_cdata_share_a_kind() {
        assert_eq!(kind_of(RawKind::Text), NodeKind::Text);
        assert_eq!(kind_of(RawKind::CdataSection), NodeKind::Text);
    }

    #[test]
    fn test_dtd_family_tags() {
        assert_eq!(kind_of(RawKind::Dtd), NodeKind::Dtd);
        assert_eq!(kind_of(RawKind::EntityDecl), NodeKind::EntityDeclaration);
        assert_eq!(kind_of(RawKind::NotationDecl), NodeKind::NotationDeclaration);
    }

    #[test]
    fn test_sub_kind_of_non_dtd_node_is_none() {
        let mut store = RawStore::new();
        let id = store.create(RawKind::Element);
        assert_eq!(dtd_kind_of(store.node(id)), None);
    }

    #[test]
    fn test_sub_kind_from_discriminators() {
        use crate::engine::dtd::scan_markup_decl;

        let mut store = RawStore::new();
        let mixed = scan_markup_decl(&mut store, "<!ELEMENT p (#PCDATA | b)*>").unwrap()[0];
        assert_eq!(dtd_kind_of(store.node(mixed)), Some(DtdKind::MixedDeclaration));

        let unparsed =
            scan_markup_decl(&mut store, "<!ENTITY pic SYSTEM \"p.gif\" NDATA gif>").unwrap()[0];
        assert_eq!(dtd_kind_of(store.node(unparsed)), Some(DtdKind::Unparsed));

        let idref = scan_markup_decl(&mut store, "<!ATTLIST a ref IDREF #IMPLIED>").unwrap()[0];
        assert_eq!(dtd_kind_of(store.node(idref)), Some(DtdKind::IdRefAttribute));
    }
}
