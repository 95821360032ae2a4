//! Input and output options
//!
//! A bitset of independent toggles honored by construction and
//! serialization. Aggregate flags (`PRESERVE_EMPTY_ELEMENTS`,
//! `PRESERVE_QUOTES`, `PRESERVE_ALL`) are unions of their parts.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

/// Combinable node and document options.
///
/// The default (`Options::NONE`) expands empty elements, uses double
/// quotes on attributes, escapes text content, and drops insignificant
/// whitespace.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Options(u32);

impl Options {
    pub const NONE: Options = Options(0);

    /// This text node is a CDATA section.
    pub const NODE_IS_CDATA: Options = Options(1 << 0);
    /// Serialize an empty element in expanded form, `<a></a>`. The default.
    pub const EXPAND_EMPTY_ELEMENT: Options = Options(1 << 1);
    /// Serialize an empty element in contracted form, `<a/>`.
    pub const COMPACT_EMPTY_ELEMENT: Options = Options(1 << 2);
    /// Use single quotes on attributes and namespace declarations.
    pub const USE_SINGLE_QUOTES: Options = Options(1 << 3);
    /// Use double quotes on attributes and namespace declarations. The default.
    pub const USE_DOUBLE_QUOTES: Options = Options(1 << 4);
    /// Do not escape `<` and `&` in text nodes on output.
    pub const NEVER_ESCAPE_CONTENTS: Options = Options(1 << 5);

    /// Try to turn HTML input into valid XHTML.
    pub const DOCUMENT_TIDY_HTML: Options = Options(1 << 9);
    /// Try to turn malformed XML input into valid XML.
    pub const DOCUMENT_TIDY_XML: Options = Options(1 << 10);
    /// Validate the document against its DTD as soon as it is loaded.
    pub const DOCUMENT_VALIDATE: Options = Options(1 << 13);

    /// Load all external entities, network access included.
    pub const LOAD_EXTERNAL_ENTITIES_ALWAYS: Options = Options(1 << 14);
    /// Load external entities only from the document's own origin.
    pub const LOAD_EXTERNAL_ENTITIES_SAME_ORIGIN_ONLY: Options = Options(1 << 15);
    /// Never load external entities, even without network access.
    pub const LOAD_EXTERNAL_ENTITIES_NEVER: Options = Options(1 << 19);

    /// Process XInclude directives during construction.
    pub const DOCUMENT_XINCLUDE: Options = Options(1 << 16);
    /// Output extra whitespace for readability.
    pub const PRETTY_PRINT: Options = Options(1 << 17);
    /// Include a content type declaration for HTML or XHTML output.
    pub const INCLUDE_CONTENT_TYPE_DECLARATION: Options = Options(1 << 18);

    pub const PRESERVE_NAMESPACE_ORDER: Options = Options(1 << 20);
    pub const PRESERVE_ATTRIBUTE_ORDER: Options = Options(1 << 21);
    /// Entities are not resolved on output.
    pub const PRESERVE_ENTITIES: Options = Options(1 << 22);
    /// Prefixes are not rewritten to the closest URI definition.
    pub const PRESERVE_PREFIXES: Options = Options(1 << 23);
    pub const PRESERVE_CDATA: Options = Options(1 << 24);
    /// Keep whitespace-only text nodes during construction.
    pub const PRESERVE_WHITESPACE: Options = Options(1 << 25);
    /// Keep the DTD until it is modified.
    pub const PRESERVE_DTD: Options = Options(1 << 26);
    pub const PRESERVE_CHARACTER_REFERENCES: Options = Options(1 << 27);
    /// Turn significant whitespace into text nodes instead of dropping it.
    /// No effect when `PRESERVE_WHITESPACE` is also set.
    pub const PROMOTE_SIGNIFICANT_WHITESPACE: Options = Options(1 << 28);

    /// Remember whether an empty element was expanded or contracted.
    pub const PRESERVE_EMPTY_ELEMENTS: Options =
        Options(Self::EXPAND_EMPTY_ELEMENT.0 | Self::COMPACT_EMPTY_ELEMENT.0);
    /// Remember whether an attribute used single or double quotes.
    pub const PRESERVE_QUOTES: Options =
        Options(Self::USE_SINGLE_QUOTES.0 | Self::USE_DOUBLE_QUOTES.0);
    /// Every preservation option at once.
    pub const PRESERVE_ALL: Options = Options(
        0xFFF0_0000
            | Self::PRESERVE_EMPTY_ELEMENTS.0
            | Self::PRESERVE_QUOTES.0,
    );

    /// True when every flag in `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one flag.
    #[inline]
    pub fn intersects(self, other: Options) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Options) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Options) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Options {
    type Output = Options;
    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Options {
    type Output = Options;
    fn bitand(self, rhs: Options) -> Options {
        Options(self.0 & rhs.0)
    }
}

impl Sub for Options {
    type Output = Options;
    fn sub(self, rhs: Options) -> Options {
        Options(self.0 & !rhs.0)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Options({:#010x})", self.0)
    }
}

/// What type of document this is. HTML and XHTML affect the serialized
/// shape of empty tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    /// The default document type.
    #[default]
    Xml,
    /// Set when `DOCUMENT_TIDY_HTML` is given and HTML is detected.
    Xhtml,
    /// Empty tags are output without a close tag, e.g. `<br>`.
    Html,
    /// Output is the string value of the document.
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_flags() {
        assert!(Options::PRESERVE_EMPTY_ELEMENTS.contains(Options::EXPAND_EMPTY_ELEMENT));
        assert!(Options::PRESERVE_EMPTY_ELEMENTS.contains(Options::COMPACT_EMPTY_ELEMENT));
        assert!(Options::PRESERVE_QUOTES.contains(Options::USE_SINGLE_QUOTES));
        assert!(Options::PRESERVE_ALL.contains(Options::PRESERVE_CDATA));
        assert!(Options::PRESERVE_ALL.contains(Options::PRESERVE_QUOTES));
        assert!(!Options::PRESERVE_ALL.contains(Options::PRETTY_PRINT));
    }

    #[test]
    fn test_insert_remove() {
        let mut opts = Options::NONE;
        opts.insert(Options::PRETTY_PRINT | Options::USE_SINGLE_QUOTES);
        assert!(opts.contains(Options::PRETTY_PRINT));
        opts.remove(Options::PRETTY_PRINT);
        assert!(!opts.contains(Options::PRETTY_PRINT));
        assert!(opts.contains(Options::USE_SINGLE_QUOTES));
    }
}
