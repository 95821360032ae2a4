//! oxidom - Mutable, identity-stable XML object model
//!
//! Layers:
//! - `engine`: the native-engine stand-in (raw tree arena, byte sources,
//!   construction, DTD scanning, serialization)
//! - `node`: the managed wrapper tree (identity registry, kind model,
//!   tree mutation, attribute/namespace model, document and DTD views)
//! - `options`: combinable input/output toggles
//! - `error`: recoverable failure taxonomy
//!
//! The raw tree is exclusively owned by the wrapper graph. Every
//! structural mutation on a wrapper is pushed into the raw tree
//! synchronously; serialization reads the raw tree directly. The model
//! is single-threaded and single-writer throughout.
//!
//! ```
//! use oxidom::{Document, Options};
//!
//! let doc = Document::parse_str("<note><to>A</to></note>", Options::NONE).unwrap();
//! let root = doc.root_element().unwrap();
//! assert_eq!(root.name().as_deref(), Some("note"));
//! ```

pub mod engine;
mod error;
mod node;
mod options;

pub use engine::source::{BufferSource, ByteSource, ReadSource};
pub use error::Error;
pub use node::{Document, DtdKind, DtdNode, Element, NodeKind, XPathEvaluator, XmlNode};
pub use options::{ContentKind, Options};
