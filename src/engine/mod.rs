//! Native engine stand-in
//!
//! Everything below this module boundary is the collaborator side of the
//! object model: raw tree storage, construction from byte sources, DTD
//! declaration scanning, and serialization. The wrapper layer in
//! `crate::node` drives it exclusively through the APIs here and pushes
//! every structural change back into the raw tree synchronously.

pub mod build;
pub mod dtd;
pub mod serialize;
pub mod source;
pub mod store;
