//! Error taxonomy
//!
//! Only recoverable conditions are represented here. Construction from
//! malformed input yields an absent document (`None`) rather than an error,
//! and precondition violations (inserting an attached node, out-of-range
//! indices, bad version strings) panic: they are programmer errors, not
//! runtime conditions a caller is expected to handle.

use thiserror::Error;

/// Recoverable failures surfaced by the object model.
#[derive(Debug, Error)]
pub enum Error {
    /// The document does not conform to its DTD. The message carries the
    /// engine-supplied diagnostic.
    #[error("document failed DTD validation: {message}")]
    Validation { message: String },

    /// The invoked feature is excluded by design (XSLT, XQuery). Never
    /// partially executed.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// The supplied XPath evaluator reported a failure.
    #[error("xpath evaluation failed: {message}")]
    Xpath { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_diagnostic() {
        let err = Error::Validation {
            message: "no declaration for element b".to_string(),
        };
        assert!(err.to_string().contains("no declaration for element b"));
    }

    #[test]
    fn test_unsupported_names_feature() {
        assert_eq!(Error::Unsupported("XSLT").to_string(), "XSLT is not supported");
    }
}
