//! Error types for Bitbind codec operations

/// Errors that can occur while building, decoding or encoding with codecs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Not enough bits left in the buffer
    #[error("End of buffer at bit {position}: requested {requested} bits, {available} available")]
    EndOfBuffer {
        /// Bit position of the failed read.
        position: u64,
        /// The number of bits requested.
        requested: u64,
        /// The number of bits left in the buffer.
        available: u64,
    },

    /// Decoded data violates a codec constraint
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A size expression references a parameter the resolver does not bind
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Size expression text could not be parsed
    #[error("Invalid size expression: {0}")]
    InvalidExpression(String),

    /// No tag at the declaration site selects a codec
    #[error("No codec-selecting tag on {0}")]
    MissingTag(String),

    /// The codec does not support the requested operation
    #[error("Operation {operation} not supported by {codec}")]
    UnsupportedOperation {
        /// The rejected operation.
        operation: &'static str,
        /// Display name of the codec that rejected it.
        codec: String,
    },
}

impl CodecError {
    /// True for failures raised while reading a value from a buffer.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            CodecError::EndOfBuffer { .. }
                | CodecError::InvalidValue(_)
                | CodecError::UnresolvedReference(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failure_kinds() {
        let eob = CodecError::EndOfBuffer {
            position: 8,
            requested: 16,
            available: 0,
        };
        assert!(eob.is_decode_failure());
        assert!(CodecError::InvalidValue("x".into()).is_decode_failure());

        let unsupported = CodecError::UnsupportedOperation {
            operation: "encode",
            codec: "uint(8)".into(),
        };
        assert!(!unsupported.is_decode_failure());
        assert_eq!(
            unsupported.to_string(),
            "Operation encode not supported by uint(8)"
        );
    }
}
