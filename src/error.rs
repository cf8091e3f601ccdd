use thiserror::Error;

/// Failures turning raw frames into a `Message`, or a `Message` into frames.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("no <IDS|MSG> delimiter in {0} frames")]
    MissingDelimiter(usize),

    #[error("expected 5 frames after the delimiter, got {0}")]
    Truncated(usize),

    #[error("message signature does not match")]
    InvalidSignature,

    #[error("signing key rejected by HMAC")]
    InvalidKey,

    #[error("malformed {part} frame: {source}")]
    MalformedPayload {
        part: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {part} frame: {source}")]
    Serialize {
        part: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that end the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid connection file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("unsupported signature scheme {0:?}, only hmac-sha256 is implemented")]
    UnsupportedSignatureScheme(String),

    #[error("failed to bind {role} socket to {address}: {source}")]
    Bind {
        role: &'static str,
        address: String,
        #[source]
        source: zmq::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] zmq::Error),

    #[error(transparent)]
    Wire(#[from] WireError),
}

pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_payload_names_the_part() {
        let source = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let err = WireError::MalformedPayload {
            part: "content",
            source,
        };
        assert!(err.to_string().starts_with("malformed content frame"));
    }

    #[test]
    fn bind_error_reports_address() {
        let err = KernelError::Bind {
            role: "shell",
            address: "tcp://127.0.0.1:5555".to_string(),
            source: zmq::Error::EADDRINUSE,
        };
        let text = err.to_string();
        assert!(text.contains("shell"));
        assert!(text.contains("tcp://127.0.0.1:5555"));
    }

    #[test]
    fn wire_errors_convert() {
        let err: KernelError = WireError::InvalidSignature.into();
        assert!(matches!(err, KernelError::Wire(WireError::InvalidSignature)));
        assert_eq!(err.to_string(), "message signature does not match");
    }
}
