use std::sync::Arc;

use crate::transport::TransportError;

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsError {
    #[error("Playlist error: {0}")]
    Parse(String),
    #[error("Key fetch error: {0}")]
    KeyFetch(String),
    #[error("IV decode error: {0}")]
    IvDecode(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Decryption error: {0}")]
    Decrypt(String),
    #[error("Write error for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("Assemble error: {0}")]
    Assemble(String),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}

// Manual implementation because of the Arc wrapping.
impl From<std::io::Error> for HlsError {
    fn from(err: std::io::Error) -> Self {
        HlsError::Io {
            source: Arc::new(err),
        }
    }
}

impl HlsError {
    pub fn write(path: impl Into<String>, err: std::io::Error) -> Self {
        HlsError::Write {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Whether another attempt may succeed. Segment acquisition keeps retrying
    /// these and, once the budget is spent, only the completion percentage
    /// drops. A malformed URL or an unbuildable client fails the same way on
    /// every attempt.
    pub fn is_recoverable(&self) -> bool {
        match self {
            HlsError::Transport(
                TransportError::InvalidUrl(_) | TransportError::ClientBuild(_),
            ) => false,
            HlsError::Transport(_) | HlsError::Decrypt(_) | HlsError::Write { .. } => true,
            _ => false,
        }
    }

    /// Failures that retrying cannot fix. Outside segment acquisition they
    /// abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        assert!(HlsError::Parse("empty".into()).is_fatal());
        assert!(HlsError::KeyFetch("404".into()).is_fatal());
        assert!(HlsError::IvDecode("zz".into()).is_fatal());
        assert!(HlsError::Assemble("exit 1".into()).is_fatal());
        assert!(HlsError::Decrypt("short".into()).is_recoverable());
        assert!(HlsError::write("a.ts", std::io::Error::other("disk full")).is_recoverable());
        assert!(
            HlsError::Transport(TransportError::Status {
                url: "https://cdn.example.com/a.ts".into(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            })
            .is_recoverable()
        );
        assert!(HlsError::Transport(TransportError::InvalidUrl("x".into())).is_fatal());
        assert!(HlsError::Transport(TransportError::ClientBuild("tls".into())).is_fatal());
    }
}
