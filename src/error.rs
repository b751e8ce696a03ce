use thiserror::Error;

/// Failures of the durable key/value backend behind the token store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage file is not a valid key/value document")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by the identity provider or the auth service in front of it.
///
/// Payloads are plain strings so the error can be shared by every waiter of a
/// single-flight renewal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid identity provider response: {0}")]
    InvalidResponse(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ProviderError {
    /// HTTP status of a rejection, if the provider answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("token store failure: {0}")]
    Storage(String),
    #[error("session was logged out while the operation was in flight")]
    Superseded,
    #[error("session task aborted: {0}")]
    Aborted(String),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
