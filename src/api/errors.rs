use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiError {
    Config(String),
    Network(String),
    Timeout(String),
    /// `401` that survived one renewal and replay, or a renewal that failed.
    Unauthorized(String),
    /// `403`: the credential is valid but lacks the permission. Never retried.
    Forbidden(String),
    Http { status: u16, message: String },
    Parse(String),
    Serialization(String),
}

impl ApiError {
    /// HTTP status, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suited to an end user. Expired credentials and missing
    /// permissions read differently.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Please log in again.".to_string(),
            ApiError::Forbidden(_) => "You are not allowed to perform this action.".to_string(),
            ApiError::Timeout(message) | ApiError::Network(message) => message.clone(),
            ApiError::Http { message, .. } => message.clone(),
            ApiError::Config(_) | ApiError::Parse(_) | ApiError::Serialization(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(message) => write!(formatter, "Config error: {message}"),
            ApiError::Network(message) => write!(formatter, "Network error: {message}"),
            ApiError::Timeout(message) => write!(formatter, "Timeout: {message}"),
            ApiError::Unauthorized(message) => write!(formatter, "Unauthorized: {message}"),
            ApiError::Forbidden(message) => write!(formatter, "Forbidden: {message}"),
            ApiError::Http { status, message } => {
                write!(formatter, "Request failed ({status}): {message}")
            }
            ApiError::Parse(message) => write!(formatter, "Response error: {message}"),
            ApiError::Serialization(message) => {
                write!(formatter, "Request error: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}
