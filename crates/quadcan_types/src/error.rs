//! QuadCan error type.

/// QuadCan Error Type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CanError {
    /// The operation timed out before a response arrived.
    #[error("operation timed out")]
    TimedOut,

    /// This resource is closed - no further operations are possible.
    #[error("this resource is closed")]
    Closed,

    /// No neighbor zone could make progress toward the request key.
    #[error("no route toward key: {0}")]
    NoRoute(Box<str>),

    /// The addressed peer is mid zone-update and refuses to route.
    #[error("peer not activated: {0}")]
    NotActivated(Box<str>),

    /// Other
    #[error("Other: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl CanError {
    /// Promote a custom error type to a CanError.
    pub fn other(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(e.into())
    }
}

impl From<String> for CanError {
    fn from(s: String) -> Self {
        #[derive(Debug, thiserror::Error)]
        struct OtherError(String);
        impl std::fmt::Display for OtherError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        CanError::other(OtherError(s))
    }
}

impl From<&str> for CanError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

/// QuadCan Result Type.
pub type CanResult<T> = Result<T, CanError>;
