use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;
pub type ConfigError = Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Task '{0}' aborted: {1}")]
    TaskAborted(String, String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Pattern(err.to_string())
    }
}

impl Error {
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Error::HttpError(_) | Error::Timeout(_) | Error::Io(_)
        )
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl(_) | Error::Config(_) | Error::Pattern(_)
        )
    }
}

/// Outcome signal from a plugin callback.
///
/// `Warning` is recoverable: the engine logs it, the plugin's remaining work
/// for this event is abandoned, and the task continues with the next plugin.
/// Every other variant aborts the task at the next checkpoint.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{0}")]
    Warning(String),

    #[error("{0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] Error),
}

impl PluginError {
    pub fn warning(msg: impl Into<String>) -> Self {
        PluginError::Warning(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        PluginError::Fatal(msg.into())
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, PluginError::Warning(_))
    }
}

/// Entry-scoped resolution failure. Never task-fatal: the engine marks the
/// affected entry failed and moves on.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The distinguished "could not resolve" signal raised by resolvers.
    #[error("could not resolve: {0}")]
    Failed(String),

    /// The iteration cap tripped: a resolver kept claiming the entry was
    /// resolvable after resolving it.
    #[error("resolve loop gave up on '{entry}' after {attempts} attempts")]
    Loop { entry: String, attempts: usize },

    /// Anything unexpected escaping a resolver, converted so resolvers
    /// cannot crash the engine.
    #[error("internal resolver error: {0}")]
    Internal(String),
}

impl From<Error> for ResolveError {
    fn from(err: Error) -> Self {
        ResolveError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_errors() {
        assert!(Error::Timeout("slow feed".into()).is_temporary());
        assert!(Error::HttpError("503".into()).is_temporary());
        assert!(!Error::Config("bad key".into()).is_temporary());
    }

    #[test]
    fn test_plugin_error_classification() {
        assert!(PluginError::warning("feed unreachable").is_warning());
        assert!(!PluginError::fatal("bad config").is_warning());
        assert!(!PluginError::from(Error::Invalid("x".into())).is_warning());
    }
}
