//! Unified error type.

/// The error type returned by onion's fallible operations.
///
/// Unknown middleware keys are *not* errors: [`Registry::filter`] drops them
/// silently. This type surfaces the failures that abort a request: a
/// namespace the container cannot resolve, or a handler body that failed.
///
/// [`Registry::filter`]: crate::Registry::filter
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The container has nothing bound to `namespace`.
    #[error("cannot resolve `{namespace}.{}`", crate::resolver::HANDLE)]
    Resolution { namespace: String },

    /// A middleware body failed. Travels outward through every enclosing
    /// `next.run().await?` untouched.
    #[error("middleware failed")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Middleware configuration could not be parsed.
    #[error("invalid middleware config")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Wraps any error raised inside a middleware body.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::Handler(err.into())
    }
}

/// Shorthand used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
