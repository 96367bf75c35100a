use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the MD engine.
///
/// Configuration and topology errors are fatal: the run aborts with the
/// message carried here. Numeric warnings (the `min_r` clamp) are not errors
/// and never show up in this enum; see [`crate::core::force::ForceReport`].
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration, detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The decomposition cannot deliver the ghost data a neighbor-list build needs.
    #[error("topology error: {0}")]
    Topology(String),

    /// Invalid argument to a constructor or setter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Malformed TOML configuration file.
    #[error("failed to parse configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Propagated I/O errors from the output writers.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
