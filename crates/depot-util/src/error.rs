//! Error types for depot-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A checksum was requested for something that is not a regular file.
    #[error("cannot calculate checksums of {path}: not a regular file")]
    NotAFile { path: String },

    /// A checksum algorithm name is not one of MD5, SHA-1, SHA-256.
    #[error("unsupported checksum algorithm \"{name}\", expected one of MD5, SHA-1, SHA-256")]
    UnsupportedAlgorithm { name: String },

    /// An include/exclude pattern was invalid.
    #[error("invalid path pattern `{pattern}`: {message}")]
    PathPattern { pattern: String, message: String },

    /// A command failed to execute.
    #[error("cannot execute `{command}`: {source}")]
    CommandExec {
        command: String,
        source: std::io::Error,
    },
}
