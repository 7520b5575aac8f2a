//! Declaration-time errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while declaring or emitting a stack.
#[derive(Error, Debug)]
pub enum StackError {
    /// The cpu/memory pair is not accepted by Fargate.
    #[error("Invalid task size: {cpu} CPU units with {memory_mib} MiB is not a supported Fargate combination")]
    InvalidTaskSize { cpu: u32, memory_mib: u32 },

    /// An EC2 capacity mode was declared without a required instance parameter.
    #[error("Missing capacity parameter: {0} is required for EC2 capacity")]
    MissingCapacityParameter(&'static str),

    /// A value is outside the accepted range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `emit` was called before every entity was declared.
    #[error("Incomplete stack: no {0} declared")]
    Incomplete(&'static str),

    /// Two declared entities reference each other inconsistently.
    #[error("Inconsistent stack: {0}")]
    Inconsistent(String),

    /// The stack profile file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stack profile file could not be parsed.
    #[error("Failed to parse stack profile: {0}")]
    Profile(#[from] serde_yaml::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for declaration-time operations.
pub type Result<T, E = StackError> = std::result::Result<T, E>;
