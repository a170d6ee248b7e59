use std::path::PathBuf;
use std::time::Duration;

use authz_policy::{EngineBuildError, TranslationError};
use thiserror::Error;

/// Invalid gate settings, detected before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("authorization policy file path is empty")]
    EmptySource,

    #[error("requires refresh interval({0:?}) greater than 0s")]
    NonPositiveInterval(Duration),
}

/// Why one load of the policy source failed.
///
/// Fatal when the gate is constructed; afterwards it is only reported and
/// the previously loaded policy stays in force.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("policy file({path}) read failed: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    EngineBuild(#[from] EngineBuildError),
}

/// The gate could not be constructed.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Load(#[from] LoadError),
}
