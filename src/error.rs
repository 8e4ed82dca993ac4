use std::fmt::Display;

use anyhow::{anyhow, Context, Result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SWError {
    #[error("Precache fetch failed for {url}: {reason}")]
    ManifestFetchError { url: String, reason: String },
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("Storage write error: {0}")]
    StorageWriteError(String),
    #[error("Generation {0} no longer exists")]
    StaleGenerationReference(String),
    #[error("Cache initialization failed: {0}")]
    InitError(String),
    #[error("Generation {0} has not been installed")]
    GenerationNotInstalled(String),
    #[error("Invalid generation name: {0}")]
    InvalidGenerationName(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Manifest error: {0}")]
    ManifestError(String),
    #[error("Cache location error: {0}")]
    CacheLocationError(String),
    #[error("Time conversion error: {0}")]
    TimeConversionError(String),
}

pub trait AddContext<T, E>: Context<T, E> {
    fn err_context<C: Display + Send + Sync + 'static>(self, msg: C) -> Result<T, anyhow::Error>
    where
        Self: Sized,
    {
        self.context(msg)
    }
}

impl<U, T, E> AddContext<T, E> for U where U: Context<T, E> {}

pub fn gen<T: AsRef<str>>(msg: T) -> anyhow::Error {
    anyhow!(msg.as_ref().to_string())
}

/// Returns true if the error chain carries the given `SWError` variant.
pub fn is_stale_generation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SWError>(),
        Some(SWError::StaleGenerationReference(_))
    )
}
