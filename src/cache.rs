use std::sync::Arc;

use crate::error::SWError;
use crate::http::RequestKey;
use crate::io::Response;

pub mod filesystem;
pub mod inmemory;

use crate::Result;
pub use filesystem::FileCache;
pub use inmemory::InMemoryCache;

/// Storage of named cache generations. Each generation maps request keys to
/// responses. Implementors must be safe to share with the background writer.
///
/// Reading from or writing to a generation that does not exist fails with
/// `SWError::StaleGenerationReference`. Only `open` creates generations.
pub trait Cache {
    /// Create the generation if it does not exist yet.
    fn open(&self, generation: &str) -> Result<()>;
    fn get(&self, generation: &str, key: &RequestKey) -> Result<CacheState>;
    /// Store `value` under `key`, replacing any previous entry.
    fn set(&self, generation: &str, key: &RequestKey, value: &Response) -> Result<()>;
    fn keys(&self, generation: &str) -> Result<Vec<RequestKey>>;
    fn generations(&self) -> Result<Vec<String>>;
    /// Remove a generation and all its entries. Returns false if there was
    /// nothing to remove.
    fn delete(&self, generation: &str) -> Result<bool>;
    /// Generation recorded as current, if any. Survives restarts for
    /// persistent backends.
    fn active_generation(&self) -> Result<Option<String>>;
    fn set_active_generation(&self, generation: &str) -> Result<()>;

    fn has_generation(&self, generation: &str) -> Result<bool> {
        Ok(self.generations()?.iter().any(|name| name == generation))
    }
}

#[derive(Debug)]
pub enum CacheState {
    Found(Response),
    None,
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn open(&self, generation: &str) -> Result<()> {
        self.as_ref().open(generation)
    }

    fn get(&self, generation: &str, key: &RequestKey) -> Result<CacheState> {
        self.as_ref().get(generation, key)
    }

    fn set(&self, generation: &str, key: &RequestKey, value: &Response) -> Result<()> {
        self.as_ref().set(generation, key, value)
    }

    fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
        self.as_ref().keys(generation)
    }

    fn generations(&self) -> Result<Vec<String>> {
        self.as_ref().generations()
    }

    fn delete(&self, generation: &str) -> Result<bool> {
        self.as_ref().delete(generation)
    }

    fn active_generation(&self) -> Result<Option<String>> {
        self.as_ref().active_generation()
    }

    fn set_active_generation(&self, generation: &str) -> Result<()> {
        self.as_ref().set_active_generation(generation)
    }

    fn has_generation(&self, generation: &str) -> Result<bool> {
        self.as_ref().has_generation(generation)
    }
}

/// Generation names double as directory names for persistent storage.
pub fn validate_generation_name(name: &str) -> Result<()> {
    lazy_static! {
        static ref RE_GENERATION: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();
    }
    if name == "." || name == ".." || !RE_GENERATION.is_match(name) {
        return Err(SWError::InvalidGenerationName(format!(
            "{name:?} - only letters, digits, '.', '_' and '-' are allowed"
        ))
        .into());
    }
    Ok(())
}
