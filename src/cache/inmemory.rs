use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use crate::{
    cache::{Cache, CacheState},
    error::{self, SWError},
    http::RequestKey,
    io::Response,
};

use crate::Result;

type Generations = HashMap<String, HashMap<RequestKey, Response>>;

/// Volatile generation storage. Optionally enforces a byte quota over all
/// stored bodies, rejecting writes that would exceed it.
#[derive(Default)]
pub struct InMemoryCache {
    generations: Mutex<Generations>,
    active: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl InMemoryCache {
    pub fn with_quota(quota: usize) -> Self {
        InMemoryCache {
            quota: Some(quota),
            ..Default::default()
        }
    }

    fn lock_generations(&self) -> Result<MutexGuard<'_, Generations>> {
        self.generations
            .lock()
            .map_err(|_| error::gen("in-memory cache lock poisoned"))
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<String>>> {
        self.active
            .lock()
            .map_err(|_| error::gen("in-memory active generation lock poisoned"))
    }

    /// Number of entries stored under `generation`, zero if it is unknown.
    pub fn len(&self, generation: &str) -> usize {
        self.lock_generations()
            .map(|generations| generations.get(generation).map_or(0, |g| g.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, generation: &str) -> bool {
        self.len(generation) == 0
    }
}

fn stored_bytes(generations: &Generations) -> usize {
    generations
        .values()
        .flat_map(|entries| entries.values())
        .map(|response| response.body.len())
        .sum()
}

impl Cache for InMemoryCache {
    fn open(&self, generation: &str) -> Result<()> {
        self.lock_generations()?
            .entry(generation.to_string())
            .or_default();
        Ok(())
    }

    fn get(&self, generation: &str, key: &RequestKey) -> Result<CacheState> {
        let generations = self.lock_generations()?;
        let entries = generations
            .get(generation)
            .ok_or_else(|| SWError::StaleGenerationReference(generation.to_string()))?;
        match entries.get(key) {
            Some(response) => Ok(CacheState::Found(response.clone())),
            None => Ok(CacheState::None),
        }
    }

    fn set(&self, generation: &str, key: &RequestKey, value: &Response) -> Result<()> {
        let mut generations = self.lock_generations()?;
        if let Some(quota) = self.quota {
            let replaced = generations
                .get(generation)
                .and_then(|entries| entries.get(key))
                .map_or(0, |response| response.body.len());
            let used = stored_bytes(&generations) - replaced;
            if used + value.body.len() > quota {
                return Err(SWError::StorageWriteError(format!(
                    "quota exceeded storing {key}: {} bytes used of {quota}",
                    used
                ))
                .into());
            }
        }
        let entries = generations
            .get_mut(generation)
            .ok_or_else(|| SWError::StaleGenerationReference(generation.to_string()))?;
        entries.insert(key.clone(), value.clone());
        Ok(())
    }

    fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
        let generations = self.lock_generations()?;
        let entries = generations
            .get(generation)
            .ok_or_else(|| SWError::StaleGenerationReference(generation.to_string()))?;
        Ok(entries.keys().cloned().collect())
    }

    fn generations(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock_generations()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, generation: &str) -> Result<bool> {
        Ok(self.lock_generations()?.remove(generation).is_some())
    }

    fn active_generation(&self) -> Result<Option<String>> {
        Ok(self.lock_active()?.clone())
    }

    fn set_active_generation(&self, generation: &str) -> Result<()> {
        *self.lock_active()? = Some(generation.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::is_stale_generation, http::Method};

    fn key(url: &str) -> RequestKey {
        RequestKey::new(Method::GET, url)
    }

    fn body(data: &str) -> Response {
        Response::builder().body(data.as_bytes().to_vec()).build().unwrap()
    }

    #[test]
    fn test_set_and_get_last_write_wins() {
        let cache = InMemoryCache::default();
        cache.open("v1").unwrap();
        cache.set("v1", &key("http://a/x"), &body("one")).unwrap();
        cache.set("v1", &key("http://a/x"), &body("two")).unwrap();
        match cache.get("v1", &key("http://a/x")).unwrap() {
            CacheState::Found(response) => assert_eq!("two", response.text()),
            CacheState::None => panic!("Expected a cached entry"),
        }
        assert_eq!(1, cache.len("v1"));
    }

    #[test]
    fn test_get_unknown_key_is_none() {
        let cache = InMemoryCache::default();
        cache.open("v1").unwrap();
        assert!(matches!(
            cache.get("v1", &key("http://a/missing")).unwrap(),
            CacheState::None
        ));
    }

    #[test]
    fn test_missing_generation_is_stale_reference() {
        let cache = InMemoryCache::default();
        let err = cache.get("gone", &key("http://a/x")).unwrap_err();
        assert!(is_stale_generation(&err));
        let err = cache.set("gone", &key("http://a/x"), &body("x")).unwrap_err();
        assert!(is_stale_generation(&err));
        assert!(cache.generations().unwrap().is_empty());
    }

    #[test]
    fn test_delete_generation() {
        let cache = InMemoryCache::default();
        cache.open("v1").unwrap();
        cache.open("v2").unwrap();
        assert!(cache.delete("v1").unwrap());
        assert!(!cache.delete("v1").unwrap());
        assert_eq!(vec!["v2".to_string()], cache.generations().unwrap());
    }

    #[test]
    fn test_quota_rejects_oversized_writes() {
        let cache = InMemoryCache::with_quota(8);
        cache.open("v1").unwrap();
        cache.set("v1", &key("http://a/x"), &body("12345")).unwrap();
        let err = cache
            .set("v1", &key("http://a/y"), &body("12345"))
            .unwrap_err();
        match err.downcast_ref::<SWError>() {
            Some(SWError::StorageWriteError(_)) => {}
            _ => panic!("Expected StorageWriteError"),
        }
        // Replacing an entry only accounts for the difference.
        cache.set("v1", &key("http://a/x"), &body("12345678")).unwrap();
    }

    #[test]
    fn test_active_generation_round_trip() {
        let cache = InMemoryCache::default();
        assert_eq!(None, cache.active_generation().unwrap());
        cache.set_active_generation("v3").unwrap();
        assert_eq!(Some("v3".to_string()), cache.active_generation().unwrap());
    }
}
