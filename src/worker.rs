//! The offline resource cache. Owns the current generation, precaches
//! manifests into new generations, promotes them on activation and mediates
//! every request cache-first with network fallback.

use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, RwLock};

use crate::cache::{validate_generation_name, Cache, CacheState};
use crate::config::ConfigProperties;
use crate::error::{self, is_stale_generation, SWError};
use crate::http::{absolute_url, Method, Request, RequestKey};
use crate::io::{HttpRunner, Response};
use crate::manifest::Manifest;
use crate::writer::BackgroundWriter;
use crate::{log_debug, log_error, log_info, log_warn, Result};

/// Lifecycle of the most recent install cycle. A new `initialize` can start
/// at any point; the previously current generation keeps serving until the
/// new one is activated.
#[derive(Clone, Debug, PartialEq)]
pub enum Lifecycle {
    Uninitialized,
    Installing(String),
    Installed(String),
    Active(String),
}

impl Display for Lifecycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Uninitialized => write!(f, "uninitialized"),
            Lifecycle::Installing(version) => write!(f, "installing {version}"),
            Lifecycle::Installed(version) => write!(f, "installed {version}"),
            Lifecycle::Active(version) => write!(f, "active {version}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstallReport {
    pub version: String,
    /// Manifest URLs fetched and stored.
    pub stored: Vec<String>,
    /// Manifest URLs that could not be fetched but were carried over from
    /// the current generation.
    pub copied_forward: Vec<String>,
    pub failed: Vec<String>,
}

impl InstallReport {
    fn new(version: &str) -> Self {
        InstallReport {
            version: version.to_string(),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.stored.is_empty() && self.copied_forward.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivationReport {
    pub version: String,
    pub swept: Vec<String>,
    /// Stale generations that could not be removed.
    pub failed: Vec<String>,
}

pub struct OfflineCache<C, R, D> {
    storage: Arc<C>,
    runner: R,
    config: D,
    current: RwLock<Option<String>>,
    lifecycle: Mutex<Lifecycle>,
    activation: Mutex<()>,
    writer: BackgroundWriter,
}

impl<C, R, D> OfflineCache<C, R, D>
where
    C: Cache + Send + Sync + 'static,
    R: HttpRunner,
    D: ConfigProperties,
{
    /// Creates the cache on top of `storage`, restoring the generation that
    /// was current when the storage was last used.
    pub fn new(storage: Arc<C>, runner: R, config: D) -> Result<Self> {
        let restored = match storage.active_generation()? {
            Some(name) if storage.has_generation(&name)? => Some(name),
            Some(name) => {
                log_warn!("Active generation {} no longer exists, ignoring", name);
                None
            }
            None => None,
        };
        let lifecycle = match &restored {
            Some(name) => {
                log_info!("Restored active generation {}", name);
                Lifecycle::Active(name.clone())
            }
            None => Lifecycle::Uninitialized,
        };
        let writer = BackgroundWriter::spawn(storage.clone())?;
        Ok(OfflineCache {
            storage,
            runner,
            config,
            current: RwLock::new(restored),
            lifecycle: Mutex::new(lifecycle),
            activation: Mutex::new(()),
            writer,
        })
    }

    pub fn storage(&self) -> &Arc<C> {
        &self.storage
    }

    pub fn config(&self) -> &D {
        &self.config
    }

    pub fn current_generation(&self) -> Option<String> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn state(&self) -> Lifecycle {
        match self.lifecycle.lock() {
            Ok(lifecycle) => lifecycle.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, state: Lifecycle) -> Lifecycle {
        let mut lifecycle = match self.lifecycle.lock() {
            Ok(lifecycle) => lifecycle,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *lifecycle, state)
    }

    /// Waits for pending background cache writes.
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Precaches `manifest` into the generation `version`. Individual URLs
    /// may fail; the generation is created with whatever succeeded. Fails
    /// only when nothing at all could be cached.
    pub fn initialize(&self, manifest: &Manifest, version: &str) -> Result<InstallReport> {
        validate_generation_name(version)?;
        log_info!("Installing generation {}", version);
        let previous = self.set_state(Lifecycle::Installing(version.to_string()));
        match self.install_generation(manifest, version) {
            Ok(report) => {
                log_info!(
                    "Installed generation {}: {} stored, {} kept from cache, {} failed",
                    version,
                    report.stored.len(),
                    report.copied_forward.len(),
                    report.failed.len()
                );
                self.set_state(Lifecycle::Installed(version.to_string()));
                Ok(report)
            }
            Err(err) => {
                self.set_state(previous);
                Err(err)
            }
        }
    }

    fn install_generation(&self, manifest: &Manifest, version: &str) -> Result<InstallReport> {
        let current = self.current_generation();
        let replaces_current = current.as_deref() == Some(version);
        // A non current generation with this name is a leftover from an
        // earlier install. Start it from scratch.
        if !replaces_current && self.storage.has_generation(version)? {
            log_info!("Replacing leftover generation {}", version);
            self.storage.delete(version)?;
        }
        self.storage.open(version).map_err(|err| {
            SWError::InitError(format!("cannot create generation {version}: {err:#}"))
        })?;

        let mut report = InstallReport::new(version);
        for url in manifest.urls() {
            let request = Request::new(url, Method::GET);
            let key = request.key(self.config.origin());
            match self.runner.run(&request) {
                Ok(response) if response.is_cacheable() => {
                    match self.storage.set(version, &key, &response) {
                        Ok(()) => report.stored.push(url.clone()),
                        Err(err) => precache_failed(&mut report, url, format!("{err:#}")),
                    }
                }
                Ok(response) => precache_failed(
                    &mut report,
                    url,
                    format!(
                        "status {} {:?} response is not cacheable",
                        response.status, response.response_type
                    ),
                ),
                Err(err) => match self.carry_forward(current.as_deref(), version, &key) {
                    Some(()) => {
                        log_warn!(
                            "Precache fetch failed for {}, keeping cached copy: {:#}",
                            url,
                            err
                        );
                        report.copied_forward.push(url.clone())
                    }
                    None => precache_failed(&mut report, url, format!("{err:#}")),
                },
            }
        }

        if !manifest.is_empty() && report.is_empty() {
            if !replaces_current {
                if let Err(err) = self.storage.delete(version) {
                    log_error!("Could not remove failed generation {}: {:#}", version, err);
                }
            }
            return Err(SWError::InitError(format!(
                "none of the {} manifest URLs could be cached for {}",
                manifest.len(),
                version
            ))
            .into());
        }
        Ok(report)
    }

    /// Copies the entry for `key` from the current generation into
    /// `version`. When re-installing the current generation in place the
    /// entry is already where it belongs.
    fn carry_forward(&self, current: Option<&str>, version: &str, key: &RequestKey) -> Option<()> {
        let current = current?;
        let response = self.lookup(current, key)?;
        if current == version {
            return Some(());
        }
        match self.storage.set(version, key, &response) {
            Ok(()) => Some(()),
            Err(err) => {
                log_error!("Could not carry {} forward into {}: {:#}", key, version, err);
                None
            }
        }
    }

    /// Makes `version` the current generation and sweeps every other one.
    /// Activations are serialized, the last one to run wins.
    pub fn activate(&self, version: &str) -> Result<ActivationReport> {
        let _guard = self
            .activation
            .lock()
            .map_err(|_| error::gen("activation lock poisoned"))?;
        if !self.storage.has_generation(version)? {
            return Err(SWError::GenerationNotInstalled(version.to_string()).into());
        }
        log_info!("Activating generation {}", version);
        match self.current.write() {
            Ok(mut current) => *current = Some(version.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(version.to_string()),
        }
        if let Err(err) = self.storage.set_active_generation(version) {
            log_error!("Could not persist active generation {}: {:#}", version, err);
        }

        let mut report = ActivationReport {
            version: version.to_string(),
            ..Default::default()
        };
        for name in self.storage.generations()? {
            if name == version {
                continue;
            }
            match self.storage.delete(&name) {
                Ok(true) => {
                    log_info!("Removing old cache: {}", name);
                    report.swept.push(name);
                }
                Ok(false) => {}
                Err(err) => {
                    log_error!("Could not remove old cache {}: {:#}", name, err);
                    report.failed.push(name);
                }
            }
        }
        self.set_state(Lifecycle::Active(version.to_string()));
        Ok(report)
    }

    /// Installs `version` and, when configured to skip waiting, activates it
    /// right away.
    pub fn install(&self, manifest: &Manifest, version: &str) -> Result<InstallReport> {
        let report = self.initialize(manifest, version)?;
        if self.config.skip_waiting() {
            self.activate(version)?;
        }
        Ok(report)
    }

    /// Serves `request`. Reads are answered from the current generation when
    /// possible, otherwise from the network, populating the cache with
    /// cacheable responses in the background. Never fails: network failures
    /// become the offline fallback page or a 503 response.
    pub fn resolve(&self, request: &Request) -> Response {
        log_debug!("Fetch: {} {}", request.method, request.url());
        if !request.method.is_read() {
            return match self.runner.run(request) {
                Ok(response) => response,
                Err(err) => {
                    log_error!("Fetch failed for {} {}: {:#}", request.method, request.url(), err);
                    Response::service_unavailable()
                }
            };
        }

        let key = request.key(self.config.origin());
        let generation = self.current_generation();
        if let Some(generation) = &generation {
            if let Some(response) = self.lookup(generation, &key) {
                log_debug!("Cache hit: {}", key);
                return response;
            }
        }

        match self.runner.run(request) {
            Ok(response) => {
                if response.is_cacheable() {
                    if let Some(generation) = generation {
                        self.writer.store(generation, key, response.clone());
                    }
                } else {
                    log_debug!(
                        "Not caching {}: status {} {:?}",
                        key,
                        response.status,
                        response.response_type
                    );
                }
                response
            }
            Err(err) => {
                log_error!("Fetch failed for {}: {:#}", key, err);
                self.offline_response(request, generation.as_deref())
            }
        }
    }

    fn offline_response(&self, request: &Request, generation: Option<&str>) -> Response {
        if let (true, Some(generation)) = (request.is_navigation(), generation) {
            let fallback = RequestKey::new(
                Method::GET,
                &absolute_url(self.config.origin(), self.config.offline_fallback()),
            );
            if let Some(response) = self.lookup(generation, &fallback) {
                log_info!("Serving offline page {} for {}", fallback.url, request.url());
                return response;
            }
        }
        Response::service_unavailable()
    }

    /// Storage read failures are cache misses.
    fn lookup(&self, generation: &str, key: &RequestKey) -> Option<Response> {
        match self.storage.get(generation, key) {
            Ok(CacheState::Found(response)) => Some(response),
            Ok(CacheState::None) => None,
            Err(err) if is_stale_generation(&err) => {
                log_debug!("Generation {} is gone, treating {} as a miss", generation, key);
                None
            }
            Err(err) => {
                log_error!("Cache read failed for {}: {:#}", key, err);
                None
            }
        }
    }
}

fn precache_failed(report: &mut InstallReport, url: &str, reason: String) {
    let err = SWError::ManifestFetchError {
        url: url.to_string(),
        reason,
    };
    log_warn!("{}", err);
    report.failed.push(url.to_string());
}
