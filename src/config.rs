//! Config file parsing and validation.
//!
//! The configuration is a TOML file with one table per application. Each
//! table describes the origin being cached, the version tag of the current
//! deploy and where its precache manifest and cache storage live:
//!
//! ```toml
//! [space-explorer]
//! version = "v1"
//! origin = "http://localhost:8080"
//! manifest = "/srv/space-explorer/precache.txt"
//! cache_location = "/home/user/.cache/swcache"
//! offline_fallback = "/index.html"
//! skip_waiting = true
//! network_timeout = "30s"
//! ```

use crate::error::{AddContext, SWError};
use crate::time::Seconds;
use crate::Result;
use crate::DEFAULT_OFFLINE_FALLBACK;
use serde::Deserialize;
use std::sync::Arc;
use std::{collections::HashMap, io::Read};

pub const DEFAULT_NETWORK_TIMEOUT: u64 = 30;

pub trait ConfigProperties {
    /// Origin the cached application is served from. Relative URLs resolve
    /// against it and only responses from it are cacheable.
    fn origin(&self) -> &str;
    fn cache_location(&self) -> Option<&str>;
    /// Version tag naming the generation of the current deploy.
    fn version(&self) -> &str {
        ""
    }
    fn manifest(&self) -> Option<&str> {
        None
    }
    fn offline_fallback(&self) -> &str {
        DEFAULT_OFFLINE_FALLBACK
    }
    /// Activate a freshly installed generation right away.
    fn skip_waiting(&self) -> bool {
        false
    }
    fn network_timeout(&self) -> Seconds {
        Seconds::new(DEFAULT_NETWORK_TIMEOUT)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AppTable {
    version: Option<String>,
    origin: Option<String>,
    manifest: Option<String>,
    cache_location: Option<String>,
    offline_fallback: Option<String>,
    skip_waiting: Option<bool>,
    network_timeout: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    version: String,
    origin: String,
    manifest: Option<String>,
    cache_location: Option<String>,
    offline_fallback: String,
    skip_waiting: bool,
    network_timeout: Seconds,
}

impl Config {
    pub fn new<T: Read>(reader: T, app: &str) -> Result<Self> {
        let mut tables = Config::parse(reader)?;
        let table = tables.remove(app).ok_or_else(|| {
            SWError::ConfigurationError(format!("No configuration found for app {app}"))
        })?;
        let version = table.version.ok_or_else(|| {
            SWError::ConfigurationError(format!("No version found for app {app} in config"))
        })?;
        let origin = table.origin.ok_or_else(|| {
            SWError::ConfigurationError(format!("No origin found for app {app} in config"))
        })?;
        let network_timeout = match table.network_timeout {
            Some(timeout) => Seconds::try_from(timeout.as_str()).err_context(
                SWError::ConfigurationError(format!(
                    "Invalid network_timeout for app {app}. Use a time format \
                     such as 30s, 2m or 1h."
                )),
            )?,
            None => Seconds::new(DEFAULT_NETWORK_TIMEOUT),
        };
        Ok(Config {
            version,
            origin,
            manifest: table.manifest,
            cache_location: table.cache_location,
            offline_fallback: table
                .offline_fallback
                .unwrap_or_else(|| DEFAULT_OFFLINE_FALLBACK.to_string()),
            skip_waiting: table.skip_waiting.unwrap_or(false),
            network_timeout,
        })
    }

    fn parse<T: Read>(mut reader: T) -> Result<HashMap<String, AppTable>> {
        let mut config_data = String::new();
        reader.read_to_string(&mut config_data)?;
        if config_data.trim().is_empty() {
            return Err(SWError::ConfigurationError("No config data found".to_string()).into());
        }
        let tables = toml::from_str::<HashMap<String, AppTable>>(&config_data)
            .err_context(SWError::ConfigurationError(
                "Could not parse the configuration file".to_string(),
            ))?;
        Ok(tables)
    }
}

impl ConfigProperties for Config {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn cache_location(&self) -> Option<&str> {
        self.cache_location.as_deref()
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn manifest(&self) -> Option<&str> {
        self.manifest.as_deref()
    }

    fn offline_fallback(&self) -> &str {
        &self.offline_fallback
    }

    fn skip_waiting(&self) -> bool {
        self.skip_waiting
    }

    fn network_timeout(&self) -> Seconds {
        self.network_timeout
    }
}

impl<T: ConfigProperties + ?Sized> ConfigProperties for Arc<T> {
    fn origin(&self) -> &str {
        self.as_ref().origin()
    }

    fn cache_location(&self) -> Option<&str> {
        self.as_ref().cache_location()
    }

    fn version(&self) -> &str {
        self.as_ref().version()
    }

    fn manifest(&self) -> Option<&str> {
        self.as_ref().manifest()
    }

    fn offline_fallback(&self) -> &str {
        self.as_ref().offline_fallback()
    }

    fn skip_waiting(&self) -> bool {
        self.as_ref().skip_waiting()
    }

    fn network_timeout(&self) -> Seconds {
        self.as_ref().network_timeout()
    }
}
