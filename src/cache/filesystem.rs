use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::{validate_generation_name, Cache, CacheState};
use crate::config::ConfigProperties;
use crate::error::{self, AddContext, SWError};
use crate::http::{Headers, RequestKey};
use crate::io::{Response, ResponseType};
use crate::Result;

const ACTIVE_MARKER: &str = "ACTIVE";
const GENERATION_MARKER: &str = ".generation";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Persistent generation storage. Layout under the configured location:
///
/// ```text
/// <cache_location>/<ns>/ACTIVE                   name of the current generation
/// <cache_location>/<ns>/<generation>/.generation  written by `open`
/// <cache_location>/<ns>/<generation>/<sha>        gzip entry per request key
/// ```
///
/// `<ns>` is derived from the configured origin, so apps sharing a location
/// never see each other's generations. Directories without the
/// `.generation` marker were not created here and are never listed or
/// deleted. Each entry holds one JSON metadata line followed by the raw body
/// bytes.
pub struct FileCache {
    config: Arc<dyn ConfigProperties + Send + Sync>,
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    status_text: String,
    headers: Headers,
    response_type: ResponseType,
    url: String,
    stored_at: DateTime<Utc>,
}

impl FileCache {
    pub fn new(config: Arc<dyn ConfigProperties + Send + Sync>) -> Self {
        FileCache { config }
    }

    fn location(&self) -> Result<&Path> {
        let cache_location = self.config.cache_location().ok_or_else(|| {
            SWError::ConfigurationError("No cache_location found in config".to_string())
        })?;
        Ok(Path::new(cache_location))
    }

    pub fn validate_cache_location(&self) -> Result<()> {
        let path = self.location()?;
        let cache_location = path.to_string_lossy();

        if !path.exists() {
            return Err(SWError::CacheLocationError(format!(
                "Cache directory does not exist: {cache_location}"
            ))
            .into());
        }

        if !path.is_dir() {
            return Err(SWError::CacheLocationError(format!(
                "Cache location is not a directory: {cache_location}"
            ))
            .into());
        }

        // Check if we can write to the directory
        let test_file_path = path.join(".write_test_cache_file");
        match File::create(&test_file_path) {
            Ok(_) => {
                if let Err(e) = fs::remove_file(&test_file_path) {
                    return Err(SWError::CacheLocationError(format!(
                        "Failed to remove cache test file {}: {}",
                        test_file_path.to_string_lossy(),
                        e
                    ))
                    .into());
                }
            }
            Err(e) => {
                return Err(SWError::CacheLocationError(format!(
                    "No write permission for cache directory {cache_location}: {e}"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Directory holding this origin's generations.
    pub fn root(&self) -> Result<PathBuf> {
        Ok(self.location()?.join(namespace(self.config.origin())))
    }

    fn generation_dir(&self, generation: &str) -> Result<PathBuf> {
        validate_generation_name(generation)?;
        Ok(self.root()?.join(generation))
    }

    pub fn get_cache_file(&self, generation: &str, key: &RequestKey) -> Result<PathBuf> {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string());
        let hash = hasher.finalize();
        Ok(self.generation_dir(generation)?.join(format!("{hash:x}")))
    }

    /// Total size in bytes of everything stored for this origin.
    pub fn size(&self) -> Result<u64> {
        let root = self.root()?;
        if !root.is_dir() {
            return Ok(0);
        }
        dir_size(&root)
    }

    fn get_cache_data(&self, reader: impl BufRead) -> Result<(EntryMeta, Vec<u8>)> {
        let decompressed_data = GzDecoder::new(reader);
        let mut reader = BufReader::new(decompressed_data);
        let mut meta = String::new();
        reader.read_line(&mut meta)?;
        // parse error in here could be hard to find/debug. Send a clear
        // error trace over to the client.
        let meta = serde_json::from_str::<EntryMeta>(meta.trim_end())
            .err_context("Could not parse cache entry metadata")?;
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        Ok((meta, body))
    }

    fn persist_cache_data(
        &self,
        key: &RequestKey,
        value: &Response,
        f: BufWriter<File>,
    ) -> Result<()> {
        let meta = EntryMeta {
            key: key.clone(),
            status: value.status,
            status_text: value.status_text.clone(),
            headers: value.headers.clone(),
            response_type: value.response_type.clone(),
            url: value.url.clone(),
            stored_at: Utc::now(),
        };
        let meta = serde_json::to_string(&meta)?;
        let mut encoder = GzEncoder::new(f, Compression::default());
        encoder.write_all(meta.as_bytes())?;
        encoder.write_all(b"\n")?;
        encoder.write_all(&value.body)?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    /// Writes go to a hidden temporary sibling first and are renamed into
    /// place, so readers never observe a partially written entry.
    fn write_atomically<F>(&self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(BufWriter<File>) -> Result<()>,
    {
        let dir = path
            .parent()
            .ok_or_else(|| error::gen(format!("No parent directory for {}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp_path = dir.join(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let result = File::create(&tmp_path)
            .map_err(anyhow::Error::from)
            .and_then(|f| write(BufWriter::new(f)))
            .and_then(|_| fs::rename(&tmp_path, path).map_err(anyhow::Error::from));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

impl Cache for FileCache {
    fn open(&self, generation: &str) -> Result<()> {
        let dir = self.generation_dir(generation)?;
        if is_generation(&dir) {
            return Ok(());
        }
        fs::create_dir_all(&dir).map_err(|err| {
            SWError::StorageWriteError(format!("cannot create {}: {err}", dir.display()))
        })?;
        let origin = self.config.origin();
        self.write_atomically(&dir.join(GENERATION_MARKER), |mut f| {
            writeln!(f, "{origin}")?;
            f.flush()?;
            Ok(())
        })
        .map_err(|err| {
            SWError::StorageWriteError(format!("cannot mark {}: {err}", dir.display()))
        })?;
        Ok(())
    }

    fn get(&self, generation: &str, key: &RequestKey) -> Result<CacheState> {
        let dir = self.generation_dir(generation)?;
        if !is_generation(&dir) {
            return Err(SWError::StaleGenerationReference(generation.to_string()).into());
        }
        let path = self.get_cache_file(generation, key)?;
        let f = match File::open(&path) {
            Ok(f) => f,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(CacheState::None),
            Err(err) => return Err(err.into()),
        };
        let (meta, body) = self.get_cache_data(BufReader::new(f))?;
        let response = Response::builder()
            .status(meta.status)
            .status_text(meta.status_text)
            .headers(meta.headers)
            .body(body)
            .response_type(meta.response_type)
            .url(meta.url)
            .build()?;
        Ok(CacheState::Found(response))
    }

    fn set(&self, generation: &str, key: &RequestKey, value: &Response) -> Result<()> {
        let dir = self.generation_dir(generation)?;
        if !is_generation(&dir) {
            return Err(SWError::StaleGenerationReference(generation.to_string()).into());
        }
        let path = self.get_cache_file(generation, key)?;
        self.write_atomically(&path, |f| self.persist_cache_data(key, value, f))
            .map_err(|err| SWError::StorageWriteError(format!("{key}: {err}")))?;
        Ok(())
    }

    fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
        let dir = self.generation_dir(generation)?;
        if !is_generation(&dir) {
            return Err(SWError::StaleGenerationReference(generation.to_string()).into());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let f = BufReader::new(File::open(entry.path())?);
            let (meta, _) = self.get_cache_data(f)?;
            keys.push(meta.key);
        }
        keys.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(keys)
    }

    fn generations(&self) -> Result<Vec<String>> {
        let root = self.root()?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() || !is_generation(&entry.path()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_generation_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, generation: &str) -> Result<bool> {
        let dir = self.generation_dir(generation)?;
        if !is_generation(&dir) {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    fn active_generation(&self) -> Result<Option<String>> {
        let path = self.root()?.join(ACTIVE_MARKER);
        match fs::read_to_string(path) {
            Ok(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Ok(None);
                }
                Ok(Some(name.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_active_generation(&self, generation: &str) -> Result<()> {
        validate_generation_name(generation)?;
        let root = self.root()?;
        fs::create_dir_all(&root)?;
        let path = root.join(ACTIVE_MARKER);
        self.write_atomically(&path, |mut f| {
            writeln!(f, "{generation}")?;
            f.flush()?;
            Ok(())
        })
    }
}

fn is_generation(dir: &Path) -> bool {
    dir.join(GENERATION_MARKER).is_file()
}

/// Short stable directory name for an origin. Case and a trailing slash do
/// not change it.
fn namespace(origin: &str) -> String {
    let origin = origin.trim_end_matches('/').to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(origin);
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += metadata.len();
        }
    }
    Ok(size)
}
