use crate::cache::{Cache, FileCache};
use crate::cli::cache::CacheOptions;
use crate::config::ConfigProperties;
use crate::Result;
use std::fmt;
use std::io::Write;

pub fn execute<D: ConfigProperties>(
    options: CacheOptions,
    storage: &FileCache,
    config: &D,
    writer: impl Write,
) -> Result<()> {
    match options {
        CacheOptions::Info => info(storage, config, writer),
        CacheOptions::List { generation } => list(storage, generation.as_deref(), writer),
    }
}

fn info<D: ConfigProperties>(storage: &FileCache, config: &D, mut writer: impl Write) -> Result<()> {
    let size = storage.size()?;
    writeln!(writer, "Location: {}", config.cache_location().unwrap_or_default())?;
    writeln!(writer, "Size: {}", BytesToHumanReadable::from(size))?;
    writeln!(
        writer,
        "Active: {}",
        storage.active_generation()?.unwrap_or_else(|| "-".to_string())
    )?;
    writeln!(writer, "Generations: {}", storage.generations()?.len())?;
    Ok(())
}

/// Without a generation lists every generation, marking the active one.
/// Otherwise lists the request keys stored in it, sorted.
fn list<C: Cache>(storage: &C, generation: Option<&str>, mut writer: impl Write) -> Result<()> {
    match generation {
        Some(generation) => {
            let mut keys = storage.keys(generation)?;
            keys.sort_by(|a, b| a.url.cmp(&b.url).then(a.method.cmp(&b.method)));
            for key in keys {
                writeln!(writer, "{key}")?;
            }
        }
        None => {
            let active = storage.active_generation()?;
            for name in storage.generations()? {
                let marker = if active.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                writeln!(writer, "{marker} {name}")?;
            }
        }
    }
    Ok(())
}

struct BytesToHumanReadable(u64);

impl From<u64> for BytesToHumanReadable {
    fn from(size: u64) -> Self {
        BytesToHumanReadable(size)
    }
}

impl fmt::Display for BytesToHumanReadable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let suffixes = ["B", "KB", "MB", "GB"];
        let mut size = self.0 as f64;
        let mut i = 0;
        while size >= 1024.0 && i < suffixes.len() - 1 {
            size /= 1024.0;
            i += 1;
        }
        write!(f, "{:.2} {}", size, suffixes[i])
    }
}
