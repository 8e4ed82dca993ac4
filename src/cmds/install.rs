use std::io::Write;

use crate::cache::Cache;
use crate::cli::{ActivateOptions, InstallOptions};
use crate::config::ConfigProperties;
use crate::error::SWError;
use crate::io::HttpRunner;
use crate::manifest::Manifest;
use crate::worker::{ActivationReport, InstallReport, OfflineCache};
use crate::Result;

/// Precaches the configured manifest into the configured version.
pub fn install<C, R, D, W>(
    options: InstallOptions,
    cache: &OfflineCache<C, R, D>,
    mut writer: W,
) -> Result<()>
where
    C: Cache + Send + Sync + 'static,
    R: HttpRunner,
    D: ConfigProperties,
    W: Write,
{
    let config = cache.config();
    let path = config.manifest().ok_or_else(|| {
        SWError::ConfigurationError("No manifest found in config".to_string())
    })?;
    let manifest = Manifest::from_file(path)?;
    let version = config.version();
    let report = cache.install(&manifest, version)?;
    print_install(&report, &mut writer)?;
    // With skip_waiting the install already activated the generation.
    if options.activate && !config.skip_waiting() {
        let report = cache.activate(version)?;
        print_activation(&report, &mut writer)?;
    }
    Ok(())
}

pub fn activate<C, R, D, W>(
    options: ActivateOptions,
    cache: &OfflineCache<C, R, D>,
    mut writer: W,
) -> Result<()>
where
    C: Cache + Send + Sync + 'static,
    R: HttpRunner,
    D: ConfigProperties,
    W: Write,
{
    let version = match &options.version {
        Some(version) => version.as_str(),
        None => cache.config().version(),
    };
    let report = cache.activate(version)?;
    print_activation(&report, &mut writer)
}

fn print_install<W: Write>(report: &InstallReport, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "Installed {}: {} stored, {} kept from cache, {} failed",
        report.version,
        report.stored.len(),
        report.copied_forward.len(),
        report.failed.len()
    )?;
    for url in &report.failed {
        writeln!(writer, "  failed: {url}")?;
    }
    Ok(())
}

fn print_activation<W: Write>(report: &ActivationReport, writer: &mut W) -> Result<()> {
    writeln!(writer, "Activated {}", report.version)?;
    for name in &report.swept {
        writeln!(writer, "  removed: {name}")?;
    }
    for name in &report.failed {
        writeln!(writer, "  could not remove: {name}")?;
    }
    Ok(())
}
