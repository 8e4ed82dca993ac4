use std::io::Write;

use crate::cache::Cache;
use crate::cli::FetchOptions;
use crate::config::ConfigProperties;
use crate::io::{HttpRunner, Response};
use crate::worker::OfflineCache;
use crate::Result;

pub fn execute<C, R, D, W>(
    options: FetchOptions,
    cache: &OfflineCache<C, R, D>,
    mut writer: W,
) -> Result<()>
where
    C: Cache + Send + Sync + 'static,
    R: HttpRunner,
    D: ConfigProperties,
    W: Write,
{
    let response = cache.resolve(&options.request);
    if options.include {
        print_head(&response, &mut writer)?;
    }
    writer.write_all(&response.body)?;
    writer.flush()?;
    Ok(())
}

fn print_head<W: Write>(response: &Response, writer: &mut W) -> Result<()> {
    writeln!(writer, "HTTP {} {}", response.status, response.status_text)?;
    let mut headers: Vec<_> = response.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        writeln!(writer, "{name}: {value}")?;
    }
    writeln!(writer)?;
    Ok(())
}
