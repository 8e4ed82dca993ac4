//! Precache manifest: the URLs a generation must hold right after install.
//!
//! Accepted file formats are a plain list with one URL per line (blank lines
//! and `#` comments ignored) or a JSON array of strings.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{AddContext, SWError};
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    urls: Vec<String>,
}

impl Manifest {
    /// Builds a manifest keeping the first occurrence of each URL. Order only
    /// drives install-time fetch ordering.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let urls = urls
            .into_iter()
            .map(Into::into)
            .filter(|url: &String| seen.insert(url.clone()))
            .collect();
        Manifest { urls }
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;
        if data.trim_start().starts_with('[') {
            let urls = serde_json::from_str::<Vec<String>>(&data).err_context(
                SWError::ManifestError("Invalid JSON manifest, expected an array of URLs".into()),
            )?;
            return Ok(Manifest::new(
                urls.into_iter().map(|url| url.trim().to_string()),
            ));
        }
        let urls = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        Ok(Manifest::new(urls))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).err_context(SWError::ManifestError(format!(
            "Cannot open manifest file {}",
            path.display()
        )))?;
        Manifest::from_reader(f)
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
