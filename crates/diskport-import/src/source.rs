//! Import source resolution
//!
//! A [`Source`] is the validated form of the user's input reference: either a disk
//! file in object storage or an existing platform image. Construction goes through
//! [`SourceFactory`], which rejects inputs the pipeline cannot inflate.

use diskport_import_types::{ImportError, ImportResult, StorageClient};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

static STORAGE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^gs://([a-z0-9][-_.a-z0-9]*)/(.+)$").expect("storage path pattern is a valid regex")
});

static IMAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:projects/(?P<project>[a-z][-a-z0-9.:]*[a-z0-9])/global/images/|global/images/)?(?P<name>[a-z](?:[-a-z0-9]{0,61}[a-z0-9])?)$",
    )
    .expect("image pattern is a valid regex")
});

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Validated import source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Disk file in object storage, `gs://bucket/object`
    File(String),
    /// Existing image, `global/images/<name>` or `projects/<project>/global/images/<name>`
    Image(String),
}

impl Source {
    /// Canonical reference string
    pub fn path(&self) -> &str {
        match self {
            Source::File(path) | Source::Image(path) => path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Source::File(_))
    }
}

/// Split `gs://bucket/object` into bucket and object
pub fn parse_storage_path(path: &str) -> ImportResult<(String, String)> {
    let captures = STORAGE_PATH_PATTERN.captures(path).ok_or_else(|| {
        ImportError::InvalidSource(format!(
            "file `{}` is not a valid storage path; expected gs://bucket/object",
            path
        ))
    })?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// Canonical image path, or `None` when the reference is malformed
fn canonical_image_path(reference: &str) -> Option<String> {
    let captures = IMAGE_PATTERN.captures(reference)?;
    let name = &captures["name"];
    Some(match captures.name("project") {
        Some(project) => format!("projects/{}/global/images/{}", project.as_str(), name),
        None => format!("global/images/{}", name),
    })
}

/// Builds [`Source`] values from raw user input
pub struct SourceFactory {
    storage: Arc<dyn StorageClient>,
}

impl SourceFactory {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    /// Resolve exactly one of `source_file` / `source_image` into a [`Source`]
    pub async fn init(&self, source_file: &str, source_image: &str) -> ImportResult<Source> {
        let source_file = source_file.trim();
        let source_image = source_image.trim();

        match (source_file.is_empty(), source_image.is_empty()) {
            (true, true) => Err(ImportError::InvalidSource(
                "either a source file or a source image must be specified".to_string(),
            )),
            (false, false) => Err(ImportError::InvalidSource(
                "a source file and a source image are mutually exclusive; specify only one"
                    .to_string(),
            )),
            (false, true) => self.file_source(source_file).await,
            (true, false) => {
                let path = canonical_image_path(source_image).ok_or_else(|| {
                    ImportError::InvalidSource(format!(
                        "invalid image reference `{}`; expected <name>, global/images/<name> or projects/<project>/global/images/<name>",
                        source_image
                    ))
                })?;
                Ok(Source::Image(path))
            }
        }
    }

    async fn file_source(&self, path: &str) -> ImportResult<Source> {
        let (bucket, object) = parse_storage_path(path)?;

        let mut reader = self.storage.open_reader(&bucket, &object).await?;
        let mut header = [0u8; 2];
        let mut read = 0;
        while read < header.len() {
            let n = reader.read(&mut header[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
        }
        debug!("Read {} header bytes from {}", read, path);

        if read == 0 {
            return Err(ImportError::InvalidSource(
                "cannot import an image from an empty file".to_string(),
            ));
        }
        if read == header.len() && header == GZIP_MAGIC {
            return Err(ImportError::InvalidSource(
                "cannot import an image from a compressed file. Decompress it and import the disk image file directly".to_string(),
            ));
        }

        Ok(Source::File(path.to_string()))
    }
}
