use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::models::{ImageSource, ResourceId};

#[derive(Debug, Error)]
pub enum FetchError {
    /// The source does not exist and retrying will not change that.
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare image: {0:#}")]
    Decode(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Resolves an item source into encoded image bytes.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, source: &ImageSource) -> Result<Vec<u8>, FetchError>;
}

/// Reads sources from the local filesystem.
///
/// Resource ids resolve through a registration table. Urls are accepted as
/// `file://` urls or bare paths; network schemes are not handled here.
#[derive(Debug, Clone, Default)]
pub struct FsFetcher {
    resources: HashMap<ResourceId, PathBuf>,
}

impl FsFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ResourceId, path: impl Into<PathBuf>) {
        self.resources.insert(id, path.into());
    }

    pub fn with_resource(mut self, id: ResourceId, path: impl Into<PathBuf>) -> Self {
        self.register(id, path);
        self
    }

    fn read(path: &Path) -> Result<Vec<u8>, FetchError> {
        trace!(?path, "Reading image source");
        std::fs::read(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                FetchError::NotFound(path.display().to_string())
            } else {
                FetchError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    fn url_path(url: &str) -> Result<PathBuf, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        match url.split_once("://") {
            Some((scheme, _)) => Err(FetchError::Unsupported(format!(
                "{} urls need a network fetcher: {}",
                scheme, url
            ))),
            None => Ok(PathBuf::from(url)),
        }
    }
}

impl Fetcher for FsFetcher {
    fn fetch(&self, source: &ImageSource) -> Result<Vec<u8>, FetchError> {
        match source {
            ImageSource::Local(id) => {
                let path = self
                    .resources
                    .get(id)
                    .ok_or_else(|| FetchError::NotFound(id.to_string()))?;
                Self::read(path)
            }
            ImageSource::Remote(url) => Self::read(&Self::url_path(url)?),
        }
    }
}
