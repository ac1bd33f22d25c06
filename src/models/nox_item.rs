use std::fmt;

use thiserror::Error;

/// Opaque handle to an image bundled with the application.
///
/// Handles are resolved to real files by a [`crate::loader::Fetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res:{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("a NoxItem needs either a url or a resource id")]
    MissingSource,
    #[error("a NoxItem can't be created with both a url and a resource id")]
    AmbiguousSource,
    #[error("the url used to create a NoxItem can't be empty")]
    EmptyUrl,
}

/// Where the image of an item comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    Remote(String),
    Local(ResourceId),
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Local(id) => write!(f, "{}", id),
        }
    }
}

/// One displayable entry of a [`crate::NoxView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoxItem {
    source: ImageSource,
    placeholder: Option<ResourceId>,
}

impl NoxItem {
    /// Create an item whose image is downloaded from `url`.
    pub fn from_url(url: impl Into<String>) -> Result<Self, ItemError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ItemError::EmptyUrl);
        }
        Ok(Self {
            source: ImageSource::Remote(url),
            placeholder: None,
        })
    }

    /// Create an item backed by a local resource.
    pub fn from_resource(resource: ResourceId) -> Self {
        Self {
            source: ImageSource::Local(resource),
            placeholder: None,
        }
    }

    /// Create an item from optional parts. Exactly one of `url` and
    /// `resource` has to be present.
    pub fn new(url: Option<String>, resource: Option<ResourceId>) -> Result<Self, ItemError> {
        match (url, resource) {
            (Some(url), None) => Self::from_url(url),
            (None, Some(resource)) => Ok(Self::from_resource(resource)),
            (None, None) => Err(ItemError::MissingSource),
            (Some(_), Some(_)) => Err(ItemError::AmbiguousSource),
        }
    }

    pub fn with_placeholder(mut self, placeholder: ResourceId) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn url(&self) -> Option<&str> {
        match &self.source {
            ImageSource::Remote(url) => Some(url),
            ImageSource::Local(_) => None,
        }
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        match self.source {
            ImageSource::Local(id) => Some(id),
            ImageSource::Remote(_) => None,
        }
    }

    pub fn placeholder_id(&self) -> Option<ResourceId> {
        self.placeholder
    }

    pub fn has_url(&self) -> bool {
        self.url().is_some()
    }

    pub fn has_resource_id(&self) -> bool {
        self.resource_id().is_some()
    }
}
