//! Loading of external files: shader sources, meshes, textures and JSON.
//!
//! On native targets paths are resolved against an asset root and read with
//! `tokio::fs`. On the web they are fetched relative to the page origin.
//! [`ResourceCache`] fetches every path once and keeps the result.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

pub mod mesh;

/// How the bytes behind a path are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Text,
    Binary,
    Structured,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Text(String),
    Binary(Vec<u8>),
    Structured(serde_json::Value),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Text(_) => ResourceKind::Text,
            Resource::Binary(_) => ResourceKind::Binary,
            Resource::Structured(_) => ResourceKind::Structured,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to fetch `{path}`: {message}")]
    Fetch { path: String, message: String },
    #[error("`{path}` is not valid UTF-8: {source}")]
    Utf8 {
        path: String,
        source: std::string::FromUtf8Error,
    },
    #[error("`{path}` is not valid JSON: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("`{path}` was loaded as {found:?}, not {expected:?}")]
    Kind {
        path: String,
        expected: ResourceKind,
        found: ResourceKind,
    },
}

#[cfg(target_arch = "wasm32")]
fn format_url(root: &Path, file_name: &str) -> Result<reqwest::Url, ResourceError> {
    let fetch_error = |message: String| ResourceError::Fetch {
        path: file_name.to_string(),
        message,
    };
    let origin = web_sys::window()
        .ok_or_else(|| fetch_error("no window".to_string()))?
        .location()
        .origin()
        .map_err(|e| fetch_error(format!("{e:?}")))?;
    let base = reqwest::Url::parse(&format!("{}/{}/", origin, root.display()))
        .map_err(|e| fetch_error(e.to_string()))?;
    base.join(file_name).map_err(|e| fetch_error(e.to_string()))
}

/// Reads the raw bytes behind `file_name`.
pub async fn load_binary(root: &Path, file_name: &str) -> Result<Vec<u8>, ResourceError> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(root, file_name)?;
        let fetch_error = |e: reqwest::Error| ResourceError::Fetch {
            path: file_name.to_string(),
            message: e.to_string(),
        };
        reqwest::get(url)
            .await
            .map_err(fetch_error)?
            .bytes()
            .await
            .map_err(fetch_error)?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = tokio::fs::read(root.join(file_name))
        .await
        .map_err(|source| ResourceError::Io {
            path: file_name.to_string(),
            source,
        })?;

    Ok(data)
}

pub async fn load_string(root: &Path, file_name: &str) -> Result<String, ResourceError> {
    let data = load_binary(root, file_name).await?;
    String::from_utf8(data).map_err(|source| ResourceError::Utf8 {
        path: file_name.to_string(),
        source,
    })
}

/// Fetch-once store of resources keyed by their path.
#[derive(Debug, Default)]
pub struct ResourceCache {
    root: PathBuf,
    entries: HashMap<String, Resource>,
}

impl ResourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads `path` as `kind` unless it is already cached.
    ///
    /// A cached entry is returned as is, even if it was loaded as a different
    /// kind. Failed loads are not cached.
    pub async fn load(&mut self, kind: ResourceKind, path: &str) -> Result<&Resource, ResourceError> {
        if !self.entries.contains_key(path) {
            let resource = match kind {
                ResourceKind::Binary => Resource::Binary(load_binary(&self.root, path).await?),
                ResourceKind::Text => Resource::Text(load_string(&self.root, path).await?),
                ResourceKind::Structured => {
                    let text = load_string(&self.root, path).await?;
                    let value = serde_json::from_str(&text).map_err(|source| ResourceError::Json {
                        path: path.to_string(),
                        source,
                    })?;
                    Resource::Structured(value)
                }
            };
            log::debug!("loaded {kind:?} resource `{path}`");
            self.entries.insert(path.to_string(), resource);
        }
        self.entries
            .get(path)
            .ok_or_else(|| ResourceError::Fetch {
                path: path.to_string(),
                message: "vanished from the cache".to_string(),
            })
    }

    /// An already loaded resource.
    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.entries.get(path)
    }

    /// Stores a resource that did not come from the asset root.
    pub fn insert(&mut self, path: impl Into<String>, resource: Resource) -> Option<Resource> {
        self.entries.insert(path.into(), resource)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mismatch(path: &str, expected: ResourceKind, found: &Resource) -> ResourceError {
        ResourceError::Kind {
            path: path.to_string(),
            expected,
            found: found.kind(),
        }
    }

    pub async fn text(&mut self, path: &str) -> Result<&str, ResourceError> {
        match self.load(ResourceKind::Text, path).await? {
            Resource::Text(text) => Ok(text),
            other => Err(Self::mismatch(path, ResourceKind::Text, other)),
        }
    }

    pub async fn binary(&mut self, path: &str) -> Result<&[u8], ResourceError> {
        match self.load(ResourceKind::Binary, path).await? {
            Resource::Binary(bytes) => Ok(bytes),
            other => Err(Self::mismatch(path, ResourceKind::Binary, other)),
        }
    }

    pub async fn json(&mut self, path: &str) -> Result<&serde_json::Value, ResourceError> {
        match self.load(ResourceKind::Structured, path).await? {
            Resource::Structured(value) => Ok(value),
            other => Err(Self::mismatch(path, ResourceKind::Structured, other)),
        }
    }
}
