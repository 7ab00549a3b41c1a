//! Code-split asset manifest.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Kind of a bundled asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Style,
}

impl AssetKind {
    /// Infer the kind from a file name; unknown extensions are not emitted.
    pub fn from_file(file: &str) -> Option<Self> {
        let file = file.split(['?', '#']).next().unwrap_or(file);
        if file.ends_with(".js") || file.ends_with(".mjs") {
            Some(Self::Script)
        } else if file.ends_with(".css") {
            Some(Self::Style)
        } else {
            None
        }
    }
}

/// A resolved asset URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    pub kind: AssetKind,
}

/// Error loading an asset manifest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid manifest: {0}")]
    Parse(String),
}

/// Build manifest mapping chunk names to emitted files.
///
/// ```json
/// {
///   "publicPath": "/static/",
///   "entrypoints": ["client"],
///   "chunks": { "client": ["client.js", "client.css"], "home": ["home.js"] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetManifest {
    /// Prefix joined to every file name.
    pub public_path: String,
    /// Chunks every page needs, emitted before any route chunk.
    pub entrypoints: Vec<String>,
    /// Files emitted for each chunk.
    pub chunks: BTreeMap<String, Vec<String>>,
}

impl AssetManifest {
    /// Parse a manifest from JSON.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Set the public path.
    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = public_path.into();
        self
    }

    /// Register a chunk's files.
    pub fn with_chunk(mut self, name: &str, files: &[&str]) -> Self {
        self.chunks
            .insert(name.to_string(), files.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Mark a chunk as an entrypoint.
    pub fn with_entrypoint(mut self, name: &str) -> Self {
        if !self.entrypoints.iter().any(|e| e == name) {
            self.entrypoints.push(name.to_string());
        }
        self
    }

    /// Resolve the assets for a render that used `chunks`.
    ///
    /// Entrypoints come first, then used chunks in the order they were
    /// reported. Each URL appears once; unknown chunks are skipped.
    pub fn assets_for(&self, chunks: &[String]) -> Vec<Asset> {
        let mut seen = HashSet::new();
        let mut assets = Vec::new();

        for name in self.entrypoints.iter().chain(chunks) {
            let Some(files) = self.chunks.get(name) else {
                continue;
            };
            for file in files {
                let Some(kind) = AssetKind::from_file(file) else {
                    continue;
                };
                let url = self.url_for(file);
                if seen.insert(url.clone()) {
                    assets.push(Asset { url, kind });
                }
            }
        }
        assets
    }

    fn url_for(&self, file: &str) -> String {
        if file.starts_with('/') || file.contains("://") || self.public_path.is_empty() {
            return file.to_string();
        }
        if self.public_path.ends_with('/') {
            format!("{}{}", self.public_path, file)
        } else {
            format!("{}/{}", self.public_path, file)
        }
    }
}

/// Request-scoped record of the code-split chunks a render touched.
#[derive(Debug, Clone, Default)]
pub struct ChunkCollector {
    used: Arc<Mutex<Vec<String>>>,
}

impl ChunkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a chunk was rendered.
    pub fn mark(&self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        let mut used = self.lock();
        if !used.contains(&chunk) {
            used.push(chunk);
        }
    }

    /// Chunks recorded so far, in first-use order.
    pub fn used(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> AssetManifest {
        AssetManifest::default()
            .with_public_path("/static/")
            .with_chunk("client", &["client.js", "client.css"])
            .with_chunk("home", &["home.js", "client.css", "home.js.map"])
            .with_chunk("about", &["about.js"])
            .with_entrypoint("client")
    }

    #[test]
    fn test_entrypoints_first_then_used_chunks() {
        let assets = manifest().assets_for(&["home".to_string()]);
        let urls: Vec<_> = assets.iter().map(|a| a.url.as_str()).collect();

        assert_eq!(urls, vec!["/static/client.js", "/static/client.css", "/static/home.js"]);
        assert_eq!(assets[1].kind, AssetKind::Style);
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let assets = manifest().assets_for(&["missing".to_string()]);
        assert_eq!(assets.len(), 2);
    }

    #[test]
    fn test_manifest_from_json() {
        let manifest = AssetManifest::from_json(
            r#"{"publicPath":"/assets","entrypoints":["main"],"chunks":{"main":["main.js"]}}"#,
        )
        .unwrap();
        assert_eq!(manifest.assets_for(&[])[0].url, "/assets/main.js");

        assert!(matches!(
            AssetManifest::from_json("[]"),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_collector_keeps_first_use_order() {
        let chunks = ChunkCollector::new();
        chunks.mark("home");
        chunks.mark("about");
        chunks.mark("home");
        assert_eq!(chunks.used(), vec!["home", "about"]);
    }
}
