//! Asynchronous loading of named image assets (overlay textures, SMAA
//! lookup tables).
//!
//! Decoding runs on tokio's blocking pool, one task per asset. A failed
//! asset is logged and recorded; it only becomes an error when an effect
//! asks for it through [`AssetBundle::require`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;

use lumen_core::{LumenError, LumenResult, Surface};

use crate::image_loader;
use crate::smaa::lookup::{AREA_ASSET, AREA_FILE, SEARCH_ASSET, SEARCH_FILE};

#[derive(Debug, Clone, Default)]
pub struct AssetLoader {
    requests: Vec<(String, PathBuf)>,
}

impl AssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.requests.push((name.into(), path.into()));
        self
    }

    /// Request `smaa-search.png` and `smaa-area.png` from `dir`.
    pub fn with_smaa_lookup(self, dir: &Path) -> Self {
        self.add(SEARCH_ASSET, dir.join(SEARCH_FILE))
            .add(AREA_ASSET, dir.join(AREA_FILE))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Load every requested asset concurrently.
    pub async fn load(self) -> AssetBundle {
        let mut tasks = JoinSet::new();
        for (name, path) in self.requests {
            tasks.spawn(async move {
                let result = tokio::task::spawn_blocking({
                    let path = path.clone();
                    move || image_loader::load_surface(&path)
                })
                .await
                .map_err(|e| LumenError::asset(format!("loader task failed: {e}"), &path))
                .and_then(|r| r);
                (name, path, result)
            });
        }

        let mut bundle = AssetBundle::default();
        while let Some(joined) = tasks.join_next().await {
            let (name, path, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!("asset task panicked: {e}");
                    continue;
                }
            };
            match result {
                Ok(surface) => {
                    tracing::debug!(asset = %name, path = %path.display(), "loaded asset");
                    bundle.insert(name, surface);
                }
                Err(e) => {
                    tracing::warn!(asset = %name, path = %path.display(), "failed to load asset: {e}");
                    bundle.failures.insert(name, e.to_string());
                }
            }
        }
        tracing::info!(
            loaded = bundle.assets.len(),
            failed = bundle.failures.len(),
            "asset loading finished"
        );
        bundle
    }

    /// [`AssetLoader::load`] on a private runtime, for synchronous callers.
    pub fn load_blocking(self) -> LumenResult<AssetBundle> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.load()))
    }
}

/// Assets that finished loading, plus the reasons others did not.
#[derive(Debug, Clone, Default)]
pub struct AssetBundle {
    assets: HashMap<String, Arc<Surface>>,
    failures: HashMap<String, String>,
}

impl AssetBundle {
    pub fn get(&self, name: &str) -> Option<Arc<Surface>> {
        self.assets.get(name).cloned()
    }

    pub fn require(&self, name: &str, required_by: &str) -> LumenResult<Arc<Surface>> {
        self.get(name)
            .ok_or_else(|| LumenError::missing_asset(name, required_by))
    }

    pub fn insert(&mut self, name: impl Into<String>, surface: Surface) {
        let name = name.into();
        self.failures.remove(&name);
        self.assets.insert(name, Arc::new(surface));
    }

    pub fn failures(&self) -> &HashMap<String, String> {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_files_are_recorded_not_fatal() {
        let bundle = AssetLoader::new()
            .add("nope", "/nonexistent/lumen/nope.png")
            .load()
            .await;
        assert!(bundle.is_empty());
        assert!(bundle.failures().contains_key("nope"));
        let err = bundle.require("nope", "texture").unwrap_err();
        assert!(matches!(err, LumenError::MissingAsset { .. }));
    }

    #[test]
    fn test_insert_clears_failure() {
        let mut bundle = AssetBundle::default();
        bundle.failures.insert("map".into(), "boom".into());
        bundle.insert("map", Surface::new(1, 1));
        assert!(bundle.failures().is_empty());
        assert_eq!(bundle.require("map", "texture").unwrap().size(), (1, 1));
    }
}
