//! Persistent asset store.
//!
//! Resolved assets land in type-partitioned directories under
//! `<output_root>/assets/` (`images/`, `audio/`), named by their spec id.
//! Each partition gets its own manifest (`manifest_images.json`,
//! `manifest_audio.json`) listing every spec's outcome, placeholders
//! included, so downstream tooling never has to guess what was acquired.

use crate::assets::{AssetResult, AssetSearch, AssetSpec, AssetType};
use crate::errors::AssetError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One manifest row. `reference` is either a path relative to the output
/// root or the documented placeholder reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub spec_id: String,
    pub success: bool,
    pub reference: String,
    pub relaxation_level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn partition_dir(&self, asset_type: AssetType) -> PathBuf {
        self.root.join("assets").join(asset_type.subdir())
    }

    /// Create the type-partitioned directories.
    pub fn ensure_directories(&self) -> Result<(), AssetError> {
        fs::create_dir_all(self.partition_dir(AssetType::Image))?;
        fs::create_dir_all(self.partition_dir(AssetType::Audio))?;
        Ok(())
    }

    /// Download a resolved candidate and write it into its partition,
    /// recording the local path on the result. Placeholder results are
    /// left untouched; they carry a reference, not a file.
    pub async fn persist(
        &self,
        search: &dyn AssetSearch,
        spec: &AssetSpec,
        result: &mut AssetResult,
    ) -> Result<(), AssetError> {
        let Some(resolved) = result.resolved.as_mut() else {
            return Ok(());
        };

        let format = resolved
            .url
            .rsplit('.')
            .next()
            .filter(|ext| ext.len() <= 4)
            .unwrap_or(match spec.asset_type {
                AssetType::Image => "png",
                AssetType::Audio => "mp3",
            });
        let path = self
            .partition_dir(spec.asset_type)
            .join(format!("{}.{}", spec.id, format));

        let candidate = crate::assets::Candidate {
            id: resolved.candidate_id.clone(),
            name: resolved.name.clone(),
            url: resolved.url.clone(),
            format: format.to_string(),
            license: resolved.license.clone(),
            duration_secs: resolved.duration_secs,
        };
        let bytes = search.download(&candidate).await?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &bytes)?;
        info!(spec = %spec.id, path = %path.display(), bytes = bytes.len(), "asset stored");

        resolved.path = Some(path);
        Ok(())
    }

    /// Write both partition manifests from the full result set.
    pub fn write_manifests(
        &self,
        specs: &[AssetSpec],
        results: &[AssetResult],
    ) -> Result<(), AssetError> {
        for asset_type in [AssetType::Image, AssetType::Audio] {
            let entries: Vec<ManifestEntry> = results
                .iter()
                .filter(|r| r.asset_type == asset_type)
                .map(|r| self.manifest_entry(specs, r))
                .collect();

            let name = match asset_type {
                AssetType::Image => "manifest_images.json",
                AssetType::Audio => "manifest_audio.json",
            };
            let path = self.root.join("assets").join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&entries)
                .map_err(|e| AssetError::Search(format!("manifest encode failed: {}", e)))?;
            fs::write(&path, json)?;
        }
        Ok(())
    }

    fn manifest_entry(&self, specs: &[AssetSpec], result: &AssetResult) -> ManifestEntry {
        let reference = match &result.resolved {
            Some(resolved) => resolved
                .path
                .as_ref()
                .and_then(|p| p.strip_prefix(&self.root).ok())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| resolved.url.clone()),
            None => specs
                .iter()
                .find(|s| s.id == result.spec_id)
                .map(AssetResult::placeholder_reference)
                .unwrap_or_else(|| format!("assets/placeholders/{}", result.spec_id)),
        };

        ManifestEntry {
            spec_id: result.spec_id.clone(),
            success: result.success,
            reference,
            relaxation_level: result.relaxation_level,
            license: result.resolved.as_ref().map(|r| r.license.clone()),
            duration_secs: result.resolved.as_ref().and_then(|r| r.duration_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Candidate, ResolvedAsset};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct ByteSearch;

    #[async_trait]
    impl AssetSearch for ByteSearch {
        async fn search(
            &self,
            _asset_type: AssetType,
            _query: &str,
        ) -> Result<Vec<Candidate>, AssetError> {
            Ok(Vec::new())
        }

        async fn download(&self, _candidate: &Candidate) -> Result<Vec<u8>, AssetError> {
            Ok(b"RIFFdata".to_vec())
        }
    }

    fn audio_spec(id: &str) -> AssetSpec {
        AssetSpec {
            id: id.to_string(),
            asset_type: AssetType::Audio,
            terms: vec!["music".to_string()],
            min_duration_secs: None,
            max_duration_secs: None,
            formats: Vec::new(),
            licenses: Vec::new(),
        }
    }

    fn resolved_result(spec: &AssetSpec) -> AssetResult {
        AssetResult {
            spec_id: spec.id.clone(),
            asset_type: spec.asset_type,
            success: true,
            relaxation_level: 0,
            resolved: Some(ResolvedAsset {
                candidate_id: "7".to_string(),
                name: "loop".to_string(),
                url: "http://x/7.mp3".to_string(),
                license: "CC0".to_string(),
                duration_secs: Some(40.0),
                path: None,
            }),
            placeholder: false,
            trace: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_persist_writes_into_type_partition() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());
        store.ensure_directories().unwrap();

        let spec = audio_spec("bgm");
        let mut result = resolved_result(&spec);
        store.persist(&ByteSearch, &spec, &mut result).await.unwrap();

        let path = result.resolved.unwrap().path.unwrap();
        assert!(path.ends_with("assets/audio/bgm.mp3"));
        assert_eq!(fs::read(&path).unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn test_persist_skips_placeholder_results() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());

        let spec = audio_spec("bgm");
        let mut result = AssetResult {
            resolved: None,
            success: false,
            placeholder: true,
            ..resolved_result(&spec)
        };
        store.persist(&ByteSearch, &spec, &mut result).await.unwrap();
        assert!(result.resolved.is_none());
    }

    #[tokio::test]
    async fn test_manifests_cover_successes_and_placeholders() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());
        store.ensure_directories().unwrap();

        let ok_spec = audio_spec("bgm");
        let mut ok = resolved_result(&ok_spec);
        store.persist(&ByteSearch, &ok_spec, &mut ok).await.unwrap();

        let missed_spec = audio_spec("sfx-jump");
        let missed = AssetResult {
            spec_id: missed_spec.id.clone(),
            resolved: None,
            success: false,
            placeholder: true,
            ..resolved_result(&missed_spec)
        };

        let specs = vec![ok_spec, missed_spec];
        store.write_manifests(&specs, &[ok, missed]).unwrap();

        let manifest: Vec<ManifestEntry> = serde_json::from_str(
            &fs::read_to_string(dir.path().join("assets/manifest_audio.json")).unwrap(),
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(manifest[0].success);
        assert_eq!(manifest[0].reference, "assets/audio/bgm.mp3");
        assert!(!manifest[1].success);
        assert_eq!(
            manifest[1].reference,
            "assets/placeholders/sfx-jump.mp3"
        );

        // Image manifest exists and is empty
        let images: Vec<ManifestEntry> = serde_json::from_str(
            &fs::read_to_string(dir.path().join("assets/manifest_images.json")).unwrap(),
        )
        .unwrap();
        assert!(images.is_empty());
    }
}
