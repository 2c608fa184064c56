//! Ground-truth manifest and corpus metadata documents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BenchError, Result};

/// File name of the per-dataset manifest.
pub const MANIFEST_FILE: &str = "ground_truth.json";

/// File name of the corpus-wide metadata document.
pub const METADATA_FILE: &str = "metadata.json";

/// Directory holding anonymized images inside a dataset corpus.
pub const IMAGES_DIR: &str = "images";

/// One anonymized item in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Anonymous identifier, e.g. `item_001`.
    pub id: String,

    /// True label.
    pub label: String,

    /// Anonymized image file name under `images/`.
    pub file_name: String,

    /// Source path kept for audit; never shown to a classifier.
    pub original_path: PathBuf,
}

/// Authoritative id → label mapping for one dataset's corpus.
///
/// `items` is stored in evaluation order (post-shuffle).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundTruthManifest {
    pub dataset_name: String,
    pub description: String,
    pub expected_classes: Vec<String>,
    pub items: Vec<ManifestEntry>,
}

/// An anonymized example as exposed to the run controller.
///
/// The label stays with the harness; adapters only ever receive the image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationItem {
    pub id: String,
    pub image_path: PathBuf,
    pub true_label: String,
}

impl GroundTruthManifest {
    /// Path of the manifest inside a dataset corpus directory.
    pub fn path_in(dataset_dir: &Path) -> PathBuf {
        dataset_dir.join(MANIFEST_FILE)
    }

    /// Load the manifest from a dataset corpus directory.
    pub fn load(dataset_dir: &Path) -> Result<Self> {
        let path = Self::path_in(dataset_dir);
        if !path.is_file() {
            return Err(BenchError::missing_corpus(path));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the manifest into a dataset corpus directory.
    pub fn save(&self, dataset_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path_in(dataset_dir), content)?;
        Ok(())
    }

    /// Evaluation items in manifest order, with image paths rooted at `dataset_dir`.
    pub fn evaluation_items(&self, dataset_dir: &Path) -> Vec<EvaluationItem> {
        let images = dataset_dir.join(IMAGES_DIR);
        self.items
            .iter()
            .map(|e| EvaluationItem {
                id: e.id.clone(),
                image_path: images.join(&e.file_name),
                true_label: e.label.clone(),
            })
            .collect()
    }

    /// id → true label lookup.
    pub fn labels(&self) -> BTreeMap<&str, &str> {
        self.items
            .iter()
            .map(|e| (e.id.as_str(), e.label.as_str()))
            .collect()
    }

    /// SHA-256 over the ordered (id, label) pairs and class list.
    ///
    /// Stable across rebuilds with the same seed and inventory; changes when
    /// the selection or ordering changes.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dataset_name.as_bytes());
        hasher.update(b"\0");
        for class in &self.expected_classes {
            hasher.update(class.as_bytes());
            hasher.update(b"\0");
        }
        for entry in &self.items {
            hasher.update(entry.id.as_bytes());
            hasher.update(b"=");
            hasher.update(entry.label.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Per-dataset summary in the corpus metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSummary {
    pub description: String,
    pub num_classes: usize,
    pub num_images: usize,
    pub classes: Vec<String>,
    pub manifest_digest: String,
}

/// Top-level corpus metadata document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusMetadata {
    pub total_images: usize,
    pub images_per_class: usize,
    pub seed: u64,
    pub datasets: BTreeMap<String, DatasetSummary>,
}

impl CorpusMetadata {
    pub fn load(corpus_root: &Path) -> Result<Self> {
        let path = corpus_root.join(METADATA_FILE);
        if !path.is_file() {
            return Err(BenchError::missing_corpus(path));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, corpus_root: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(corpus_root.join(METADATA_FILE), content)?;
        Ok(())
    }
}

/// Dataset directories under `corpus_root` that hold a manifest, sorted by name.
pub fn discover_datasets(corpus_root: &Path) -> Result<Vec<String>> {
    if !corpus_root.is_dir() {
        return Err(BenchError::missing_corpus(corpus_root));
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(corpus_root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> GroundTruthManifest {
        GroundTruthManifest {
            dataset_name: "Leaves".to_string(),
            description: "Leaf diseases".to_string(),
            expected_classes: vec!["A".to_string(), "B".to_string()],
            items: vec![
                ManifestEntry {
                    id: "item_001".to_string(),
                    label: "B".to_string(),
                    file_name: "item_001.jpg".to_string(),
                    original_path: PathBuf::from("/src/B/x.jpg"),
                },
                ManifestEntry {
                    id: "item_002".to_string(),
                    label: "A".to_string(),
                    file_name: "item_002.png".to_string(),
                    original_path: PathBuf::from("/src/A/y.png"),
                },
            ],
        }
    }

    #[test]
    fn evaluation_items_keep_manifest_order() {
        let items = manifest().evaluation_items(Path::new("/corpus/Leaves"));
        assert_eq!(items[0].id, "item_001");
        assert_eq!(items[0].true_label, "B");
        assert_eq!(
            items[1].image_path,
            PathBuf::from("/corpus/Leaves/images/item_002.png")
        );
    }

    #[test]
    fn digest_is_order_sensitive() {
        let a = manifest();
        let mut b = manifest();
        b.items.reverse();
        assert_eq!(a.digest(), manifest().digest());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn save_and_load_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        manifest().save(dir.path()).expect("save");
        let loaded = GroundTruthManifest::load(dir.path()).expect("load");
        assert_eq!(loaded, manifest());
    }

    #[test]
    fn load_missing_manifest_is_missing_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = GroundTruthManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, BenchError::MissingArtifact { .. }));
    }

    #[test]
    fn discover_datasets_sorts_and_filters() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["Zeta", "Alpha"] {
            let d = dir.path().join(name);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join(MANIFEST_FILE), "{}").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("NoManifest")).unwrap();
        let names = discover_datasets(dir.path()).expect("discover");
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }
}
