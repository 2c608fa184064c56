//! Deterministic corpus sampling and anonymization.
//!
//! A corpus build draws `min(per_class, available)` source images per class,
//! shuffles the whole selection, and only then assigns sequential anonymous
//! identifiers, so identifier order carries no label signal. Per-class draws
//! and the final shuffle consume one seeded stream in a fixed order: classes
//! in catalog order, then the shuffle.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::{HarnessConfig, MissingClassPolicy, SamplingConfig};
use crate::domain::{
    CorpusMetadata, DatasetCatalog, DatasetSpec, DatasetSummary, GroundTruthManifest,
    ManifestEntry, IMAGES_DIR,
};
use crate::error::{BenchError, Result};

/// Image extensions picked up from the source tree (compared lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A labeled source image before anonymization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub path: PathBuf,
    pub label: String,
}

/// Source images grouped by label, each group sorted by path.
pub type Inventory = BTreeMap<String, Vec<SourceItem>>;

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// List `<source_root>/<dataset>/<label>/*` images.
///
/// A missing dataset directory yields an empty inventory. Groups are sorted
/// by path so the result does not depend on directory iteration order.
pub fn scan_inventory(source_root: &Path, dataset: &str) -> Result<Inventory> {
    let dataset_dir = source_root.join(dataset);
    let mut inventory = Inventory::new();
    if !dataset_dir.is_dir() {
        return Ok(inventory);
    }

    for class_entry in std::fs::read_dir(&dataset_dir)? {
        let class_dir = class_entry?.path();
        if !class_dir.is_dir() {
            continue;
        }
        let Some(label) = class_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let mut items = Vec::new();
        for file in std::fs::read_dir(&class_dir)? {
            let path = file?.path();
            if path.is_file() && is_image(&path) {
                items.push(SourceItem {
                    path,
                    label: label.clone(),
                });
            }
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));
        inventory.insert(label, items);
    }
    Ok(inventory)
}

/// Draw per-class samples and shuffle them, all from one seeded stream.
///
/// Returns the selection in evaluation order. Labels present in the
/// inventory but absent from the class list are ignored.
pub fn select_items(
    dataset: &DatasetSpec,
    inventory: &Inventory,
    sampling: &SamplingConfig,
) -> Result<Vec<SourceItem>> {
    let mut rng = StdRng::seed_from_u64(sampling.seed);
    let mut selected = Vec::new();

    for class in &dataset.classes {
        let pool = inventory.get(class).map(Vec::as_slice).unwrap_or(&[]);
        if pool.is_empty() {
            match sampling.missing_class_policy {
                MissingClassPolicy::Skip => {
                    warn!(dataset = %dataset.name, class = %class, "No source images for class; sampling zero");
                    continue;
                }
                MissingClassPolicy::Fail => {
                    return Err(BenchError::Sampling {
                        dataset: dataset.name.clone(),
                        reason: format!("class {class} has no source images"),
                    });
                }
            }
        }
        let take = sampling.per_class.min(pool.len());
        debug!(dataset = %dataset.name, class = %class, available = pool.len(), take, "Sampling class");
        selected.extend(
            index::sample(&mut rng, pool.len(), take)
                .into_iter()
                .map(|i| pool[i].clone()),
        );
    }

    for label in inventory.keys().filter(|l| !dataset.has_class(l)) {
        debug!(dataset = %dataset.name, label = %label, "Ignoring source directory outside the class list");
    }

    selected.shuffle(&mut rng);
    Ok(selected)
}

/// Assign `{prefix}_001, {prefix}_002, ...` in selection order.
///
/// Fails if any identifier contains a class name, since that would leak the
/// label space into what the classifier sees.
pub fn assign_ids(
    selection: Vec<SourceItem>,
    prefix: &str,
    classes: &[String],
) -> Result<Vec<(String, SourceItem)>> {
    selection
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let id = format!("{prefix}_{:03}", i + 1);
            if let Some(class) = classes.iter().find(|c| id.contains(c.as_str())) {
                return Err(BenchError::LabelLeak {
                    identifier: id,
                    class: class.clone(),
                });
            }
            Ok((id, item))
        })
        .collect()
}

/// Rebuild the corpus for one dataset.
///
/// Any previous `<corpus_root>/<dataset>` directory is removed first; nothing
/// from an earlier build survives.
pub fn build_dataset_corpus(
    config: &HarnessConfig,
    dataset: &DatasetSpec,
) -> Result<GroundTruthManifest> {
    info!(dataset = %dataset.name, description = %dataset.description, "Preparing dataset corpus");

    let inventory = scan_inventory(&config.source_root, &dataset.name)?;
    let available: usize = inventory.values().map(Vec::len).sum();
    info!(dataset = %dataset.name, available, "Scanned source images");

    let selection = select_items(dataset, &inventory, &config.sampling)?;
    let assigned = assign_ids(selection, &config.sampling.id_prefix, &dataset.classes)?;

    let dataset_dir = config.corpus_root.join(&dataset.name);
    if dataset_dir.exists() {
        std::fs::remove_dir_all(&dataset_dir)?;
    }
    let images_dir = dataset_dir.join(IMAGES_DIR);
    std::fs::create_dir_all(&images_dir)?;

    let mut items = Vec::with_capacity(assigned.len());
    for (id, source) in assigned {
        let file_name = match source.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{id}.{ext}"),
            None => id.clone(),
        };
        std::fs::copy(&source.path, images_dir.join(&file_name))?;
        debug!(dataset = %dataset.name, item = %id, label = %source.label, "Copied image");
        items.push(ManifestEntry {
            id,
            label: source.label,
            file_name,
            original_path: source.path,
        });
    }

    let manifest = GroundTruthManifest {
        dataset_name: dataset.name.clone(),
        description: dataset.description.clone(),
        expected_classes: dataset.classes.clone(),
        items,
    };
    manifest.save(&dataset_dir)?;
    info!(dataset = %dataset.name, images = manifest.items.len(), "Wrote ground truth manifest");
    Ok(manifest)
}

/// Rebuild the whole corpus: clear `corpus_root`, build every dataset, write metadata.
pub fn build_corpus(config: &HarnessConfig, catalog: &DatasetCatalog) -> Result<CorpusMetadata> {
    config.validate()?;
    guard_corpus_root(config)?;

    if config.corpus_root.exists() {
        std::fs::remove_dir_all(&config.corpus_root)?;
    }
    std::fs::create_dir_all(&config.corpus_root)?;

    let mut datasets = BTreeMap::new();
    let mut total_images = 0;
    for dataset in &catalog.datasets {
        let manifest = build_dataset_corpus(config, dataset)?;
        total_images += manifest.items.len();
        datasets.insert(
            dataset.name.clone(),
            DatasetSummary {
                description: dataset.description.clone(),
                num_classes: dataset.classes.len(),
                num_images: manifest.items.len(),
                classes: dataset.classes.clone(),
                manifest_digest: manifest.digest(),
            },
        );
    }

    let metadata = CorpusMetadata {
        total_images,
        images_per_class: config.sampling.per_class,
        seed: config.sampling.seed,
        datasets,
    };
    metadata.save(&config.corpus_root)?;
    info!(total_images, corpus = %config.corpus_root.display(), "Corpus prepared");
    Ok(metadata)
}

/// Clearing the corpus root must never touch the source images.
fn guard_corpus_root(config: &HarnessConfig) -> Result<()> {
    if config.corpus_root.as_os_str().is_empty() {
        return Err(BenchError::InvalidConfig("corpus root is empty".to_string()));
    }
    let corpus = resolve(&config.corpus_root)?;
    let source = resolve(&config.source_root)?;
    if source.starts_with(&corpus) {
        return Err(BenchError::InvalidConfig(format!(
            "corpus root {} would contain the source images at {}",
            config.corpus_root.display(),
            config.source_root.display()
        )));
    }
    Ok(())
}

/// Absolute form of `path` with `.` and `..` folded away. Existing paths are
/// canonicalized so symlinks compare by target.
fn resolve(path: &Path) -> Result<PathBuf> {
    if let Ok(real) = std::fs::canonicalize(path) {
        return Ok(real);
    }
    let mut resolved = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str, name: &str) -> SourceItem {
        SourceItem {
            path: PathBuf::from(format!("/src/{label}/{name}")),
            label: label.to_string(),
        }
    }

    fn inventory() -> Inventory {
        let mut inv = Inventory::new();
        inv.insert(
            "A".to_string(),
            (0..10).map(|i| item("A", &format!("a{i:02}.jpg"))).collect(),
        );
        inv.insert(
            "B".to_string(),
            (0..3).map(|i| item("B", &format!("b{i:02}.jpg"))).collect(),
        );
        inv
    }

    fn sampling(per_class: usize, seed: u64) -> SamplingConfig {
        SamplingConfig {
            per_class,
            seed,
            ..SamplingConfig::default()
        }
    }

    #[test]
    fn selection_is_deterministic_for_a_seed() {
        let dataset = DatasetSpec::new("d", "desc", ["A", "B"]);
        let a = select_items(&dataset, &inventory(), &sampling(4, 42)).unwrap();
        let b = select_items(&dataset, &inventory(), &sampling(4, 42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_usually_differ() {
        let dataset = DatasetSpec::new("d", "desc", ["A", "B"]);
        let a = select_items(&dataset, &inventory(), &sampling(4, 1)).unwrap();
        let b = select_items(&dataset, &inventory(), &sampling(4, 2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn per_class_count_is_capped_by_availability() {
        let dataset = DatasetSpec::new("d", "desc", ["A", "B"]);
        let selected = select_items(&dataset, &inventory(), &sampling(5, 42)).unwrap();
        let a = selected.iter().filter(|s| s.label == "A").count();
        let b = selected.iter().filter(|s| s.label == "B").count();
        assert_eq!(a, 5);
        assert_eq!(b, 3);
    }

    #[test]
    fn selection_has_no_duplicates() {
        let dataset = DatasetSpec::new("d", "desc", ["A", "B"]);
        let mut selected = select_items(&dataset, &inventory(), &sampling(10, 9)).unwrap();
        let before = selected.len();
        selected.sort_by(|a, b| a.path.cmp(&b.path));
        selected.dedup();
        assert_eq!(selected.len(), before);
        assert_eq!(before, 13);
    }

    #[test]
    fn missing_class_is_skipped_by_default() {
        let dataset = DatasetSpec::new("d", "desc", ["A", "B", "C"]);
        let selected = select_items(&dataset, &inventory(), &sampling(2, 42)).unwrap();
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|s| s.label != "C"));
    }

    #[test]
    fn missing_class_fails_under_strict_policy() {
        let dataset = DatasetSpec::new("d", "desc", ["A", "C"]);
        let strict = SamplingConfig {
            missing_class_policy: MissingClassPolicy::Fail,
            ..sampling(2, 42)
        };
        let err = select_items(&dataset, &inventory(), &strict).unwrap_err();
        assert!(matches!(err, BenchError::Sampling { .. }));
    }

    #[test]
    fn ids_are_sequential_and_label_free() {
        let selection = vec![item("Anthracnose", "x.jpg"), item("Die_Back", "y.jpg")];
        let classes = vec!["Anthracnose".to_string(), "Die_Back".to_string()];
        let assigned = assign_ids(selection, "item", &classes).unwrap();
        assert_eq!(assigned[0].0, "item_001");
        assert_eq!(assigned[1].0, "item_002");
        for (id, _) in &assigned {
            assert!(classes.iter().all(|c| !id.contains(c.as_str())));
        }
    }

    #[test]
    fn leaking_prefix_is_rejected() {
        let selection = vec![item("rust", "x.jpg")];
        let classes = vec!["rust".to_string()];
        let err = assign_ids(selection, "rust_sample", &classes).unwrap_err();
        assert!(matches!(err, BenchError::LabelLeak { .. }));
    }

    #[test]
    fn image_extension_filter_is_case_insensitive() {
        assert!(is_image(Path::new("a.JPG")));
        assert!(is_image(Path::new("a.jpeg")));
        assert!(is_image(Path::new("a.png")));
        assert!(!is_image(Path::new("a.txt")));
        assert!(!is_image(Path::new("noext")));
    }

    #[test]
    fn corpus_root_containing_sources_is_refused() {
        let config = HarnessConfig {
            source_root: PathBuf::from("/data/corpus/sources"),
            corpus_root: PathBuf::from("/data/corpus"),
            ..HarnessConfig::default()
        };
        assert!(guard_corpus_root(&config).is_err());
    }

    #[test]
    fn relative_corpus_root_over_sources_is_refused() {
        let config = HarnessConfig {
            source_root: PathBuf::from("Plant_Disease_Dataset"),
            corpus_root: PathBuf::from("."),
            ..HarnessConfig::default()
        };
        assert!(guard_corpus_root(&config).is_err());
    }

    #[test]
    fn parent_segments_are_resolved_before_comparing() {
        let config = HarnessConfig {
            source_root: PathBuf::from("/data/src"),
            corpus_root: PathBuf::from("/data/src/../"),
            ..HarnessConfig::default()
        };
        assert!(guard_corpus_root(&config).is_err());

        let same = HarnessConfig {
            source_root: PathBuf::from("/data/src"),
            corpus_root: PathBuf::from("/data/other/../src"),
            ..HarnessConfig::default()
        };
        assert!(guard_corpus_root(&same).is_err());
    }

    #[test]
    fn sibling_corpus_root_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("source")).unwrap();
        let config = HarnessConfig {
            source_root: tmp.path().join("source"),
            corpus_root: tmp.path().join("corpus"),
            ..HarnessConfig::default()
        };
        guard_corpus_root(&config).unwrap();

        let dotted = HarnessConfig {
            corpus_root: tmp.path().join("source/../corpus"),
            ..config
        };
        guard_corpus_root(&dotted).unwrap();
    }
}
