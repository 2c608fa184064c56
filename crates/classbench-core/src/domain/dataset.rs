//! Dataset definitions and the catalog of datasets known to the harness.

use serde::{Deserialize, Serialize};

/// A named classification task with a fixed, ordered class list.
///
/// The class order is the canonical ordering for per-class reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSpec {
    /// Directory name under the source and corpus roots.
    pub name: String,

    /// Human-readable description handed to classifiers.
    pub description: String,

    /// Ordered class identifiers.
    pub classes: Vec<String>,
}

impl DatasetSpec {
    /// Create a new dataset definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        classes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `label` is one of this dataset's classes (exact match).
    pub fn has_class(&self, label: &str) -> bool {
        self.classes.iter().any(|c| c == label)
    }
}

/// Ordered collection of dataset definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetCatalog {
    pub datasets: Vec<DatasetSpec>,
}

impl DatasetCatalog {
    pub fn new(datasets: Vec<DatasetSpec>) -> Self {
        Self { datasets }
    }

    /// Look up a dataset by name.
    pub fn get(&self, name: &str) -> Option<&DatasetSpec> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// Dataset names in lexicographic order.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl Default for DatasetCatalog {
    /// The two plant-pathology datasets the harness ships with.
    fn default() -> Self {
        Self::new(vec![
            DatasetSpec::new(
                "Foliar_Disease_Stress",
                "Mango Leaf Diseases",
                [
                    "Anthracnose",
                    "Bacterial_Canker",
                    "Cutting_Weevil",
                    "Die_Back",
                    "Gall_Midge",
                    "Powdery_Mildew",
                    "Sooty_Mould",
                ],
            ),
            DatasetSpec::new(
                "Disease_Severity",
                "Yellow Rust Severity Levels",
                [
                    "Resistant_R",
                    "Moderately_Resistant_MR",
                    "MRMS",
                    "Moderately_Susceptible_MS",
                    "Susceptible_S",
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_lists_both_datasets() {
        let catalog = DatasetCatalog::default();
        assert_eq!(
            catalog.sorted_names(),
            vec!["Disease_Severity", "Foliar_Disease_Stress"]
        );
        let severity = catalog.get("Disease_Severity").expect("present");
        assert_eq!(severity.classes.len(), 5);
        assert_eq!(severity.classes[0], "Resistant_R");
    }

    #[test]
    fn has_class_is_case_sensitive() {
        let spec = DatasetSpec::new("d", "desc", ["Anthracnose"]);
        assert!(spec.has_class("Anthracnose"));
        assert!(!spec.has_class("anthracnose"));
    }
}
