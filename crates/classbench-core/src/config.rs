//! Harness configuration.
//!
//! One explicit [`HarnessConfig`] value is built at startup and passed to the
//! sampler, the run controller and the adapter constructors. Layering:
//! built-in defaults, then an optional TOML file, then environment variables.
//! The CLI applies its own flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DatasetCatalog, DatasetSpec};
use crate::error::{BenchError, Result};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "classbench.toml";

/// What the sampler does when a class has no source images.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingClassPolicy {
    /// Log a warning and sample zero items for the class.
    #[default]
    Skip,

    /// Abort the corpus build.
    Fail,
}

/// Output protocol of the agent CLI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputProtocol {
    /// One JSON result object on stdout.
    #[default]
    Json,

    /// Newline-delimited JSON events ending in a result event.
    StreamJson,
}

impl OutputProtocol {
    /// Value passed to the agent's `--output-format` flag.
    pub fn flag_value(&self) -> &'static str {
        match self {
            OutputProtocol::Json => "json",
            OutputProtocol::StreamJson => "stream-json",
        }
    }
}

/// Corpus sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Items drawn per class (capped by availability).
    pub per_class: usize,

    /// Seed for the single sampling/shuffle stream.
    pub seed: u64,

    /// Prefix of anonymous identifiers (`{prefix}_001`).
    pub id_prefix: String,

    pub missing_class_policy: MissingClassPolicy,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            per_class: 2,
            seed: 42,
            id_prefix: "item".to_string(),
            missing_class_policy: MissingClassPolicy::Skip,
        }
    }
}

/// Direct (single request) classifier settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DirectConfig {
    /// API key; usually supplied via `ANTHROPIC_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,

    /// Outer request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            max_tokens: 500,
            timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for DirectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl DirectConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Agentic (subprocess) classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable.
    pub program: PathBuf,

    pub model: String,

    /// Tools the agent may use; read-only tools only.
    pub allowed_tools: Vec<String>,

    /// Hard wall-clock bound per item in seconds.
    pub timeout_secs: u64,

    pub protocol: OutputProtocol,

    /// Working directory of the agent process.
    pub working_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("claude"),
            model: "haiku".to_string(),
            allowed_tools: vec!["Read".to_string()],
            timeout_secs: 180,
            protocol: OutputProtocol::Json,
            working_dir: PathBuf::from("."),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Labeled source images: `<source_root>/<dataset>/<class>/*.jpg`.
    pub source_root: PathBuf,

    /// Anonymized corpus output.
    pub corpus_root: PathBuf,

    /// Prediction files, logs and the report.
    pub results_root: PathBuf,

    /// Knowledge-base document read by the agent.
    pub knowledge_path: PathBuf,

    pub sampling: SamplingConfig,
    pub direct: DirectConfig,
    pub agent: AgentConfig,

    /// Dataset catalog; replaces the built-in catalog when non-empty.
    pub datasets: Vec<DatasetSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("Plant_Disease_Dataset"),
            corpus_root: PathBuf::from("test_data"),
            results_root: PathBuf::from("results"),
            knowledge_path: PathBuf::from("disease_symptoms.md"),
            sampling: SamplingConfig::default(),
            direct: DirectConfig::default(),
            agent: AgentConfig::default(),
            datasets: DatasetCatalog::default().datasets,
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional TOML file, then apply the process environment.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(p)?)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_toml_str(&std::fs::read_to_string(default_path)?)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|v| !v.is_empty()) {
            self.direct.api_key = Some(key);
        }
        if let Some(url) = lookup("CLASSBENCH_API_BASE_URL") {
            self.direct.base_url = url;
        }
        if let Some(model) = lookup("CLASSBENCH_DIRECT_MODEL") {
            self.direct.model = model;
        }
        if let Some(program) = lookup("CLASSBENCH_AGENT_PROGRAM") {
            self.agent.program = PathBuf::from(program);
        }
        if let Some(model) = lookup("CLASSBENCH_AGENT_MODEL") {
            self.agent.model = model;
        }
        if let Some(secs) = lookup("CLASSBENCH_AGENT_TIMEOUT_SECS") {
            self.agent.timeout_secs = parse_env("CLASSBENCH_AGENT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(dir) = lookup("CLASSBENCH_CORPUS_ROOT") {
            self.corpus_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CLASSBENCH_RESULTS_ROOT") {
            self.results_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CLASSBENCH_SOURCE_ROOT") {
            self.source_root = PathBuf::from(dir);
        }
        if let Some(path) = lookup("CLASSBENCH_KNOWLEDGE_PATH") {
            self.knowledge_path = PathBuf::from(path);
        }
        self.validate()
    }

    /// The dataset catalog in effect.
    pub fn catalog(&self) -> DatasetCatalog {
        if self.datasets.is_empty() {
            DatasetCatalog::default()
        } else {
            DatasetCatalog::new(self.datasets.clone())
        }
    }

    /// Reject values that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.per_class == 0 {
            return Err(BenchError::InvalidConfig(
                "sampling.per_class must be at least 1".to_string(),
            ));
        }
        if self.sampling.id_prefix.is_empty() {
            return Err(BenchError::InvalidConfig(
                "sampling.id_prefix must not be empty".to_string(),
            ));
        }
        if self.agent.timeout_secs == 0 {
            return Err(BenchError::InvalidConfig(
                "agent.timeout_secs must be at least 1".to_string(),
            ));
        }
        for dataset in &self.datasets {
            if dataset.classes.is_empty() {
                return Err(BenchError::InvalidConfig(format!(
                    "dataset {} has no classes",
                    dataset.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BenchError::InvalidConfig(format!("{key}={value:?} is not a valid number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_reference_setup() {
        let config = HarnessConfig::default();
        assert_eq!(config.sampling.per_class, 2);
        assert_eq!(config.sampling.seed, 42);
        assert_eq!(config.agent.timeout_secs, 180);
        assert_eq!(config.agent.allowed_tools, vec!["Read"]);
        assert_eq!(config.catalog().datasets.len(), 2);
    }

    #[test]
    fn toml_overrides_and_dataset_catalog() {
        let config = HarnessConfig::from_toml_str(
            r#"
            corpus_root = "/tmp/corpus"

            [sampling]
            per_class = 5
            seed = 7

            [agent]
            protocol = "stream_json"
            timeout_secs = 30

            [[datasets]]
            name = "Toy"
            description = "Toy dataset"
            classes = ["A", "B"]
            "#,
        )
        .expect("parse");

        assert_eq!(config.corpus_root, PathBuf::from("/tmp/corpus"));
        assert_eq!(config.sampling.per_class, 5);
        assert_eq!(config.sampling.seed, 7);
        assert_eq!(config.sampling.id_prefix, "item");
        assert_eq!(config.agent.protocol, OutputProtocol::StreamJson);
        assert_eq!(config.agent.timeout_secs, 30);
        assert_eq!(config.agent.model, "haiku");
        let catalog = config.catalog();
        assert_eq!(catalog.sorted_names(), vec!["Toy"]);
    }

    #[test]
    fn zero_per_class_is_rejected() {
        let err = HarnessConfig::from_toml_str("[sampling]\nper_class = 0\n").unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("CLASSBENCH_AGENT_TIMEOUT_SECS", "5"),
            ("CLASSBENCH_RESULTS_ROOT", "/tmp/results"),
        ]);
        let mut config = HarnessConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .expect("apply env");
        assert_eq!(config.direct.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.agent.timeout_secs, 5);
        assert_eq!(config.results_root, PathBuf::from("/tmp/results"));
    }

    #[test]
    fn bad_env_number_is_invalid_config() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_env(|k| (k == "CLASSBENCH_AGENT_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CLASSBENCH_AGENT_TIMEOUT_SECS"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut direct = DirectConfig::default();
        direct.api_key = Some("sk-secret".to_string());
        let rendered = format!("{direct:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
