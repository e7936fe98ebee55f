use crate::error::Result;
use crate::fitness::ChannelWeights;
use crate::mutation::MutationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Probability(String),
    #[error("{field} must satisfy 0 < min <= max (got {min}..{max})")]
    Range {
        field: &'static str,
        min: i64,
        max: i64,
    },
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("channel weights must be finite and non-negative")]
    Weights,
}

/// Everything a coordinator, peer or local run needs to know. Loaded from
/// YAML; every field may be omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Image to approximate. Every participant needs the same file.
    pub target: PathBuf,
    /// Where snapshots of the elite are written.
    pub output: PathBuf,
    /// Edge length of the blank canvas used when `target` can't be read.
    pub fallback_size: u32,
    /// Accepted improvements between snapshots.
    pub save_every: u64,
    /// Local worker threads. Defaults to the available parallelism.
    pub workers: Option<usize>,
    /// Trials each worker runs per peer round.
    pub batch_size: usize,
    pub listen: String,
    pub coordinator: String,
    /// Re-score genomes returned by peers instead of trusting their claim.
    pub verify_scores: bool,
    pub weights: ChannelWeights,
    pub mutation: MutationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target: PathBuf::from("target.png"),
            output: PathBuf::from("evolution.png"),
            fallback_size: 200,
            save_every: 20,
            workers: None,
            batch_size: 50,
            listen: "0.0.0.0:8080".to_owned(),
            coordinator: "localhost:8080".to_owned(),
            verify_scores: false,
            weights: ChannelWeights::default(),
            mutation: MutationConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let string = fs::read_to_string(path)?;
        let settings: Self = serde_yaml::from_str(&string)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.fallback_size == 0 {
            return Err(ConfigError::NotPositive("fallback_size"));
        }
        if self.save_every == 0 {
            return Err(ConfigError::NotPositive("save_every"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::NotPositive("batch_size"));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::NotPositive("workers"));
        }
        let ChannelWeights { r, g, b } = self.weights;
        if [r, g, b].iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Weights);
        }
        self.mutation.validate()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
