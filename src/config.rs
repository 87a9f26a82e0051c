use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Call graph construction algorithm, from least to most precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Static,
    Cha,
    Rta,
    Vta,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Static => "static",
            Algorithm::Cha => "cha",
            Algorithm::Rta => "rta",
            Algorithm::Vta => "vta",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(Algorithm::Static),
            "cha" => Ok(Algorithm::Cha),
            "rta" => Ok(Algorithm::Rta),
            "vta" => Ok(Algorithm::Vta),
            other => Err(AnalysisError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Splits a comma-separated ignore list, trimming entries and dropping empty ones.
pub fn parse_ignore_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub root: PathBuf,
    pub algorithm: Algorithm,
    pub ignore_paths: Vec<String>,
    /// `None` makes both graph channels unbounded. A zero capacity is treated as `None`.
    pub channel_capacity: Option<usize>,
}

impl AnalysisConfig {
    pub fn new(root: impl Into<PathBuf>, algorithm: Algorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
            ignore_paths: Vec::new(),
            channel_capacity: Some(DEFAULT_CHANNEL_CAPACITY),
        }
    }

    /// Builds a config from raw selector strings; an unknown algorithm fails here,
    /// before anything is loaded.
    pub fn from_selectors(root: impl Into<PathBuf>, algorithm: &str, ignore: &str) -> Result<Self> {
        let algorithm = algorithm.parse::<Algorithm>()?;
        Ok(Self::new(root, algorithm).with_ignore_paths(parse_ignore_paths(ignore)))
    }

    pub fn with_ignore_paths(mut self, ignore_paths: Vec<String>) -> Self {
        self.ignore_paths = ignore_paths;
        self
    }

    /// `None` or `Some(0)` makes both channels unbounded.
    pub fn with_channel_capacity(mut self, capacity: Option<usize>) -> Self {
        self.channel_capacity = capacity.filter(|&cap| cap > 0);
        self
    }
}

/// On-disk TOML configuration. Every key is optional; CLI flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub algo: Option<String>,
    pub ignore: Option<String>,
    pub channel_capacity: Option<usize>,
    pub database: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| AnalysisError::Config(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_paths_are_trimmed_and_empty_entries_dropped() {
        assert_eq!(
            parse_ignore_paths(" a/b , ,c,, d "),
            vec!["a/b".to_string(), "c".to_string(), "d".to_string()]
        );
        assert!(parse_ignore_paths("").is_empty());
        assert!(parse_ignore_paths(" , ").is_empty());
    }

    #[test]
    fn zero_channel_capacity_means_unbounded() {
        let config = AnalysisConfig::new(".", Algorithm::Cha).with_channel_capacity(Some(0));
        assert_eq!(config.channel_capacity, None);
        let config = config.with_channel_capacity(Some(8));
        assert_eq!(config.channel_capacity, Some(8));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = "pointer".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedAlgorithm(ref a) if a == "pointer"));
        assert!(AnalysisConfig::from_selectors(".", "CHA", "").is_err());
    }

    #[test]
    fn algorithms_round_trip_through_display() {
        for algo in [Algorithm::Static, Algorithm::Cha, Algorithm::Rta, Algorithm::Vta] {
            assert_eq!(algo.to_string().parse::<Algorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn file_config_reads_known_keys() {
        let cfg = FileConfig::parse(
            "root = \"./svc\"\nalgo = \"rta\"\nignore = \"a, b\"\nchannel_capacity = 8\n",
        )
        .unwrap();
        assert_eq!(cfg.root, Some(PathBuf::from("./svc")));
        assert_eq!(cfg.algo.as_deref(), Some("rta"));
        assert_eq!(cfg.channel_capacity, Some(8));
        assert!(FileConfig::parse("colour = 1").is_err());
    }
}
