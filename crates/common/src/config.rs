use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MAX_TRANSITIVE_DEPTH: u32 = 10;

/// Query-time multiplicative weights per searchable field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoostConfig {
    pub entity_name: f32,
    pub doc_summary: f32,
    pub content: f32,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            entity_name: 3.0,
            doc_summary: 2.0,
            content: 1.0,
        }
    }
}

impl BoostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("entity_name", self.entity_name),
            ("doc_summary", self.doc_summary),
            ("content", self.content),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Boost { field, value });
            }
        }
        Ok(())
    }
}

/// Fusion weights for the keyword and vector branches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HybridWeights {
    #[serde(alias = "keyword_weight")]
    pub keyword: f32,
    #[serde(alias = "vector_weight")]
    pub vector: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            keyword: 0.6,
            vector: 0.4,
        }
    }
}

impl HybridWeights {
    pub const SUM_TOLERANCE: f64 = 1e-9;

    pub fn new(keyword: f32, vector: f32) -> Result<Self, ConfigError> {
        let weights = Self { keyword, vector };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |w: f32| w.is_finite() && (0.0..=1.0).contains(&w);
        let sum = f64::from(self.keyword) + f64::from(self.vector);
        if !in_range(self.keyword)
            || !in_range(self.vector)
            || (sum - 1.0).abs() > Self::SUM_TOLERANCE
        {
            return Err(ConfigError::Weights {
                keyword: self.keyword,
                vector: self.vector,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransitiveConfig {
    pub default_depth: u32,
    pub max_depth: u32,
}

impl Default for TransitiveConfig {
    fn default() -> Self {
        Self {
            default_depth: 5,
            max_depth: MAX_TRANSITIVE_DEPTH,
        }
    }
}

impl TransitiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for value in [self.default_depth, self.max_depth] {
            if !(1..=MAX_TRANSITIVE_DEPTH).contains(&value) {
                return Err(ConfigError::Depth {
                    value,
                    max: MAX_TRANSITIVE_DEPTH,
                });
            }
        }
        if self.default_depth > self.max_depth {
            return Err(ConfigError::Depth {
                value: self.default_depth,
                max: self.max_depth,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorConfig {
    pub dimension: usize,
    pub ef_search: usize,
    pub batch_size: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            ef_search: 40,
            batch_size: 100,
        }
    }
}

impl VectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("vector.dimension", self.dimension),
            ("vector.ef_search", self.ef_search),
            ("vector.batch_size", self.batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::PositiveInt { field, value });
            }
        }
        Ok(())
    }
}

/// Process-wide search configuration, resolved once at startup and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub boost: BoostConfig,
    pub hybrid: HybridWeights,
    pub transitive: TransitiveConfig,
    pub vector: VectorConfig,
    pub index_directory: String,
    pub graph_uri: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            boost: BoostConfig::default(),
            hybrid: HybridWeights::default(),
            transitive: TransitiveConfig::default(),
            vector: VectorConfig::default(),
            index_directory: "./data/index".to_string(),
            graph_uri: None,
        }
    }
}

impl SearchConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides, then validate. Serving must not start on
    /// a validation failure.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
            toml::from_str::<Self>(&raw)
                .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("CODEQUARRY_INDEX_DIR") {
            cfg.index_directory = dir;
        }
        if let Ok(uri) = std::env::var("CODEQUARRY_GRAPH_URI") {
            cfg.graph_uri = Some(uri).filter(|value| !value.trim().is_empty());
        }
        if let Ok(weight) = std::env::var("CODEQUARRY_KEYWORD_WEIGHT") {
            cfg.hybrid.keyword = weight.parse().unwrap_or(cfg.hybrid.keyword);
        }
        if let Ok(weight) = std::env::var("CODEQUARRY_VECTOR_WEIGHT") {
            cfg.hybrid.vector = weight.parse().unwrap_or(cfg.hybrid.vector);
        }
        if let Ok(ef) = std::env::var("CODEQUARRY_EF_SEARCH") {
            cfg.vector.ef_search = ef.parse().unwrap_or(cfg.vector.ef_search);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.boost.validate()?;
        self.hybrid.validate()?;
        self.transitive.validate()?;
        self.vector.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{BoostConfig, HybridWeights, SearchConfig, TransitiveConfig};

    #[test]
    fn loads_default_when_file_missing() {
        let cfg = SearchConfig::load(std::path::Path::new("does-not-exist.toml")).expect("config");
        assert_eq!(cfg.boost.entity_name, 3.0);
        assert_eq!(cfg.hybrid.keyword, 0.6);
        assert_eq!(cfg.transitive.default_depth, 5);
        assert_eq!(cfg.vector.batch_size, 100);
        assert_eq!(cfg.index_directory, "./data/index");
    }

    #[test]
    fn loads_partial_toml_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("codequarry-config-test-{}.toml", std::process::id()));
        fs::write(
            &path,
            "index_directory='/tmp/idx'\n[boost]\nentity_name=4.5\n[hybrid]\nkeyword=0.5\nvector=0.5\n",
        )
        .expect("write");

        let cfg = SearchConfig::load(path.as_path()).expect("config");
        assert_eq!(cfg.index_directory, "/tmp/idx");
        assert_eq!(cfg.boost.entity_name, 4.5);
        assert_eq!(cfg.boost.doc_summary, 2.0);
        assert_eq!(cfg.hybrid.keyword, 0.5);
    }

    #[test]
    fn rejects_non_positive_boost() {
        let boost = BoostConfig {
            entity_name: 0.0,
            ..BoostConfig::default()
        };
        boost.validate().expect_err("zero boost");

        let boost = BoostConfig {
            content: f32::NAN,
            ..BoostConfig::default()
        };
        boost.validate().expect_err("non-finite boost");
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        HybridWeights::new(0.7, 0.4).expect_err("sum above one");
        HybridWeights::new(-0.1, 1.1).expect_err("out of range");
        HybridWeights::new(0.6, 0.4).expect("valid");
        HybridWeights::new(1.0, 0.0).expect("keyword only");
    }

    #[test]
    fn rejects_out_of_range_depths() {
        let transitive = TransitiveConfig {
            default_depth: 0,
            max_depth: 10,
        };
        transitive.validate().expect_err("zero depth");

        let transitive = TransitiveConfig {
            default_depth: 7,
            max_depth: 3,
        };
        transitive.validate().expect_err("default above max");
    }
}
