//! Configuration options.
//!
//! A single capture is analyzed per [`AnalysisConfig`]; unlike the teacher's
//! `RuntimeConfig` there is no online/offline split (this crate never reads
//! from a live interface) and no per-core/mempool tuning, since the pass is
//! single-threaded by design .

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Loads an [`AnalysisConfig`] from a TOML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<AnalysisConfig> {
    let config_str = fs::read_to_string(path)?;
    let config: AnalysisConfig = toml::from_str(&config_str)?;
    Ok(config)
}

/// Returns a default configuration pointed at `capture`.
///
/// For demonstration purposes only. Mirrors the teacher's
/// `config::default_config`, which assumes sane defaults for everything
/// except the input path.
pub fn default_config(capture: impl Into<PathBuf>) -> AnalysisConfig {
    AnalysisConfig {
        capture: capture.into(),
        seen_segment_cache: SeenSegmentCacheConfig::default(),
        evidence_cap: default_evidence_cap(),
        progress_granularity_pct: default_progress_granularity(),
        rules_path: None,
    }
}

/// Top-level analysis configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnalysisConfig {
    /// Path to the PCAP/PCAP-NG capture file to analyze.
    pub capture: PathBuf,

    /// Per-flow seen-segment cache sizing (retransmission detection).
    #[serde(default)]
    pub seen_segment_cache: SeenSegmentCacheConfig,

    /// Cap on the length of any single per-flow evidence packet-index list
    /// before it is marked overflowed (§9).
    #[serde(default = "default_evidence_cap")]
    pub evidence_cap: usize,

    /// Minimum percent-of-file-read delta between progress reports.
    #[serde(default = "default_progress_granularity")]
    pub progress_granularity_pct: f64,

    /// Optional path to a directory of rule YAML files overriding the
    /// embedded rule set. `None` uses the rules embedded at build time.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

/// Sizing for the per-flow [`SeenSegmentCache`](crate::conntrack::seen_cache::SeenSegmentCache).
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct SeenSegmentCacheConfig {
    /// Maximum number of (direction, seq, len) tuples retained per flow.
    pub capacity: usize,
    /// TTL in milliseconds from an entry's last-seen time.
    pub ttl_ms: i64,
}

impl Default for SeenSegmentCacheConfig {
    fn default() -> Self {
        SeenSegmentCacheConfig {
            capacity: 2048,
            ttl_ms: 3_000,
        }
    }
}

fn default_evidence_cap() -> usize {
    4096
}

fn default_progress_granularity() -> f64 {
    1.0
}
