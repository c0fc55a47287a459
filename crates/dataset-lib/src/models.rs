//! Core data models shared across the pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp column of raw exports and of every derived table
pub const TIME_COLUMN: &str = "_time";

/// Metric-name column of raw long-format exports
pub const FIELD_COLUMN: &str = "_field";

/// Value column of raw long-format exports
pub const VALUE_COLUMN: &str = "_value";

/// Extension shared by raw exports and persisted tables
pub const CSV_SUFFIX: &str = ".csv";

/// Sub-directory of a source directory holding normalized intermediates
pub const PROCESSED_DIR: &str = "processed";

/// Monitoring sources the normalizer knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Container energy counters
    Kepler,
    /// Container resource usage
    K8s,
    /// Virtual machine resource usage
    Proxmox,
    /// Host power draw from power distribution units
    Pdu,
    /// Host and VM power telemetry arriving in one directory
    Scaphandre,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Kepler,
        SourceKind::K8s,
        SourceKind::Proxmox,
        SourceKind::Pdu,
        SourceKind::Scaphandre,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Kepler => "kepler",
            SourceKind::K8s => "k8s",
            SourceKind::Proxmox => "proxmox",
            SourceKind::Pdu => "pdu",
            SourceKind::Scaphandre => "scaphandre",
        }
    }

    /// Default file name of the persisted intermediate
    pub fn default_output_name(&self) -> String {
        format!("{}_processed{}", self.as_str(), CSV_SUFFIX)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown source kind `{}`", s))
    }
}

/// Row and column counts of a table at one point of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub rows: usize,
    pub columns: usize,
}
