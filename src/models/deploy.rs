use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::PipelineError;

/// One device to push a configuration file to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub hostname: String,
    pub address: String,
    pub config_path: PathBuf,
}

impl DeployTarget {
    pub fn new(hostname: &str, address: &str, config_path: impl Into<PathBuf>) -> Self {
        Self {
            hostname: hostname.to_string(),
            address: address.to_string(),
            config_path: config_path.into(),
        }
    }
}

/// Per-device outcome of one deployment run.
///
/// `results` holds every device a task was started for; `skipped` holds
/// devices rejected before any connection (missing file, no snapshot).
#[derive(Debug, Default)]
pub struct DeployReport {
    pub results: BTreeMap<String, Result<String, PipelineError>>,
    pub skipped: BTreeMap<String, PipelineError>,
}

impl DeployReport {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }

    pub fn failed_hostnames(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(h, _)| h.as_str())
            .collect()
    }

    /// Flatten into serializable rows, one per device
    pub fn summary(&self) -> Vec<DeviceSummary> {
        let mut rows: Vec<DeviceSummary> = self
            .results
            .iter()
            .map(|(hostname, result)| match result {
                Ok(_) => DeviceSummary {
                    hostname: hostname.clone(),
                    status: "ok",
                    error_kind: None,
                    detail: None,
                },
                Err(e) => DeviceSummary {
                    hostname: hostname.clone(),
                    status: "failed",
                    error_kind: Some(e.kind()),
                    detail: Some(e.to_string()),
                },
            })
            .collect();

        rows.extend(self.skipped.iter().map(|(hostname, reason)| DeviceSummary {
            hostname: hostname.clone(),
            status: "skipped",
            error_kind: Some(reason.kind()),
            detail: Some(reason.to_string()),
        }));
        rows
    }
}

/// DeviceSummary is one line of the run report
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub hostname: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
