use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "topology-forge")]
#[command(
    about = "Compile a device inventory, deploy configurations and roll back to golden snapshots",
    long_about = None
)]
pub struct Cli {
    /// Tabular source of truth (overrides REQUIREMENTS_CSV)
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Run one named action instead of the full pipeline
    #[arg(long)]
    pub action: Option<String>,

    /// Submitted rows for the merge action
    #[arg(long)]
    pub rows: Option<PathBuf>,

    /// Merge policy: overwrite or update
    #[arg(long, default_value = "update")]
    pub policy: String,

    /// Address every device must reach after deployment (repeatable)
    #[arg(long = "ping")]
    pub ping: Vec<String>,

    /// Check BGP neighbors during health_check
    #[arg(long)]
    pub bgp: bool,

    /// Route lookup term for health_check
    #[arg(long)]
    pub route: Option<String>,
}

/// Named entry points selectable with `--action`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TopologyConfig,
    RollbackConfig,
    GoldenPull,
    Merge,
    VerifiedConfig,
    HealthCheck,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopologyConfig => "topology_config",
            Self::RollbackConfig => "rollback_config",
            Self::GoldenPull => "golden_pull",
            Self::Merge => "merge",
            Self::VerifiedConfig => "verified_config",
            Self::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "topology_config" => Ok(Self::TopologyConfig),
            "rollback_config" => Ok(Self::RollbackConfig),
            "golden_pull" => Ok(Self::GoldenPull),
            "merge" => Ok(Self::Merge),
            "verified_config" => Ok(Self::VerifiedConfig),
            "health_check" => Ok(Self::HealthCheck),
            other => Err(PipelineError::InvalidArgument(format!("unknown action: {}", other))),
        }
    }
}
