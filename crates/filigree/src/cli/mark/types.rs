//! CLI enum types for the mark command: topology and report format.

use clap::ValueEnum;
use filigree_core::Topology;

/// Worker topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TopologyArg {
    /// One thread, one image at a time
    Sequential,
    /// Shared queue and thread pool per stage
    StagedPool,
    /// Each worker runs a private load → mark → save pipe
    FarmOfPipes,
    /// Load, mark and save farms chained together
    PipeOfFarms,
}

impl From<TopologyArg> for Topology {
    fn from(arg: TopologyArg) -> Self {
        match arg {
            TopologyArg::Sequential => Topology::Sequential,
            TopologyArg::StagedPool => Topology::StagedPool,
            TopologyArg::FarmOfPipes => Topology::FarmOfPipes,
            TopologyArg::PipeOfFarms => Topology::PipeOfFarms,
        }
    }
}

/// How the run report is printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary on stderr
    #[default]
    Text,
    /// JSON report on stdout
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}
