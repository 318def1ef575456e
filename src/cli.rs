//! Command Line Interface (CLI) arguments.

use byte_unit::Byte;
use clap::Parser;

use crate::error::Imars3dError;

/// imars3d command line interface
#[derive(Clone, Debug, Parser)]
#[command(version, about = "Run a neutron imaging CT reduction workflow")]
pub struct CommandLineArgs {
    /// Path to the task graph (.yaml, .yml or .json)
    #[arg(env = "IMARS3D_GRAPH")]
    pub graph: String,
    /// JSON document bound to `config` in the initial context
    #[arg(long, env = "IMARS3D_CONTEXT")]
    pub context: Option<String>,
    /// Maximum number of worker threads
    #[arg(long, env = "IMARS3D_WORKER_LIMIT")]
    pub worker_limit: Option<usize>,
    /// Number of CPUs left free for the coordinator and the operating system
    #[arg(long, default_value_t = 1, env = "IMARS3D_RESERVED_CPUS")]
    pub reserved_cpus: usize,
    /// Limit on memory used for staged image stacks, e.g. 8GiB
    #[arg(long, env = "IMARS3D_MEMORY_LIMIT")]
    pub memory_limit: Option<String>,
    /// Write Prometheus metrics to this file when the run finishes
    #[arg(long, env = "IMARS3D_METRICS_FILE")]
    pub metrics_file: Option<String>,
    /// Validate the task graph without running it
    #[arg(long, default_value_t = false, env = "IMARS3D_VALIDATE_ONLY")]
    pub validate_only: bool,
}

impl CommandLineArgs {
    /// Memory limit in bytes, if one was given.
    pub fn memory_limit_bytes(&self) -> Result<Option<usize>, Imars3dError> {
        self.memory_limit
            .as_deref()
            .map(|limit| -> Result<usize, Imars3dError> {
                Ok(usize::try_from(Byte::parse_str(limit, true)?.as_u64())?)
            })
            .transpose()
    }
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
