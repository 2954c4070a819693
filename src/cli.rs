use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "toolkit",
    version,
    about = "Terminal browser for tenants, limits, models, GPU pools and dedicated AI clusters."
)]
pub struct CliArgs {
    /// Root of the source-of-truth repository
    #[arg(long)]
    pub repo_path: Option<PathBuf>,

    /// Environment type (dev, preprod, prod)
    #[arg(long)]
    pub env_type: Option<String>,

    /// Region identifier, for example us-chicago-1
    #[arg(long)]
    pub env_region: Option<String>,

    /// Realm identifier, for example oc1
    #[arg(long)]
    pub env_realm: Option<String>,

    /// Path to the kubeconfig used for GPU nodes and dedicated AI clusters
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Starting category alias
    #[arg(short, long)]
    pub category: Option<String>,

    /// Starting filter text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Append logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// text or json
    #[arg(long)]
    pub log_format: Option<String>,

    /// Force debug logging
    #[arg(long)]
    pub debug: bool,

    /// Config file (YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
