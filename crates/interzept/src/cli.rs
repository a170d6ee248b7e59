use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "interzept",
    version,
    about = "Authorize and account RPC calls read as JSON lines from stdin"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "interzept.yaml")]
    pub config: PathBuf,

    /// Path to the authorization policy file (overrides config file setting)
    #[arg(short, long)]
    pub policy: Option<PathBuf>,

    /// Seconds between policy file reloads (overrides config file setting)
    #[arg(long)]
    pub refresh_secs: Option<u64>,

    /// Accounting export file (overrides config file setting)
    #[arg(long)]
    pub records: Option<PathBuf>,
}
