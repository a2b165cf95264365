use clap::Parser;

/// Shares this device's GPS fixes with a peer over UDP and logs peer positions.
///
/// Fixes are read from stdin, one `<latitude> <longitude>` pair per line.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Stop after this many seconds instead of at end of input.
    #[arg(long)]
    pub duration: Option<u64>,

    #[arg(short, long, default_value_t = log::LevelFilter::Info)]
    pub logging_level: log::LevelFilter,

    #[arg(long)]
    pub config_file: std::path::PathBuf,

    /// Overrides `[identity] callsign`.
    #[arg(long)]
    pub callsign: Option<String>,

    /// Overrides `[peer] address`.
    #[arg(long)]
    pub peer: Option<String>,
}
