//! Process CLI, grounded on the teacher's `RunOpts`: one `clap::Parser`
//! struct, `env` overrides on every flag, and a `Color`-style enum with a
//! hand-rolled `FromStr` for the log-format toggles.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use derive_more::{Display, Error};

#[derive(Debug, Clone, Copy)]
pub enum Color {
    Off,
    Auto,
    On,
}

impl FromStr for Color {
    type Err = NoColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "on" | "true" => Ok(Self::On),
            "0" | "off" | "false" => Ok(Self::Off),
            "auto" => Ok(Self::Auto),
            _ => Err(NoColor),
        }
    }
}

#[derive(Debug, Display, Error)]
#[display(fmt = "allowed values are 1, on, true, 0, off, false, auto (case insensitive)")]
pub struct NoColor;

/// One `--adapter HOST:PORT@DEVICE` flag. Parsed by hand rather than via
/// `clap::ValueEnum` since its shape (host, port, device name) is
/// domain-specific rather than an enumerated choice.
#[derive(Debug, Clone)]
pub struct AdapterArg {
    pub host: String,
    pub port: u16,
    pub device_name: String,
}

#[derive(Debug, Display, Error)]
#[display(fmt = "expected HOST:PORT@DEVICE, got '{}'", _0)]
pub struct AdapterArgParseError(String);

impl FromStr for AdapterArg {
    type Err = AdapterArgParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hostport, device_name) = s.split_once('@').ok_or_else(|| AdapterArgParseError(s.to_string()))?;
        let (host, port) = hostport.rsplit_once(':').ok_or_else(|| AdapterArgParseError(s.to_string()))?;
        let port: u16 = port.parse().map_err(|_| AdapterArgParseError(s.to_string()))?;
        Ok(AdapterArg { host: host.to_string(), port, device_name: device_name.to_string() })
    }
}

#[derive(clap::Parser, Debug, Clone)]
#[command(
    name = "agentd",
    about = "run an MTConnect agent",
    after_help = "For one-off log verbosity override, you may start with the environment variable \
        RUST_LOG set to \u{201c}debug\u{201d} or \u{201c}agentd=debug,info\u{201d} (the former logs all debug messages \
        while the latter logs at debug level for the \u{201c}agentd\u{201d} module and info level for everything else).",
    rename_all = "kebab-case"
)]
pub struct RunOpts {
    /// Path to the device configuration describing the devices, components
    /// and data items this agent serves.
    #[arg(
        long,
        env = "AGENTD_DEVICE_CONFIG",
        long_help = "Path to the device configuration file. Parsing the real MTConnect device-XML \
            format is out of scope for this crate; see `device_config.rs` for the minimal structured \
            format accepted here."
    )]
    pub device_config: PathBuf,

    /// Repeatable: one SHDR adapter to connect to, as HOST:PORT@DEVICE.
    #[arg(long = "adapter", env = "AGENTD_ADAPTERS", value_delimiter = ',')]
    pub adapters: Vec<AdapterArg>,

    /// Address the HTTP surface binds to.
    #[arg(long, env = "AGENTD_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    #[arg(long, env = "AGENTD_BUFFER_SIZE", default_value_t = 131_072)]
    pub buffer_size: usize,

    #[arg(long, env = "AGENTD_MAX_ASSETS", default_value_t = 1024)]
    pub max_assets: usize,

    #[arg(long, env = "AGENTD_CHECKPOINT_FREQUENCY")]
    pub checkpoint_frequency: Option<usize>,

    #[arg(long, env = "AGENTD_RECONNECT_INTERVAL_MS", default_value_t = 10_000)]
    pub reconnect_interval_ms: u64,

    #[arg(long, env = "AGENTD_LEGACY_TIMEOUT_MS", default_value_t = 600_000)]
    pub legacy_timeout_ms: u64,

    #[arg(long, env = "AGENTD_IGNORE_TIMESTAMPS")]
    pub ignore_timestamps: bool,

    #[arg(long, env = "AGENTD_UPCASE_DATA_ITEM_VALUE")]
    pub upcase_data_item_value: bool,

    #[arg(long, env = "AGENTD_NO_FILTER_DUPLICATES")]
    pub no_filter_duplicates: bool,

    /// Control whether to use ANSI color sequences in log output.
    #[arg(
        long,
        env = "AGENTD_LOG_COLOR",
        long_help = "Control whether to use ANSI color sequences in log output. Valid values \
            (case insensitive) are 1, true, on, 0, false, off, auto (auto only uses colour when \
            stderr is a terminal). Defaults to auto."
    )]
    pub log_color: Option<Color>,

    /// Output logs as JSON objects (one per line).
    #[arg(long, env = "AGENTD_LOG_JSON")]
    pub log_json: Option<Color>,
}
