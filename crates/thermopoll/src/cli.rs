//! Clap derive structures for the `thermopoll` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// thermopoll -- poll and control local heat-pump controllers
#[derive(Debug, Parser)]
#[command(
    name = "thermopoll",
    version,
    about = "Poll and control local heat-pump controllers",
    long_about = "Reads telemetry and properties from unauthenticated local heat-pump\n\
        controllers, writes settings, and runs a rate-limited batch poller\n\
        for every configured sensor.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configured device to use
    #[arg(long, short = 'd', env = "THERMOPOLL_DEVICE", global = true)]
    pub device: Option<String>,

    /// Device base URL (overrides the configured one)
    #[arg(long, env = "THERMOPOLL_URL", global = true)]
    pub url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "THERMOPOLL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show device identity (serial, model, firmware)
    Info,

    /// Read a single data point
    #[command(alias = "r")]
    Read(ReadArgs),

    /// Write a single property
    #[command(alias = "w")]
    Write(WriteArgs),

    /// Show or update the live dashboard
    #[command(alias = "dash")]
    Dashboard(DashboardArgs),

    /// Show or update the thermal profile
    Profile(ProfileArgs),

    /// Reset the device
    Reset,

    /// Poll configured sensors and print each cycle until Ctrl-C
    Watch(WatchArgs),

    /// Manage CLI configuration and devices
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Decoding ─────────────────────────────────────────────────────────

/// How a raw value is decoded.
#[derive(Debug, Clone, Copy, Args)]
pub struct DecodeArgs {
    /// Value width in bytes (1 or 2)
    #[arg(long, short = 'b', default_value = "1")]
    pub bytes: u8,

    /// Interpret the value as two's complement
    #[arg(long, short = 's')]
    pub signed: bool,

    /// Multiply the raw value by this factor
    #[arg(long, default_value = "1.0")]
    pub scale: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  READ / WRITE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[command(subcommand)]
    pub command: ReadCommand,
}

#[derive(Debug, Subcommand)]
pub enum ReadCommand {
    /// Read a telemetry value
    #[command(alias = "t")]
    Telemetry {
        /// Telemetry id
        id: u16,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    /// Read a property value
    #[command(alias = "p")]
    Property {
        /// Property path, e.g. 1.2.3
        path: String,

        #[command(flatten)]
        decode: DecodeArgs,
    },
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    #[command(subcommand)]
    pub command: WriteCommand,
}

#[derive(Debug, Subcommand)]
pub enum WriteCommand {
    /// Encode and write a property value
    #[command(alias = "p")]
    Property {
        /// Property path, e.g. 1.2.3
        path: String,

        /// New value (before scaling)
        #[arg(allow_hyphen_values = true)]
        value: f64,

        #[command(flatten)]
        decode: DecodeArgs,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AGGREGATES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[command(subcommand)]
    pub command: Option<DashboardCommand>,
}

#[derive(Debug, Subcommand)]
pub enum DashboardCommand {
    /// Show the dashboard (default)
    Show,

    /// Update writable dashboard fields; unset flags stay unchanged
    Set {
        /// Operating mode code
        #[arg(long)]
        mode: Option<u8>,

        /// Room setpoint in °C
        #[arg(long, allow_hyphen_values = true)]
        room_setpoint: Option<f64>,

        /// Hot water setpoint in °C
        #[arg(long)]
        hot_water_setpoint: Option<f64>,
    },
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Show the thermal profile
    Show,

    /// Update thermal profile fields; unset flags stay unchanged
    Set {
        /// Comfort temperature in °C
        #[arg(long)]
        comfort: Option<f64>,

        /// Eco temperature in °C
        #[arg(long)]
        eco: Option<f64>,

        /// Frost protection temperature in °C
        #[arg(long, allow_hyphen_values = true)]
        frost_protection: Option<f64>,

        /// Heating curve slope
        #[arg(long)]
        curve_slope: Option<f64>,

        /// Heating curve offset
        #[arg(long, allow_hyphen_values = true)]
        curve_offset: Option<f64>,

        /// Enable or disable the schedule
        #[arg(long)]
        schedule: Option<bool>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between cycles (overrides defaults.batch_interval_secs)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Stop after this many cycles
    #[arg(long, short = 'n')]
    pub count: Option<u64>,

    /// Extra telemetry ids to poll (raw unsigned byte)
    #[arg(long = "telemetry", short = 't', value_delimiter = ',')]
    pub telemetry: Vec<u16>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the current resolved configuration
    Show,

    /// Create or extend the config file with a device
    Init {
        /// Device name
        #[arg(long)]
        name: Option<String>,

        /// Device base URL (prompted for when omitted)
        #[arg(long = "device-url")]
        device_url: Option<String>,

        /// Replace an existing device of the same name
        #[arg(long)]
        force: bool,
    },

    /// List configured devices
    Devices,

    /// Set the default device
    Use {
        /// Device name to set as default
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
