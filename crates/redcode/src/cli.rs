//! Clap derive structures for the `redcode` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. This
//! file is also compiled by `build.rs` for man pages, so it depends on
//! nothing but clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// redcode -- hospital code-alarm station
#[derive(Debug, Parser)]
#[command(
    name = "redcode",
    version,
    about = "Raise, watch and resolve hospital code alarms from the terminal",
    long_about = "A station for facility-wide code alarms.\n\n\
        Every station watches the shared alert store, sounds the active\n\
        alert, acknowledges it once and counts down to its expiry.",
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
    /// Station profile to use
    #[arg(long, short = 'p', env = "REDCODE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Store project URL (overrides profile)
    #[arg(long, short = 'u', env = "REDCODE_URL", global = true)]
    pub url: Option<String>,

    /// Store API key
    #[arg(long, env = "REDCODE_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Receiver id of this station (overrides profile)
    #[arg(long, short = 'r', env = "REDCODE_RECEIVER", global = true)]
    pub receiver: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "REDCODE_OUTPUT",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "REDCODE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "REDCODE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
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

// ── Policy Enums ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StopPolicyArg {
    /// Resolve the alert for every station
    Global,
    /// Silence this station only; expiry still resolves it
    LocalOnly,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RacePolicyArg {
    /// A newer alert replaces the displayed one
    PreferNewest,
    /// Keep the displayed alert until it ends
    HoldCurrent,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run this station: sound, acknowledge and count down active alerts
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Raise a new alert for every station
    Raise(RaiseArgs),

    /// Mark an alert resolved for every station
    Resolve(ResolveArgs),

    /// Browse alert history
    #[command(alias = "a")]
    Alerts(AlertsArgs),

    /// List acknowledgments of an alert
    Acks(AcksArgs),

    /// Run an offline drill against an in-memory store
    Drill(DrillArgs),

    /// Show the category to clip table
    Sounds,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared lifecycle overrides ───────────────────────────────────────

/// Station behaviour overrides shared by `watch` and `drill`.
#[derive(Debug, Args)]
pub struct LifecycleOpts {
    /// Alert expiry window (e.g. "60s", "2m")
    #[arg(long)]
    pub expiry: Option<String>,

    /// What a manual stop does
    #[arg(long, value_enum)]
    pub manual_stop: Option<StopPolicyArg>,

    /// How to react to a new alert while one is displayed
    #[arg(long, value_enum)]
    pub race: Option<RacePolicyArg>,

    /// Start with audio blocked until the `sound` command is entered
    #[arg(long)]
    pub muted: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub lifecycle: LifecycleOpts,

    /// Write logs to a daily rolling file in this directory
    #[arg(long, env = "REDCODE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RAISE / RESOLVE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RaiseArgs {
    /// Category code or slug ("red-1", "blue", "fire", "RED CODE 2", "CODE GREY")
    pub category: String,

    /// Sending department (defaults to the station label)
    #[arg(long)]
    pub origin: Option<String>,

    /// Free-text message (defaults to the category label)
    #[arg(long, short = 'm')]
    pub message: Option<String>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Alert id
    pub id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ALERTS / ACKS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List recent alerts, newest first
    #[command(alias = "ls")]
    List {
        /// Max results (1-500)
        #[arg(long, short = 'l', default_value = "20")]
        limit: u32,
    },

    /// Show the latest active alert, if any
    Latest,
}

#[derive(Debug, Args)]
pub struct AcksArgs {
    /// Alert id
    pub alert_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DRILL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DrillArgs {
    /// Category to drill
    #[arg(long, short = 'c', default_value = "red-code-1")]
    pub category: String,

    /// Number of simulated stations
    #[arg(long, short = 'n', default_value = "2", value_parser = clap::value_parser!(u8).range(1..=8))]
    pub stations: u8,

    /// Alert expiry window for the drill
    #[arg(long, default_value = "10s")]
    pub expiry: String,

    /// Manually stop from the first station after this long
    #[arg(long)]
    pub stop_after: Option<String>,

    /// What the manual stop does
    #[arg(long, value_enum, default_value = "global")]
    pub manual_stop: StopPolicyArg,
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
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g. "label", "expiry", "manual_stop")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the API key in the system keyring
    SetKey {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },

    /// Print the config file path
    Path,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
