//! Clap derive structures for the `rosweb` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rosweb -- talk to a robot through a rosbridge WebSocket
#[derive(Debug, Parser)]
#[command(
    name = "rosweb",
    version,
    about = "Publish, subscribe and drive actuators over rosbridge",
    long_about = "A command-line client for rosbridge (ROS over WebSocket).\n\n\
        Holds one bridge session per invocation: subscriptions survive\n\
        reconnects and commands are validated before they reach the robot.",
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
    /// Broker profile to use
    #[arg(long, short = 'p', env = "ROSWEB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// rosbridge endpoint, e.g. ws://robot.local:9090 (overrides profile)
    #[arg(long, short = 'e', env = "ROSWEB_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Connect and service call timeout in seconds (overrides profile)
    #[arg(long, env = "ROSWEB_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
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
    /// Connect and report the session state
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Print messages arriving on a topic
    #[command(alias = "sub")]
    Echo(EchoArgs),

    /// Publish one JSON message to a topic
    #[command(alias = "pub")]
    Publish(PublishArgs),

    /// Move an actuator to a slider position
    Slide(SlideArgs),

    /// List topics known to the broker
    Topics,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Session Commands ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Keep running and print every connection state change
    #[arg(long, short = 'w')]
    pub watch: bool,
}

#[derive(Debug, Args)]
pub struct EchoArgs {
    /// Topic name (e.g. /chatter)
    pub topic: String,

    /// Message type (e.g. std_msgs/String); the broker infers it when empty
    #[arg(long = "type", short = 't', default_value = "")]
    pub message_type: String,

    /// Exit after this many messages
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Print each message on one line
    #[arg(long)]
    pub compact: bool,
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Topic name (e.g. /chatter)
    pub topic: String,

    /// Message type (e.g. std_msgs/String)
    pub message_type: String,

    /// Message body as a JSON object (e.g. '{"data":"hi"}')
    pub message: String,
}

#[derive(Debug, Args)]
pub struct SlideArgs {
    /// Slider position within the configured range
    #[arg(allow_negative_numbers = true)]
    pub value: f64,

    /// Actuator id (overrides profile)
    #[arg(long, short = 'a')]
    pub actuator: Option<u16>,

    /// Position units per slider unit (overrides profile)
    #[arg(long)]
    pub scale: Option<f64>,

    /// Motion duration in milliseconds (overrides profile)
    #[arg(long, short = 'd')]
    pub duration: Option<u32>,

    /// Print the command without connecting
    #[arg(long)]
    pub dry_run: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a starter config file (uses --endpoint for the default profile)
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
