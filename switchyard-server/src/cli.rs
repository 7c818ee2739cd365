use std::path::PathBuf;

use clap::Parser;

/// CLI for the switchyard relay daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "switchyard", about = "Pub/sub document relay over HTTP webhooks")]
pub struct Cli {
    /// Actor name, used in logs
    #[arg(long, env = "SWITCHYARD_NAME", default_value = "switchyard")]
    pub name: String,

    /// Listen address for HTTP endpoints
    #[arg(long, env = "SWITCHYARD_ADDR", default_value = "127.0.0.1:8790")]
    pub listen_addr: String,

    /// Public base URL of this relay; used to build webhooks when subscribing
    /// to other relays and in `advertise` commands
    #[arg(long, env = "SWITCHYARD_ENDPOINT")]
    pub endpoint: Option<String>,

    /// YAML file declaring the schema types to accept
    #[arg(long, env = "SWITCHYARD_SCHEMAS")]
    pub schemas: Option<PathBuf>,

    /// Extra schema type to accept with subscriptions enabled (repeatable)
    #[arg(long = "schema-type", value_name = "NAME")]
    pub schema_types: Vec<String>,

    /// Token stamped on outgoing commands (random if unset)
    #[arg(long, env = "SWITCHYARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Timeout for one outbound webhook POST, in seconds
    #[arg(long, env = "SWITCHYARD_DELIVERY_TIMEOUT", default_value = "10")]
    pub delivery_timeout_secs: u64,

    /// Drop subscriptions not renewed within this many seconds
    /// (kept until restart if unset)
    #[arg(long, env = "SWITCHYARD_SUBSCRIPTION_TTL")]
    pub subscription_ttl_secs: Option<u64>,

    /// Honor subscriptions to the `command` type itself
    #[arg(long, env = "SWITCHYARD_COMMAND_SUBSCRIPTIONS", default_value = "false")]
    pub allow_command_subscriptions: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}
