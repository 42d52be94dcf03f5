//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use peerchat_core::{Policy, WireFormat};

use crate::config::Config;

/// Peer-to-peer chat node.
#[derive(Parser, Debug, Clone)]
#[command(name = "peerchat")]
#[command(about = "Peer-to-peer chat node with connect/accept membership")]
#[command(version)]
pub struct Cli {
    /// Display name shown to peers (single word).
    #[arg(long)]
    pub name: Option<String>,

    /// TCP port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Host or IP advertised to peers as our reply address.
    #[arg(long)]
    pub advertise_host: Option<String>,

    /// Config file (default: ~/.config/peerchat/config.toml, then /etc/peerchat/config.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Admission policy: open or strict.
    #[arg(long)]
    pub policy: Option<Policy>,

    /// Wire format: tagged or legacy.
    #[arg(long)]
    pub wire_format: Option<WireFormat>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Flags win over file and environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(name) = &self.name {
            config.name = Some(name.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.advertise_host {
            config.advertise_host = Some(host.clone());
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(format) = self.wire_format {
            config.wire_format = format;
        }
    }
}
