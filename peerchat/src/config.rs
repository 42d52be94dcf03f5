//! Load config from file and environment; CLI flags are applied on top in `main`.

use std::path::{Path, PathBuf};

use peerchat_core::{Policy, WireFormat};
use serde::Deserialize;

/// Node configuration. File: ~/.config/peerchat/config.toml or /etc/peerchat/config.toml.
/// Env overrides: PEERCHAT_NAME, PEERCHAT_PORT, PEERCHAT_ADVERTISE_HOST, PEERCHAT_POLICY,
/// PEERCHAT_WIRE_FORMAT.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Display name; prompted for at startup when unset.
    #[serde(default)]
    pub name: Option<String>,
    /// TCP listen port (default 4000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host advertised to peers; detected from local interfaces when unset.
    #[serde(default)]
    pub advertise_host: Option<String>,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub wire_format: WireFormat,
    /// Inbound messages longer than this are dropped (default 64 KiB).
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_port() -> u16 {
    4000
}
fn default_max_message_bytes() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            port: default_port(),
            advertise_host: None,
            policy: Policy::default(),
            wire_format: WireFormat::default(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

/// Load config: merge default, then config file (explicit path or first existing default
/// path), then env vars.
pub fn load(explicit: Option<&Path>) -> Config {
    let mut c = match explicit {
        Some(p) => load_path(p),
        None => config_paths()
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| load_path(&p)),
    }
    .unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PEERCHAT_NAME") {
        c.name = Some(s);
    }
    if let Some(s) = var("PEERCHAT_PORT") {
        match s.parse::<u16>() {
            Ok(p) => c.port = p,
            Err(_) => tracing::warn!(value = %s, "ignoring invalid PEERCHAT_PORT"),
        }
    }
    if let Some(s) = var("PEERCHAT_ADVERTISE_HOST") {
        c.advertise_host = Some(s);
    }
    if let Some(s) = var("PEERCHAT_POLICY") {
        match s.parse::<Policy>() {
            Ok(p) => c.policy = p,
            Err(e) => tracing::warn!(error = %e, "ignoring PEERCHAT_POLICY"),
        }
    }
    if let Some(s) = var("PEERCHAT_WIRE_FORMAT") {
        match s.parse::<WireFormat>() {
            Ok(f) => c.wire_format = f,
            Err(e) => tracing::warn!(error = %e, "ignoring PEERCHAT_WIRE_FORMAT"),
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/peerchat/config.toml"));
    }
    out.push(PathBuf::from("/etc/peerchat/config.toml"));
    out
}

fn load_path(p: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(p) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %p.display(), error = %e, "cannot read config file");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => {
            tracing::debug!(path = %p.display(), "loaded config file");
            Some(c)
        }
        Err(e) => {
            tracing::warn!(path = %p.display(), error = %e, "invalid config file, using defaults");
            None
        }
    }
}
