//! Server configuration loaded from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;

/// Whether the originator of an event also receives its broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    pub echo_edits_to_sender: bool,
    pub echo_cursor_to_sender: bool,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            echo_edits_to_sender: true,
            echo_cursor_to_sender: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// JSON file with users and documents for the memory backend
    pub seed_file: Option<PathBuf>,
    /// Messages buffered per connection before broadcasts are dropped
    pub outbox_capacity: usize,
    /// Inbound events buffered per connection
    pub inbox_capacity: usize,
    pub max_content_bytes: usize,
    pub policy: BroadcastPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            seed_file: None,
            outbox_capacity: 256,
            inbox_capacity: 64,
            max_content_bytes: 1024 * 1024,
            policy: BroadcastPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = parse_var("DOCSYNC_BIND", defaults.bind_addr);
        let seed_file = std::env::var("DOCSYNC_SEED_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let outbox_capacity = positive_var("DOCSYNC_OUTBOX_CAPACITY", defaults.outbox_capacity);
        let inbox_capacity = positive_var("DOCSYNC_INBOX_CAPACITY", defaults.inbox_capacity);
        let max_content_bytes =
            positive_var("DOCSYNC_MAX_CONTENT_BYTES", defaults.max_content_bytes);

        let policy = BroadcastPolicy {
            echo_edits_to_sender: flag_var(
                "DOCSYNC_ECHO_EDITS",
                defaults.policy.echo_edits_to_sender,
            ),
            echo_cursor_to_sender: flag_var(
                "DOCSYNC_ECHO_CURSOR",
                defaults.policy.echo_cursor_to_sender,
            ),
        };

        tracing::info!(
            %bind_addr,
            seed_file = ?seed_file,
            outbox_capacity,
            inbox_capacity,
            max_content_bytes,
            echo_edits = policy.echo_edits_to_sender,
            echo_cursor = policy.echo_cursor_to_sender,
            "Server config loaded"
        );

        Self {
            bind_addr,
            seed_file,
            outbox_capacity,
            inbox_capacity,
            max_content_bytes,
            policy,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = raw.as_str(), "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn positive_var(key: &str, default: usize) -> usize {
    match parse_var(key, default) {
        0 => {
            tracing::warn!(key, "Value must be positive, using default");
            default
        }
        value => value,
    }
}

fn flag_var(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => {
                tracing::warn!(key, value = raw.as_str(), "Invalid flag, using default");
                default
            }
        },
        Err(_) => default,
    }
}
