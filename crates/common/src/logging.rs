//! Tracing setup shared by the binaries of the workspace.

use std::env;

use tracing::info;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Appended to the whoami string after a `%` when set.
pub const SVC_LABEL_ENVVAR: &str = "LIQUID_STAKE_SVC_LABEL";

/// Adds source file names to log lines when set to `1`.
pub const LOG_FILE_ENVVAR: &str = "LOG_FILE";

/// Adds line numbers to log lines when set to `1`.
pub const LOG_LINE_NUM_ENVVAR: &str = "LOG_LINE_NUM";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// How a binary wants its logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    whoami: String,
    default_directives: String,
    with_file: bool,
    with_line_number: bool,
}

impl LoggerConfig {
    /// A config for the service `base`, with the service label and source location flags read
    /// from the environment.
    pub fn with_base_name(base: &str) -> Self {
        Self {
            whoami: whoami(base, env::var(SVC_LABEL_ENVVAR).ok().as_deref()),
            default_directives: DEFAULT_DIRECTIVES.to_string(),
            with_file: flag(LOG_FILE_ENVVAR),
            with_line_number: flag(LOG_LINE_NUM_ENVVAR),
        }
    }

    /// Replaces the filter used when `RUST_LOG` is unset, e.g. `info,liquid_stake_core=debug`.
    pub fn with_default_directives(mut self, directives: impl Into<String>) -> Self {
        self.default_directives = directives.into();
        self
    }

    /// Identifies the service in the first log line.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("liquid-stake")
    }
}

/// Installs a compact stdout subscriber filtered by `RUST_LOG`.
///
/// Does nothing if a global subscriber is already set.
pub fn init(config: LoggerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directives));

    let stdout = fmt::layer()
        .compact()
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_filter(filter);

    if tracing_subscriber::registry().with(stdout).try_init().is_ok() {
        info!(whoami = %config.whoami, "logging started");
    }
}

fn flag(var: &str) -> bool {
    env::var(var).is_ok_and(|v| v == "1")
}

fn whoami(base: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whoami_appends_label() {
        assert_eq!(whoami("devnet", None), "devnet");
        assert_eq!(whoami("devnet", Some("local")), "devnet%local");
    }

    #[test]
    fn test_second_init_is_ignored() {
        let config = LoggerConfig::default().with_default_directives("warn");

        init(config.clone());
        init(config);
    }
}
