//! Tracing setup for binaries built on this crate.
//!
//! The filter is built from three layers, later ones winning per target:
//! a quiet default (`warn` for dependencies, `info` for this crate and the
//! `truthcheck` binary), a verbosity bump from the caller (`-v`, `-vv`), and
//! `TRUTH_LOG_LEVEL` directives. Directives may name this crate's modules by
//! their short name (`chat=debug`, `session=trace`); a bare level applies to
//! the whole crate. `RUST_LOG` is honoured verbatim when `TRUTH_LOG_LEVEL` is
//! unset.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const CRATE_TARGET: &str = "truth_realtime";
const CLI_TARGET: &str = "truthcheck";

/// Modules addressable by short name in `TRUTH_LOG_LEVEL`.
const MODULES: &[&str] = &[
    "chat",
    "client",
    "lines",
    "normalize",
    "session",
    "transport",
];

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Where and how much to log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// 0 = info, 1 = debug, 2+ = trace for this crate and the CLI.
    pub verbosity: u8,
    /// Raw `TRUTH_LOG_LEVEL` value.
    pub directives: Option<String>,
    /// Raw `RUST_LOG` value, used only without `directives`.
    pub rust_log: Option<String>,
    /// JSON-lines log file; console on stderr when unset.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            verbosity: 0,
            directives: None,
            rust_log: None,
            json_path: None,
        }
    }
}

impl LogSettings {
    /// Reads `TRUTH_OBSERVABILITY_ENABLED`, `TRUTH_LOG_LEVEL`, `RUST_LOG` and
    /// `TRUTH_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            enabled: var("TRUTH_OBSERVABILITY_ENABLED").is_none_or(|v| !is_off(&v)),
            verbosity: 0,
            directives: var("TRUTH_LOG_LEVEL"),
            rust_log: var("RUST_LOG"),
            json_path: var("TRUTH_JSON_LOG_PATH").map(PathBuf::from),
        }
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Full `EnvFilter` directive string for these settings.
    pub fn filter_directives(&self) -> String {
        if self.directives.is_none()
            && let Some(rust_log) = &self.rust_log
        {
            return rust_log.clone();
        }
        let level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut parts = vec![
            "warn".to_string(),
            format!("{CRATE_TARGET}={level}"),
            format!("{CLI_TARGET}={level}"),
        ];
        if let Some(raw) = &self.directives {
            parts.extend(
                raw.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(expand_directive),
            );
        }
        parts.join(",")
    }
}

/// Rewrites short module names and bare levels to targets in this crate.
fn expand_directive(directive: &str) -> String {
    let (target, level) = match directive.split_once('=') {
        Some((target, level)) => (target.trim(), Some(level.trim())),
        None => (directive, None),
    };
    match level {
        None if is_level(target) => format!("{CRATE_TARGET}={target}"),
        Some(level) if MODULES.contains(&target) => {
            format!("{CRATE_TARGET}::{target}={level}")
        }
        None if MODULES.contains(&target) => format!("{CRATE_TARGET}::{target}"),
        _ => directive.to_string(),
    }
}

fn is_off(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

fn is_level(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "off" | "error" | "warn" | "info" | "debug" | "trace"
    )
}

/// Installs the process-wide subscriber from the environment.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// Installs the process-wide subscriber once.
///
/// Later calls, and calls after another subscriber was installed, do nothing.
/// Unparseable directives fall back to the default filter.
pub fn init_with(settings: LogSettings) {
    INSTALLED.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = EnvFilter::try_new(settings.filter_directives()).unwrap_or_else(|_| {
            EnvFilter::new(
                LogSettings {
                    directives: None,
                    rust_log: None,
                    ..settings.clone()
                }
                .filter_directives(),
            )
        });

        let registry = tracing_subscriber::registry().with(filter);
        match json_writer(settings.json_path.as_deref()) {
            Some(writer) => {
                let _ = registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_target(true)
                            .with_writer(writer),
                    )
                    .try_init();
            }
            None => {
                // stdout carries event output in the CLI.
                let _ = registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stderr),
                    )
                    .try_init();
            }
        }
    });
}

fn json_writer(path: Option<&std::path::Path>) -> Option<tracing_appender::rolling::RollingFileAppender> {
    let path = path?;
    let file_name = path.file_name()?.to_str()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    std::fs::create_dir_all(dir).ok()?;
    Some(tracing_appender::rolling::never(dir, file_name))
}
