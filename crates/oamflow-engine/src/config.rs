//! Runtime configuration

use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Engine configuration, covering the recognized runtime options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker count for the enclosing controller
    pub concurrent_reconciles: usize,

    /// Max retries per failed step before the failure is permanent
    pub error_retry_times: i64,

    /// Upper bound on requeue while steps are running or suspending
    pub backoff_wait_state_max: Duration,

    /// Upper bound on requeue while retrying a failed step
    pub backoff_failed_state_max: Duration,

    /// Deadline applied to steps that declare no timeout of their own
    pub default_step_timeout: Option<Duration>,

    /// Post-run record export options
    pub backup: BackupConfig,

    /// Diagnostic output options
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrent_reconciles: 4,
            error_retry_times: 10,
            backoff_wait_state_max: Duration::from_secs(60),
            backoff_failed_state_max: Duration::from_secs(300),
            default_step_timeout: None,
            backup: BackupConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Post-run record export options
#[derive(Debug, Clone, Default)]
pub struct BackupConfig {
    /// Whether finished runs are exported
    pub enabled: bool,

    /// Exporter strategy name
    pub strategy: Option<String>,

    /// Strategy exclusions
    pub ignore_strategy: Option<String>,

    /// Persistence backend selector
    pub persist_type: Option<String>,

    /// Label used to group exported records
    pub group_by_label: Option<String>,

    /// Delete the run after a successful export
    pub clean_on_backup: bool,
}

/// Diagnostic output options
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Enable debug-level output
    pub debug: bool,

    /// Mirror output into a rolling log file at this path
    pub file_path: Option<PathBuf>,

    /// Size hint for the log file, in megabytes
    pub file_max_size: Option<u64>,
}

/// Install the global tracing subscriber per the log configuration.
///
/// Returns the appender guard when file output is enabled; dropping it
/// flushes buffered log lines, so hold it for the process lifetime.
pub fn init_logging(config: &LogConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_directives = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    match &config.file_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "workflow.log".to_string());
            let appender = tracing_appender::rolling::daily(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            None
        }
    }
}
