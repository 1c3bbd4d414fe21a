use once_cell::sync::OnceCell;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "plugboo.log";
const FALLBACK_FILTER: &str = "info";

static FILE_GUARD: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Picks the filter directives: `RUST_LOG` wins, then the configured filter. Directives
/// that do not parse fall through to the next candidate.
fn filter_directives(from_env: Option<&str>, configured: &str) -> String {
    [from_env, Some(configured)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty() && EnvFilter::try_new(d).is_ok())
        .unwrap_or(FALLBACK_FILTER)
        .to_string()
}

/// Console output plus a daily rolling `plugboo.log` under `log_dir`. Only the first call
/// installs anything; later calls are ignored.
pub fn init_logging(log_dir: &Path, configured_filter: &str) {
    let _ = FILE_GUARD.get_or_init(|| {
        let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        let directives = filter_directives(env.as_deref(), configured_filter);

        let file_writer = match fs::create_dir_all(log_dir) {
            Ok(()) => Some(tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_PREFIX))),
            Err(e) => {
                eprintln!("log directory {} unavailable: {}", log_dir.display(), e);
                None
            }
        };
        let (file_layer, guard) = match file_writer {
            Some((writer, guard)) => (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard)),
            None => (None, None),
        };

        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(&directives))
            .with(fmt::layer().with_target(false))
            .with(file_layer)
            .try_init();
        tracing::debug!("logging to {} with filter '{}'", log_dir.display(), directives);
        guard
    });
}

/// Rate-limits progress reporting for one task.
/// A percentage is forwarded when it changed and `min_interval` elapsed since the last one;
/// 100% is always forwarded once.
pub struct ProgressThrottle {
    last_pct: Option<u8>,
    last_instant: Instant,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        let min_interval = Duration::from_millis(min_interval_ms);
        Self {
            last_pct: None,
            last_instant: Instant::now().checked_sub(min_interval).unwrap_or_else(Instant::now),
            min_interval,
        }
    }

    pub fn emit(&mut self, task: &str, pct: u8, mut sink: impl FnMut(u8)) {
        let pct = pct.min(100);
        if self.last_pct == Some(pct) {
            return;
        }
        let now = Instant::now();
        if pct == 100 || now.duration_since(self.last_instant) >= self.min_interval {
            sink(pct);
            tracing::info!(target: "progress", "{}: {}%", task, pct);
            self.last_pct = Some(pct);
            self.last_instant = now;
        }
    }
}
