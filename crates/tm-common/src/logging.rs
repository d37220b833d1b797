use std::any::Any;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const DEFAULT_FILTER: &str = "info";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Process-wide log settings.
///
/// - `TM_LOG_DIR`: write `<dir>/<app>.log`, rotated daily, instead of stdout
/// - `TM_LOG_INCLUDE_BACKTRACE`: also run the default panic hook (1/true)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub include_backtrace: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let include_backtrace = std::env::var("TM_LOG_INCLUDE_BACKTRACE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);
        Self {
            dir: std::env::var_os("TM_LOG_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            include_backtrace,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Log panics through `tracing`. Only the first call per process installs the hook.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let include_backtrace = LogConfig::from_env().include_backtrace;
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".into());

            tracing::error!(
                app = app_name,
                thread = thread.name().unwrap_or("unnamed"),
                %location,
                message = %panic_message(info.payload()),
                "panic"
            );
            if include_backtrace {
                previous(info);
            }
        }));
    });
}

fn file_writer(dir: PathBuf, app_name: &str) -> Option<BoxMakeWriter> {
    if let Err(err) = std::fs::create_dir_all(&dir) {
        tracing::warn!(dir = %dir.display(), error = %err, "cannot create log dir; using stdout");
        return None;
    }
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, format!("{app_name}.log")));
    // a second init keeps the first guard
    let _ = FILE_GUARD.set(guard);
    Some(BoxMakeWriter::new(writer))
}

/// Install the global subscriber. `RUST_LOG` filters (default `info`).
pub fn init_tracing_subscriber(app_name: &'static str) {
    let config = LogConfig::from_env();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let writer = config.dir.and_then(|dir| file_writer(dir, app_name));
    let _ = match writer {
        Some(writer) => builder.with_ansi(false).with_writer(writer).try_init(),
        None => builder.try_init(),
    };
}
