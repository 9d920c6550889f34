use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber: env-filter + fmt, exactly
/// as the closest-domain sibling in the pack wires it. `--debug` raises
/// the default level to `debug`; `--logfile` routes output through a
/// non-blocking file writer instead of stdout. The returned guard must be
/// held for the lifetime of the process — dropping it stops the
/// background flush thread (see `tracing-appender`'s own contract).
pub fn init(debug: bool, logfile: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match logfile {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "dr-recorder.log".to_string());
            let appender = tracing_appender::rolling::never(dir, filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        None => {
            fmt().with_env_filter(filter).init();
            None
        }
    }
}
