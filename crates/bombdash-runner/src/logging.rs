use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use bombdash_client::config::ProjectPaths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Filter used when `RUST_LOG` is unset: `info`, `debug` or `trace` by
/// verbosity
fn default_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize logging for a component.
///
/// Console output goes to stderr so command output on stdout stays clean.
/// With `to_file`, logs are also appended to `{component}.log` in the log
/// directory, which is emptied once it grows past 1MB.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(
    component_name: &str,
    to_file: bool,
    verbosity: u8,
) -> io::Result<Option<WorkerGuard>> {
    if !to_file {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(default_filter(verbosity))
            .init();
        return Ok(None);
    }

    let log_dir = log_directory()?;
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{}.log", component_name));
    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(default_filter(verbosity))
        .with(fmt::layer().with_writer(io::stderr).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());
    Ok(Some(guard))
}

fn log_directory() -> io::Result<PathBuf> {
    let paths = ProjectPaths::new("bombdash")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?;
    Ok(paths.log_dir())
}

fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if fs::metadata(log_path).is_ok_and(|m| m.len() > MAX_LOG_SIZE) {
        File::create(log_path)?;
    }
    Ok(())
}
