use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "rtrm.log";

/// Initializes the global logger.
///
/// Call once at the very beginning of the daemon's `main`. The level is
/// taken from `RUST_LOG` (default `info`); records go to stderr (colored)
/// and to `logs/rtrm.log`.
pub fn init() {
    if let Err(e) = fs::create_dir_all(LOG_DIR) {
        eprintln!("Failed to create log directory at '{}': {}", LOG_DIR, e);
    }
    let log_file_path = format!("{}/{}", LOG_DIR, LOG_FILE);

    let level = std::env::var("RUST_LOG").ok().and_then(|v| v.parse::<LevelFilter>().ok()).unwrap_or(LevelFilter::Info);

    let base = Dispatch::new()
        .level(level)
        .level_for("mio", LevelFilter::Warn)
        .level_for("actix", LevelFilter::Warn)
        .level_for("tokio_util", LevelFilter::Warn);

    base.chain(console_sink()).chain(file_sink(&log_file_path)).apply().unwrap_or_else(|e| {
        eprintln!("Failed to apply logger configuration: {}", e);
    });

    log::info!("Logger initialized. Logging to console and '{}'.", log_file_path);
}

fn console_sink() -> Dispatch {
    let colors = fern::colors::ColoredLevelConfig::new()
        .error(fern::colors::Color::Red)
        .warn(fern::colors::Color::Yellow)
        .info(fern::colors::Color::Green)
        .debug(fern::colors::Color::Blue)
        .trace(fern::colors::Color::BrightBlack);

    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr())
}

fn file_sink(path: &str) -> Dispatch {
    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{} {} {}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.target(), message))
        })
        .chain(fern::log_file(path).unwrap_or_else(|e| {
            eprintln!("Failed to open log file '{}': {}", path, e);
            fern::log_file("/dev/stderr").expect("Failed to open stderr as fallback")
        }))
}
