//! Logger setup on top of the `fern` dispatcher.
//!
//! Console output goes to stderr so that stdout stays clean for piping; it is colourised only
//! when stderr is a terminal. When an output directory is given, every message is also appended
//! to a single `coldplan.log` there, uncoloured and with full dates. Which level is active is
//! decided by [`crate::settings::Settings::log_level_filter`], not here.
use anyhow::Result;
use chrono::Local;
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

/// A flag indicating whether the logger has been initialised
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The single log file written into the output directory
const LOG_FILE_NAME: &str = "coldplan.log";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Initialise the program logger at the given level.
///
/// # Arguments
///
/// * `level` - The active log level, already resolved from settings and environment
/// * `log_dir` - Directory to append `coldplan.log` to, if any
pub fn init(level: LevelFilter, log_dir: Option<&Path>) -> Result<()> {
    let mut dispatch = Dispatch::new().level(level).chain(console_dispatch());
    if let Some(dir) = log_dir {
        dispatch = dispatch.chain(file_dispatch(dir)?);
    }

    dispatch.apply()?;
    LOGGER_INIT.set(()).expect("Logger already initialised");

    Ok(())
}

/// Terminal output: `HH:MM:SS LEVEL [target] message`, coloured when stderr is a terminal
fn console_dispatch() -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let use_colour = std::io::stderr().is_terminal();

    Dispatch::new()
        .format(move |out, message, record| {
            let time = Local::now().format("%H:%M:%S");
            if use_colour {
                out.finish(format_args!(
                    "{time} {:>5} [{}] {message}",
                    colours.color(record.level()),
                    record.target()
                ));
            } else {
                out.finish(format_args!(
                    "{time} {:>5} [{}] {message}",
                    record.level(),
                    record.target()
                ));
            }
        })
        .chain(std::io::stderr())
}

/// File output: one combined file, full dates, no colour
fn file_dispatch(dir: &Path) -> Result<Dispatch> {
    let file = fern::log_file(dir.join(LOG_FILE_NAME))?;

    Ok(Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:>5} [{}] {message}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target()
            ));
        })
        .chain(file))
}
