use std::path::Path;

use anyhow::{Context, Result};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

pub const DATETIME_FORMAT: &str = "[%Y-%m-%d] (%H:%M:%S%.3f)";

pub struct LoggerConfig<'a> {
    pub level: LevelFilter,
    pub disable_colors: bool,
    pub log_file: Option<&'a Path>,
}

/// Install the global logger: stdout always, plus a plain text file when
/// configured
pub fn init(config: LoggerConfig<'_>) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);
    let disable_colors = config.disable_colors;

    let stdout = fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = chrono::Local::now().format(DATETIME_FORMAT);
            if disable_colors {
                out.finish(format_args!("{} {} > {}", now, record.level(), message))
            } else {
                out.finish(format_args!(
                    "{} {} > {}",
                    now,
                    colors.color(record.level()),
                    message
                ))
            }
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new()
        .level(config.level)
        // keep transport internals out of the report
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("rustls", LevelFilter::Warn)
        .chain(stdout);

    if let Some(path) = config.log_file {
        let file = fern::log_file(path)
            .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} {} [{}] {}",
                        chrono::Local::now().format(DATETIME_FORMAT),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .chain(file),
        );
    }

    dispatch.apply().context("Failed to install logger")?;
    Ok(())
}
