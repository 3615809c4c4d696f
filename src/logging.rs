//! Logging setup (A2).
//!
//! A single console appender whose level follows the resolved
//! `logging_level` config key. The teacher declares `log4rs` as a
//! dependency but never wires it up; this crate completes that wiring.

use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::FatalError;

pub fn init(level: log::LevelFilter) -> Result<(), FatalError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}",
        )))
        .target(Target::Stderr)
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| FatalError::LoggingInit(e.to_string()))?;

    log4rs::init_config(config)?;
    Ok(())
}
