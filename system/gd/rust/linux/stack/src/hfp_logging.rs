use log::LevelFilter;
use syslog::{BasicLogger, Facility, Formatter3164};

use crate::config::HfpConfig;

/// API to modify log levels.
pub trait IHfpLogging {
    /// Check whether debug logging is enabled.
    fn is_debug_enabled(&self) -> bool;

    /// Change whether debug logging is enabled.
    fn set_debug_logging(&mut self, enabled: bool);
}

/// Logging related implementation.
pub struct HfpLogging {
    level: LevelFilter,
}

fn level_for(is_debug: bool) -> LevelFilter {
    if is_debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn install(level: LevelFilter, log_output: &str) {
    if log_output == "stderr" {
        if env_logger::Builder::new().filter(None, level).try_init().is_err() {
            log::set_max_level(level);
        }
    } else {
        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: "hfp_ag".into(),
            pid: std::process::id(),
        };

        match syslog::unix(formatter) {
            Ok(logger) => {
                let _ = log::set_boxed_logger(Box::new(BasicLogger::new(logger)));
                log::set_max_level(level);
            }
            Err(e) => eprintln!("Could not connect to syslog: {}", e),
        }
    }

    log_panics::init();
}

impl HfpLogging {
    /// Installs the process logger writing to `log_output`: "stderr", or syslog otherwise.
    ///
    /// A logger that was already installed is left in place; only the level is applied.
    pub fn new(is_debug: bool, log_output: &str) -> Self {
        let level = level_for(is_debug);
        install(level, log_output);
        Self { level }
    }

    /// Same as `new`, at the `log_level` of `config` or at info level when it has none.
    pub fn from_config(config: &HfpConfig, log_output: &str) -> Self {
        let level = config.log_level.unwrap_or(LevelFilter::Info);
        install(level, log_output);
        Self { level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl IHfpLogging for HfpLogging {
    fn is_debug_enabled(&self) -> bool {
        self.level >= LevelFilter::Debug
    }

    fn set_debug_logging(&mut self, enabled: bool) {
        self.level = level_for(enabled);
        log::set_max_level(self.level);

        // Mark the start of debug logging with a debug print.
        if enabled {
            log::debug!("Debug logging successfully enabled!");
        }

        log::info!("Setting debug logging to {}", enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share the process wide max level, so they run in one test.
    #[test]
    fn applies_configured_and_toggled_levels() {
        let config = HfpConfig { log_level: Some(LevelFilter::Warn), ..Default::default() };
        let logging = HfpLogging::from_config(&config, "stderr");
        assert_eq!(logging.level(), LevelFilter::Warn);
        assert_eq!(log::max_level(), LevelFilter::Warn);
        assert!(!logging.is_debug_enabled());

        let config = HfpConfig { log_level: Some(LevelFilter::Trace), ..Default::default() };
        assert!(HfpLogging::from_config(&config, "stderr").is_debug_enabled());
        assert_eq!(log::max_level(), LevelFilter::Trace);

        assert!(HfpLogging::new(true, "stderr").is_debug_enabled());
        assert_eq!(log::max_level(), LevelFilter::Debug);

        let mut logging = HfpLogging::from_config(&HfpConfig::default(), "stderr");
        assert_eq!(log::max_level(), LevelFilter::Info);
        assert!(!logging.is_debug_enabled());

        logging.set_debug_logging(true);
        assert!(logging.is_debug_enabled());
        assert_eq!(log::max_level(), LevelFilter::Debug);

        logging.set_debug_logging(false);
        assert_eq!(log::max_level(), LevelFilter::Info);
    }
}
