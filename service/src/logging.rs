use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{self, ConfigBuilder};

/// Crates whose records are dropped unless the level is Trace. The HTTP and
/// SSE stacks log every chunk of a long-lived change feed.
const FILTERED_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "eventsource_client",
    "rustls",
    "mio",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the level set in `config`.
    ///
    /// Panics if a global logger is already installed; use [`Logger::try_init_logger`]
    /// where that can legitimately happen (tests, embedding).
    pub fn init_logger(config: &Config) {
        Self::try_init_logger(config).expect("Failed to start simplelog");
    }

    pub fn try_init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;

        simplelog::TermLogger::init(
            level,
            Self::build_log_config(Self::should_filter_dependencies(level)),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
    }

    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_modules_cover_the_transport_stack() {
        for module in ["hyper", "reqwest", "eventsource_client"] {
            assert!(
                FILTERED_MODULES.contains(&module),
                "{module} should be filtered"
            );
        }
    }

    #[test]
    fn test_only_trace_level_shows_dependency_logs() {
        assert!(!Logger::should_filter_dependencies(LevelFilter::Trace));
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
        ] {
            assert!(
                Logger::should_filter_dependencies(level),
                "{level} should filter dependencies"
            );
        }
    }

    #[test]
    fn test_build_log_config_does_not_panic() {
        let _filtered = Logger::build_log_config(true);
        let _unfiltered = Logger::build_log_config(false);
    }
}
