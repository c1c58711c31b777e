//! The `log` module defines an interface to the crate's internal logging
//! facilities, used for messages about the runtime's own behavior: task
//! failures, forced schedule promotions, dependency rebuilds, and the like.
//!
//! This module (re)exports the five logging macros: `error!`, `warn!`,
//! `info!`, `debug!` and `trace!`, where `error!` represents the
//! highest-priority log messages and `trace!` the lowest. To emit a log
//! message, simply use one of these macros in your code:
//!
//! ```rust
//! use orrery::log::info;
//!
//! pub fn do_a_thing() {
//!     info!("A thing is being done.");
//! }
//! ```
//!
//! Logging is _disabled_ by default. Log messages are enabled/disabled using
//! the functions:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only log messages with
//!    priority at least `level`
//!
//! In addition, per-module filtering of messages can be configured with
//! `set_module_filter()` / `remove_module_filter()`:
//!
//! ```rust
//! use orrery::log::{set_module_filter, set_log_level, LevelFilter};
//!
//! pub fn setup_logging() {
//!     set_log_level(LevelFilter::Info);
//!     // Silence the executor's trace output while keeping our own.
//!     set_module_filter("orrery::schedule", LevelFilter::Warn);
//! }
//! ```

use env_logger::{Builder, Logger, WriteStyle};
pub use log::{debug, error, info, trace, warn, LevelFilter};
use log_reload::{ReloadHandle, ReloadLog};

use std::sync::{LazyLock, Mutex, MutexGuard};

use crate::HashMap;

// Logging disabled.
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;
// Automatically determine if output supports color.
const DEFAULT_LOG_STYLE: WriteStyle = WriteStyle::Auto;

/// A global instance of the logging configuration.
static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> =
    LazyLock::new(|| Mutex::new(LogConfiguration::default()));

/// Holds logging configuration so the configuration can persist across
/// reinitialization of the global logger.
///
/// Neither `env_logger::Builder` nor `env_logger::Logger` can be modified once
/// constructed. This struct serves as a mutable proxy for
/// `env_logger::Builder`. Because the global logger cannot be initialized more
/// than once, we use `log_reload::ReloadLog` as the global logger, which wraps
/// the real logger and allows us to swap out the inner logger after
/// initialization.
struct LogConfiguration {
    /// The "default" level filter for modules ("targets") without an
    /// explicitly set filter. A global filter level of `LevelFilter::Off`
    /// disables logging.
    global_log_level: LevelFilter,
    /// Whether to colorize output.
    log_style: WriteStyle,
    /// Holds module ("target") specific level filters
    module_level: HashMap<String, LevelFilter>,
    /// A handle to the logger that can reload or modify its inner wrapped logger.
    log_handle: Option<ReloadHandle<Logger>>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        LogConfiguration {
            global_log_level: DEFAULT_LOG_LEVEL,
            log_style: DEFAULT_LOG_STYLE,
            module_level: HashMap::default(),
            log_handle: None,
        }
    }
}

impl LogConfiguration {
    /// Constructs an `env_logger::Logger` with the current configuration,
    /// analogous to `env_logger::Builder::build()`. Does not install the
    /// logger.
    fn build(&self) -> Logger {
        let mut builder = Builder::new();

        builder
            .filter_level(self.global_log_level)
            .write_style(self.log_style);
        // Add module specific filters.
        for (module, filter) in &self.module_level {
            builder.filter(Some(module), *filter);
        }

        builder.build()
    }
}

/// Enables the logger with no global level filter / full logging. Equivalent
/// to `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level. A global filter level of `LevelFilter::Off`
/// disables logging.
pub fn set_log_level(level: LevelFilter) {
    let mut configuration = get_log_configuration();
    configuration.global_log_level = level;
    set_logger(&mut configuration);
}

/// Sets a level filter for the given module path.
pub fn set_module_filter(module_path: &str, level_filter: LevelFilter) {
    let mut configuration = get_log_configuration();
    configuration
        .module_level
        .insert(module_path.to_string(), level_filter);
    set_logger(&mut configuration);
}

/// Removes a module-specific level filter for the given module path. The
/// global level filter will apply to the module.
pub fn remove_module_filter(module_path: &str) {
    let mut configuration = get_log_configuration();
    configuration.module_level.remove(module_path);
    set_logger(&mut configuration);
}

/// Fetches the global `LogConfiguration`.
fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION.lock().unwrap()
}

/// Initializes or replaces the existing global logger with a logger described
/// by the global log configuration.
fn set_logger(configuration: &mut LogConfiguration) {
    let logger = configuration.build();

    match &configuration.log_handle {
        None => {
            // Logger has not been initialized.
            let wrapping_logger = ReloadLog::new(logger);
            configuration.log_handle = Some(wrapping_logger.handle());
            let result = log::set_boxed_logger(Box::new(wrapping_logger))
                .map(|()| log::set_max_level(configuration.global_log_level));
            if let Err(error) = result {
                error!(
                    "tried to initialize a global logger that has already been set: {}",
                    error
                );
            }
        }

        Some(handle) => {
            // Replace the existing logger.
            log::set_max_level(configuration.global_log_level);
            if let Err(error) = handle.replace(logger) {
                error!("failed to set logger: {}", error);
            }
        }
    }
}
