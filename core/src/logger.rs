use std::str::FromStr;

use tracing::{debug, level_filters::LevelFilter, warn};
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    EnvFilter,
};

use crate::config::BulkSettings;

struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Installs the global subscriber. `RUST_LOG` directives are honoured on top of `log_level`.
pub fn setup_logger(log_level: LevelFilter) {
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let format = Format::default().with_timer(CustomTimer).with_level(true).with_target(true);

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Logger has already been set up, continuing...");
    }
}

pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}

pub fn setup_logger_from_settings(settings: &BulkSettings) {
    let level = match settings.log_level.as_deref().map(LevelFilter::from_str) {
        Some(Ok(level)) => level,
        Some(Err(_)) => {
            setup_info_logger();
            warn!("Unknown log level {:?}, using info", settings.log_level);
            return;
        }
        None => LevelFilter::INFO,
    };
    setup_logger(level);
}
