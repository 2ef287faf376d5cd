use time::macros::format_description;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Initialize the stdout subscriber: `MM-dd-yyyy HH:mm:ss.SSS LEVEL [file:line]: message k=v`.
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let timer = UtcTime::new(format_description!(
        "[month]-[day]-[year] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();
}
