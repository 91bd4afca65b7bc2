pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

use anyhow::Result;

use self::actions::Action;

/// Map `-v` occurrences to a level. No flag leaves the decision to the
/// environment.
const fn get_verbosity_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Parse arguments, initialise logging and build the action to run.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = get_verbosity_level(
        matches
            .get_one::<u8>(commands::ARG_VERBOSITY)
            .copied()
            .unwrap_or(0),
    );
    let log_level = matches
        .get_one::<String>(commands::ARG_LOG_LEVEL)
        .map(String::as_str);
    telemetry::init(log_level, verbosity)?;

    dispatch::handler(&matches)
}
