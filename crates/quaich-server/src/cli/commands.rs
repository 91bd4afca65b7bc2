use clap::{Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";

pub const ARG_DB_URL: &str = "db-url";
pub const ARG_DB_NAMESPACE: &str = "db-namespace";
pub const ARG_DB_DATABASE: &str = "db-database";
pub const ARG_DB_USER: &str = "db-user";
pub const ARG_DB_PASSWORD: &str = "db-password";

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_PEPPER: &str = "pepper";
pub const ARG_MFA_KEY: &str = "mfa-key";

pub const CMD_INIT: &str = "init";
pub const CMD_SETTINGS: &str = "settings";
pub const CMD_UNLOCK: &str = "unlock";

pub const ARG_INCLUDE_PRIVATE: &str = "include-private";
pub const ARG_USER_ID: &str = "user-id";

#[must_use]
pub fn new() -> Command {
    let command = Command::new("quaich")
        .about("Whisky club membership: settings and security administration")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new(CMD_INIT)
                .about("Apply schema migrations and seed missing default settings"),
        )
        .subcommand(
            Command::new(CMD_SETTINGS)
                .about("Print the settings and the resolved security configuration as JSON")
                .arg(
                    Arg::new(ARG_INCLUDE_PRIVATE)
                        .long(ARG_INCLUDE_PRIVATE)
                        .help("Include settings that are not public")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new(CMD_UNLOCK)
                .about("Clear a member's login lockout")
                .arg(
                    Arg::new(ARG_USER_ID)
                        .help("User ID (UUID)")
                        .required(true)
                        .value_parser(clap::value_parser!(uuid::Uuid)),
                ),
        );

    with_auth_args(with_db_args(with_logging_args(command)))
}

fn with_logging_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .help("Log filter directive, e.g. `info` or `quaich_auth=debug`; wins over -v")
                .env("QUAICH_LOG_LEVEL")
                .global(true),
        )
}

fn with_db_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DB_URL)
                .long(ARG_DB_URL)
                .help("SurrealDB WebSocket address")
                .default_value("127.0.0.1:8000")
                .env("QUAICH_DB_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_DB_NAMESPACE)
                .long(ARG_DB_NAMESPACE)
                .help("SurrealDB namespace")
                .default_value("quaich")
                .env("QUAICH_DB_NAMESPACE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_DB_DATABASE)
                .long(ARG_DB_DATABASE)
                .help("SurrealDB database")
                .default_value("club")
                .env("QUAICH_DB_DATABASE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_DB_USER)
                .long(ARG_DB_USER)
                .help("SurrealDB root user")
                .default_value("root")
                .env("QUAICH_DB_USER")
                .global(true),
        )
        .arg(
            Arg::new(ARG_DB_PASSWORD)
                .long(ARG_DB_PASSWORD)
                .help("SurrealDB root password")
                .default_value("root")
                .env("QUAICH_DB_PASSWORD")
                .hide_env_values(true)
                .global(true),
        )
}

fn with_auth_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret for session tokens")
                .env("QUAICH_JWT_SECRET")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_PEPPER)
                .long(ARG_PEPPER)
                .help("Password pepper; must match the one passwords were hashed with")
                .env("QUAICH_PEPPER")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_MFA_KEY)
                .long(ARG_MFA_KEY)
                .help("AES-256 key (64 hex characters) for TOTP secrets at rest")
                .env("QUAICH_MFA_KEY")
                .hide_env_values(true)
                .global(true),
        )
}
