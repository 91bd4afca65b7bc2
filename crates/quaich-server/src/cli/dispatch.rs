//! Map parsed arguments to an [`Action`] with its configuration.

use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use quaich_auth::AuthConfig;
use quaich_db::DbConfig;
use uuid::Uuid;

use crate::cli::actions::Action;
use crate::cli::commands::{
    ARG_DB_DATABASE, ARG_DB_NAMESPACE, ARG_DB_PASSWORD, ARG_DB_URL, ARG_DB_USER,
    ARG_INCLUDE_PRIVATE, ARG_JWT_SECRET, ARG_MFA_KEY, ARG_PEPPER, ARG_USER_ID, CMD_INIT,
    CMD_SETTINGS, CMD_UNLOCK,
};

pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let db = db_config(matches)?;

    match matches.subcommand() {
        Some((CMD_INIT, _)) => Ok(Action::Init { db }),
        Some((CMD_SETTINGS, sub)) => Ok(Action::Settings {
            db,
            include_private: sub.get_flag(ARG_INCLUDE_PRIVATE),
        }),
        Some((CMD_UNLOCK, sub)) => {
            let user_id = sub
                .get_one::<Uuid>(ARG_USER_ID)
                .copied()
                .context("missing required argument: <user-id>")?;
            Ok(Action::Unlock {
                db,
                auth: auth_config(matches)?,
                user_id,
            })
        }
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("no command given"),
    }
}

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn db_config(matches: &ArgMatches) -> Result<DbConfig> {
    Ok(DbConfig {
        url: required(matches, ARG_DB_URL)?,
        namespace: required(matches, ARG_DB_NAMESPACE)?,
        database: required(matches, ARG_DB_DATABASE)?,
        username: required(matches, ARG_DB_USER)?,
        password: required(matches, ARG_DB_PASSWORD)?,
    })
}

fn auth_config(matches: &ArgMatches) -> Result<AuthConfig> {
    let mfa_encryption_key = matches
        .get_one::<String>(ARG_MFA_KEY)
        .map(|hex_key| parse_key(hex_key))
        .transpose()?;

    Ok(AuthConfig {
        jwt_secret: matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .unwrap_or_default(),
        pepper: matches.get_one::<String>(ARG_PEPPER).cloned(),
        mfa_encryption_key,
        ..AuthConfig::default()
    })
}

fn parse_key(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim()).context("--mfa-key is not valid hex")?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        anyhow!(
            "--mfa-key must be 32 bytes (64 hex characters), got {}",
            bytes.len()
        )
    })
}
