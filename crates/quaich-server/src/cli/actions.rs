use anyhow::{Context, Result};
use quaich_auth::{AuthConfig, AuthService};
use quaich_db::repository::{SurrealSettingRepository, SurrealUserRepository};
use quaich_db::{DbConfig, DbManager};
use quaich_settings::{SecuritySettingsResolver, SettingStore};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum Action {
    /// Migrate the schema and seed missing settings.
    Init { db: DbConfig },
    /// Dump settings and the resolved security snapshot.
    Settings { db: DbConfig, include_private: bool },
    /// Clear a member's lockout.
    Unlock {
        db: DbConfig,
        auth: AuthConfig,
        user_id: Uuid,
    },
}

impl Action {
    pub async fn execute(self) -> Result<()> {
        match self {
            Action::Init { db } => init(&db).await,
            Action::Settings {
                db,
                include_private,
            } => settings(&db, include_private).await,
            Action::Unlock { db, auth, user_id } => unlock(&db, auth, user_id).await,
        }
    }
}

async fn connect(config: &DbConfig) -> Result<DbManager> {
    let manager = DbManager::connect(config)
        .await
        .context("failed to connect to SurrealDB")?;
    manager.migrate().await.context("schema migration failed")?;
    Ok(manager)
}

async fn init(config: &DbConfig) -> Result<()> {
    let db = connect(config).await?;
    let repo = SurrealSettingRepository::new(db.client().clone());

    let inserted = SettingStore::new(repo.clone())
        .initialize_defaults()
        .await
        .context("failed to seed default settings")?;

    let snapshot = SecuritySettingsResolver::new(repo).resolve().await;
    info!(
        inserted,
        login_attempt_limit = snapshot.login_attempt_limit,
        account_lockout_duration_minutes = snapshot.account_lockout_duration_minutes,
        session_timeout_hours = snapshot.session_timeout_hours,
        idle_timeout_minutes = snapshot.idle_timeout_minutes,
        enable_two_factor_auth = snapshot.enable_two_factor_auth,
        "Initialisation complete"
    );
    Ok(())
}

async fn settings(config: &DbConfig, include_private: bool) -> Result<()> {
    let db = connect(config).await?;
    let repo = SurrealSettingRepository::new(db.client().clone());

    let settings = SettingStore::new(repo.clone())
        .list_all(include_private)
        .await
        .context("failed to list settings")?;
    let security = SecuritySettingsResolver::new(repo).resolve().await;

    let out = json!({
        "settings": settings,
        "security": security,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn unlock(config: &DbConfig, auth: AuthConfig, user_id: Uuid) -> Result<()> {
    let db = connect(config).await?;
    let users = match &auth.pepper {
        Some(pepper) => SurrealUserRepository::with_pepper(db.client().clone(), pepper.clone()),
        None => SurrealUserRepository::new(db.client().clone()),
    };
    let settings = SurrealSettingRepository::new(db.client().clone());

    AuthService::new(users, settings, auth)
        .unlock_account(user_id)
        .await
        .with_context(|| format!("failed to unlock {user_id}"))?;
    Ok(())
}
