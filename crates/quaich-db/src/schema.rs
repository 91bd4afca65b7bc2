//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as strings and enums as
//! strings with ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "settings_and_users",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- System settings (record id = setting key)
-- =======================================================================
DEFINE TABLE setting SCHEMAFULL;
DEFINE FIELD key ON TABLE setting TYPE string;
DEFINE FIELD value ON TABLE setting TYPE option<string>;
DEFINE FIELD data_type ON TABLE setting TYPE string \
    ASSERT $value IN ['string', 'number', 'boolean', 'json', 'array'];
DEFINE FIELD category ON TABLE setting TYPE string DEFAULT 'general';
DEFINE FIELD description ON TABLE setting TYPE option<string>;
DEFINE FIELD is_public ON TABLE setting TYPE bool DEFAULT false;
DEFINE FIELD is_readonly ON TABLE setting TYPE bool DEFAULT false;
DEFINE FIELD validation_rules ON TABLE setting TYPE option<string>;
DEFINE FIELD created_at ON TABLE setting TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE setting TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_setting_key ON TABLE setting COLUMNS key UNIQUE;
DEFINE INDEX idx_setting_category ON TABLE setting COLUMNS category;

-- =======================================================================
-- Users, with login-failure and two-factor state
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['Member', 'Moderator', 'Admin'];
DEFINE FIELD status ON TABLE user TYPE string \
    ASSERT $value IN ['Active', 'PendingApproval', 'Suspended'];
DEFINE FIELD email_verified ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD failed_login_attempts ON TABLE user TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD account_locked_until ON TABLE user TYPE option<datetime>;
DEFINE FIELD last_failed_login ON TABLE user TYPE option<datetime>;
DEFINE FIELD two_factor_enabled ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD two_factor_secret ON TABLE user TYPE option<string>;
DEFINE FIELD two_factor_backup_codes ON TABLE user TYPE array<string> \
    DEFAULT [];
DEFINE FIELD two_factor_last_used ON TABLE user TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_user_username ON TABLE user COLUMNS username UNIQUE;
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;
";

/// Apply every migration newer than the recorded schema version.
/// Safe to call on every start-up.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}
