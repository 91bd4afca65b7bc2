//! SurrealDB implementation of [`UserRepository`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1) and a random salt per
//! hash. An optional pepper can be supplied at construction time.
//!
//! Counter and backup-code mutations are single `UPDATE` statements so
//! that concurrent logins against one account cannot lose an increment
//! or spend the same backup code twice.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use quaich_core::error::QuaichResult;
use quaich_core::models::user::{CreateUser, UpdateUser, User, UserRole, UserStatus};
use quaich_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

const ENTITY: &str = "user";

/// Row for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    email_verified: bool,
    failed_login_attempts: u32,
    account_locked_until: Option<DateTime<Utc>>,
    last_failed_login: Option<DateTime<Utc>>,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    two_factor_backup_codes: Vec<String>,
    two_factor_last_used: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row that carries the record id via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    email_verified: bool,
    failed_login_attempts: u32,
    account_locked_until: Option<DateTime<Utc>>,
    last_failed_login: Option<DateTime<Utc>>,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    two_factor_backup_codes: Vec<String>,
    two_factor_last_used: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CounterRow {
    failed_login_attempts: u32,
}

#[derive(Debug, SurrealValue)]
struct IdRow {
    #[allow(dead_code)]
    record_id: String,
}

fn corrupt(message: String) -> DbError {
    DbError::Corrupt {
        entity: ENTITY.into(),
        message,
    }
}

fn parse_role(s: &str) -> Result<UserRole, DbError> {
    match s {
        "Member" => Ok(UserRole::Member),
        "Moderator" => Ok(UserRole::Moderator),
        "Admin" => Ok(UserRole::Admin),
        other => Err(corrupt(format!("unknown user role: {other}"))),
    }
}

fn parse_status(s: &str) -> Result<UserStatus, DbError> {
    match s {
        "Active" => Ok(UserStatus::Active),
        "PendingApproval" => Ok(UserStatus::PendingApproval),
        "Suspended" => Ok(UserStatus::Suspended),
        other => Err(corrupt(format!("unknown user status: {other}"))),
    }
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            status: parse_status(&self.status)?,
            email_verified: self.email_verified,
            failed_login_attempts: self.failed_login_attempts,
            account_locked_until: self.account_locked_until,
            last_failed_login: self.last_failed_login,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_secret: self.two_factor_secret,
            two_factor_backup_codes: self.two_factor_backup_codes,
            two_factor_last_used: self.two_factor_last_used,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| corrupt(format!("invalid UUID: {e}")))?;
        UserRow {
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            status: self.status,
            email_verified: self.email_verified,
            failed_login_attempts: self.failed_login_attempts,
            account_locked_until: self.account_locked_until,
            last_failed_login: self.last_failed_login,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_secret: self.two_factor_secret,
            two_factor_backup_codes: self.two_factor_backup_codes,
            two_factor_last_used: self.two_factor_last_used,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_user(id)
    }
}

fn not_found(id: impl Into<String>) -> DbError {
    DbError::NotFound {
        entity: ENTITY.into(),
        id: id.into(),
    }
}

/// `UPDATE ... RETURN meta::id(id)` yields no rows for a missing user.
fn ensure_updated(rows: Vec<IdRow>, id: String) -> QuaichResult<()> {
    if rows.is_empty() {
        return Err(not_found(id).into());
    }
    Ok(())
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
/// The pepper, when present, is prepended to the password.
fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Hashing(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let input = match pepper {
        Some(p) => format!("{p}{password}"),
        None => password.to_string(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| DbError::Hashing(e.to_string()))?;

    Ok(hash.to_string())
}

#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    pepper: Option<String>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }

    async fn find_one(&self, field: &'static str, value: &str) -> QuaichResult<User> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user WHERE {field} = $value"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("value", value.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("{field}={value}")))?;

        Ok(row.try_into_user()?)
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> QuaichResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 username = $username, email = $email, \
                 password_hash = $password_hash, \
                 role = $role, status = $status, \
                 email_verified = false, \
                 failed_login_attempts = 0, \
                 two_factor_enabled = false, \
                 two_factor_backup_codes = []",
            )
            .bind(("id", id_str.clone()))
            .bind(("username", input.username))
            .bind(("email", input.email))
            .bind(("password_hash", password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("status", input.status.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_check(ENTITY, e))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(id_str))?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> QuaichResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(id_str))?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_username(&self, username: &str) -> QuaichResult<User> {
        self.find_one("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> QuaichResult<User> {
        self.find_one("email", email).await
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> QuaichResult<User> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.username.is_some() {
            sets.push("username = $username");
        }
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.email_verified.is_some() {
            sets.push("email_verified = $email_verified");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(username) = input.username {
            builder = builder.bind(("username", username));
        }
        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }
        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }
        if let Some(email_verified) = input.email_verified {
            builder = builder.bind(("email_verified", email_verified));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_check(ENTITY, e))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(id_str))?;

        Ok(row.into_user(id)?)
    }

    async fn update_password(&self, id: Uuid, password: &str) -> QuaichResult<()> {
        let password_hash = hash_password(password, self.pepper.as_deref())?;
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 password_hash = $password_hash, updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        ensure_updated(rows, id_str)
    }

    async fn record_failed_login(&self, id: Uuid, at: DateTime<Utc>) -> QuaichResult<u32> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 failed_login_attempts += 1, \
                 last_failed_login = $at, \
                 updated_at = time::now() \
                 RETURN failed_login_attempts",
            )
            .bind(("id", id_str.clone()))
            .bind(("at", at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<CounterRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(id_str))?;
        Ok(row.failed_login_attempts)
    }

    async fn lock_until(&self, id: Uuid, until: DateTime<Utc>) -> QuaichResult<()> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 account_locked_until = $until, updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("until", until))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        ensure_updated(rows, id_str)
    }

    async fn reset_login_failures(&self, id: Uuid) -> QuaichResult<()> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 failed_login_attempts = 0, \
                 account_locked_until = NONE, \
                 last_failed_login = NONE, \
                 updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        ensure_updated(rows, id_str)
    }

    async fn enable_two_factor(
        &self,
        id: Uuid,
        secret: String,
        backup_code_hashes: Vec<String>,
    ) -> QuaichResult<()> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 two_factor_enabled = true, \
                 two_factor_secret = $secret, \
                 two_factor_backup_codes = $codes, \
                 updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("secret", secret))
            .bind(("codes", backup_code_hashes))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        ensure_updated(rows, id_str)
    }

    async fn disable_two_factor(&self, id: Uuid) -> QuaichResult<()> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 two_factor_enabled = false, \
                 two_factor_secret = NONE, \
                 two_factor_backup_codes = [], \
                 two_factor_last_used = NONE, \
                 updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        ensure_updated(rows, id_str)
    }

    async fn replace_backup_codes(
        &self,
        id: Uuid,
        backup_code_hashes: Vec<String>,
    ) -> QuaichResult<()> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 two_factor_backup_codes = $codes, updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("codes", backup_code_hashes))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        ensure_updated(rows, id_str)
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> QuaichResult<bool> {
        // The WHERE guard makes removal conditional: of two concurrent
        // callers with the same code only one gets a row back.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 two_factor_backup_codes -= $hash, \
                 updated_at = time::now() \
                 WHERE two_factor_backup_codes CONTAINS $hash \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("hash", code_hash.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn claim_two_factor_use(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        unused_since: Option<DateTime<Utc>>,
    ) -> QuaichResult<bool> {
        let guard = if unused_since.is_some() {
            "WHERE two_factor_last_used = NONE OR two_factor_last_used < $since "
        } else {
            ""
        };
        let query = format!(
            "UPDATE type::record('user', $id) SET \
             two_factor_last_used = $at, updated_at = time::now() \
             {guard}RETURN meta::id(id) AS record_id"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id.to_string()))
            .bind(("at", at));
        if let Some(since) = unused_since {
            builder = builder.bind(("since", since));
        }

        let mut result = builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }
}
