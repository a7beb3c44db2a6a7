/// Postgres store
///
/// Accounts and their bindings live in separate tables; the
/// `UNIQUE (method, identifier)` index on `auth_bindings` is what makes
/// registration races loud, and code issuance is a single conditional
/// `INSERT ... SELECT ... WHERE count < n RETURNING` statement so the
/// quota check and the write cannot interleave.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::models::{
    Account, AccountMergeRequest, AuthBinding, AuthMethod, CodePurpose, MergeConflicts,
    MergeResolution, MergeStatus, MfaSettings, VerificationCode,
};

use super::{AccountStore, MergeRequestStore, VerificationCodeStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;
        Ok(())
    }

    async fn load_account(&self, row: AccountRow) -> Result<Account> {
        let bindings = sqlx::query_as::<_, BindingRow>(
            r#"
            SELECT method, identifier, verified, bound_at
            FROM auth_bindings
            WHERE account_id = $1
            ORDER BY position
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        row.into_account(bindings)
    }

    async fn replace_bindings(
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
    ) -> Result<()> {
        sqlx::query("DELETE FROM auth_bindings WHERE account_id = $1")
            .bind(account.id)
            .execute(tx.as_mut())
            .await?;

        for (position, binding) in account.bindings.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO auth_bindings (account_id, method, identifier, verified, bound_at, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(account.id)
            .bind(binding.method)
            .bind(&binding.identifier)
            .bind(binding.verified)
            .bind(binding.bound_at)
            .bind(position as i32)
            .execute(tx.as_mut())
            .await?;
        }

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    primary_method: AuthMethod,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    role_name: Option<String>,
    mfa: Option<serde_json::Value>,
    oauth_metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self, bindings: Vec<BindingRow>) -> Result<Account> {
        let mfa: Option<MfaSettings> = match self.mfa {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| AuthError::Database(format!("corrupt mfa column: {e}")))?,
            ),
            None => None,
        };
        let oauth_metadata = serde_json::from_value(self.oauth_metadata)
            .map_err(|e| AuthError::Database(format!("corrupt oauth_metadata column: {e}")))?;

        Ok(Account {
            id: self.id,
            primary_method: self.primary_method,
            bindings: bindings
                .into_iter()
                .map(|b| AuthBinding {
                    method: b.method,
                    identifier: b.identifier,
                    verified: b.verified,
                    bound_at: b.bound_at,
                })
                .collect(),
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            role_name: self.role_name,
            mfa,
            oauth_metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BindingRow {
    method: AuthMethod,
    identifier: String,
    verified: bool,
    bound_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CodeRow {
    id: Uuid,
    code: String,
    identifier: String,
    method: AuthMethod,
    purpose: CodePurpose,
    contact: String,
    is_used: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<CodeRow> for VerificationCode {
    fn from(row: CodeRow) -> Self {
        VerificationCode {
            id: row.id,
            code: row.code,
            identifier: row.identifier,
            method: row.method,
            purpose: row.purpose,
            contact: row.contact,
            is_used: row.is_used,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MergeRow {
    id: Uuid,
    primary_account_id: Uuid,
    secondary_account_id: Option<Uuid>,
    method: AuthMethod,
    conflicts: serde_json::Value,
    status: MergeStatus,
    resolution: Option<serde_json::Value>,
    expires_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MergeRow {
    fn into_request(self) -> Result<AccountMergeRequest> {
        let conflicts: MergeConflicts = serde_json::from_value(self.conflicts)
            .map_err(|e| AuthError::Database(format!("corrupt conflicts column: {e}")))?;
        let resolution: Option<MergeResolution> = match self.resolution {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| AuthError::Database(format!("corrupt resolution column: {e}")))?,
            ),
            None => None,
        };

        Ok(AccountMergeRequest {
            id: self.id,
            primary_account_id: self.primary_account_id,
            secondary_account_id: self.secondary_account_id,
            method: self.method,
            conflicts,
            status: self.status,
            resolution,
            expires_at: self.expires_at,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_identifier(
        &self,
        method: AuthMethod,
        identifier: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT a.*
            FROM accounts a
            JOIN auth_bindings b ON b.account_id = a.id
            WHERE b.method = $1 AND b.identifier = $2
            "#,
        )
        .bind(method)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_account(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load_account(row).await?)),
            None => Ok(None),
        }
    }

    async fn insert_account(&self, account: &Account) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, primary_method, password_hash, first_name, last_name,
                display_name, avatar_url, role_name, mfa, oauth_metadata,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(account.id)
        .bind(account.primary_method)
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.display_name)
        .bind(&account.avatar_url)
        .bind(&account.role_name)
        .bind(
            account
                .mfa
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(
            serde_json::to_value(&account.oauth_metadata)
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(tx.as_mut())
        .await?;

        Self::replace_bindings(&mut tx, account).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = $2,
                first_name = $3,
                last_name = $4,
                display_name = $5,
                avatar_url = $6,
                role_name = $7,
                mfa = $8,
                oauth_metadata = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.display_name)
        .bind(&account.avatar_url)
        .bind(&account.role_name)
        .bind(
            account
                .mfa
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(
            serde_json::to_value(&account.oauth_metadata)
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(Utc::now())
        .execute(tx.as_mut())
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AuthError::UserNotFound);
        }

        Self::replace_bindings(&mut tx, account).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_accounts(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl VerificationCodeStore for PgStore {
    async fn insert_code_if_quota(
        &self,
        code: &VerificationCode,
        window: Duration,
        max: i64,
    ) -> Result<bool> {
        let cutoff = Utc::now() - window;

        // One conditional write: the quota count and the insert execute
        // as a single statement, so concurrent issuers cannot both pass.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO verification_codes
                (id, code, identifier, method, purpose, contact, is_used, expires_at, created_at)
            SELECT $1, $2, $3, $4, $5, $6, FALSE, $7, $8
            WHERE (
                SELECT COUNT(*) FROM verification_codes
                WHERE identifier = $3 AND method = $4 AND created_at > $9
            ) < $10
            RETURNING id
            "#,
        )
        .bind(code.id)
        .bind(&code.code)
        .bind(&code.identifier)
        .bind(code.method)
        .bind(code.purpose)
        .bind(&code.contact)
        .bind(code.expires_at)
        .bind(code.created_at)
        .bind(cutoff)
        .bind(max)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.is_some())
    }

    async fn find_unused_code(
        &self,
        code: &str,
        identifier: &str,
        method: AuthMethod,
        purpose: CodePurpose,
    ) -> Result<Option<VerificationCode>> {
        let row = sqlx::query_as::<_, CodeRow>(
            r#"
            SELECT * FROM verification_codes
            WHERE code = $1 AND identifier = $2 AND method = $3 AND purpose = $4
              AND is_used = FALSE
            "#,
        )
        .bind(code)
        .bind(identifier)
        .bind(method)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VerificationCode::from))
    }

    async fn consume_code(&self, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("UPDATE verification_codes SET is_used = TRUE WHERE id = $1 AND is_used = FALSE")
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl MergeRequestStore for PgStore {
    async fn insert_merge_request(&self, request: &AccountMergeRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO merge_requests (
                id, primary_account_id, secondary_account_id, method, conflicts,
                status, resolution, expires_at, resolved_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(request.id)
        .bind(request.primary_account_id)
        .bind(request.secondary_account_id)
        .bind(request.method)
        .bind(
            serde_json::to_value(&request.conflicts)
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(request.status)
        .bind(
            request
                .resolution
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(request.expires_at)
        .bind(request.resolved_at)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_merge_request(&self, id: Uuid) -> Result<Option<AccountMergeRequest>> {
        let row = sqlx::query_as::<_, MergeRow>("SELECT * FROM merge_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MergeRow::into_request).transpose()
    }

    async fn update_merge_request(&self, request: &AccountMergeRequest) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE merge_requests
            SET status = $2, resolution = $3, resolved_at = $4
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(request.status)
        .bind(
            request
                .resolution
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        )
        .bind(request.resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::MergeRequestNotFound);
        }

        Ok(())
    }
}
