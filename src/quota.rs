use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Rate-limited action categories tracked per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKey {
    Llm,
    Image,
    Text,
}

impl QuotaKey {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaKey::Llm => "llm",
            QuotaKey::Image => "image",
            QuotaKey::Text => "text",
        }
    }
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Decrement the account's allowance; `Ok(false)` means denied.
    async fn consume(&self, user_id: Uuid, key: QuotaKey, amount: i32) -> anyhow::Result<bool>;
}

/// Ledger backed by the `consume_user_quota` Postgres function.
pub struct PgQuotaLedger {
    db: PgPool,
}

impl PgQuotaLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QuotaLedger for PgQuotaLedger {
    async fn consume(&self, user_id: Uuid, key: QuotaKey, amount: i32) -> anyhow::Result<bool> {
        let granted = sqlx::query_scalar::<_, bool>("SELECT consume_user_quota($1, $2, $3)")
            .bind(user_id)
            .bind(key.as_str())
            .bind(amount)
            .fetch_one(&self.db)
            .await
            .context("consume_user_quota rpc")?;
        debug!(%user_id, key = key.as_str(), amount, granted, "quota consume");
        Ok(granted)
    }
}
