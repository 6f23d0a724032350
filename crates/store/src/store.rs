use irm_core::error::Result;
use sqlx::{PgPool, Postgres, Transaction};

/// Cloneable handle over the shared pool. Every entity operation in the
/// sibling modules hangs off this type; it is the only effect boundary in
/// the system.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
