use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::DatabaseSettings;

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_create_resources",
    include_str!("../../migrations/0001_create_resources.sql"),
)];

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(settings.max_lifetime_seconds))
            .connect(&settings.url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the bundled schema. Every statement is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            tracing::debug!(migration = name, "applying migration");
            sqlx::raw_sql(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
