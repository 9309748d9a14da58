//! SQLite-backed existence oracle and entity store.

use crate::error::Result;
use crate::sources::{EntityStore, ExistenceOracle, StoreSession};
use async_trait::async_trait;
use bluechip_core::{CompanyNumber, Entity};
use bluechip_db::companies;
use bluechip_db::Database;
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;

#[async_trait]
impl ExistenceOracle for Database {
    async fn exists(&self, number: &CompanyNumber) -> Result<bool> {
        let mut conn = self.acquire().await?;
        Ok(companies::company_exists(&mut conn, number).await?)
    }
}

#[async_trait]
impl EntityStore for Database {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>> {
        let conn = self.acquire().await?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

/// One pooled connection; returned to the pool on drop.
pub struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn exists(&mut self, number: &CompanyNumber) -> Result<bool> {
        Ok(companies::company_exists(&mut self.conn, number).await?)
    }

    async fn insert_batch(&mut self, entities: &[Entity]) -> Result<u64> {
        Ok(companies::insert_companies(&mut self.conn, entities).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_round_trip() {
        let db = Database::new(":memory:").await.expect("create db");
        db.run_migrations().await.expect("run migrations");
        let number = CompanyNumber::new("00000001").expect("valid company number");

        {
            let mut session = db.open_session().await.expect("open session");
            assert!(!session.exists(&number).await.expect("exists"));
            let written = session
                .insert_batch(&[Entity::new(number.clone(), "Alpha Ltd")])
                .await
                .expect("insert");
            assert_eq!(written, 1);
        }

        assert!(ExistenceOracle::exists(&db, &number).await.expect("exists"));
    }
}
