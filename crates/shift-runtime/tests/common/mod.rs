//! Shared setup for tests that need PostgreSQL.
//!
//! Every test gets its own database on the server named by
//! `TEST_DATABASE_URL` and skips itself when the variable is unset.

use shift_core::testing::{IsolatedTestDb, TestDatabase};
use shift_core::{CallScope, DatabaseConfig};
use shift_runtime::{Database, Queryer};

pub struct TestDb {
    pub db: Database,
    isolated: IsolatedTestDb,
}

impl TestDb {
    pub async fn setup(test_name: &str) -> Option<Self> {
        let Some(server) = TestDatabase::try_from_env().await.unwrap() else {
            eprintln!("skipping {}: TEST_DATABASE_URL not set", test_name);
            return None;
        };

        let isolated = server.isolated(test_name).await.unwrap();
        let db = Database::connect(&DatabaseConfig::from_url(isolated.url()))
            .await
            .unwrap();

        Some(Self { db, isolated })
    }

    /// Row count of `table`.
    #[allow(dead_code)]
    pub async fn count(&self, table: &str) -> i64 {
        let (count,): (i64,) = self
            .db
            .get(
                &CallScope::new(),
                &format!("SELECT count(*) FROM {}", table),
                vec![],
            )
            .await
            .unwrap();
        count
    }

    pub async fn teardown(self) {
        drop(self.db);
        self.isolated.cleanup().await.unwrap();
    }
}
