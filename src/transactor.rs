//! The transaction boundary (C5): runs a composite DB action either
//! inside a single transaction or outside it, over a small fixed-size
//! connection pool.
//!
//! Grounded on the teacher's `pool::connection_pool` acquire/release
//! shape, collapsed to the fixed pool size this domain needs (loads are
//! single-flight; four connections cover the load, manifest reads, the
//! folder monitor, and the ready-check).

use crate::error::{LoaderError, Result};
use crate::statement::SqlText;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

pub const DEFAULT_POOL_SIZE: usize = 4;

/// A single warehouse connection. Autocommit is expected to be off;
/// `execute`/`query_*` run one statement each.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, sql: &SqlText) -> Result<()>;
    /// A single scalar result, or `None` for zero rows — used by
    /// `TableExists`, `GetVersion`, `Select1`, `ReadyCheck`.
    async fn query_scalar(&self, sql: &SqlText) -> Result<Option<String>>;
    /// Row-shaped results — used by `GetColumns`, `FoldersMinusManifest`,
    /// `ManifestGet`.
    async fn query_rows(&self, sql: &SqlText) -> Result<Vec<Vec<String>>>;
}

/// Opens fresh connections to the warehouse. Credential resolution, the
/// real JDBC driver, and TLS/tunnel plumbing are out of scope (§1) —
/// this trait is the seam a production binary plugs them in behind.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// The transaction boundary. Holds a semaphore sized to the pool limit
/// so at most `DEFAULT_POOL_SIZE` connections are open concurrently.
pub struct Transactor {
    factory: Arc<dyn ConnectionFactory>,
    target: Arc<dyn crate::target::Target>,
    permits: Arc<Semaphore>,
}

impl Transactor {
    pub fn new(factory: Arc<dyn ConnectionFactory>, target: Arc<dyn crate::target::Target>) -> Self {
        Transactor::with_pool_size(factory, target, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(factory: Arc<dyn ConnectionFactory>, target: Arc<dyn crate::target::Target>, pool_size: usize) -> Self {
        Transactor { factory, target, permits: Arc::new(Semaphore::new(pool_size)) }
    }

    /// The dialect this transactor renders statements against. Pure
    /// `Target` methods (no catalog I/O) can be called directly rather
    /// than routed through `run`/`transact`.
    pub fn target(&self) -> &dyn crate::target::Target {
        self.target.as_ref()
    }

    /// Open a connection, run `body`, release — no BEGIN/COMMIT. Used
    /// for statements the warehouse forbids inside a transaction.
    #[instrument(skip_all)]
    pub async fn run<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c dyn Connection, &'c dyn crate::target::Target) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LoaderError::transient_db("connection pool closed"))?;
        let conn = self.factory.connect().await?;
        debug!("acquired connection outside transaction");
        body(conn.as_ref(), self.target.as_ref()).await
    }

    /// Open a connection, BEGIN, run `body`, COMMIT on success, ROLLBACK
    /// on any failure, release.
    #[instrument(skip_all)]
    pub async fn transact<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c dyn Connection, &'c dyn crate::target::Target) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LoaderError::transient_db("connection pool closed"))?;
        let conn = self.factory.connect().await?;
        debug!("acquired connection, beginning transaction");
        let begin = self.target.to_fragment(&crate::statement::Statement::Begin)?;
        conn.execute(&begin).await?;

        match body(conn.as_ref(), self.target.as_ref()).await {
            Ok(value) => {
                let commit = self.target.to_fragment(&crate::statement::Statement::Commit)?;
                conn.execute(&commit).await?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(e) => {
                let abort = self.target.to_fragment(&crate::statement::Statement::Abort);
                if let Ok(abort) = abort {
                    let _ = conn.execute(&abort).await;
                }
                debug!(error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }
}

/// An in-memory [`Connection`]/[`ConnectionFactory`] used by tests: a
/// log of executed statements plus a scripted table of query responses.
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct FakeConnection {
        pub executed: Mutex<Vec<String>>,
        pub scalar_responses: Mutex<VecDeque<Option<String>>>,
        pub row_responses: Mutex<VecDeque<Vec<Vec<String>>>>,
        pub fail_on_execute_containing: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn execute(&self, sql: &SqlText) -> Result<()> {
            if let Some(needle) = self.fail_on_execute_containing.lock().clone() {
                if sql.as_str().contains(&needle) {
                    return Err(LoaderError::transient_db(format!("injected failure executing: {}", sql.as_str())));
                }
            }
            self.executed.lock().push(sql.as_str().to_string());
            Ok(())
        }

        async fn query_scalar(&self, _sql: &SqlText) -> Result<Option<String>> {
            Ok(self.scalar_responses.lock().pop_front().flatten())
        }

        async fn query_rows(&self, _sql: &SqlText) -> Result<Vec<Vec<String>>> {
            Ok(self.row_responses.lock().pop_front().unwrap_or_default())
        }
    }

    pub struct FakeConnectionFactory {
        pub conn: Arc<FakeConnection>,
    }

    impl FakeConnectionFactory {
        pub fn new(conn: Arc<FakeConnection>) -> Self {
            FakeConnectionFactory { conn }
        }
    }

    #[async_trait]
    impl ConnectionFactory for FakeConnectionFactory {
        async fn connect(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(ProxyConnection(self.conn.clone())))
        }
    }

    /// Wraps the shared `FakeConnection` so every `connect()` call hands
    /// out a handle to the same recorded state.
    pub struct ProxyConnection(pub Arc<FakeConnection>);

    #[async_trait]
    impl Connection for ProxyConnection {
        async fn execute(&self, sql: &SqlText) -> Result<()> {
            self.0.execute(sql).await
        }

        async fn query_scalar(&self, sql: &SqlText) -> Result<Option<String>> {
            self.0.query_scalar(sql).await
        }

        async fn query_rows(&self, sql: &SqlText) -> Result<Vec<Vec<String>>> {
            self.0.query_rows(sql).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;
    use crate::target::RedshiftTarget;
    use std::sync::Arc;

    fn transactor() -> (Transactor, Arc<FakeConnection>) {
        let conn = Arc::new(FakeConnection::default());
        let factory = Arc::new(FakeConnectionFactory::new(conn.clone()));
        let differ = Arc::new(crate::collaborators::FakeColumnDiffer::new());
        let target: Arc<dyn crate::target::Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        (Transactor::new(factory, target), conn)
    }

    #[tokio::test]
    async fn transact_commits_on_success() {
        let (tx, conn) = transactor();
        let result = tx
            .transact(|conn, target| {
                Box::pin(async move {
                    let stmt = crate::statement::Statement::Select1;
                    let sql = target.to_fragment(&stmt)?;
                    conn.execute(&sql).await?;
                    Ok(42)
                })
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        let executed = conn.executed.lock().clone();
        assert_eq!(executed, vec!["BEGIN".to_string(), "SELECT 1".to_string(), "COMMIT".to_string()]);
    }

    #[tokio::test]
    async fn transact_rolls_back_on_failure() {
        let (tx, conn) = transactor();
        *conn.fail_on_execute_containing.lock() = Some("SELECT 1".to_string());
        let result: Result<()> = tx
            .transact(|conn, target| {
                Box::pin(async move {
                    let sql = target.to_fragment(&crate::statement::Statement::Select1)?;
                    conn.execute(&sql).await?;
                    Ok(())
                })
            })
            .await;
        assert!(result.is_err());
        let executed = conn.executed.lock().clone();
        assert_eq!(executed, vec!["BEGIN".to_string(), "ABORT".to_string()]);
    }

    #[tokio::test]
    async fn run_does_not_begin_or_commit() {
        let (tx, conn) = transactor();
        tx.run(|conn, target| {
            Box::pin(async move {
                let sql = target.to_fragment(&crate::statement::Statement::Select1)?;
                conn.execute(&sql).await
            })
        })
        .await
        .unwrap();
        assert_eq!(conn.executed.lock().clone(), vec!["SELECT 1".to_string()]);
    }
}
