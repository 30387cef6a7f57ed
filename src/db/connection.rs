use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;
use crate::store::SubscriberRegistry;

const WORKER_NAME: &str = "roomwatch-db";

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// The thread that owns the connection. It drains jobs until every sender is
/// gone, so dropping the last `Database` clone closes the channel and joins.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(mut conn: Connection) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                for job in jobs_rx {
                    job(&mut conn);
                }
                info!("Database worker stopped");
            })
            .context("failed to spawn database worker thread")?;

        Ok(Self {
            jobs: Some(jobs_tx),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.jobs
            .as_ref()
            .ok_or_else(|| anyhow!("database worker is shutting down"))?
            .send(job)
            .map_err(|_| anyhow!("database worker is no longer running"))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Database worker panicked");
            }
        }
    }
}

/// Opens the file, switches it to WAL and brings the schema up to date.
fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

/// SQLite-backed store. All statements run on one worker thread that owns the
/// connection; callers hand it closures through [`Database::execute`].
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
    pub(crate) subscribers: SubscriberRegistry,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        let conn = open_connection(&path)?;
        let worker = Worker::spawn(conn)?;

        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
            subscribers: SubscriberRegistry::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `task` on the worker thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.worker.submit(Box::new(move |conn| {
            // The caller may have given up waiting; the work is done either way.
            let _ = reply_tx.send(task(conn));
        }))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn statements_run_on_the_worker_thread() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("roomwatch.sqlite3")).unwrap();

        let thread_name = db
            .execute(|_| Ok(thread::current().name().map(str::to_string)))
            .await
            .unwrap();
        assert_eq!(thread_name.as_deref(), Some(WORKER_NAME));
        assert!(db.path().exists());

        let journal: String = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("roomwatch.sqlite3")).unwrap();

        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());

        // The worker keeps serving after a failed task.
        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
