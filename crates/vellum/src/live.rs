//! Live queries: repository reads that re-run when the tables they depend
//! on change.
//!
//! A [`LiveQuery`] pairs an async query closure with the set of tables it
//! reads. A background task listens on the database's commit feed and
//! re-executes the query whenever a commit touches one of those tables,
//! publishing the fresh snapshot over a `watch` channel. The channel
//! conflates, so subscribers only ever observe the latest result, tagged
//! with the commit sequence it was computed at; versions never go
//! backwards. Invalidation is per table, not per row, so a refresh may
//! find nothing changed; such results advance the version silently without
//! waking subscribers.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use vellum_api::{Result, StoreError};

use crate::storage::Database;

/// One delivered query result: the snapshot and the data version it
/// reflects.
#[derive(Debug)]
pub struct LiveResult<T> {
    /// Commit sequence the snapshot was computed at.
    pub version: u64,
    pub data: Arc<T>,
}

impl<T> Clone for LiveResult<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            data: Arc::clone(&self.data),
        }
    }
}

/// A subscription to a repository query that stays current.
///
/// Cheap to clone; clones share the refresh task. The task stops once
/// every handle is dropped, and a refresh that completes after teardown is
/// discarded rather than delivered.
pub struct LiveQuery<T> {
    rx: watch::Receiver<LiveResult<T>>,
}

impl<T> Clone for LiveQuery<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("version", &self.rx.borrow().version)
            .finish()
    }
}

impl<T> LiveQuery<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Register a live query over `tables` and run it once, so the handle
    /// holds a current snapshot from the start. The query closure receives
    /// a database clone on every run.
    ///
    /// The commit feed is subscribed before the first run, so a write
    /// landing during it is not lost; the follow-up notice re-runs the
    /// query and the version check sorts out which result is newer.
    pub async fn new<F, Fut>(
        db: &Database,
        tables: impl IntoIterator<Item = impl Into<String>>,
        query: F,
    ) -> Result<Self>
    where
        F: Fn(Database) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        let tables: BTreeSet<String> = tables.into_iter().map(Into::into).collect();
        let mut commits = db.subscribe_commits();
        let version = db.commit_seq().await;
        let data = query(db.clone()).await?;
        let (tx, rx) = watch::channel(LiveResult {
            version,
            data: Arc::new(data),
        });
        let task_db = db.clone();
        tokio::spawn(async move {
            loop {
                let relevant = tokio::select! {
                    _ = tx.closed() => break,
                    notice = commits.recv() => match notice {
                        Ok(notice) => notice.touches(&tables),
                        Err(RecvError::Lagged(missed)) => {
                            // Missed notices may have touched our tables.
                            debug!(missed, "live query lagged behind the commit feed");
                            true
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                if !relevant {
                    continue;
                }
                let version = task_db.commit_seq().await;
                if version <= tx.borrow().version {
                    // An earlier refresh already covered this commit.
                    continue;
                }
                match query(task_db.clone()).await {
                    Ok(data) => {
                        tx.send_if_modified(|current| {
                            if version <= current.version {
                                return false;
                            }
                            current.version = version;
                            if *current.data == data {
                                // Advance the version without waking anyone.
                                return false;
                            }
                            current.data = Arc::new(data);
                            true
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "live query refresh failed, keeping last snapshot");
                    }
                }
            }
            debug!("live query task stopped");
        });
        Ok(Self { rx })
    }

    /// The latest delivered snapshot.
    pub fn get(&self) -> LiveResult<T> {
        self.rx.borrow().clone()
    }

    /// Wait until a snapshot newer than the last one seen through this
    /// handle is delivered, then return it.
    pub async fn changed(&mut self) -> Result<LiveResult<T>> {
        self.rx.changed().await.map_err(|_| StoreError::Storage {
            message: "live query refresh task stopped".to_string(),
        })?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Adapt the subscription into a stream. Yields the current snapshot
    /// first, then every delivered change.
    pub fn into_stream(self) -> WatchStream<LiveResult<T>> {
        WatchStream::new(self.rx)
    }
}

#[cfg(test)]
#[path = "live_tests.rs"]
mod live_tests;
