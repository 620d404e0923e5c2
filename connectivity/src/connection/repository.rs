//! Per-cluster connection entries
//!
//! At most one entry exists per cluster id. An entry is either `Pending`
//! (an attempt is running and callers await its shared result) or
//! `Connected`. Failed and cancelled attempts leave no entry behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::transport::NetworkConnection;

/// Outcome of a connection attempt, awaitable by any number of callers
pub type SharedConnection = Shared<BoxFuture<'static, ClientResult<Arc<NetworkConnection>>>>;

type ResultSender = oneshot::Sender<ClientResult<Arc<NetworkConnection>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Connected,
}

struct ConnectionEntry {
    attempt_id: u64,
    state: ConnectionState,
    shared: SharedConnection,
    connection: Option<Arc<NetworkConnection>>,
    task: Option<AbortHandle>,
}

#[derive(Default)]
struct Entries {
    next_attempt_id: u64,
    by_cluster: HashMap<String, ConnectionEntry>,
}

/// Result of [`ConnectionRepository::get_or_insert_pending`]
pub enum Lookup {
    /// An entry already existed; await its result
    Existing(SharedConnection),
    /// A new pending entry was created; the caller must run the attempt
    Created(PendingAttempt),
}

/// Table of connection entries keyed by cluster id
#[derive(Default)]
pub struct ConnectionRepository {
    entries: Mutex<Entries>,
}

impl ConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the entry for `cluster_id`, or create a pending one atomically.
    pub fn get_or_insert_pending(self: &Arc<Self>, cluster_id: &str) -> Lookup {
        let mut entries = self.lock();
        if let Some(entry) = entries.by_cluster.get(cluster_id) {
            let released = entry.connection.as_ref().is_some_and(|c| c.is_closed());
            if !released {
                return Lookup::Existing(entry.shared.clone());
            }
            // Closed underneath its entry; start over
            debug!(
                cluster_id,
                attempt_id = entry.attempt_id,
                "Replacing closed connection"
            );
            entries.by_cluster.remove(cluster_id);
        }

        entries.next_attempt_id += 1;
        let attempt_id = entries.next_attempt_id;
        let (sender, receiver) = oneshot::channel();
        let cancelled_id = cluster_id.to_string();
        let shared = receiver
            .map(move |received| {
                received.unwrap_or_else(|_| Err(ClientError::cancelled(cancelled_id)))
            })
            .boxed()
            .shared();

        entries.by_cluster.insert(
            cluster_id.to_string(),
            ConnectionEntry {
                attempt_id,
                state: ConnectionState::Pending,
                shared: shared.clone(),
                connection: None,
                task: None,
            },
        );
        debug!(cluster_id, attempt_id, "Created pending connection entry");

        Lookup::Created(PendingAttempt {
            repository: Arc::clone(self),
            cluster_id: cluster_id.to_string(),
            attempt_id,
            sender: Some(sender),
            shared,
        })
    }

    /// Record the task running `attempt_id`.
    ///
    /// Returns `false` if that attempt's entry no longer exists.
    pub fn attach_task(&self, cluster_id: &str, attempt_id: u64, task: AbortHandle) -> bool {
        let mut entries = self.lock();
        match entries.by_cluster.get_mut(cluster_id) {
            Some(entry) if entry.attempt_id == attempt_id => {
                entry.task = Some(task);
                true
            }
            _ => false,
        }
    }

    fn mark_connected(
        &self,
        cluster_id: &str,
        attempt_id: u64,
        connection: Arc<NetworkConnection>,
    ) -> bool {
        let mut entries = self.lock();
        match entries.by_cluster.get_mut(cluster_id) {
            Some(entry) if entry.attempt_id == attempt_id => {
                entry.state = ConnectionState::Connected;
                entry.connection = Some(connection);
                entry.task = None;
                true
            }
            _ => false,
        }
    }

    fn remove_attempt(&self, cluster_id: &str, attempt_id: u64) -> bool {
        let mut entries = self.lock();
        let matches = entries
            .by_cluster
            .get(cluster_id)
            .is_some_and(|entry| entry.attempt_id == attempt_id);
        if matches {
            entries.by_cluster.remove(cluster_id);
            debug!(cluster_id, attempt_id, "Removed connection entry");
        }
        matches
    }

    /// Remove the entry for `cluster_id`, aborting a pending attempt or
    /// closing an established connection. Returns the state it was in.
    pub fn remove(&self, cluster_id: &str) -> Option<ConnectionState> {
        let entry = self.lock().by_cluster.remove(cluster_id)?;
        Some(tear_down(cluster_id, entry))
    }

    /// Remove every entry. Returns the cluster ids that were removed.
    pub fn drain(&self) -> Vec<(String, ConnectionState)> {
        let drained: Vec<_> = self.lock().by_cluster.drain().collect();
        drained
            .into_iter()
            .map(|(cluster_id, entry)| {
                let state = tear_down(&cluster_id, entry);
                (cluster_id, state)
            })
            .collect()
    }

    pub fn state(&self, cluster_id: &str) -> Option<ConnectionState> {
        self.lock().by_cluster.get(cluster_id).map(|e| e.state)
    }

    /// The established connection for `cluster_id`, if any
    pub fn connection(&self, cluster_id: &str) -> Option<Arc<NetworkConnection>> {
        self.lock()
            .by_cluster
            .get(cluster_id)
            .and_then(|e| e.connection.clone())
    }

    pub fn cluster_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().by_cluster.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().by_cluster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Release whatever an entry holds. Runs outside the repository lock.
fn tear_down(cluster_id: &str, entry: ConnectionEntry) -> ConnectionState {
    if let Some(task) = entry.task {
        task.abort();
    }
    if let Some(connection) = entry.connection {
        connection.close();
    }
    debug!(
        cluster_id,
        attempt_id = entry.attempt_id,
        state = ?entry.state,
        "Tore down connection entry"
    );
    entry.state
}

/// Ownership of a pending entry's outcome.
///
/// Exactly one of `succeed` or `fail` publishes the result. Dropping the
/// attempt unpublished (for instance because its task was aborted) removes
/// the entry and resolves every waiter with [`ClientError::Cancelled`].
pub struct PendingAttempt {
    repository: Arc<ConnectionRepository>,
    cluster_id: String,
    attempt_id: u64,
    sender: Option<ResultSender>,
    shared: SharedConnection,
}

impl PendingAttempt {
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn attempt_id(&self) -> u64 {
        self.attempt_id
    }

    /// The future waiters of this attempt resolve through
    pub fn shared(&self) -> SharedConnection {
        self.shared.clone()
    }

    /// Publish an established connection.
    ///
    /// If the entry was torn down meanwhile, the connection is closed and
    /// waiters see `Cancelled`.
    pub fn succeed(
        mut self,
        connection: Arc<NetworkConnection>,
    ) -> ClientResult<Arc<NetworkConnection>> {
        let result = if self.repository.mark_connected(
            &self.cluster_id,
            self.attempt_id,
            Arc::clone(&connection),
        ) {
            Ok(connection)
        } else {
            connection.close();
            Err(ClientError::cancelled(&self.cluster_id))
        };
        self.publish(result.clone());
        result
    }

    /// Remove the entry, then publish `error` to every waiter.
    pub fn fail(mut self, error: ClientError) -> ClientError {
        self.repository
            .remove_attempt(&self.cluster_id, self.attempt_id);
        self.publish(Err(error.clone()));
        error
    }

    fn publish(&mut self, result: ClientResult<Arc<NetworkConnection>>) {
        if let Some(sender) = self.sender.take() {
            // Every waiter may have gone away; the entry still holds the result
            let _ = sender.send(result);
        }
    }
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.repository
                .remove_attempt(&self.cluster_id, self.attempt_id);
            debug!(
                cluster_id = %self.cluster_id,
                attempt_id = self.attempt_id,
                "Connection attempt dropped before completing"
            );
        }
    }
}
