//! Cached, coalesced access to federation metadata.
//!
//! The directory remembers the last cluster URI it was pointed at and keeps
//! one cache slot:
//!
//! ```text
//! Empty ──get_current──► InFlight ──ok──► Ready ──refresh interval──► (stale)
//!   ▲                       │                                           │
//!   └─────────err───────────┘        get_current on stale ──► InFlight ◄┘
//!
//! connect_to: any state ──► InFlight (new generation, previous attempt detached)
//! ```
//!
//! Every caller arriving while a fetch is in flight awaits the same shared
//! future, so N concurrent readers cost one network call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Url;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Federation;
use crate::error::{ClientError, ClientResult};
use crate::http::{fetch_document, HttpFetch};

/// Default age after which cached federation metadata is refetched
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

const FEDERATION_PATH: &str = "/_federation";

type SharedFetch = Shared<BoxFuture<'static, ClientResult<Arc<Federation>>>>;

enum CacheSlot {
    Empty,
    InFlight {
        fetch: SharedFetch,
    },
    Ready {
        fetched_at: Instant,
        federation: Arc<Federation>,
    },
}

struct DirectoryState {
    cluster_uri: Option<Url>,
    /// Bumped on every fetch start; a completing fetch only writes the slot
    /// if its generation is still current.
    generation: u64,
    slot: CacheSlot,
}

fn lock(state: &Mutex<DirectoryState>) -> MutexGuard<'_, DirectoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn no_cluster_uri() -> ClientError {
    ClientError::configuration(
        "No cluster URI set. Configure a default cluster URI or pass one when connecting to the federation",
    )
}

/// Fetches and caches the federation a cluster belongs to
pub struct FederationDirectory {
    fetcher: Arc<dyn HttpFetch>,
    refresh_interval: Duration,
    state: Arc<Mutex<DirectoryState>>,
}

impl FederationDirectory {
    /// Create a directory. `cluster_uri` is the default entry cluster, if known.
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        cluster_uri: Option<Url>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            refresh_interval,
            state: Arc::new(Mutex::new(DirectoryState {
                cluster_uri,
                generation: 0,
                slot: CacheSlot::Empty,
            })),
        }
    }

    /// The cluster URI the next fetch will use
    pub fn current_cluster_uri(&self) -> Option<Url> {
        lock(&self.state).cluster_uri.clone()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Fetch federation metadata from `cluster_uri`, bypassing the cache.
    pub async fn fetch(&self, cluster_uri: &Url) -> ClientResult<Federation> {
        fetch_document(self.fetcher.as_ref(), cluster_uri, FEDERATION_PATH).await
    }

    /// Return the cached federation, refetching it if stale or missing.
    ///
    /// Concurrent callers share a single in-flight fetch and all observe its
    /// result. A failed fetch leaves the cache empty.
    pub async fn get_current(&self) -> ClientResult<Arc<Federation>> {
        let fetch = {
            let mut state = lock(&self.state);
            let joined = match &state.slot {
                CacheSlot::Ready {
                    fetched_at,
                    federation,
                } if fetched_at.elapsed() <= self.refresh_interval => {
                    debug!(cluster = %federation.current.id, "Federation cache hit");
                    return Ok(Arc::clone(federation));
                }
                CacheSlot::InFlight { fetch } => Some(fetch.clone()),
                _ => None,
            };

            match joined {
                Some(fetch) => {
                    debug!("Joining in-flight federation fetch");
                    fetch
                }
                None => {
                    let uri = state.cluster_uri.clone().ok_or_else(no_cluster_uri)?;
                    self.start_fetch(&mut state, uri)
                }
            }
        };

        fetch.await
    }

    /// Point the directory at `cluster_uri` (or keep the remembered one) and
    /// fetch unconditionally, replacing any cached or in-flight metadata.
    pub async fn connect_to(&self, cluster_uri: Option<Url>) -> ClientResult<Arc<Federation>> {
        let fetch = {
            let mut state = lock(&self.state);
            if let Some(uri) = cluster_uri {
                state.cluster_uri = Some(uri);
            }
            let uri = state.cluster_uri.clone().ok_or_else(no_cluster_uri)?;
            info!(%uri, "Connecting to federation");
            self.start_fetch(&mut state, uri)
        };

        fetch.await
    }

    /// Drop cached metadata so the next read refetches.
    ///
    /// An in-flight fetch still completes for its waiters but is not cached.
    pub fn invalidate(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.slot = CacheSlot::Empty;
    }

    /// Whether fresh metadata is cached right now
    pub fn is_cached(&self) -> bool {
        matches!(
            &lock(&self.state).slot,
            CacheSlot::Ready { fetched_at, .. } if fetched_at.elapsed() <= self.refresh_interval
        )
    }

    fn start_fetch(&self, state: &mut DirectoryState, uri: Url) -> SharedFetch {
        state.generation += 1;
        let generation = state.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let shared_state = Arc::clone(&self.state);

        let fetch = async move {
            let result = fetch_document::<Federation>(fetcher.as_ref(), &uri, FEDERATION_PATH)
                .await
                .map(Arc::new);

            let mut state = lock(&shared_state);
            if state.generation == generation {
                match &result {
                    Ok(federation) => {
                        info!(
                            %uri,
                            current = %federation.current.id,
                            clusters = federation.clusters.len(),
                            "Federation metadata refreshed"
                        );
                        state.slot = CacheSlot::Ready {
                            fetched_at: Instant::now(),
                            federation: Arc::clone(federation),
                        };
                    }
                    Err(e) => {
                        warn!(%uri, error = %e, "Federation fetch failed, cache cleared");
                        state.slot = CacheSlot::Empty;
                    }
                }
            } else {
                debug!(%uri, generation, "Superseded federation fetch completed");
            }
            result
        }
        .boxed()
        .shared();

        state.slot = CacheSlot::InFlight {
            fetch: fetch.clone(),
        };
        fetch
    }
}
