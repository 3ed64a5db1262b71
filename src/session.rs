//! Long-lived resolution sessions.
//!
//! A session tracks one consumer's identity and flags across its lifetime
//! and re-runs fetch + merge on three triggers: mount, identity change and
//! regained focus. Every state change is published through a
//! `tokio::sync::watch` channel; value-equal merges are not signalled.
//!
//! ```text
//! Uninitialized ──mount──▶ Loading ──settle──▶ Resolved ◀──┐
//!       │                                        │  triggers│
//!       └─initial flags─▶ HasInitialFlags ─mount─┘──────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::engine::FlagEngine;
use crate::identity::{normalize_identity, sanitize, Identity};
use crate::merge::merge;
use crate::value::FlagSet;

/// Options for [`FlagEngine::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub identity: Option<Identity>,
    /// Flags preloaded elsewhere. When present the session never fetches on
    /// mount.
    pub initial_flags: Option<FlagSet>,
    /// Defaults to `true`.
    pub revalidate_on_focus: Option<bool>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn initial_flags(mut self, flags: FlagSet) -> Self {
        self.initial_flags = Some(flags);
        self
    }

    pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = Some(enabled);
        self
    }
}

/// Where the currently served flags came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagSource {
    Defaults,
    Initial,
    Cache,
    Network,
}

/// One published resolution state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Flags merged with defaults. Every default key is present.
    pub flags: FlagSet,
    /// `true` until flags are established or the first fetch settles.
    pub loading: bool,
    /// Origin of the flags when they last changed. A later result with the
    /// same flags is not republished and leaves this untouched.
    pub source: FlagSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    HasInitialFlags,
    Loading,
    Resolved,
    Closed,
}

/// Acceptance ticket for an issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    identity_epoch: u64,
    focus: Option<u64>,
}

struct SessionState {
    phase: Phase,
    mounted: bool,
    identity: Option<Identity>,
    identity_epoch: u64,
    flags: Option<FlagSet>,
    latest_focus: u64,
}

struct SessionInner {
    engine: FlagEngine,
    revalidate_on_focus: bool,
    state: Mutex<SessionState>,
    tx: watch::Sender<Resolution>,
}

/// Handle to a resolution session. Clones share the session.
#[derive(Clone)]
pub struct FlagSession {
    inner: Arc<SessionInner>,
}

impl FlagSession {
    pub(crate) fn new(engine: FlagEngine, options: ResolveOptions) -> Self {
        let identity = sanitize(options.identity.as_ref());
        let defaults = engine.config().default_flags();

        let (phase, initial) = match &options.initial_flags {
            Some(flags) => (
                Phase::HasInitialFlags,
                Resolution {
                    flags: merge(Some(flags), defaults).into_owned(),
                    loading: false,
                    source: FlagSource::Initial,
                },
            ),
            None => (
                Phase::Uninitialized,
                Resolution {
                    flags: defaults.clone(),
                    loading: true,
                    source: FlagSource::Defaults,
                },
            ),
        };
        let (tx, _rx) = watch::channel(initial);

        Self {
            inner: Arc::new(SessionInner {
                revalidate_on_focus: options.revalidate_on_focus.unwrap_or(true),
                state: Mutex::new(SessionState {
                    phase,
                    mounted: false,
                    identity,
                    identity_epoch: 0,
                    flags: options.initial_flags,
                    latest_focus: 0,
                }),
                engine,
                tx,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Identity used for subsequent fetches and cache lookups.
    pub fn identity(&self) -> Option<Identity> {
        self.state().identity.clone()
    }

    pub fn current(&self) -> Resolution {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Resolution> {
        self.inner.tx.subscribe()
    }

    /// Stream of resolution states, starting with the current one. Each call
    /// starts a fresh stream. Ends once every session handle is dropped.
    pub fn updates(&self) -> impl Stream<Item = Resolution> + Send + 'static {
        let mut rx = self.subscribe();
        async_stream::stream! {
            let first = rx.borrow_and_update().clone();
            yield first;
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                yield next;
            }
        }
    }

    /// First-mount trigger.
    ///
    /// With initial flags nothing is fetched. Otherwise the cache is
    /// consulted and a fresh fetch is always issued. Mounting twice is a
    /// no-op.
    pub async fn mount(&self) {
        let (stamp, identity) = {
            let mut st = self.state();
            if st.mounted || st.phase == Phase::Closed {
                return;
            }
            st.mounted = true;
            match st.phase {
                Phase::HasInitialFlags => {
                    st.phase = Phase::Resolved;
                    return;
                }
                Phase::Uninitialized => st.phase = Phase::Loading,
                _ => {}
            }
            (
                Stamp {
                    identity_epoch: st.identity_epoch,
                    focus: None,
                },
                st.identity.clone(),
            )
        };

        self.restore_from_cache(stamp, identity.as_ref());

        let outcome = self.inner.engine.fetch_flags(identity.as_ref()).await;
        self.settle(stamp, identity.as_ref(), outcome);
    }

    /// Identity-change trigger for raw, unvalidated input.
    pub async fn set_identity_value(&self, raw: &Value) -> bool {
        let identity = normalize_identity(raw);
        self.set_identity(identity.as_ref()).await
    }

    /// Identity-change trigger. Returns `false` when `identity` equals the
    /// active one and nothing was fetched.
    pub async fn set_identity(&self, identity: Option<&Identity>) -> bool {
        let next = sanitize(identity);
        let stamp = {
            let mut st = self.state();
            if st.phase == Phase::Closed || st.identity == next {
                return false;
            }
            st.identity = next.clone();
            st.identity_epoch += 1;
            Stamp {
                identity_epoch: st.identity_epoch,
                focus: None,
            }
        };
        tracing::debug!(identity = ?next.as_ref().map(|u| &u.key), "flagbag: identity changed");

        let outcome = self.inner.engine.fetch_flags(next.as_ref()).await;
        self.settle(stamp, next.as_ref(), outcome);
        true
    }

    /// Focus-regained trigger. Returns `false` when focus revalidation is
    /// disabled or the session is not mounted yet. Only the most recently
    /// issued focus fetch may apply.
    pub async fn focus(&self) -> bool {
        let Some((stamp, identity)) = self.begin_focus() else {
            return false;
        };
        let outcome = self.inner.engine.fetch_flags(identity.as_ref()).await;
        self.settle(stamp, identity.as_ref(), outcome);
        true
    }

    /// Ends the session. Results still in flight are discarded on arrival.
    pub fn close(&self) {
        self.state().phase = Phase::Closed;
    }

    fn begin_focus(&self) -> Option<(Stamp, Option<Identity>)> {
        if !self.inner.revalidate_on_focus {
            return None;
        }
        let mut st = self.state();
        if !st.mounted || st.phase == Phase::Closed {
            return None;
        }
        st.latest_focus += 1;
        Some((
            Stamp {
                identity_epoch: st.identity_epoch,
                focus: Some(st.latest_focus),
            },
            st.identity.clone(),
        ))
    }

    fn restore_from_cache(&self, stamp: Stamp, identity: Option<&Identity>) {
        let Some(cache) = self.inner.engine.cache() else {
            return;
        };
        let Some(cached) = cache.load(self.inner.engine.config(), identity) else {
            return;
        };

        let mut st = self.state();
        if !self.accepts(&st, stamp) || st.flags.is_some() {
            return;
        }
        st.flags = Some(cached);
        self.publish(&st, false, FlagSource::Cache);
    }

    fn accepts(&self, st: &SessionState, stamp: Stamp) -> bool {
        if st.phase == Phase::Closed || st.identity_epoch != stamp.identity_epoch {
            return false;
        }
        match stamp.focus {
            Some(focus) => focus == st.latest_focus,
            None => true,
        }
    }

    fn settle(&self, stamp: Stamp, identity: Option<&Identity>, outcome: Option<FlagSet>) {
        let persist = {
            let mut st = self.state();
            if !self.accepts(&st, stamp) {
                tracing::debug!("flagbag: discarding superseded fetch result");
                return;
            }

            match outcome {
                Some(flags) => {
                    st.flags = Some(flags.clone());
                    st.phase = Phase::Resolved;
                    self.publish(&st, false, FlagSource::Network);
                    flags
                }
                None => {
                    // keep whatever was established; only leave loading behind
                    if st.phase == Phase::Loading {
                        st.phase = Phase::Resolved;
                    }
                    if st.flags.is_none() {
                        self.publish(&st, false, FlagSource::Defaults);
                    }
                    return;
                }
            }
        };

        // storage may block, so it runs outside the session lock
        if let Some(cache) = self.inner.engine.cache() {
            cache.store(self.inner.engine.config(), &persist, identity);
        }
    }

    fn publish(&self, st: &SessionState, loading: bool, source: FlagSource) {
        let merged = merge(st.flags.as_ref(), self.inner.engine.config().default_flags());
        self.inner.tx.send_if_modified(|current| {
            if current.flags == *merged && current.loading == loading {
                return false;
            }
            *current = Resolution {
                flags: merged.into_owned(),
                loading,
                source,
            };
            true
        });
    }
}
