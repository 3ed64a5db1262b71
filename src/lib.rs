//! Client-side feature flag resolution.
//!
//! A [`FlagEngine`] fetches flag values for a project and an optional
//! visitor identity, coalesces identical in-flight requests, persists the
//! last good result, and merges everything with caller-declared defaults.
//! Long-lived consumers use a [`FlagSession`] which revalidates on mount,
//! identity change and regained focus.
//!
//! # Examples
//! ```no_run
//! use flagbag_lib::{FlagEngine, Identity, ResolveOptions};
//!
//! # async fn run() -> Result<(), flagbag_lib::FlagError> {
//! let engine = FlagEngine::builder("flags_pub_277203581177692685")
//!     .default_flag("dog", false)
//!     .build()?;
//!
//! // one-shot
//! let flags = engine.fetch_once(Identity::new("jon").as_ref()).await?;
//! println!("dog = {}", flags["dog"]);
//!
//! // long-lived
//! let session = engine.resolve(ResolveOptions::new());
//! session.mount().await;
//! println!("loading = {}", session.current().loading);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod identity;
pub mod merge;
pub mod session;
pub mod storage;
pub mod transport;
pub mod value;

pub use cache::{CacheEntry, FlagCache, CACHE_KEY};
pub use config::{Configuration, DEFAULT_ENDPOINT};
pub use engine::{FlagEngine, FlagEngineBuilder};
pub use error::{FlagError, StorageError, TransportError};
pub use identity::{build_request_body, normalize_identity, Identity};
pub use merge::merge;
pub use session::{FlagSession, FlagSource, Phase, Resolution, ResolveOptions};
pub use storage::{MemoryStorage, Storage};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{OfflineTransport, Transport, TransportResponse};
pub use value::{FlagSet, FlagValue};
