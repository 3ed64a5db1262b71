//! Request deduplication.
//!
//! At most one request per `(url, body)` signature is in flight at any
//! instant. Concurrent callers with the same signature await the same shared
//! future and observe the same outcome. The entry lives exactly from
//! call-start to settlement, whether or not any caller is still waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use sha1::Digest;

use crate::transport::{execute, Transport};
use crate::value::FlagSet;

type InFlight = Shared<BoxFuture<'static, Option<FlagSet>>>;

/// Deterministic key for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn new(url: &str, body: &str) -> Self {
        #[derive(Serialize)]
        struct Key<'a> {
            url: &'a str,
            body: &'a str,
        }

        let key = serde_json::to_vec(&Key { url, body }).unwrap_or_default();
        let mut hasher = sha1::Sha1::new();
        hasher.update(&key);
        Signature(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Coalesces identical in-flight flag requests.
pub struct RequestDeduplicator {
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<HashMap<Signature, InFlight>>>,
}

impl RequestDeduplicator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Number of requests currently in flight.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fetches flags from `url`, joining an identical in-flight request if
    /// one exists. Must run inside a Tokio runtime.
    pub async fn fetch(&self, url: &str, body: String) -> Option<FlagSet> {
        let signature = Signature::new(url, &body);

        let in_flight = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.get(&signature) {
                Some(existing) => {
                    tracing::debug!(signature = signature.as_str(), "flagbag: joining in-flight request");
                    existing.clone()
                }
                None => {
                    let fut = self.settle(signature.clone(), url.to_string(), body);
                    pending.insert(signature, fut.clone());
                    fut
                }
            }
        };

        in_flight.await
    }

    /// Spawns the exchange so it runs to completion even when every caller
    /// stops waiting on it.
    fn settle(&self, signature: Signature, url: String, body: String) -> InFlight {
        let transport = Arc::clone(&self.transport);
        let pending = Arc::clone(&self.pending);

        let exchange = tokio::spawn({
            let pending = Arc::clone(&pending);
            let signature = signature.clone();
            async move {
                let outcome = execute(transport.as_ref(), &url, body).await;
                // unregister before any subscriber observes the outcome
                pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&signature);
                outcome
            }
        });

        async move {
            match exchange.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(signature = signature.as_str(), error = %e, "flagbag: flag request task failed");
                    pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&signature);
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = Signature::new("https://e/k", r#"{"user":{"key":"jon"}}"#);
        let b = Signature::new("https://e/k", r#"{"user":{"key":"jon"}}"#);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 40);
    }

    #[test]
    fn test_signature_covers_url_and_body() {
        let base = Signature::new("https://e/a", "{}");
        assert_ne!(base, Signature::new("https://e/b", "{}"));
        assert_ne!(base, Signature::new("https://e/a", r#"{"user":{"key":"jon"}}"#));
        // the boundary between url and body is unambiguous
        assert_ne!(
            Signature::new("https://e/a", "b{}"),
            Signature::new("https://e/ab", "{}")
        );
    }
}
