#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flagbag_lib::{FlagEngine, FlagEngineBuilder, Transport, TransportError, TransportResponse};
use tokio::sync::Semaphore;

pub const PROJECT_KEY: &str = "flags_pub_x";
pub const ENDPOINT: &str = "https://e";

type Reply = Result<TransportResponse, TransportError>;

/// Scriptable transport recording every request it receives.
pub struct MockTransport {
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, String)>>,
    replies: Mutex<VecDeque<Reply>>,
    respond: Box<dyn Fn(&str) -> Reply + Send + Sync>,
    gates: Mutex<Vec<(String, Arc<Semaphore>)>>,
}

pub fn ok(body: &str) -> Reply {
    Ok(TransportResponse {
        status: 200,
        body: body.as_bytes().to_vec(),
    })
}

pub fn network_error() -> Reply {
    Err(TransportError::Request("connection refused".into()))
}

impl MockTransport {
    /// Answers every request with `body`.
    pub fn json(body: &'static str) -> Arc<Self> {
        Self::with(move |_| ok(body))
    }

    /// Fails every request.
    pub fn failing() -> Arc<Self> {
        Self::with(|_| network_error())
    }

    /// Computes the reply from the request body.
    pub fn with(respond: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            respond: Box::new(respond),
            gates: Mutex::new(Vec::new()),
        })
    }

    /// Replies in order; falls back to a network error once exhausted.
    pub fn scripted(replies: Vec<Reply>) -> Arc<Self> {
        let transport = Self::failing();
        transport.replies.lock().unwrap().extend(replies);
        transport
    }

    /// Holds requests whose body contains `pattern` until permits are added
    /// to the returned semaphore.
    pub fn gate(&self, pattern: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .push((pattern.to_string(), Arc::clone(&gate)));
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, url: &str, body: String) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));

        let gate = self
            .gates
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| body.contains(pattern.as_str()))
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply,
            None => (self.respond)(&body),
        }
    }
}

pub fn builder(transport: Arc<MockTransport>) -> FlagEngineBuilder {
    FlagEngine::builder(PROJECT_KEY)
        .endpoint(ENDPOINT)
        .default_flag("dog", false)
        .transport(transport)
}

pub fn engine(transport: Arc<MockTransport>) -> FlagEngine {
    builder(transport).build().unwrap()
}

/// Lets every other branch of a `join!` run until it blocks.
pub async fn settle_others() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
