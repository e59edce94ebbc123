//! Async HTTP exchange behind a blocking wait.
//!
//! The transport owns a small multi-thread tokio runtime and one pooled
//! `reqwest::Client`. `execute` spawns the exchange onto the runtime and parks
//! the calling thread on a single-slot completion channel, bounded by the
//! response timeout. That wait is the only point where a call suspends. When
//! the timeout fires the task is aborted, so a late response is dropped by the
//! transport and never reaches a caller.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::RestError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Progress of a single call.
///
/// `Decoded`, `Rejected`, `DecodeFailed`, `TimedOut` and `TransportFailed`
/// are terminal; a call never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Sending,
    AwaitingResponse,
    Decoded,
    /// The server answered with a non-2xx status.
    Rejected,
    DecodeFailed,
    TimedOut,
    TransportFailed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Decoded
                | CallState::Rejected
                | CallState::DecodeFailed
                | CallState::TimedOut
                | CallState::TransportFailed
        )
    }

    /// Whether `next` may follow `self`.
    pub fn can_advance_to(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, AwaitingResponse)
                | (Sending, TransportFailed)
                | (AwaitingResponse, Decoded)
                | (AwaitingResponse, Rejected)
                | (AwaitingResponse, DecodeFailed)
                | (AwaitingResponse, TimedOut)
                | (AwaitingResponse, TransportFailed)
        )
    }
}

/// Per-call bookkeeping: correlation id, state and start time.
#[derive(Debug)]
pub struct Call {
    id: Uuid,
    method: HttpMethod,
    state: CallState,
    started: Instant,
}

impl Call {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            state: CallState::Idle,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn advance(&mut self, next: CallState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal call transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(call_id = %self.id, method = %self.method, from = ?self.state, to = ?next, "call state");
        self.state = next;
    }
}

/// Options the transport is built with.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub worker_threads: usize,
}

pub struct Transport {
    // `Option` so `Drop` can move the runtime out and shut it down.
    runtime: Option<Runtime>,
    client: reqwest::Client,
    timeout: Duration,
}

impl Transport {
    pub fn new(options: &TransportOptions) -> Result<Self, RestError> {
        if options.timeout.is_zero() {
            return Err(RestError::configuration("response timeout must be greater than zero"));
        }
        if options.worker_threads == 0 {
            return Err(RestError::configuration("worker_threads must be at least 1"));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.worker_threads)
            .thread_name("rest-facade-io")
            .enable_all()
            .build()
            .map_err(|e| RestError::configuration(format!("failed to start transport runtime: {e}")))?;

        let mut builder = reqwest::Client::builder().timeout(options.timeout);
        if let Some(connect_timeout) = options.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RestError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            runtime: Some(runtime),
            client,
            timeout: options.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs one exchange and blocks until it settles or times out.
    ///
    /// The exchange runs on the transport's own runtime and reports back over
    /// a single-slot channel, so any thread may wait on it: plain threads,
    /// `spawn_blocking` closures, or threads inside another runtime's
    /// context. Waiting on an async worker thread stalls that worker for up
    /// to the response timeout.
    pub fn execute(&self, request: HttpRequest, call: &mut Call) -> Result<HttpResponse, RestError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| RestError::configuration("transport runtime has shut down"))?;

        let method = request.method;
        let url = request.url.to_string();
        let mut builder = self
            .client
            .request(method.to_reqwest(), request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        call.advance(CallState::Sending);
        debug!(call_id = %call.id(), %method, %url, "dispatching request");
        let (done, outcome) = mpsc::sync_channel(1);
        let exchange = runtime.spawn(async move {
            let result = async {
                let response = builder.send().await?;
                let status = response.status().as_u16();
                let headers = response.headers().clone();
                let body = response.bytes().await?;
                Ok::<_, reqwest::Error>(HttpResponse {
                    status,
                    headers,
                    body: body.to_vec(),
                })
            }
            .await;
            // The caller is gone once its wait has timed out.
            let _ = done.send(result);
        });
        call.advance(CallState::AwaitingResponse);

        let timeout = self.timeout;
        match outcome.recv_timeout(timeout) {
            Ok(Ok(response)) => {
                debug!(
                    call_id = %call.id(),
                    status = response.status,
                    bytes = response.body.len(),
                    elapsed_ms = call.elapsed().as_millis() as u64,
                    "response received"
                );
                Ok(response)
            }
            Ok(Err(e)) if e.is_timeout() => {
                call.advance(CallState::TimedOut);
                warn!(call_id = %call.id(), %url, timeout_ms = timeout.as_millis() as u64, "request timed out");
                Err(RestError::Timeout { after: timeout })
            }
            Ok(Err(e)) => {
                call.advance(CallState::TransportFailed);
                debug!(call_id = %call.id(), %url, error = %e, "transport failure");
                Err(RestError::Transport(e))
            }
            Err(RecvTimeoutError::Timeout) => {
                exchange.abort();
                call.advance(CallState::TimedOut);
                warn!(call_id = %call.id(), %url, timeout_ms = timeout.as_millis() as u64, "request timed out");
                Err(RestError::Timeout { after: timeout })
            }
            Err(RecvTimeoutError::Disconnected) => {
                call.advance(CallState::TransportFailed);
                debug!(call_id = %call.id(), %url, "exchange task ended without a result");
                Err(RestError::TaskFailed)
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // A plain drop blocks on worker shutdown and panics inside async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
