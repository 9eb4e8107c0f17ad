//! Invocation service: send a request, await its response, retry when safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gridlink_core::MemberId;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::table::{InvocationTable, PendingGuard, PendingInvocation, ResponseHook};
use crate::connection::ConnectionManager;
use crate::error::InvocationError;
use crate::membership::MemberDirectory;
use crate::partition::PartitionRouter;
use crate::protocol::{self, RemoteError};
use crate::wire::Frame;

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A specific member.
    Member(MemberId),
    /// Owner of the partition of a routing key, resolved on every attempt.
    Key(Vec<u8>),
    /// Oldest member of the cluster.
    Coordinator,
}

/// Retry and deadline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationConfig {
    /// Default deadline of an invocation.
    pub invocation_timeout: Duration,
    /// Pause between two attempts.
    pub retry_pause: Duration,
    /// Upper bound on attempts per invocation.
    pub max_attempts: u32,
    /// Retry non-idempotent requests after a connection loss too.
    pub redo_operation: bool,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            invocation_timeout: Duration::from_secs(120),
            retry_pause: Duration::from_secs(1),
            max_attempts: 10,
            redo_operation: false,
        }
    }
}

/// A request to invoke.
#[derive(Clone)]
pub struct InvocationRequest {
    target: Target,
    op_code: u16,
    payload: Vec<u8>,
    retryable: bool,
    timeout: Option<Duration>,
    hook: Option<ResponseHook>,
}

impl std::fmt::Debug for InvocationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationRequest")
            .field("target", &self.target)
            .field("op_code", &format_args!("{:#06x}", self.op_code))
            .field("payload_len", &self.payload.len())
            .field("retryable", &self.retryable)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl InvocationRequest {
    /// Create a non-retryable request with the default timeout.
    pub fn new(target: Target, op_code: u16, payload: Vec<u8>) -> Self {
        Self {
            target,
            op_code,
            payload,
            retryable: false,
            timeout: None,
            hook: None,
        }
    }

    /// Mark the request safe to resend after a connection loss.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Override the configured timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `hook` in the reader task when the successful response arrives.
    pub fn on_response(mut self, hook: ResponseHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Operation id.
    pub fn op_code(&self) -> u16 {
        self.op_code
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResponse {
    /// Member that answered.
    pub member: MemberId,
    /// Encoded response body.
    pub payload: Vec<u8>,
}

impl InvocationResponse {
    /// Decode the response body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, InvocationError> {
        Ok(protocol::decode_body(&self.payload)?)
    }
}

/// Why one attempt failed.
enum AttemptError {
    /// Nothing reached the wire; always safe to retry.
    NotSent(InvocationError),
    /// The request may have been applied.
    Sent(InvocationError),
}

/// Issues invocations for one client session.
#[derive(Clone)]
pub struct InvocationService {
    inner: Arc<Inner>,
}

struct Inner {
    config: InvocationConfig,
    table: Arc<InvocationTable>,
    connections: ConnectionManager,
    router: Arc<PartitionRouter>,
    directory: Arc<MemberDirectory>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for InvocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationService")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.table.len())
            .finish()
    }
}

impl InvocationService {
    /// Create a service over the session's shared components.
    pub fn new(
        config: InvocationConfig,
        table: Arc<InvocationTable>,
        connections: ConnectionManager,
        router: Arc<PartitionRouter>,
        directory: Arc<MemberDirectory>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                table,
                connections,
                router,
                directory,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &InvocationConfig {
        &self.inner.config
    }

    /// Number of invocations waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.table.len()
    }

    /// Invoke a request and wait for its response.
    ///
    /// Each attempt uses a new correlation id. Failures that happen before
    /// the request is written are always retried; a connection loss after
    /// writing is retried only for retryable requests (or with
    /// `redo_operation`). Retries stop at the deadline or after
    /// `max_attempts`.
    ///
    /// # Errors
    ///
    /// - `InvocationTimeout` once the deadline elapses
    /// - `MemberLeft`, `MemberUnreachable`, `Remote`, `Codec` immediately
    /// - the last transient error when attempts are exhausted
    /// - `ClientShutdown` after [`InvocationService::shutdown`]
    pub async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> Result<InvocationResponse, InvocationError> {
        let config = &self.inner.config;
        let timeout = request.timeout.unwrap_or(config.invocation_timeout);
        let deadline = Instant::now() + timeout;
        let retryable = request.retryable || config.redo_operation;
        let timed_out = || InvocationError::InvocationTimeout {
            op_code: request.op_code,
            timeout,
        };

        let mut attempt = 0;
        loop {
            if self.inner.shut_down.load(Ordering::SeqCst) {
                return Err(InvocationError::ClientShutdown);
            }
            if Instant::now() >= deadline {
                return Err(timed_out());
            }
            attempt += 1;

            let result = match tokio::time::timeout_at(deadline, self.attempt(&request)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(
                        "invocation op={:#06x} timed out after {} attempts",
                        request.op_code,
                        attempt
                    );
                    return Err(timed_out());
                }
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(AttemptError::NotSent(error)) if error.is_transient() => error,
                Err(AttemptError::Sent(error)) if error.is_transient() && retryable => error,
                Err(AttemptError::NotSent(error) | AttemptError::Sent(error)) => return Err(error),
            };

            if attempt >= config.max_attempts {
                tracing::debug!(
                    "invocation op={:#06x} gave up after {} attempts: {}",
                    request.op_code,
                    attempt,
                    error
                );
                return Err(error);
            }

            tracing::debug!(
                "invocation op={:#06x} attempt {} failed: {} - retrying in {:?}",
                request.op_code,
                attempt,
                error,
                config.retry_pause
            );
            let resume = std::cmp::min(Instant::now() + config.retry_pause, deadline);
            tokio::time::sleep_until(resume).await;
        }
    }

    /// Fail every pending invocation and refuse new ones.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.table.fail_all();
    }

    fn resolve_target(&self, target: &Target) -> Result<MemberId, InvocationError> {
        match target {
            Target::Member(member) => Ok(*member),
            Target::Key(key) => {
                let owner = self.inner.router.route(key)?;
                // The owner left but the table moving its partitions has not
                // arrived yet.
                if !self.inner.directory.snapshot().contains(owner) {
                    return Err(InvocationError::NoOwnerYet {
                        partition: self.inner.router.partition_of(key),
                    });
                }
                Ok(owner)
            }
            Target::Coordinator => self
                .inner
                .directory
                .oldest()
                .map(|member| member.id)
                .ok_or(InvocationError::NoMemberAvailable),
        }
    }

    async fn attempt(&self, request: &InvocationRequest) -> Result<InvocationResponse, AttemptError> {
        let member = self
            .resolve_target(&request.target)
            .map_err(AttemptError::NotSent)?;
        let connection = self
            .inner
            .connections
            .connection_for(member)
            .await
            .map_err(|e| AttemptError::NotSent(InvocationError::from_connection(member, e)))?;

        let table = &self.inner.table;
        let id = table.next_correlation_id();
        let (sender, receiver) = oneshot::channel();
        table.insert(
            id,
            PendingInvocation {
                member,
                connection: connection.id(),
                op_code: request.op_code,
                sender,
                hook: request.hook.clone(),
            },
        );
        let _guard = PendingGuard::new(table, id);

        connection
            .send(&Frame::request(request.op_code, id, request.payload.clone()))
            .map_err(|e| AttemptError::NotSent(InvocationError::from_connection(member, e)))?;

        let frame = match receiver.await {
            Ok(Ok(frame)) => frame,
            Ok(Err(error)) => return Err(AttemptError::Sent(error)),
            // Record dropped without an outcome.
            Err(_) => {
                return Err(AttemptError::Sent(InvocationError::TargetDisconnected {
                    member,
                }))
            }
        };

        if frame.is_error() {
            let remote: RemoteError = protocol::decode_body(&frame.payload)
                .map_err(|e| AttemptError::Sent(e.into()))?;
            return Err(AttemptError::Sent(InvocationError::Remote(remote)));
        }
        Ok(InvocationResponse {
            member,
            payload: frame.payload,
        })
    }
}
