//! Retry logic with exponential backoff for transient gateway errors.

use crate::types::RetryConfig;
use declarative::{
    AssociationKind, EntityKind, FieldSet, Gateway, GatewayCall, GatewayError, GatewayResult,
    InlineMembers, RemoteEntity,
};
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called when a call is being retried.
    ///
    /// # Arguments
    /// * `call` - The gateway call being retried
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until next attempt
    fn on_retry(
        &self,
        call: GatewayCall,
        attempt: u32,
        max_attempts: u32,
        error: &GatewayError,
        delay: Duration,
    );
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _: GatewayCall, _: u32, _: u32, _: &GatewayError, _: Duration) {}
}

/// Callback that logs retries as warnings.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(
        &self,
        call: GatewayCall,
        attempt: u32,
        max_attempts: u32,
        error: &GatewayError,
        delay: Duration,
    ) {
        log::warn!(
            "{call} attempt {attempt}/{max_attempts} failed: {error}. Retrying in {:.1}s...",
            delay.as_secs_f64()
        );
    }
}

/// Execute a gateway call with retry logic.
///
/// Retries the call if it returns a retryable error, using exponential
/// backoff between attempts.
///
/// # Returns
/// The result of the call, or the last error if all attempts failed.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    call: GatewayCall,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> GatewayResult<T>
where
    F: FnMut() -> GatewayResult<T>,
{
    let mut last_error: Option<GatewayError> = None;

    for attempt in 0..config.max_attempts {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                if attempt + 1 >= config.max_attempts {
                    last_error = Some(e);
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(call, attempt + 1, config.max_attempts, &e, delay);
                }

                thread::sleep(delay);

                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GatewayError::transient("retry exhausted")))
}

/// Gateway decorator that retries transient failures.
///
/// Create is never retried: a create that timed out may have succeeded,
/// and repeating it could produce a duplicate entity.
pub struct RetryingGateway<G> {
    inner: G,
    config: RetryConfig,
    callback: Box<dyn RetryCallback>,
}

impl<G: Gateway> RetryingGateway<G> {
    pub fn new(inner: G, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            callback: Box::new(LogCallback),
        }
    }

    pub fn with_callback(mut self, callback: impl RetryCallback + 'static) -> Self {
        self.callback = Box::new(callback);
        self
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    fn retry<T>(&self, call: GatewayCall, op: impl FnMut() -> GatewayResult<T>) -> GatewayResult<T> {
        with_retry(&self.config, call, Some(self.callback.as_ref()), op)
    }
}

impl<G: Gateway> Gateway for RetryingGateway<G> {
    fn create(
        &self,
        kind: EntityKind,
        fields: &FieldSet,
        members: &InlineMembers,
    ) -> GatewayResult<RemoteEntity> {
        self.inner.create(kind, fields, members)
    }

    fn get(&self, kind: EntityKind, id: &str) -> GatewayResult<FieldSet> {
        self.retry(GatewayCall::Get, || self.inner.get(kind, id))
    }

    fn update(&self, kind: EntityKind, id: &str, changed: &FieldSet) -> GatewayResult<FieldSet> {
        self.retry(GatewayCall::Update, || self.inner.update(kind, id, changed))
    }

    fn delete(&self, kind: EntityKind, id: &str) -> GatewayResult<()> {
        self.retry(GatewayCall::Delete, || self.inner.delete(kind, id))
    }

    fn list(&self, kind: EntityKind, filter: &FieldSet) -> GatewayResult<Vec<RemoteEntity>> {
        self.retry(GatewayCall::List, || self.inner.list(kind, filter))
    }

    fn add_association(
        &self,
        association: AssociationKind,
        parent_id: &str,
        member_id: &str,
    ) -> GatewayResult<()> {
        self.retry(GatewayCall::AddMember, || {
            self.inner.add_association(association, parent_id, member_id)
        })
    }

    fn remove_association(
        &self,
        association: AssociationKind,
        parent_id: &str,
        member_id: &str,
    ) -> GatewayResult<()> {
        self.retry(GatewayCall::RemoveMember, || {
            self.inner.remove_association(association, parent_id, member_id)
        })
    }

    fn list_members(
        &self,
        association: AssociationKind,
        parent_id: &str,
    ) -> GatewayResult<BTreeSet<String>> {
        self.retry(GatewayCall::ListMembers, || {
            self.inner.list_members(association, parent_id)
        })
    }
}
