pub mod reconcile;
pub mod state;

use anyhow::{Context as AnyhowContext, Result};
use declarative::CancelToken;
use gatewaykit::{MemoryGateway, RetryingGateway};
use std::path::PathBuf;
use std::time::Duration;

use crate::Context;
use crate::state::FileStore;

/// Tenant and record store shared by the commands of one run.
///
/// The tenant is the sandbox snapshot, reached through the retrying gateway.
pub struct Session {
    pub gateway: RetryingGateway<MemoryGateway>,
    pub store: FileStore,
    sandbox: PathBuf,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let sandbox = ctx.settings.sandbox_path()?;
        let tenant = MemoryGateway::load(&sandbox)
            .with_context(|| format!("Failed to open sandbox tenant: {}", sandbox.display()))?;
        let store = FileStore::open(&ctx.settings.state_path()?)?;
        log::debug!(
            "Session: sandbox {}, state {}",
            sandbox.display(),
            store.path().display()
        );

        Ok(Self {
            gateway: RetryingGateway::new(tenant, ctx.settings.retry.to_config()),
            store,
            sandbox,
        })
    }

    /// Persist the sandbox tenant after remote changes
    pub fn save(&self) -> Result<()> {
        self.gateway
            .inner()
            .save(&self.sandbox)
            .with_context(|| format!("Failed to save sandbox tenant: {}", self.sandbox.display()))
    }
}

/// Cancellation token for one run; `timeout_secs` overrides the settings
pub fn cancel_token(ctx: &Context, timeout_secs: Option<u64>) -> CancelToken {
    match timeout_secs.map(Duration::from_secs).or(ctx.settings.timeout()) {
        Some(timeout) => CancelToken::with_timeout(timeout),
        None => CancelToken::new(),
    }
}
