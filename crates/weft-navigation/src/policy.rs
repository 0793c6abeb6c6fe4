//! Policy gating for engine-initiated navigations
//!
//! Decides which native signals need the host at all, asks the host, and
//! turns its answer into an allow/deny. Host failures of any kind are a deny.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use url::Url;

use crate::error::HostError;
use crate::host::{NativeNavigationStarting, NavigationDecision, NavigationHost};
use crate::ledger::NavigationLedger;
use crate::types::{CorrelationId, LogicalNavigationId, NavigationStartingSignal};

/// First-pass routing of a starting signal, done under the ledger lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    NewWindow { target_uri: Option<String> },
    /// Sub-frame or unparseable URL: allowed without tracking
    Untracked,
    /// Echo of the pending API navigation
    Echo(LogicalNavigationId),
    /// Top-level engine-initiated navigation the host must decide
    Govern { request_uri: Url },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    Allow(LogicalNavigationId),
    /// `canceled` carries the id the host had already started tracking
    Deny { canceled: Option<LogicalNavigationId> },
}

pub struct PolicyGate {
    host: Arc<dyn NavigationHost>,
    // Decisions for the adapter's top-level chain are made one at a time.
    chain: AsyncMutex<()>,
}

impl PolicyGate {
    pub fn new(host: Arc<dyn NavigationHost>) -> Self {
        Self {
            host,
            chain: AsyncMutex::new(()),
        }
    }

    pub fn screen(ledger: &mut NavigationLedger, signal: &NavigationStartingSignal) -> Screening {
        if signal.is_new_window {
            let target_uri = signal
                .url
                .as_deref()
                .and_then(|url| Url::parse(url.trim()).ok())
                .map(|url| url.to_string());
            return Screening::NewWindow { target_uri };
        }

        if !signal.is_main_frame {
            return Screening::Untracked;
        }

        if let Some(navigation_id) = ledger.echo(signal.key(), signal.url.as_deref()) {
            return Screening::Echo(navigation_id);
        }

        match signal
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .and_then(|url| Url::parse(url).ok())
        {
            Some(request_uri) => Screening::Govern { request_uri },
            None => Screening::Untracked,
        }
    }

    /// Wait for any decision already in flight for the chain.
    pub async fn serialize(&self) -> AsyncMutexGuard<'_, ()> {
        self.chain.lock().await
    }

    /// Ask the host. Errors and panics come back as a deny with no id.
    pub async fn consult(&self, request: NativeNavigationStarting) -> NavigationDecision {
        let correlation_id = request.correlation_id;

        let pending = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.host.decide_navigation(request)
        })) {
            Ok(pending) => pending,
            Err(_) => return Self::host_failed(correlation_id, HostError::Panicked),
        };

        match AssertUnwindSafe(pending).catch_unwind().await {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => Self::host_failed(correlation_id, err),
            Err(_) => Self::host_failed(correlation_id, HostError::Panicked),
        }
    }

    fn host_failed(correlation_id: CorrelationId, err: HostError) -> NavigationDecision {
        tracing::warn!(
            correlation_id = %correlation_id,
            error = %err,
            "Host policy callback failed, denying navigation"
        );
        NavigationDecision::deny(LogicalNavigationId::empty())
    }

    pub fn interpret(decision: NavigationDecision) -> PolicyOutcome {
        match (decision.allow, decision.navigation_id.is_empty()) {
            (true, false) => PolicyOutcome::Allow(decision.navigation_id),
            // Allowed without an id is a host error
            (true, true) => PolicyOutcome::Deny { canceled: None },
            (false, true) => PolicyOutcome::Deny { canceled: None },
            (false, false) => PolicyOutcome::Deny {
                canceled: Some(decision.navigation_id),
            },
        }
    }
}
