//! Seams between the correlation engine and its collaborators
//!
//! The host decides policy, the native engine receives proceed/cancel
//! instructions, and the application receives events. All three may be
//! called from any thread.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::error::HostError;
use crate::types::{CorrelationId, LogicalNavigationId, PolicyRequestId, WebViewEvent};

/// Engine-initiated navigation presented to the host for a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeNavigationStarting {
    pub correlation_id: CorrelationId,
    pub request_uri: Url,
    pub is_main_frame: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationDecision {
    pub allow: bool,
    /// Empty when the host did not start tracking this navigation
    pub navigation_id: LogicalNavigationId,
}

impl NavigationDecision {
    pub fn allow(navigation_id: LogicalNavigationId) -> Self {
        Self {
            allow: true,
            navigation_id,
        }
    }

    pub fn deny(navigation_id: LogicalNavigationId) -> Self {
        Self {
            allow: false,
            navigation_id,
        }
    }
}

pub trait NavigationHost: Send + Sync {
    fn decide_navigation(
        &self,
        request: NativeNavigationStarting,
    ) -> BoxFuture<'_, Result<NavigationDecision, HostError>>;
}

/// Instructions back into the native engine for a pending policy request.
///
/// Thread affinity is the adapter's concern; these may be invoked from any thread.
pub trait NativeEngine: Send + Sync {
    fn proceed(&self, request: PolicyRequestId);
    fn cancel(&self, request: PolicyRequestId);
}

pub trait NavigationEvents: Send + Sync {
    fn emit(&self, event: WebViewEvent);
}

impl NavigationEvents for UnboundedSender<WebViewEvent> {
    fn emit(&self, event: WebViewEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding navigation event");
        }
    }
}
