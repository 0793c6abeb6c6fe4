//! Weft Navigation
//!
//! Correlates native WebView engine callbacks with application-visible
//! navigation ids. Every navigation, whether the application or the page
//! started it, ends in exactly one `NavigationCompleted` event.

mod classify;
mod coordinator;
mod error;
mod host;
mod ledger;
mod policy;
mod reconciler;
mod types;

pub use classify::{EngineProfile, ErrorClassifier, NavigationErrorKind};
pub use coordinator::{NavigationCoordinator, PolicyVerdict};
pub use error::{HostError, NavigationError};
pub use host::{
    NativeEngine, NativeNavigationStarting, NavigationDecision, NavigationEvents, NavigationHost,
};
pub use ledger::{NavigationEntry, NavigationLedger};
pub use policy::{PolicyGate, PolicyOutcome, Screening};
pub use reconciler::{CompletionReconciler, CompletionSignal, Reconciliation};
pub use types::{
    CorrelationId, LogicalNavigationId, NativeNavigationKey, NativeOutcome, NavigationCompleted,
    NavigationFailure, NavigationKind, NavigationOrigin, NavigationStartingSignal,
    NavigationStatus, NavigationTypeHint, NewWindowRequested, PolicyRequestId, WebViewEvent,
    ABOUT_BLANK,
};

pub type Result<T> = std::result::Result<T, NavigationError>;
