//! Terminal resolution of native completion signals

use std::sync::Arc;

use crate::classify::{ErrorClassifier, NavigationErrorKind};
use crate::ledger::NavigationLedger;
use crate::types::{
    LogicalNavigationId, NativeNavigationKey, NativeOutcome, NavigationCompleted,
    NavigationFailure, NavigationStatus, ABOUT_BLANK,
};

/// A finished or failed callback from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSignal {
    pub key: NativeNavigationKey,
    pub outcome: NativeOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// No live navigation is bound to the key; stale or never tracked
    Untracked,
    /// The navigation already produced its terminal event
    Duplicate(LogicalNavigationId),
    Completed(NavigationCompleted),
}

pub struct CompletionReconciler {
    classifier: Arc<dyn ErrorClassifier>,
}

impl CompletionReconciler {
    pub fn new(classifier: Arc<dyn ErrorClassifier>) -> Self {
        Self { classifier }
    }

    /// Resolve a signal against the ledger. Must run under the ledger lock.
    ///
    /// Errors and finishes for the same navigation merge by arrival: whichever
    /// resolves first is terminal. Engines that report both send the error
    /// first, so the error outcome wins. An error arriving after an emitted
    /// success is dropped; a terminal event is never retracted.
    ///
    /// A history or reload navigation with no starting signal is resolved by
    /// ordering: the next unknown completion belongs to it.
    pub fn reconcile(
        &self,
        ledger: &mut NavigationLedger,
        signal: &CompletionSignal,
    ) -> Reconciliation {
        let resolved = ledger
            .resolve(&signal.key)
            .or_else(|| ledger.resolve_pending(&signal.key));
        let Some(navigation_id) = resolved else {
            return Reconciliation::Untracked;
        };

        let request_uri = match &signal.key {
            NativeNavigationKey::ByUrl(url) => url.clone(),
            NativeNavigationKey::ByHandle(_) => ledger
                .request_uri_of(navigation_id)
                .unwrap_or(ABOUT_BLANK)
                .to_string(),
        };

        let produced = ledger.mark_terminal_if_not_already(navigation_id);

        if ledger.active_id() == Some(navigation_id) {
            ledger.clear_correlation();
        }

        if !produced {
            return Reconciliation::Duplicate(navigation_id);
        }

        let (status, error) = self.classify_outcome(&signal.outcome);
        Reconciliation::Completed(NavigationCompleted::new(
            navigation_id,
            request_uri,
            status,
            error,
        ))
    }

    pub fn classify_outcome(
        &self,
        outcome: &NativeOutcome,
    ) -> (NavigationStatus, Option<NavigationFailure>) {
        match outcome {
            NativeOutcome::Succeeded => (NavigationStatus::Success, None),
            NativeOutcome::Aborted => (NavigationStatus::Canceled, None),
            NativeOutcome::Errored { code, message } => {
                let kind = self.classifier.classify(*code);
                if kind == NavigationErrorKind::Canceled {
                    return (NavigationStatus::Canceled, None);
                }

                let message = message
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Navigation failed (code={}).", code));

                (
                    NavigationStatus::Failure,
                    Some(NavigationFailure {
                        kind,
                        native_code: Some(*code),
                        message,
                    }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::EngineProfile;
    use crate::types::NavigationOrigin;

    fn reconciler(profile: EngineProfile) -> CompletionReconciler {
        CompletionReconciler::new(Arc::new(profile))
    }

    fn finished(url: &str) -> CompletionSignal {
        CompletionSignal {
            key: NativeNavigationKey::url(url),
            outcome: NativeOutcome::Succeeded,
        }
    }

    #[test]
    fn test_success_then_duplicate_dropped() {
        let reconciler = reconciler(EngineProfile::Generic);
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        ledger.arm(id, NavigationOrigin::Api, Some("https://a.test".to_string()));

        match reconciler.reconcile(&mut ledger, &finished("https://a.test")) {
            Reconciliation::Completed(event) => {
                assert_eq!(event.navigation_id, id);
                assert_eq!(event.request_uri, "https://a.test/");
                assert_eq!(event.status, NavigationStatus::Success);
                assert!(event.error.is_none());
            }
            other => panic!("Expected completion, got {:?}", other),
        }

        assert_eq!(
            reconciler.reconcile(&mut ledger, &finished("https://a.test")),
            Reconciliation::Untracked
        );
    }

    #[test]
    fn test_stale_signal_leaves_state_untouched() {
        let reconciler = reconciler(EngineProfile::Generic);
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        ledger.arm(id, NavigationOrigin::Api, Some("https://a.test".to_string()));
        let correlation = ledger.correlation_for(crate::types::NavigationTypeHint::Other);

        assert_eq!(
            reconciler.reconcile(&mut ledger, &finished("https://elsewhere.test")),
            Reconciliation::Untracked
        );
        assert_eq!(ledger.correlation(), Some(correlation));
        assert!(ledger.api_navigation_pending());
        assert!(!ledger.is_terminal(id));
    }

    #[test]
    fn test_error_classification() {
        let reconciler = reconciler(EngineProfile::AndroidWebView);
        let (status, error) = reconciler.classify_outcome(&NativeOutcome::Errored {
            code: -8,
            message: None,
        });
        assert_eq!(status, NavigationStatus::Failure);
        let error = error.unwrap();
        assert_eq!(error.kind, NavigationErrorKind::Timeout);
        assert_eq!(error.native_code, Some(-8));
        assert_eq!(error.message, "Navigation failed (code=-8).");
    }

    #[test]
    fn test_canceled_error_code_is_canceled_status() {
        let reconciler = reconciler(EngineProfile::WkWebView);
        let (status, error) = reconciler.classify_outcome(&NativeOutcome::Errored {
            code: -999,
            message: Some("cancelled".to_string()),
        });
        assert_eq!(status, NavigationStatus::Canceled);
        assert!(error.is_none());
    }

    #[test]
    fn test_handle_key_uses_recorded_uri() {
        let reconciler = reconciler(EngineProfile::WebView2);
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        ledger.authorize(
            id,
            "https://b.test/path".to_string(),
            Some(NativeNavigationKey::ByHandle(42)),
        );

        let signal = CompletionSignal {
            key: NativeNavigationKey::ByHandle(42),
            outcome: NativeOutcome::Errored {
                code: 13,
                message: Some("host not resolved".to_string()),
            },
        };

        match reconciler.reconcile(&mut ledger, &signal) {
            Reconciliation::Completed(event) => {
                assert_eq!(event.request_uri, "https://b.test/path");
                assert_eq!(event.status, NavigationStatus::Failure);
                let error = event.error.unwrap();
                assert_eq!(error.kind, NavigationErrorKind::Network);
                assert_eq!(error.message, "host not resolved");
            }
            other => panic!("Expected completion, got {:?}", other),
        }
        assert_eq!(ledger.correlation(), None);
    }

    #[test]
    fn test_history_navigation_resolves_without_starting_signal() {
        let reconciler = reconciler(EngineProfile::AndroidWebView);
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        ledger.arm(id, NavigationOrigin::Api, None);

        match reconciler.reconcile(&mut ledger, &finished("https://prev.test/")) {
            Reconciliation::Completed(event) => {
                assert_eq!(event.navigation_id, id);
                assert_eq!(event.request_uri, "https://prev.test/");
                assert_eq!(event.status, NavigationStatus::Success);
            }
            other => panic!("Expected completion, got {:?}", other),
        }
        assert!(ledger.is_terminal(id));
    }
}
