//! Navigation coordinator
//!
//! Adapter-facing entry point. Native callbacks and application calls may
//! arrive on any thread; every state transition happens under one ledger
//! lock, and nothing calls out to the host, the engine or the event sink
//! while that lock is held.

use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::classify::ErrorClassifier;
use crate::error::NavigationError;
use crate::host::{NativeEngine, NativeNavigationStarting, NavigationEvents, NavigationHost};
use crate::ledger::{NavigationEntry, NavigationLedger};
use crate::policy::{PolicyGate, PolicyOutcome, Screening};
use crate::reconciler::{CompletionReconciler, CompletionSignal, Reconciliation};
use crate::types::{
    CorrelationId, LogicalNavigationId, NativeNavigationKey, NativeOutcome, NavigationCompleted,
    NavigationKind, NavigationOrigin, NavigationStartingSignal, NavigationStatus,
    NewWindowRequested, PolicyRequestId, WebViewEvent, ABOUT_BLANK,
};
use crate::Result;

/// How a host decision was applied to the ledger.
enum Settlement {
    Armed(LogicalNavigationId),
    /// Carries the id to report as canceled, if the host had started tracking one
    Denied(Option<LogicalNavigationId>),
    Superseded(Option<LogicalNavigationId>),
    AlreadyCompleted(LogicalNavigationId),
}

/// Reply given to the engine for a starting signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// `None` when the navigation proceeds untracked
    Proceed(Option<LogicalNavigationId>),
    Cancel,
}

pub struct NavigationCoordinator {
    ledger: Mutex<NavigationLedger>,
    gate: PolicyGate,
    reconciler: CompletionReconciler,
    engine: Arc<dyn NativeEngine>,
    events: Arc<dyn NavigationEvents>,
    detached: AtomicBool,
    diagnostics: bool,
}

impl NavigationCoordinator {
    pub fn new(
        host: Arc<dyn NavigationHost>,
        engine: Arc<dyn NativeEngine>,
        events: Arc<dyn NavigationEvents>,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        Self {
            ledger: Mutex::new(NavigationLedger::new()),
            gate: PolicyGate::new(host),
            reconciler: CompletionReconciler::new(classifier),
            engine,
            events,
            detached: AtomicBool::new(false),
            diagnostics: false,
        }
    }

    /// Log every native signal at info level instead of debug.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Arm the ledger for an application-initiated navigation.
    ///
    /// Called by navigate/back/forward/reload before the engine is instructed.
    pub fn begin_api_navigation(
        &self,
        navigation_id: LogicalNavigationId,
        kind: NavigationKind,
    ) -> Result<()> {
        if self.is_detached() {
            return Err(NavigationError::Detached);
        }
        if navigation_id.is_empty() {
            return Err(NavigationError::EmptyNavigationId);
        }

        let mut ledger = self.ledger.lock();
        if ledger.is_terminal(navigation_id) {
            return Err(NavigationError::AlreadyCompleted(navigation_id));
        }
        ledger.arm(navigation_id, NavigationOrigin::Api, kind.request_uri());

        tracing::debug!(
            navigation_id = %navigation_id,
            kind = kind.as_str(),
            "Armed API navigation"
        );

        Ok(())
    }

    /// Policy callback from the engine. The engine always gets a reply unless
    /// the adapter is torn down while the host is deciding.
    pub async fn on_engine_navigation_starting(
        &self,
        signal: NavigationStartingSignal,
    ) -> PolicyVerdict {
        self.trace_starting(&signal);

        if self.is_detached() {
            self.reply(signal.request_id, false);
            return PolicyVerdict::Cancel;
        }

        let screening = {
            let mut ledger = self.ledger.lock();
            PolicyGate::screen(&mut ledger, &signal)
        };

        match screening {
            Screening::NewWindow { target_uri } => {
                self.emit(WebViewEvent::NewWindowRequested(NewWindowRequested {
                    target_uri,
                }));
                self.reply(signal.request_id, false);
                PolicyVerdict::Cancel
            }
            Screening::Untracked => {
                self.reply(signal.request_id, true);
                PolicyVerdict::Proceed(None)
            }
            Screening::Echo(navigation_id) => {
                tracing::debug!(
                    navigation_id = %navigation_id,
                    "Engine echo of API navigation, allowing"
                );
                self.reply(signal.request_id, true);
                PolicyVerdict::Proceed(Some(navigation_id))
            }
            Screening::Govern { request_uri } => self.govern(signal, request_uri).await,
        }
    }

    async fn govern(&self, signal: NavigationStartingSignal, request_uri: url::Url) -> PolicyVerdict {
        let _chain = self.gate.serialize().await;

        if self.is_detached() {
            return PolicyVerdict::Cancel;
        }

        // An API navigation may have been armed while this signal waited.
        let prepared = {
            let mut ledger = self.ledger.lock();
            match ledger.echo(signal.key(), signal.url.as_deref()) {
                Some(navigation_id) => Err(navigation_id),
                None => Ok((ledger.correlation_for(signal.hint), ledger.generation())),
            }
        };

        let (correlation_id, generation) = match prepared {
            Ok(prepared) => prepared,
            Err(navigation_id) => {
                self.reply(signal.request_id, true);
                return PolicyVerdict::Proceed(Some(navigation_id));
            }
        };

        let decision = self
            .gate
            .consult(NativeNavigationStarting {
                correlation_id,
                request_uri: request_uri.clone(),
                is_main_frame: true,
            })
            .await;

        if self.is_detached() {
            tracing::debug!(
                correlation_id = %correlation_id,
                "Policy decision arrived after teardown, ignoring"
            );
            return PolicyVerdict::Cancel;
        }

        let outcome = PolicyGate::interpret(decision);
        let request = request_uri.to_string();

        // Checked and applied under one lock so a concurrent `begin` cannot slip in between.
        let settlement = {
            let mut ledger = self.ledger.lock();
            if ledger.generation() != generation {
                let decided = match outcome {
                    PolicyOutcome::Allow(navigation_id) => Some(navigation_id),
                    PolicyOutcome::Deny { canceled } => canceled,
                };
                Settlement::Superseded(
                    decided.filter(|id| ledger.mark_terminal_if_not_already(*id)),
                )
            } else {
                match outcome {
                    PolicyOutcome::Deny { canceled } => Settlement::Denied(
                        canceled.filter(|id| ledger.record_denied(*id, request.clone())),
                    ),
                    PolicyOutcome::Allow(navigation_id)
                        if ledger.authorize(navigation_id, request.clone(), signal.key()) =>
                    {
                        Settlement::Armed(navigation_id)
                    }
                    PolicyOutcome::Allow(navigation_id) => Settlement::AlreadyCompleted(navigation_id),
                }
            }
        };

        match settlement {
            Settlement::Armed(navigation_id) => {
                tracing::debug!(
                    navigation_id = %navigation_id,
                    correlation_id = %correlation_id,
                    url = %request_uri,
                    "Navigation allowed by host"
                );
                self.reply(signal.request_id, true);
                return PolicyVerdict::Proceed(Some(navigation_id));
            }
            Settlement::Denied(canceled) => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    url = %request_uri,
                    "Navigation denied by host"
                );
                if let Some(navigation_id) = canceled {
                    self.emit_canceled(navigation_id, request);
                }
            }
            Settlement::Superseded(canceled) => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    url = %request_uri,
                    "Policy decision superseded by API navigation, canceling"
                );
                if let Some(navigation_id) = canceled {
                    self.emit_canceled(navigation_id, request);
                }
            }
            Settlement::AlreadyCompleted(navigation_id) => {
                tracing::warn!(
                    navigation_id = %navigation_id,
                    "Host allowed an already completed navigation, canceling"
                );
            }
        }

        self.reply(signal.request_id, false);
        PolicyVerdict::Cancel
    }

    /// Returns true if this call produced the navigation's terminal event.
    pub fn on_engine_navigation_finished(
        &self,
        key: NativeNavigationKey,
        outcome: NativeOutcome,
    ) -> bool {
        self.reconcile(CompletionSignal { key, outcome })
    }

    /// Error callback; may arrive before or instead of the finished callback.
    pub fn on_engine_navigation_failed(
        &self,
        key: NativeNavigationKey,
        native_code: i64,
        message: Option<String>,
    ) -> bool {
        self.reconcile(CompletionSignal {
            key,
            outcome: NativeOutcome::Errored {
                code: native_code,
                message,
            },
        })
    }

    fn reconcile(&self, signal: CompletionSignal) -> bool {
        if self.is_detached() {
            return false;
        }

        let reconciliation = {
            let mut ledger = self.ledger.lock();
            self.reconciler.reconcile(&mut ledger, &signal)
        };

        match reconciliation {
            Reconciliation::Untracked => {
                tracing::debug!(key = %signal.key, "Ignoring untracked completion signal");
                false
            }
            Reconciliation::Duplicate(navigation_id) => {
                tracing::debug!(
                    navigation_id = %navigation_id,
                    "Ignoring duplicate completion signal"
                );
                false
            }
            Reconciliation::Completed(completed) => {
                tracing::info!(
                    navigation_id = %completed.navigation_id,
                    url = %completed.request_uri,
                    status = %completed.status,
                    "Navigation completed"
                );
                self.emit(WebViewEvent::NavigationCompleted(completed));
                true
            }
        }
    }

    /// Cancel an API navigation the engine refused or the application stopped.
    pub fn cancel_api_navigation(&self, navigation_id: LogicalNavigationId) -> bool {
        if self.is_detached() {
            return false;
        }

        let completed = {
            let mut ledger = self.ledger.lock();
            let request_uri = ledger
                .request_uri_of(navigation_id)
                .unwrap_or(ABOUT_BLANK)
                .to_string();

            if !ledger.mark_terminal_if_not_already(navigation_id) {
                return false;
            }
            if ledger.active_id() == Some(navigation_id) {
                ledger.clear_correlation();
            }

            NavigationCompleted::new(navigation_id, request_uri, NavigationStatus::Canceled, None)
        };

        tracing::debug!(navigation_id = %navigation_id, "API navigation canceled");
        self.emit(WebViewEvent::NavigationCompleted(completed));
        true
    }

    fn emit_canceled(&self, navigation_id: LogicalNavigationId, request_uri: String) {
        self.emit(WebViewEvent::NavigationCompleted(NavigationCompleted::new(
            navigation_id,
            request_uri,
            NavigationStatus::Canceled,
            None,
        )));
    }

    /// Tear down: clear all state and turn every later action into a no-op.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.ledger.lock().reset();
        tracing::info!("Navigation coordinator detached");
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn active_navigation(&self) -> Option<NavigationEntry> {
        self.ledger.lock().active().cloned()
    }

    pub fn current_correlation(&self) -> Option<CorrelationId> {
        self.ledger.lock().correlation()
    }

    fn reply(&self, request: PolicyRequestId, allow: bool) {
        if allow {
            self.engine.proceed(request);
        } else {
            self.engine.cancel(request);
        }
    }

    fn emit(&self, event: WebViewEvent) {
        if self.is_detached() {
            return;
        }

        let events = Arc::clone(&self.events);
        if std::panic::catch_unwind(AssertUnwindSafe(move || events.emit(event))).is_err() {
            tracing::error!("Navigation event handler panicked");
        }
    }

    fn trace_starting(&self, signal: &NavigationStartingSignal) {
        let url = signal.url.as_deref().unwrap_or("<none>");
        if self.diagnostics {
            tracing::info!(
                request_id = %signal.request_id,
                main_frame = signal.is_main_frame,
                new_window = signal.is_new_window,
                hint = ?signal.hint,
                url,
                "Policy request"
            );
        } else {
            tracing::debug!(
                request_id = %signal.request_id,
                main_frame = signal.is_main_frame,
                new_window = signal.is_new_window,
                hint = ?signal.hint,
                url,
                "Policy request"
            );
        }
    }
}
