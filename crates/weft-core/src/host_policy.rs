//! Default host policy
//!
//! Mints logical navigation ids for engine-initiated navigations and lets
//! application handlers veto any navigation before it starts.

use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

use weft_navigation::{
    CorrelationId, HostError, LogicalNavigationId, NativeNavigationStarting, NavigationDecision,
    NavigationHost,
};

/// Arguments passed to `NavigationStarting` handlers.
#[derive(Debug, Clone)]
pub struct NavigationStartingArgs {
    pub navigation_id: LogicalNavigationId,
    pub request_uri: Url,
    /// Set by a handler to stop the navigation
    pub cancel: bool,
}

type StartingHandler = Box<dyn Fn(&mut NavigationStartingArgs) + Send + Sync>;

#[derive(Debug, Clone)]
struct NavigationOperation {
    navigation_id: LogicalNavigationId,
    /// `None` for application commands
    correlation_id: Option<CorrelationId>,
    request_uri: Url,
}

pub struct NavigationHostPolicy {
    active: Mutex<Option<NavigationOperation>>,
    source: RwLock<Url>,
    handlers: RwLock<Vec<StartingHandler>>,
    disposed: AtomicBool,
}

impl NavigationHostPolicy {
    pub fn new(initial_source: Url) -> Self {
        Self {
            active: Mutex::new(None),
            source: RwLock::new(initial_source),
            handlers: RwLock::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register a handler run before every top-level navigation.
    ///
    /// Handlers must not register further handlers.
    pub fn on_navigation_starting<F>(&self, handler: F)
    where
        F: Fn(&mut NavigationStartingArgs) + Send + Sync + 'static,
    {
        self.handlers.write().push(Box::new(handler));
    }

    /// Last URL the webview was asked to load
    pub fn source(&self) -> Url {
        self.source.read().clone()
    }

    pub fn active_navigation(&self) -> Option<LogicalNavigationId> {
        self.active.lock().as_ref().map(|op| op.navigation_id)
    }

    /// Start an application command. Returns false if a handler canceled it.
    pub fn begin_command(&self, navigation_id: LogicalNavigationId, request_uri: Url) -> bool {
        self.replace_active(NavigationOperation {
            navigation_id,
            correlation_id: None,
            request_uri: request_uri.clone(),
        });
        *self.source.write() = request_uri.clone();

        if self.run_handlers(navigation_id, request_uri) {
            tracing::debug!(navigation_id = %navigation_id, "Command canceled by handler");
            self.complete(navigation_id);
            return false;
        }

        true
    }

    /// Forget the active operation once its terminal event was delivered.
    pub fn complete(&self, navigation_id: LogicalNavigationId) {
        let mut active = self.active.lock();
        if active.as_ref().map(|op| op.navigation_id) == Some(navigation_id) {
            *active = None;
        }
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        *self.active.lock() = None;
    }

    fn replace_active(&self, operation: NavigationOperation) {
        let previous = self.active.lock().replace(operation);
        if let Some(previous) = previous {
            tracing::debug!(
                navigation_id = %previous.navigation_id,
                "Superseding active navigation"
            );
        }
    }

    /// Returns true if any handler canceled.
    fn run_handlers(&self, navigation_id: LogicalNavigationId, request_uri: Url) -> bool {
        let mut args = NavigationStartingArgs {
            navigation_id,
            request_uri,
            cancel: false,
        };
        for handler in self.handlers.read().iter() {
            handler(&mut args);
        }
        args.cancel
    }

    fn decide(&self, request: NativeNavigationStarting) -> NavigationDecision {
        if self.disposed.load(Ordering::SeqCst) {
            return NavigationDecision::deny(LogicalNavigationId::empty());
        }

        if !request.is_main_frame {
            return NavigationDecision::allow(LogicalNavigationId::empty());
        }

        let continued = {
            let mut active = self.active.lock();
            match active.as_mut() {
                Some(op) if op.correlation_id == Some(request.correlation_id) => {
                    let same_url = op.request_uri == request.request_uri;
                    op.request_uri = request.request_uri.clone();
                    Some((op.navigation_id, same_url))
                }
                _ => None,
            }
        };

        if let Some((navigation_id, same_url)) = continued {
            if same_url {
                tracing::debug!(navigation_id = %navigation_id, "Same-URL redirect");
                return NavigationDecision::allow(navigation_id);
            }

            *self.source.write() = request.request_uri.clone();
            if self.run_handlers(navigation_id, request.request_uri) {
                tracing::debug!(navigation_id = %navigation_id, "Redirect canceled by handler");
                self.complete(navigation_id);
                return NavigationDecision::deny(navigation_id);
            }
            return NavigationDecision::allow(navigation_id);
        }

        let navigation_id = LogicalNavigationId::generate();
        self.replace_active(NavigationOperation {
            navigation_id,
            correlation_id: Some(request.correlation_id),
            request_uri: request.request_uri.clone(),
        });
        *self.source.write() = request.request_uri.clone();

        if self.run_handlers(navigation_id, request.request_uri) {
            tracing::debug!(navigation_id = %navigation_id, "Navigation canceled by handler");
            self.complete(navigation_id);
            return NavigationDecision::deny(navigation_id);
        }

        tracing::debug!(navigation_id = %navigation_id, "Engine navigation allowed");
        NavigationDecision::allow(navigation_id)
    }
}

impl NavigationHost for NavigationHostPolicy {
    fn decide_navigation(
        &self,
        request: NativeNavigationStarting,
    ) -> BoxFuture<'_, Result<NavigationDecision, HostError>> {
        future::ready(Ok(self.decide(request))).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn request(correlation_id: CorrelationId, raw: &str) -> NativeNavigationStarting {
        NativeNavigationStarting {
            correlation_id,
            request_uri: url(raw),
            is_main_frame: true,
        }
    }

    fn policy() -> NavigationHostPolicy {
        NavigationHostPolicy::new(url("about:blank"))
    }

    #[tokio::test]
    async fn test_correlation_keeps_navigation_id() {
        let policy = policy();
        let chain = CorrelationId::generate();

        let first = policy
            .decide_navigation(request(chain, "https://a.test/"))
            .await
            .unwrap();
        let redirect = policy
            .decide_navigation(request(chain, "https://a.test/login"))
            .await
            .unwrap();
        let repeat = policy
            .decide_navigation(request(chain, "https://a.test/login"))
            .await
            .unwrap();

        assert!(first.allow && redirect.allow && repeat.allow);
        assert!(!first.navigation_id.is_empty());
        assert_eq!(first.navigation_id, redirect.navigation_id);
        assert_eq!(first.navigation_id, repeat.navigation_id);
        assert_eq!(policy.source(), url("https://a.test/login"));

        let other = policy
            .decide_navigation(request(CorrelationId::generate(), "https://b.test/"))
            .await
            .unwrap();
        assert_ne!(other.navigation_id, first.navigation_id);
        assert_eq!(policy.active_navigation(), Some(other.navigation_id));
    }

    #[tokio::test]
    async fn test_handler_cancel_denies_with_id() {
        let policy = policy();
        policy.on_navigation_starting(|args| {
            if args.request_uri.host_str() == Some("blocked.test") {
                args.cancel = true;
            }
        });

        let decision = policy
            .decide_navigation(request(CorrelationId::generate(), "https://blocked.test/"))
            .await
            .unwrap();

        assert!(!decision.allow);
        assert!(!decision.navigation_id.is_empty());
        assert_eq!(policy.active_navigation(), None);
    }

    #[tokio::test]
    async fn test_sub_frame_and_disposed() {
        let policy = policy();
        let mut frame = request(CorrelationId::generate(), "https://ads.test/");
        frame.is_main_frame = false;

        let decision = policy.decide_navigation(frame).await.unwrap();
        assert!(decision.allow);
        assert!(decision.navigation_id.is_empty());

        policy.dispose();
        let decision = policy
            .decide_navigation(request(CorrelationId::generate(), "https://a.test/"))
            .await
            .unwrap();
        assert!(!decision.allow);
        assert!(decision.navigation_id.is_empty());
    }

    #[test]
    fn test_begin_command_runs_handlers() {
        let policy = policy();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        policy.on_navigation_starting(move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            args.cancel = args.request_uri.scheme() == "http";
        });

        let allowed = LogicalNavigationId::generate();
        assert!(policy.begin_command(allowed, url("https://a.test/")));
        assert_eq!(policy.active_navigation(), Some(allowed));

        let canceled = LogicalNavigationId::generate();
        assert!(!policy.begin_command(canceled, url("http://a.test/")));
        assert_eq!(policy.active_navigation(), None);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_complete_only_clears_matching_id() {
        let policy = policy();
        let id = LogicalNavigationId::generate();
        policy.begin_command(id, url("https://a.test/"));

        policy.complete(LogicalNavigationId::generate());
        assert_eq!(policy.active_navigation(), Some(id));

        policy.complete(id);
        assert_eq!(policy.active_navigation(), None);
    }
}
