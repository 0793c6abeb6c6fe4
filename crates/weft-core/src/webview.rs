//! Application-facing WebView
//!
//! Every command mints a logical navigation id, arms the coordinator, then
//! instructs the engine driver. The engine adapter reports native callbacks
//! to `WebView::coordinator()`.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

use weft_navigation::{
    LogicalNavigationId, NativeEngine, NavigationCoordinator, NavigationEvents, NavigationKind,
    WebViewEvent,
};

use crate::config::Config;
use crate::error::CoreError;
use crate::host_policy::{NavigationHostPolicy, NavigationStartingArgs};
use crate::Result;

/// Commands into a native engine. Methods returning `bool` report whether
/// the engine accepted the command.
pub trait EngineDriver: NativeEngine {
    fn navigate(&self, navigation_id: LogicalNavigationId, url: &Url) -> bool;
    fn navigate_to_string(
        &self,
        navigation_id: LogicalNavigationId,
        html: &str,
        base_url: Option<&Url>,
    ) -> bool;
    fn go_back(&self, navigation_id: LogicalNavigationId) -> bool;
    fn go_forward(&self, navigation_id: LogicalNavigationId) -> bool;
    fn refresh(&self, navigation_id: LogicalNavigationId) -> bool;
    fn stop(&self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
}

/// Event sink that releases the host's active operation before forwarding.
struct CompletionTap {
    host: Arc<NavigationHostPolicy>,
    sender: UnboundedSender<WebViewEvent>,
}

impl NavigationEvents for CompletionTap {
    fn emit(&self, event: WebViewEvent) {
        if let WebViewEvent::NavigationCompleted(completed) = &event {
            self.host.complete(completed.navigation_id);
        }
        self.sender.emit(event);
    }
}

pub struct WebView {
    config: Config,
    driver: Arc<dyn EngineDriver>,
    host: Arc<NavigationHostPolicy>,
    coordinator: Arc<NavigationCoordinator>,
}

impl WebView {
    /// Build a webview over `driver`. Events arrive on the returned receiver.
    pub fn new<D>(config: Config, driver: Arc<D>) -> Result<(Self, UnboundedReceiver<WebViewEvent>)>
    where
        D: EngineDriver + 'static,
    {
        config.validate()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let host = Arc::new(NavigationHostPolicy::new(config.blank_url()?));
        let engine: Arc<dyn NativeEngine> = driver.clone();
        let events = Arc::new(CompletionTap {
            host: Arc::clone(&host),
            sender,
        });

        let coordinator = NavigationCoordinator::new(
            host.clone(),
            engine,
            events,
            Arc::new(config.engine),
        )
        .with_diagnostics(config.diagnostics);

        tracing::info!(engine = %config.engine, "WebView created");

        Ok((
            Self {
                config,
                driver,
                host,
                coordinator: Arc::new(coordinator),
            },
            receiver,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entry point for the engine adapter's native callbacks.
    pub fn coordinator(&self) -> &Arc<NavigationCoordinator> {
        &self.coordinator
    }

    pub fn on_navigation_starting<F>(&self, handler: F)
    where
        F: Fn(&mut NavigationStartingArgs) + Send + Sync + 'static,
    {
        self.host.on_navigation_starting(handler);
    }

    pub fn source(&self) -> Url {
        self.host.source()
    }

    pub fn can_go_back(&self) -> bool {
        self.driver.can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.driver.can_go_forward()
    }

    pub fn navigate(&self, url: &str) -> Result<LogicalNavigationId> {
        let target = parse_url(url)?;
        tracing::debug!(url = %target, "navigate");

        let (navigation_id, started) =
            self.start(NavigationKind::Navigate(target.clone()), target.clone())?;
        if started && !self.driver.navigate(navigation_id, &target) {
            self.refuse(navigation_id, "navigate");
        }
        Ok(navigation_id)
    }

    pub fn navigate_to_string(&self, html: &str, base_url: Option<&str>) -> Result<LogicalNavigationId> {
        let base_url = base_url.map(parse_url).transpose()?;
        let request_uri = match &base_url {
            Some(base) => base.clone(),
            None => self.config.blank_url()?,
        };
        tracing::debug!(length = html.len(), base_url = ?base_url, "navigate_to_string");

        let kind = NavigationKind::NavigateToString {
            base_url: base_url.clone(),
        };
        let (navigation_id, started) = self.start(kind, request_uri)?;
        if started
            && !self
                .driver
                .navigate_to_string(navigation_id, html, base_url.as_ref())
        {
            self.refuse(navigation_id, "navigate_to_string");
        }
        Ok(navigation_id)
    }

    pub fn go_back(&self) -> Result<bool> {
        if !self.driver.can_go_back() {
            tracing::debug!("go_back: no history, skipped");
            return Ok(false);
        }
        self.history_command(NavigationKind::GoBack, |id| self.driver.go_back(id))
    }

    pub fn go_forward(&self) -> Result<bool> {
        if !self.driver.can_go_forward() {
            tracing::debug!("go_forward: no forward history, skipped");
            return Ok(false);
        }
        self.history_command(NavigationKind::GoForward, |id| self.driver.go_forward(id))
    }

    pub fn refresh(&self) -> Result<bool> {
        self.history_command(NavigationKind::Reload, |id| self.driver.refresh(id))
    }

    /// Stop the active navigation. It completes as canceled.
    pub fn stop(&self) -> Result<bool> {
        if self.coordinator.is_detached() {
            return Err(weft_navigation::NavigationError::Detached.into());
        }

        let active = self
            .coordinator
            .active_navigation()
            .filter(|entry| !entry.completed);
        let Some(entry) = active else {
            tracing::debug!("stop: no active navigation");
            return Ok(false);
        };

        tracing::debug!(navigation_id = %entry.navigation_id, "stop: canceling active navigation");
        self.driver.stop();
        Ok(self.coordinator.cancel_api_navigation(entry.navigation_id))
    }

    /// Tear down. Later engine callbacks are answered or dropped without effect.
    pub fn detach(&self) {
        self.coordinator.detach();
        self.host.dispose();
    }

    fn history_command<F>(&self, kind: NavigationKind, invoke: F) -> Result<bool>
    where
        F: FnOnce(LogicalNavigationId) -> bool,
    {
        let command = kind.as_str();
        let (navigation_id, started) = self.start(kind, self.host.source())?;
        if !started {
            return Ok(false);
        }

        if !invoke(navigation_id) {
            self.refuse(navigation_id, command);
            return Ok(false);
        }

        tracing::debug!(navigation_id = %navigation_id, command, "Command started");
        Ok(true)
    }

    /// Arm the coordinator and ask the handlers. A canceled command has
    /// already completed when this returns `false`.
    fn start(&self, kind: NavigationKind, request_uri: Url) -> Result<(LogicalNavigationId, bool)> {
        let navigation_id = LogicalNavigationId::generate();
        self.coordinator.begin_api_navigation(navigation_id, kind)?;

        if !self.host.begin_command(navigation_id, request_uri) {
            self.coordinator.cancel_api_navigation(navigation_id);
            return Ok((navigation_id, false));
        }

        Ok((navigation_id, true))
    }

    fn refuse(&self, navigation_id: LogicalNavigationId, command: &str) {
        tracing::debug!(navigation_id = %navigation_id, command, "Engine refused command");
        self.coordinator.cancel_api_navigation(navigation_id);
    }
}

impl Drop for WebView {
    fn drop(&mut self) {
        self.detach();
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| CoreError::InvalidUrl(format!("{}: {}", raw, e)))
}
