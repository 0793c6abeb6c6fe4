//! Weft Core
//!
//! Application-facing layer over the navigation correlation engine:
//! configuration, logging, the default host policy and the `WebView` surface.

mod config;
mod error;
mod host_policy;
mod webview;

pub use config::Config;
pub use error::CoreError;
pub use host_policy::{NavigationHostPolicy, NavigationStartingArgs};
pub use webview::{EngineDriver, WebView};

// Re-export the correlation engine
pub use weft_navigation::{
    EngineProfile, ErrorClassifier, LogicalNavigationId, NativeEngine, NativeNavigationKey,
    NativeOutcome, NavigationCompleted, NavigationCoordinator, NavigationError,
    NavigationErrorKind, NavigationEvents, NavigationFailure, NavigationStartingSignal,
    NavigationStatus, NavigationTypeHint, NewWindowRequested, PolicyRequestId, PolicyVerdict,
    WebViewEvent,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    init_logging_with(&Config::default());
}

/// Initialize logging with the configured filter. `RUST_LOG` takes precedence.
pub fn init_logging_with(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
