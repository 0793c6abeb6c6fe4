//! Identities and signal shapes shared by every engine adapter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::classify::NavigationErrorKind;

/// Application-visible identity of one navigation attempt.
///
/// Assigned by the application for API navigations and by the host for
/// engine-initiated ones. Never reused; the nil UUID means "no id".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalNavigationId(Uuid);

impl LogicalNavigationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn empty() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for LogicalNavigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one native redirect chain, internal to the policy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a native engine names a navigation in its lifecycle callbacks.
///
/// Some engines hand back a stable per-navigation handle, others only ever
/// report the URL being loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeNavigationKey {
    ByHandle(u64),
    ByUrl(String),
}

impl NativeNavigationKey {
    /// Build a URL key. Parseable URLs are normalized so that
    /// `https://a.test` and `https://a.test/` resolve to the same entry.
    pub fn url(raw: &str) -> Self {
        Self::ByUrl(normalize_url(raw))
    }

    pub fn handle(handle: u64) -> Self {
        Self::ByHandle(handle)
    }
}

impl std::fmt::Display for NativeNavigationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeNavigationKey::ByHandle(handle) => write!(f, "handle:{}", handle),
            NativeNavigationKey::ByUrl(url) => write!(f, "url:{}", url),
        }
    }
}

pub(crate) fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    Url::parse(trimmed)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| trimmed.to_string())
}

/// Application entry point that started a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationKind {
    Navigate(Url),
    NavigateToString { base_url: Option<Url> },
    GoBack,
    GoForward,
    Reload,
}

impl NavigationKind {
    /// Target URL known before the engine starts, if any.
    ///
    /// History traversal and reload only learn their URL from the engine echo.
    pub fn request_uri(&self) -> Option<String> {
        match self {
            NavigationKind::Navigate(url) => Some(url.to_string()),
            NavigationKind::NavigateToString { base_url } => Some(
                base_url
                    .as_ref()
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| ABOUT_BLANK.to_string()),
            ),
            NavigationKind::GoBack | NavigationKind::GoForward | NavigationKind::Reload => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationKind::Navigate(_) => "navigate",
            NavigationKind::NavigateToString { .. } => "navigate_to_string",
            NavigationKind::GoBack => "go_back",
            NavigationKind::GoForward => "go_forward",
            NavigationKind::Reload => "reload",
        }
    }
}

pub const ABOUT_BLANK: &str = "about:blank";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationOrigin {
    /// Started through an application call
    Api,
    /// Started inside the engine and authorized by the host
    Native,
}

/// Engine-supplied hint describing what triggered a navigation action.
///
/// Only used to decide whether a signal continues a redirect chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationTypeHint {
    LinkActivated,
    FormSubmitted,
    BackForward,
    Reload,
    FormResubmitted,
    Other,
}

impl NavigationTypeHint {
    /// Map the WebKit navigation-type ordinal. Negative or unknown values are `Other`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => NavigationTypeHint::LinkActivated,
            1 => NavigationTypeHint::FormSubmitted,
            2 => NavigationTypeHint::BackForward,
            3 => NavigationTypeHint::Reload,
            4 => NavigationTypeHint::FormResubmitted,
            _ => NavigationTypeHint::Other,
        }
    }

    /// Fresh user actions open a new chain; redirects and resubmissions continue one.
    pub fn starts_new_chain(&self) -> bool {
        matches!(
            self,
            NavigationTypeHint::LinkActivated | NavigationTypeHint::FormSubmitted
        )
    }
}

/// Ticket the engine attached to a pending policy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyRequestId(pub u64);

impl std::fmt::Display for PolicyRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine callback announcing that a navigation is about to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStartingSignal {
    pub request_id: PolicyRequestId,
    /// Handle the engine will report on completion; URL engines leave this unset
    pub handle: Option<u64>,
    pub url: Option<String>,
    pub is_main_frame: bool,
    pub is_new_window: bool,
    pub hint: NavigationTypeHint,
}

impl NavigationStartingSignal {
    /// Main-frame, same-window request for `url` with an `Other` hint.
    pub fn main_frame(request_id: u64, url: &str) -> Self {
        Self {
            request_id: PolicyRequestId(request_id),
            handle: None,
            url: Some(url.to_string()),
            is_main_frame: true,
            is_new_window: false,
            hint: NavigationTypeHint::Other,
        }
    }

    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_hint(mut self, hint: NavigationTypeHint) -> Self {
        self.hint = hint;
        self
    }

    pub fn sub_frame(mut self) -> Self {
        self.is_main_frame = false;
        self
    }

    pub fn new_window(mut self) -> Self {
        self.is_new_window = true;
        self
    }

    /// Key later completion callbacks will carry for this navigation.
    pub fn key(&self) -> Option<NativeNavigationKey> {
        match (self.handle, self.url.as_deref()) {
            (Some(handle), _) => Some(NativeNavigationKey::ByHandle(handle)),
            (None, Some(url)) => Some(NativeNavigationKey::url(url)),
            (None, None) => None,
        }
    }
}

/// What the engine reported when a navigation finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeOutcome {
    Succeeded,
    Aborted,
    Errored { code: i64, message: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationStatus {
    Success,
    Canceled,
    Failure,
}

impl NavigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationStatus::Success => "success",
            NavigationStatus::Canceled => "canceled",
            NavigationStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for NavigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified cause of a failed navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationFailure {
    pub kind: NavigationErrorKind,
    pub native_code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationCompleted {
    pub navigation_id: LogicalNavigationId,
    pub request_uri: String,
    pub status: NavigationStatus,
    pub error: Option<NavigationFailure>,
    pub completed_at: DateTime<Utc>,
}

impl NavigationCompleted {
    pub fn new(
        navigation_id: LogicalNavigationId,
        request_uri: String,
        status: NavigationStatus,
        error: Option<NavigationFailure>,
    ) -> Self {
        Self {
            navigation_id,
            request_uri,
            status,
            error,
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWindowRequested {
    pub target_uri: Option<String>,
}

/// Events delivered to the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebViewEvent {
    NavigationCompleted(NavigationCompleted),
    NewWindowRequested(NewWindowRequested),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_key_normalization() {
        assert_eq!(
            NativeNavigationKey::url("https://a.test"),
            NativeNavigationKey::url("https://a.test/")
        );
        assert_eq!(
            NativeNavigationKey::url("not a url"),
            NativeNavigationKey::ByUrl("not a url".to_string())
        );
    }

    #[test]
    fn test_hint_chain_classification() {
        assert!(NavigationTypeHint::from_raw(0).starts_new_chain());
        assert!(NavigationTypeHint::from_raw(1).starts_new_chain());
        assert!(!NavigationTypeHint::from_raw(4).starts_new_chain());
        assert_eq!(NavigationTypeHint::from_raw(-1), NavigationTypeHint::Other);
        assert_eq!(NavigationTypeHint::from_raw(42), NavigationTypeHint::Other);
    }

    #[test]
    fn test_signal_key_prefers_handle() {
        let signal = NavigationStartingSignal::main_frame(1, "https://a.test").with_handle(7);
        assert_eq!(signal.key(), Some(NativeNavigationKey::ByHandle(7)));

        let signal = NavigationStartingSignal::main_frame(1, "https://a.test");
        assert_eq!(
            signal.key(),
            Some(NativeNavigationKey::ByUrl("https://a.test/".to_string()))
        );
    }

    #[test]
    fn test_history_kinds_have_no_request_uri() {
        assert_eq!(NavigationKind::GoBack.request_uri(), None);
        assert_eq!(
            NavigationKind::NavigateToString { base_url: None }.request_uri(),
            Some("about:blank".to_string())
        );
    }
}
