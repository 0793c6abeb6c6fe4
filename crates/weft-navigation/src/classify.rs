//! Native failure code classification
//!
//! Every engine reports failures with its own code space. The taxonomy is
//! shared; only the lookup table differs per engine. Codes missing from a
//! table are `GenericNavigationFailure`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationErrorKind {
    Timeout,
    Network,
    TlsOrCertificate,
    Canceled,
    GenericNavigationFailure,
}

impl NavigationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationErrorKind::Timeout => "timeout",
            NavigationErrorKind::Network => "network",
            NavigationErrorKind::TlsOrCertificate => "tls_or_certificate",
            NavigationErrorKind::Canceled => "canceled",
            NavigationErrorKind::GenericNavigationFailure => "generic_navigation_failure",
        }
    }
}

impl std::fmt::Display for NavigationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps an engine failure code into the shared taxonomy. Must be total.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, code: i64) -> NavigationErrorKind;
}

/// Native engines with a known failure code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineProfile {
    /// `CoreWebView2WebErrorStatus`
    #[serde(rename = "webview2")]
    WebView2,
    /// `NSURLError*` codes from WKWebView
    #[serde(rename = "wkwebview")]
    WkWebView,
    /// `WebViewClient.ERROR_*`
    #[serde(rename = "android_webview")]
    AndroidWebView,
    /// Status codes produced by the WebKitGTK shim
    #[serde(rename = "webkitgtk")]
    WebKitGtk,
    #[default]
    #[serde(rename = "generic")]
    Generic,
}

use NavigationErrorKind::{Canceled, Network, Timeout, TlsOrCertificate};

const WEBVIEW2_TABLE: &[(i64, NavigationErrorKind)] = &[
    (1, TlsOrCertificate), // CertificateCommonNameIsIncorrect
    (2, TlsOrCertificate), // CertificateExpired
    (3, TlsOrCertificate), // ClientCertificateContainsErrors
    (4, TlsOrCertificate), // CertificateRevoked
    (5, TlsOrCertificate), // CertificateIsInvalid
    (6, Network),          // ServerUnreachable
    (7, Timeout),
    (8, Network),  // ErrorHttpInvalidServerResponse
    (9, Network),  // ConnectionAborted
    (10, Network), // ConnectionReset
    (11, Network), // Disconnected
    (12, Network), // CannotConnect
    (13, Network), // HostNameNotResolved
    (14, Canceled),
];

const WKWEBVIEW_TABLE: &[(i64, NavigationErrorKind)] = &[
    (-999, Canceled),
    (-1001, Timeout),
    (-1003, Network), // CannotFindHost
    (-1004, Network), // CannotConnectToHost
    (-1005, Network), // NetworkConnectionLost
    (-1006, Network), // DNSLookupFailed
    (-1009, Network), // NotConnectedToInternet
    (-1018, Network), // InternationalRoamingOff
    (-1020, Network), // DataNotAllowed
    (-1022, TlsOrCertificate), // AppTransportSecurityRequiresSecureConnection
    (-1200, TlsOrCertificate), // SecureConnectionFailed
    (-1201, TlsOrCertificate),
    (-1202, TlsOrCertificate),
    (-1203, TlsOrCertificate),
    (-1204, TlsOrCertificate),
    (-1205, TlsOrCertificate),
    (-1206, TlsOrCertificate),
];

const ANDROID_TABLE: &[(i64, NavigationErrorKind)] = &[
    (-1, Network), // ERROR_UNKNOWN
    (-2, Network), // ERROR_HOST_LOOKUP
    (-4, TlsOrCertificate), // ERROR_AUTHENTICATION
    (-6, Network), // ERROR_CONNECT
    (-7, Network), // ERROR_IO
    (-8, Timeout),
    (-11, TlsOrCertificate), // ERROR_FAILED_SSL_HANDSHAKE
];

const WEBKITGTK_TABLE: &[(i64, NavigationErrorKind)] = &[
    (2, Canceled),
    (3, Timeout),
    (4, Network),
    (5, TlsOrCertificate),
];

impl EngineProfile {
    pub fn error_table(&self) -> &'static [(i64, NavigationErrorKind)] {
        match self {
            EngineProfile::WebView2 => WEBVIEW2_TABLE,
            EngineProfile::WkWebView => WKWEBVIEW_TABLE,
            EngineProfile::AndroidWebView => ANDROID_TABLE,
            EngineProfile::WebKitGtk => WEBKITGTK_TABLE,
            EngineProfile::Generic => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineProfile::WebView2 => "webview2",
            EngineProfile::WkWebView => "wkwebview",
            EngineProfile::AndroidWebView => "android_webview",
            EngineProfile::WebKitGtk => "webkitgtk",
            EngineProfile::Generic => "generic",
        }
    }
}

impl std::fmt::Display for EngineProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EngineProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webview2" => Ok(EngineProfile::WebView2),
            "wkwebview" => Ok(EngineProfile::WkWebView),
            "android_webview" | "android" => Ok(EngineProfile::AndroidWebView),
            "webkitgtk" | "gtk" => Ok(EngineProfile::WebKitGtk),
            "generic" => Ok(EngineProfile::Generic),
            _ => Err(format!("Unknown engine profile: {}", s)),
        }
    }
}

impl ErrorClassifier for EngineProfile {
    fn classify(&self, code: i64) -> NavigationErrorKind {
        self.error_table()
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(NavigationErrorKind::GenericNavigationFailure)
    }
}
