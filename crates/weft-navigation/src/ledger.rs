//! Per-adapter navigation state
//!
//! One active entry, the in-flight redirect chain, and the maps that turn a
//! native handle or URL back into a logical navigation. The ledger itself is
//! not synchronized; the coordinator owns it behind a single mutex.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::types::{
    normalize_url, CorrelationId, LogicalNavigationId, NativeNavigationKey, NavigationOrigin,
    NavigationTypeHint, ABOUT_BLANK,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationEntry {
    pub navigation_id: LogicalNavigationId,
    pub request_uri: String,
    pub completed: bool,
    pub origin: NavigationOrigin,
}

/// Terminal ids remembered for the exactly-once guard.
const TERMINAL_HISTORY: usize = 64;

#[derive(Debug, Default)]
pub struct NavigationLedger {
    active: Option<NavigationEntry>,
    /// API navigation armed and not yet terminal; engine signals are its echo
    api_pending: bool,
    /// API navigation whose target URL is only learned from the first echo
    awaiting_echo_uri: bool,
    correlation: Option<CorrelationId>,
    resolution: HashMap<NativeNavigationKey, LogicalNavigationId>,
    request_uris: HashMap<LogicalNavigationId, String>,
    completed: HashSet<LogicalNavigationId>,
    completed_order: VecDeque<LogicalNavigationId>,
    /// Bumped by every `arm`
    generation: u64,
}

impl NavigationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `navigation_id` the active entry and drop any in-flight chain.
    ///
    /// With no `request_uri` the previous entry's URI stands in until the
    /// engine echo reports the real one.
    pub fn arm(
        &mut self,
        navigation_id: LogicalNavigationId,
        origin: NavigationOrigin,
        request_uri: Option<String>,
    ) {
        let already_terminal = self.completed.contains(&navigation_id);
        self.retire_stale(navigation_id);
        self.correlation = None;
        self.generation += 1;

        let uri = request_uri
            .as_deref()
            .map(normalize_url)
            .or_else(|| self.active.as_ref().map(|entry| entry.request_uri.clone()))
            .unwrap_or_else(|| ABOUT_BLANK.to_string());

        if !already_terminal {
            if request_uri.is_some() {
                self.resolution
                    .insert(NativeNavigationKey::ByUrl(uri.clone()), navigation_id);
            }
            self.request_uris.insert(navigation_id, uri.clone());
        }

        self.api_pending = origin == NavigationOrigin::Api && !already_terminal;
        self.awaiting_echo_uri = self.api_pending && request_uri.is_none();
        self.active = Some(NavigationEntry {
            navigation_id,
            request_uri: uri,
            completed: already_terminal,
            origin,
        });
    }

    /// Arm an engine-initiated navigation the host allowed. The redirect chain survives.
    ///
    /// Returns false if the host handed back an id that already reached a terminal state.
    pub fn authorize(
        &mut self,
        navigation_id: LogicalNavigationId,
        request_uri: String,
        key: Option<NativeNavigationKey>,
    ) -> bool {
        if self.completed.contains(&navigation_id) {
            return false;
        }

        self.retire_stale(navigation_id);

        let uri = normalize_url(&request_uri);
        self.bind(NativeNavigationKey::ByUrl(uri.clone()), navigation_id);
        if let Some(key) = key {
            self.bind(key, navigation_id);
        }
        self.request_uris.insert(navigation_id, uri.clone());

        self.api_pending = false;
        self.awaiting_echo_uri = false;
        self.active = Some(NavigationEntry {
            navigation_id,
            request_uri: uri,
            completed: false,
            origin: NavigationOrigin::Native,
        });
        true
    }

    /// Whether an API navigation is armed and still waiting for the engine.
    pub fn api_navigation_pending(&self) -> bool {
        self.api_pending
            && self
                .active
                .as_ref()
                .map(|entry| !entry.completed)
                .unwrap_or(false)
    }

    /// Treat an engine signal as the pending API navigation's own echo.
    ///
    /// Binds the native key (redirect URLs and handles included) to the armed id.
    pub fn echo(
        &mut self,
        key: Option<NativeNavigationKey>,
        url: Option<&str>,
    ) -> Option<LogicalNavigationId> {
        if !self.api_navigation_pending() {
            return None;
        }

        let entry = self.active.as_mut()?;
        let navigation_id = entry.navigation_id;

        if self.awaiting_echo_uri {
            if let Some(url) = url {
                entry.request_uri = normalize_url(url);
                self.request_uris
                    .insert(navigation_id, entry.request_uri.clone());
                self.awaiting_echo_uri = false;
            }
        }

        if let Some(key) = key {
            self.resolution.insert(key, navigation_id);
        }

        Some(navigation_id)
    }

    pub fn resolve(&self, key: &NativeNavigationKey) -> Option<LogicalNavigationId> {
        self.resolution.get(key).copied()
    }

    /// Resolve an unknown key by ordering: a history or reload navigation
    /// that never saw its starting signal claims the next completion.
    pub fn resolve_pending(&mut self, key: &NativeNavigationKey) -> Option<LogicalNavigationId> {
        if !self.awaiting_echo_uri || self.resolution.contains_key(key) {
            return None;
        }

        let url = match key {
            NativeNavigationKey::ByUrl(url) => Some(url.clone()),
            NativeNavigationKey::ByHandle(_) => None,
        };
        self.echo(Some(key.clone()), url.as_deref())
    }

    /// Generation of the last `arm`. A change means an API navigation
    /// superseded whatever was decided against the older value.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request_uri_of(&self, navigation_id: LogicalNavigationId) -> Option<&str> {
        self.request_uris.get(&navigation_id).map(String::as_str)
    }

    /// First caller for a given id wins; every later caller gets false.
    ///
    /// The winner also removes every native key bound to the id.
    pub fn mark_terminal_if_not_already(&mut self, navigation_id: LogicalNavigationId) -> bool {
        if !self.completed.insert(navigation_id) {
            return false;
        }
        self.completed_order.push_back(navigation_id);
        if self.completed_order.len() > TERMINAL_HISTORY {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.completed.remove(&oldest);
            }
        }

        self.resolution.retain(|_, bound| *bound != navigation_id);
        self.request_uris.remove(&navigation_id);

        if let Some(entry) = self.active.as_mut() {
            if entry.navigation_id == navigation_id {
                entry.completed = true;
                self.api_pending = false;
                self.awaiting_echo_uri = false;
            }
        }

        true
    }

    /// Terminal for a navigation the host denied after it had started tracking it.
    pub fn record_denied(&mut self, navigation_id: LogicalNavigationId, request_uri: String) -> bool {
        if !self.mark_terminal_if_not_already(navigation_id) {
            return false;
        }

        self.active = Some(NavigationEntry {
            navigation_id,
            request_uri: normalize_url(&request_uri),
            completed: true,
            origin: NavigationOrigin::Native,
        });
        self.api_pending = false;
        self.awaiting_echo_uri = false;
        self.correlation = None;
        true
    }

    /// Bind `key` unless it already belongs to the live active navigation.
    fn bind(&mut self, key: NativeNavigationKey, navigation_id: LogicalNavigationId) {
        let live = self
            .active
            .as_ref()
            .filter(|entry| !entry.completed && entry.navigation_id != navigation_id)
            .map(|entry| entry.navigation_id);

        match self.resolution.get(&key) {
            Some(bound) if Some(*bound) == live => {
                tracing::debug!(key = %key, "Key held by the active navigation, not rebinding");
            }
            _ => {
                self.resolution.insert(key, navigation_id);
            }
        }
    }

    /// Forget keys of navigations older than the current entry.
    ///
    /// The entry being replaced keeps its keys so its late callbacks still resolve.
    fn retire_stale(&mut self, incoming: LogicalNavigationId) {
        let previous = self.active_id();
        let keep = |id: &LogicalNavigationId| *id == incoming || Some(*id) == previous;

        self.resolution.retain(|_, bound| keep(bound));
        self.request_uris.retain(|id, _| keep(id));
    }

    pub fn is_terminal(&self, navigation_id: LogicalNavigationId) -> bool {
        self.completed.contains(&navigation_id)
    }

    /// Correlation id for an engine-initiated top-level signal.
    ///
    /// Continues the current chain unless the entry is terminal or the hint
    /// is a fresh user action.
    pub fn correlation_for(&mut self, hint: NavigationTypeHint) -> CorrelationId {
        let entry_terminal = self
            .active
            .as_ref()
            .map(|entry| entry.completed)
            .unwrap_or(false);

        match self.correlation {
            Some(current) if !entry_terminal && !hint.starts_new_chain() => current,
            _ => {
                let fresh = CorrelationId::generate();
                self.correlation = Some(fresh);
                fresh
            }
        }
    }

    pub fn correlation(&self) -> Option<CorrelationId> {
        self.correlation
    }

    pub fn clear_correlation(&mut self) {
        self.correlation = None;
    }

    pub fn active(&self) -> Option<&NavigationEntry> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<LogicalNavigationId> {
        self.active.as_ref().map(|entry| entry.navigation_id)
    }

    pub fn tracked_keys(&self) -> usize {
        self.resolution.len()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_arm(ledger: &mut NavigationLedger, url: &str) -> LogicalNavigationId {
        let id = LogicalNavigationId::generate();
        ledger.arm(id, NavigationOrigin::Api, Some(url.to_string()));
        id
    }

    #[test]
    fn test_arm_binds_request_url() {
        let mut ledger = NavigationLedger::new();
        let id = api_arm(&mut ledger, "https://a.test");

        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://a.test")), Some(id));
        assert!(ledger.api_navigation_pending());
        assert_eq!(ledger.request_uri_of(id), Some("https://a.test/"));
    }

    #[test]
    fn test_terminal_guard_single_winner() {
        let mut ledger = NavigationLedger::new();
        let id = api_arm(&mut ledger, "https://a.test");

        assert!(ledger.mark_terminal_if_not_already(id));
        assert!(!ledger.mark_terminal_if_not_already(id));
        assert!(!ledger.mark_terminal_if_not_already(id));
        assert_eq!(ledger.tracked_keys(), 0);
        assert!(!ledger.api_navigation_pending());
        assert!(ledger.active().map(|e| e.completed).unwrap_or(false));
    }

    #[test]
    fn test_arm_supersedes_but_keeps_prior_keys() {
        let mut ledger = NavigationLedger::new();
        let first = api_arm(&mut ledger, "https://a.test");
        let second = api_arm(&mut ledger, "https://b.test");

        assert_eq!(ledger.active_id(), Some(second));
        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://a.test")), Some(first));
        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://b.test")), Some(second));
    }

    #[test]
    fn test_rearming_terminal_id_stays_terminal() {
        let mut ledger = NavigationLedger::new();
        let id = api_arm(&mut ledger, "https://a.test");
        ledger.mark_terminal_if_not_already(id);

        ledger.arm(id, NavigationOrigin::Api, Some("https://a.test".to_string()));
        assert!(ledger.active().map(|e| e.completed).unwrap_or(false));
        assert!(!ledger.api_navigation_pending());
        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://a.test")), None);
    }

    #[test]
    fn test_echo_learns_uri_for_history_navigation() {
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        ledger.arm(id, NavigationOrigin::Api, None);

        let echoed = ledger.echo(
            Some(NativeNavigationKey::ByHandle(9)),
            Some("https://back.test/page"),
        );
        assert_eq!(echoed, Some(id));
        assert_eq!(ledger.resolve(&NativeNavigationKey::ByHandle(9)), Some(id));
        assert_eq!(ledger.request_uri_of(id), Some("https://back.test/page"));
    }

    #[test]
    fn test_echo_ignored_without_api_navigation() {
        let mut ledger = NavigationLedger::new();
        assert_eq!(ledger.echo(Some(NativeNavigationKey::ByHandle(1)), None), None);

        let id = api_arm(&mut ledger, "https://a.test");
        ledger.mark_terminal_if_not_already(id);
        assert_eq!(ledger.echo(Some(NativeNavigationKey::ByHandle(1)), None), None);
    }

    #[test]
    fn test_correlation_continues_until_fresh_action() {
        let mut ledger = NavigationLedger::new();
        let first = ledger.correlation_for(NavigationTypeHint::Other);
        let id = LogicalNavigationId::generate();
        assert!(ledger.authorize(id, "https://a.test".to_string(), None));

        assert_eq!(ledger.correlation_for(NavigationTypeHint::Other), first);
        assert_eq!(ledger.correlation_for(NavigationTypeHint::FormResubmitted), first);
        assert_ne!(ledger.correlation_for(NavigationTypeHint::LinkActivated), first);
    }

    #[test]
    fn test_arm_clears_correlation() {
        let mut ledger = NavigationLedger::new();
        ledger.correlation_for(NavigationTypeHint::Other);
        api_arm(&mut ledger, "https://a.test");
        assert_eq!(ledger.correlation(), None);
    }

    #[test]
    fn test_authorize_rejects_terminal_id() {
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        assert!(ledger.record_denied(id, "https://a.test".to_string()));
        assert!(!ledger.authorize(id, "https://a.test".to_string(), None));
        assert!(!ledger.record_denied(id, "https://a.test".to_string()));
    }

    #[test]
    fn test_arm_retires_keys_older_than_previous_entry() {
        let mut ledger = NavigationLedger::new();
        let first = api_arm(&mut ledger, "https://a.test");
        let second = api_arm(&mut ledger, "https://b.test");
        let third = api_arm(&mut ledger, "https://c.test");

        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://a.test")), None);
        assert_eq!(ledger.request_uri_of(first), None);
        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://b.test")), Some(second));
        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://c.test")), Some(third));
        assert_eq!(ledger.tracked_keys(), 2);
    }

    #[test]
    fn test_terminal_guard_survives_later_arms() {
        let mut ledger = NavigationLedger::new();
        let done = api_arm(&mut ledger, "https://a.test");
        assert!(ledger.mark_terminal_if_not_already(done));

        api_arm(&mut ledger, "https://b.test");
        api_arm(&mut ledger, "https://c.test");

        assert!(ledger.is_terminal(done));
        assert!(!ledger.authorize(done, "https://d.test".to_string(), None));
        assert!(!ledger.record_denied(done, "https://d.test".to_string()));
    }

    #[test]
    fn test_terminal_history_is_bounded() {
        let mut ledger = NavigationLedger::new();
        let oldest = LogicalNavigationId::generate();
        ledger.mark_terminal_if_not_already(oldest);

        for _ in 0..TERMINAL_HISTORY {
            ledger.mark_terminal_if_not_already(LogicalNavigationId::generate());
        }

        assert!(!ledger.is_terminal(oldest));
    }

    #[test]
    fn test_authorize_keeps_keys_of_live_api_navigation() {
        let mut ledger = NavigationLedger::new();
        let api = api_arm(&mut ledger, "https://a.test");
        let generation = ledger.generation();

        let other = LogicalNavigationId::generate();
        assert!(ledger.authorize(
            other,
            "https://a.test".to_string(),
            Some(NativeNavigationKey::ByHandle(3))
        ));

        assert_eq!(ledger.resolve(&NativeNavigationKey::url("https://a.test")), Some(api));
        assert_eq!(ledger.resolve(&NativeNavigationKey::ByHandle(3)), Some(other));
        assert_eq!(ledger.generation(), generation);

        api_arm(&mut ledger, "https://b.test");
        assert_ne!(ledger.generation(), generation);
    }

    #[test]
    fn test_resolve_pending_claims_unknown_key_by_order() {
        let mut ledger = NavigationLedger::new();
        let id = LogicalNavigationId::generate();
        ledger.arm(id, NavigationOrigin::Api, None);

        let key = NativeNavigationKey::url("https://prev.test/");
        assert_eq!(ledger.resolve(&key), None);
        assert_eq!(ledger.resolve_pending(&key), Some(id));
        assert_eq!(ledger.request_uri_of(id), Some("https://prev.test/"));
        assert_eq!(ledger.resolve(&key), Some(id));

        // Known target URLs never resolve by order.
        let mut ledger = NavigationLedger::new();
        api_arm(&mut ledger, "https://a.test");
        assert_eq!(ledger.resolve_pending(&key), None);
    }
}
