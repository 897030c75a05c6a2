use crate::api::models::Match;
use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_millis(3000);

/// What one snapshot of the match list means for the rest of the client.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Fire the single "new match" notification for this refresh.
    pub notify: bool,
    /// Conversation to activate because none was active.
    pub activate: Option<String>,
    /// Ids seen for the first time in this snapshot.
    pub new_ids: Vec<String>,
}

/// Tracks which matches the user has already been told about.
///
/// The tracker only starts notifying once it has seen a non-empty match list:
/// matches that exist when the session starts (or the first ones to show up
/// after an empty start) never raise a notification.
#[derive(Debug, Default)]
pub struct MatchTracker {
    seen: HashSet<String>,
    primed: bool,
    matches: Vec<Match>,
}

impl MatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one full snapshot in. `active` is the currently active conversation.
    pub fn apply(&mut self, snapshot: Vec<Match>, active: Option<&str>) -> RefreshOutcome {
        let new_ids: Vec<String> = snapshot
            .iter()
            .filter(|m| !self.seen.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        let notify = self.primed && !new_ids.is_empty();
        let activate = match active {
            Some(_) => None,
            None => snapshot.first().map(|m| m.id.clone()),
        };

        self.seen.extend(new_ids.iter().cloned());
        if !snapshot.is_empty() {
            self.primed = true;
        }
        self.matches = snapshot;

        RefreshOutcome { notify, activate, new_ids }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Show cached matches without touching the seen set.
    pub fn show_cached(&mut self, cached: Vec<Match>) {
        if self.matches.is_empty() {
            self.matches = cached;
        }
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.primed = false;
        self.matches.clear();
    }
}

/// The one-shot "new match" popup and its auto-dismiss timer.
#[derive(Debug, Default)]
pub struct Notifier {
    visible: bool,
    cycle: u64,
    timer: Option<JoinHandle<()>>,
}

impl Notifier {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show the notification and (re)arm the dismiss timer. A trigger while it
    /// is already visible extends the same cycle. `arm` receives the cycle
    /// number and must start a timer that reports back through `expire`.
    pub fn trigger<F>(&mut self, arm: F)
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.cancel_timer();
        self.visible = true;
        self.cycle += 1;
        self.timer = Some(arm(self.cycle));
    }

    /// Timer callback. Stale cycles are ignored.
    pub fn expire(&mut self, cycle: u64) -> bool {
        if cycle != self.cycle || !self.visible {
            return false;
        }
        self.timer = None;
        self.visible = false;
        true
    }

    pub fn dismiss(&mut self) {
        self.cancel_timer();
        self.visible = false;
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::fixtures::a_match;

    fn snapshot(ids: &[&str]) -> Vec<Match> {
        ids.iter().map(|id| a_match(id)).collect()
    }

    #[test]
    fn first_refresh_never_notifies() {
        let mut tracker = MatchTracker::new();
        let outcome = tracker.apply(snapshot(&["m1", "m2"]), None);
        assert!(!outcome.notify);
        assert_eq!(outcome.activate.as_deref(), Some("m1"));
    }

    #[test]
    fn one_notification_however_many_new_matches() {
        let mut tracker = MatchTracker::new();
        tracker.apply(snapshot(&["m1"]), Some("m1"));
        let outcome = tracker.apply(snapshot(&["m1", "m2", "m3", "m4"]), Some("m1"));
        assert!(outcome.notify);
        assert_eq!(outcome.new_ids, vec!["m2", "m3", "m4"]);
        let again = tracker.apply(snapshot(&["m1", "m2", "m3", "m4"]), Some("m1"));
        assert!(!again.notify);
    }

    #[test]
    fn empty_then_first_match_then_second() {
        let mut tracker = MatchTracker::new();
        let first = tracker.apply(Vec::new(), None);
        assert_eq!(first, RefreshOutcome::default());

        let second = tracker.apply(snapshot(&["m1"]), None);
        assert!(!second.notify);
        assert_eq!(second.activate.as_deref(), Some("m1"));

        let third = tracker.apply(snapshot(&["m1", "m2"]), Some("m1"));
        assert!(third.notify);
        assert_eq!(third.activate, None);
        assert_eq!(third.new_ids, vec!["m2"]);
    }

    #[test]
    fn seen_set_only_grows() {
        let mut tracker = MatchTracker::new();
        tracker.apply(snapshot(&["m1", "m2"]), Some("m1"));
        tracker.apply(snapshot(&["m2"]), Some("m1"));
        let back = tracker.apply(snapshot(&["m1", "m2"]), Some("m1"));
        assert!(!back.notify);
        assert_eq!(tracker.matches().len(), 2);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut tracker = MatchTracker::new();
        tracker.apply(snapshot(&["m1"]), None);
        tracker.reset();
        assert!(tracker.matches().is_empty());
        let outcome = tracker.apply(snapshot(&["m1", "m2"]), None);
        assert!(!outcome.notify);
        assert_eq!(outcome.new_ids, vec!["m1", "m2"]);
    }

    #[test]
    fn cached_matches_do_not_count_as_seen() {
        let mut tracker = MatchTracker::new();
        tracker.show_cached(snapshot(&["m1"]));
        assert_eq!(tracker.matches().len(), 1);
        let outcome = tracker.apply(snapshot(&["m1"]), Some("m1"));
        assert_eq!(outcome.new_ids, vec!["m1"]);
    }

    #[tokio::test]
    async fn notifier_ignores_stale_expiry() {
        let mut notifier = Notifier::default();
        notifier.trigger(|_| tokio::spawn(async {}));
        notifier.trigger(|_| tokio::spawn(async {}));
        assert!(notifier.is_visible());
        assert!(!notifier.expire(1));
        assert!(notifier.is_visible());
        assert!(notifier.expire(2));
        assert!(!notifier.is_visible());
    }

    #[tokio::test]
    async fn dismiss_hides_and_cancels() {
        let mut notifier = Notifier::default();
        notifier.trigger(|_| tokio::spawn(std::future::pending::<()>()));
        notifier.dismiss();
        assert!(!notifier.is_visible());
        assert!(!notifier.expire(1));
    }
}
