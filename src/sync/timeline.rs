use crate::api::models::Message;
use std::collections::{HashMap, HashSet};

/// Messages of one conversation in first-seen order, keyed by message id.
#[derive(Debug, Default, Clone)]
struct Timeline {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl Timeline {
    /// Appends when the id is new. Returns whether anything changed.
    fn push(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// Per-conversation message timelines. The only writer of message state.
#[derive(Debug, Default)]
pub struct ConversationSync {
    timelines: HashMap<String, Timeline>,
}

impl ConversationSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the server history for `conversation_id`. Anything already held
    /// that the history does not contain (live arrivals that raced the fetch)
    /// is kept after it, in its existing order.
    pub fn load_initial(&mut self, conversation_id: &str, history: Vec<Message>) {
        let previous = self.timelines.remove(conversation_id).unwrap_or_default();
        let mut timeline = Timeline::default();
        for message in history {
            timeline.push(message);
        }
        for message in previous.messages {
            timeline.push(message);
        }
        self.timelines.insert(conversation_id.to_string(), timeline);
    }

    /// Append every message whose id is not present yet. Returns how many were added.
    pub fn merge<I>(&mut self, conversation_id: &str, incoming: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let timeline = self.timelines.entry(conversation_id.to_string()).or_default();
        let mut added = 0;
        for message in incoming {
            if timeline.push(message) {
                added += 1;
            }
        }
        added
    }

    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.timelines.get(conversation_id).map(Timeline::messages).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.timelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::fixtures::message;

    fn ids(sync: &ConversationSync, conversation: &str) -> Vec<String> {
        sync.messages(conversation).iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn merging_the_same_message_twice_keeps_one() {
        let mut sync = ConversationSync::new();
        assert_eq!(sync.merge("c1", [message("a", "c1")]), 1);
        assert_eq!(sync.merge("c1", [message("a", "c1")]), 0);
        assert_eq!(ids(&sync, "c1"), vec!["a"]);
    }

    #[test]
    fn first_seen_order_survives_redelivery() {
        let mut sync = ConversationSync::new();
        sync.load_initial("c1", vec![message("a", "c1"), message("b", "c1")]);
        sync.merge("c1", vec![message("b", "c1"), message("c", "c1")]);
        sync.merge("c1", vec![message("a", "c1"), message("d", "c1"), message("c", "c1")]);
        assert_eq!(ids(&sync, "c1"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn duplicates_inside_one_batch_collapse() {
        let mut sync = ConversationSync::new();
        let added = sync.merge("c1", vec![message("a", "c1"), message("a", "c1"), message("b", "c1")]);
        assert_eq!(added, 2);
        assert_eq!(ids(&sync, "c1"), vec!["a", "b"]);
    }

    #[test]
    fn load_initial_is_idempotent() {
        let mut sync = ConversationSync::new();
        let history = vec![message("a", "c1"), message("b", "c1")];
        sync.load_initial("c1", history.clone());
        sync.load_initial("c1", history);
        assert_eq!(ids(&sync, "c1"), vec!["a", "b"]);
    }

    #[test]
    fn load_initial_keeps_live_arrivals_missing_from_history() {
        let mut sync = ConversationSync::new();
        sync.merge("c1", [message("live", "c1")]);
        sync.load_initial("c1", vec![message("a", "c1"), message("b", "c1")]);
        assert_eq!(ids(&sync, "c1"), vec!["a", "b", "live"]);
    }

    #[test]
    fn conversations_do_not_bleed_into_each_other() {
        let mut sync = ConversationSync::new();
        sync.merge("c1", [message("a", "c1")]);
        sync.merge("c2", [message("a", "c2")]);
        assert_eq!(sync.messages("c1").len(), 1);
        assert_eq!(sync.messages("c2").len(), 1);
        assert!(sync.messages("c3").is_empty());
        sync.clear();
        assert!(sync.messages("c1").is_empty());
    }

    #[test]
    fn poll_then_live_scenario() {
        let mut sync = ConversationSync::new();
        sync.merge("c1", vec![message("a", "c1"), message("b", "c1")]);
        sync.merge("c1", [message("b", "c1")]);
        sync.merge("c1", [message("c", "c1")]);
        assert_eq!(ids(&sync, "c1"), vec!["a", "b", "c"]);
    }
}
