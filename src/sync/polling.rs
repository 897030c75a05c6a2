use crate::engine::{CoreMsg, HistorySource};
use crate::sync::source::SyncSource;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Pulls the active conversation's history while the live channel is down.
#[derive(Debug, Default)]
pub struct PollingFallback {
    current: Option<(String, JoinHandle<()>)>,
}

impl PollingFallback {
    pub fn polling(&self) -> Option<&str> {
        self.current.as_ref().map(|(id, _)| id.as_str())
    }

    /// Make polling match `target`: run for that conversation, or not at all
    /// when `None`. An existing loop for the same conversation is left alone.
    pub fn reconcile<F>(&mut self, target: Option<&str>, start: F)
    where
        F: FnOnce(&str) -> JoinHandle<()>,
    {
        if self.polling() == target {
            return;
        }
        self.stop();
        if let Some(id) = target {
            log::debug!("polling {id} while the live channel is down");
            self.current = Some((id.to_string(), start(id)));
        }
    }

    pub fn stop(&mut self) {
        if let Some((_, task)) = self.current.take() {
            task.abort();
        }
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll loop. Each tick awaits its request before the next one, and a
/// failed request just waits for the next tick.
pub fn spawn_poll_loop<S: SyncSource>(
    source: S,
    conversation_id: String,
    generation: u64,
    inbox: mpsc::UnboundedSender<CoreMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match source.history(&conversation_id).await {
                Ok(messages) => {
                    let msg = CoreMsg::HistoryLoaded {
                        generation,
                        conversation_id: conversation_id.clone(),
                        source: HistorySource::Poll,
                        messages,
                    };
                    if inbox.send(msg).is_err() {
                        return;
                    }
                }
                Err(e) => log::debug!("poll of {conversation_id} failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::api::models::DeckFilter;
    use crate::api::models::fixtures::message;
    use crate::sync::source::ServerSource;
    use crate::sync::source::testing::StubSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn reconcile_starts_switches_and_stops() {
        let starts = AtomicUsize::new(0);
        let start = |_: &str| {
            starts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(std::future::pending::<()>())
        };
        let mut poll = PollingFallback::default();

        poll.reconcile(Some("a"), start);
        poll.reconcile(Some("a"), start);
        assert_eq!(poll.polling(), Some("a"));
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        poll.reconcile(Some("b"), start);
        assert_eq!(poll.polling(), Some("b"));
        assert_eq!(starts.load(Ordering::SeqCst), 2);

        poll.reconcile(None, start);
        assert_eq!(poll.polling(), None);
    }

    #[tokio::test]
    async fn stop_aborts_the_loop() {
        let mut poll = PollingFallback::default();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        poll.reconcile(Some("a"), |_| {
            tokio::spawn(async move {
                let _keep = tx;
                std::future::pending::<()>().await;
            })
        });
        poll.stop();
        // the aborted task drops its sender
        assert!(rx.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_feed_poll_history_every_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = StubSource::open();
        source.history = vec![message("a", "c1"), message("b", "c1")];
        let task = spawn_poll_loop(source.clone(), "c1".into(), 3, tx);

        tokio::time::sleep(POLL_INTERVAL / 2).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(POLL_INTERVAL).await;
        match rx.try_recv() {
            Ok(CoreMsg::HistoryLoaded { generation: 3, conversation_id, source: HistorySource::Poll, messages }) => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(messages.len(), 2);
            }
            other => panic!("expected a poll result, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(POLL_INTERVAL).await;
        assert_eq!(source.calls(), vec!["history", "history"]);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn a_pending_poll_is_never_doubled_up() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = StubSource::gated();
        let task = spawn_poll_loop(source.clone(), "c1".into(), 1, tx);

        tokio::time::sleep(POLL_INTERVAL * 5).await;
        assert_eq!(source.calls(), vec!["history"]);
        assert!(rx.try_recv().is_err());

        source.gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(rx.try_recv(), Ok(CoreMsg::HistoryLoaded { .. })));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_polls_are_swallowed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = ServerSource::new(ApiClient::new("http://127.0.0.1:9"), "tok".into(), DeckFilter::default());
        let task = spawn_poll_loop(source, "c1".into(), 1, tx);
        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert!(!task.is_finished());
        assert!(rx.try_recv().is_err());
        task.abort();
    }
}
