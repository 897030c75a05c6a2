use crate::engine::CoreMsg;
use crate::sync::source::SyncSource;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const REFRESH_INTERVAL: Duration = Duration::from_millis(2000);

/// Periodic sweep over the deck and the match list while signed in.
#[derive(Debug, Default)]
pub struct BackgroundRefresh {
    task: Option<JoinHandle<()>>,
}

impl BackgroundRefresh {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn start<S: SyncSource>(&mut self, source: S, generation: u64, inbox: mpsc::UnboundedSender<CoreMsg>) {
        self.stop();
        self.task = Some(tokio::spawn(refresh_loop(source, generation, inbox)));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for BackgroundRefresh {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The first tick fires at once, which doubles as the sign-in load. Each tick
/// finishes both pulls before the next one can start.
async fn refresh_loop<S: SyncSource>(source: S, generation: u64, inbox: mpsc::UnboundedSender<CoreMsg>) {
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        match source.deck().await {
            Ok(deck) => {
                if inbox.send(CoreMsg::DeckLoaded { generation, deck }).is_err() {
                    return;
                }
            }
            Err(e) => log::debug!("deck refresh failed: {e}"),
        }

        match source.matches().await {
            Ok(matches) => {
                if inbox.send(CoreMsg::MatchesLoaded { generation, matches }).is_err() {
                    return;
                }
            }
            Err(e) => log::debug!("match refresh failed: {e}"),
        }
    }
}
