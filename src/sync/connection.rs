use crate::api::events::OutboundFrame;
use crate::engine::CoreMsg;
use crate::sync::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a replaced socket gets to send its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What a connector needs to dial one channel.
#[derive(Debug, Clone)]
pub struct ChannelRequest {
    pub epoch: u64,
    pub conversation_id: String,
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Opened,
    Frame(String),
    Closed,
}

/// A signal from the channel opened at `epoch`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub epoch: u64,
    pub signal: ChannelSignal,
}

/// Where a channel reports back. Every signal carries the epoch the channel
/// was opened with, so the manager can tell stale channels apart.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    epoch: u64,
    inbox: mpsc::UnboundedSender<CoreMsg>,
}

impl ChannelSink {
    fn emit(&self, signal: ChannelSignal) {
        let _ = self.inbox.send(CoreMsg::Channel(ChannelEvent { epoch: self.epoch, signal }));
    }

    pub fn opened(&self) {
        self.emit(ChannelSignal::Opened);
    }

    pub fn frame(&self, text: String) {
        self.emit(ChannelSignal::Frame(text));
    }

    pub fn closed(&self) {
        self.emit(ChannelSignal::Closed);
    }
}

/// A running channel: the outbound queue and the task driving it.
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub task: JoinHandle<()>,
}

pub trait Connector: Send + Sync {
    fn connect(&self, request: ChannelRequest, sink: ChannelSink) -> ChannelLink;
}

/// Live channel over a websocket.
#[derive(Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, request: ChannelRequest, sink: ChannelSink) -> ChannelLink {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(request, outbound_rx, sink));
        ChannelLink { outbound, task }
    }
}

async fn run_socket(
    request: ChannelRequest,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    sink: ChannelSink,
) {
    let ws_stream = match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request.url.as_str())).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            log::debug!("live channel for {} failed to connect: {e}", request.conversation_id);
            sink.closed();
            return;
        }
        Err(_) => {
            log::debug!("live channel for {} timed out connecting", request.conversation_id);
            sink.closed();
            return;
        }
    };
    log::info!("live channel open for {}", request.conversation_id);
    sink.opened();

    let (mut write, mut read) = ws_stream.split();
    let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    // manager dropped the link: explicit close
                    let _ = write.close().await;
                    return;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("could not encode outbound frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    log::debug!("live channel write failed: {e}");
                    break;
                }
            }
            _ = keepalive.tick() => {
                if let Ok(text) = serde_json::to_string(&OutboundFrame::Ping) {
                    if write.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => sink.frame(text),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    log::debug!("live channel error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    log::info!("live channel closed for {}", request.conversation_id);
    sink.closed();
}

/// Owns the single live channel and its reconnect timer.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    inbox: mpsc::UnboundedSender<CoreMsg>,
    state: ConnectionState,
    conversation: Option<String>,
    epoch: u64,
    backoff: Backoff,
    link: Option<ChannelLink>,
    reconnect: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, inbox: mpsc::UnboundedSender<CoreMsg>) -> Self {
        Self {
            connector,
            inbox,
            state: ConnectionState::Disconnected,
            conversation: None,
            epoch: 0,
            backoff: Backoff::default(),
            link: None,
            reconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn conversation(&self) -> Option<&str> {
        self.conversation.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Open a channel for `conversation_id`, replacing whatever was open. The
    /// retry counter survives, so reconnects keep backing off.
    pub fn open(&mut self, conversation_id: &str, url: Url) {
        self.teardown();
        self.epoch += 1;
        self.conversation = Some(conversation_id.to_string());
        self.state = ConnectionState::Connecting;
        let request = ChannelRequest { epoch: self.epoch, conversation_id: conversation_id.to_string(), url };
        let sink = ChannelSink { epoch: self.epoch, inbox: self.inbox.clone() };
        self.link = Some(self.connector.connect(request, sink));
    }

    /// Tear everything down; nothing from the old channel is applied afterwards.
    pub fn close(&mut self) {
        self.teardown();
        self.epoch += 1;
        self.conversation = None;
        self.state = ConnectionState::Disconnected;
        self.backoff.reset();
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
        if let Some(link) = self.link.take() {
            retire(link);
        }
    }

    /// Signals from any other epoch belong to a channel that has been replaced.
    pub fn accepts(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.conversation.is_some()
    }

    pub fn on_opened(&mut self, epoch: u64) -> bool {
        if !self.accepts(epoch) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        true
    }

    /// Failure or abrupt closure. Schedules a reconnect and returns its delay.
    pub fn on_closed(&mut self, epoch: u64) -> Option<Duration> {
        if !self.accepts(epoch) || self.state == ConnectionState::Disconnected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        if let Some(link) = self.link.take() {
            link.task.abort();
        }
        let delay = self.backoff.next_delay();
        let inbox = self.inbox.clone();
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(CoreMsg::ReconnectDue { epoch });
        }));
        Some(delay)
    }

    /// The conversation to reopen when the reconnect timer of `epoch` fires.
    pub fn reconnect_target(&mut self, epoch: u64) -> Option<String> {
        if !self.accepts(epoch) || self.state != ConnectionState::Disconnected {
            return None;
        }
        self.reconnect = None;
        self.conversation.clone()
    }

    /// Queue a frame on the open channel. Hands the frame back when there is
    /// no connected channel to take it.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), OutboundFrame> {
        match (&self.link, self.state) {
            (Some(link), ConnectionState::Connected) => link.outbound.send(frame).map_err(|e| e.0),
            _ => Err(frame),
        }
    }
}

/// Dropping the outbound sender tells the socket task to send a close frame
/// and stop. It gets `CLOSE_GRACE` to do so before it is aborted.
fn retire(link: ChannelLink) {
    let ChannelLink { outbound, mut task } = link;
    drop(outbound);
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                    task.abort();
                }
            });
        }
        Err(_) => task.abort(),
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingConnector;
    use super::*;

    fn url() -> Url {
        Url::parse("ws://localhost/api/chat/ws/c1?token=t").unwrap()
    }

    fn manager() -> (ConnectionManager, Arc<RecordingConnector>, mpsc::UnboundedReceiver<CoreMsg>) {
        let connector = Arc::new(RecordingConnector::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionManager::new(connector.clone(), tx), connector, rx)
    }

    #[tokio::test]
    async fn open_then_ack_connects_and_resets_backoff() {
        let (mut conn, connector, _rx) = manager();
        conn.open("c1", url());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        let epoch = connector.last_request().epoch;
        assert_eq!(conn.on_closed(epoch), Some(Duration::from_millis(500)));
        conn.open("c1", url());
        let epoch = conn.epoch();
        assert!(conn.on_opened(epoch));
        assert!(conn.is_connected());
        assert_eq!(conn.backoff().attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_back_off_to_the_cap() {
        let (mut conn, _connector, mut rx) = manager();
        conn.open("c1", url());
        let mut delays = Vec::new();
        for _ in 0..5 {
            let epoch = conn.epoch();
            delays.push(conn.on_closed(epoch).unwrap().as_millis());
            match rx.recv().await {
                Some(CoreMsg::ReconnectDue { epoch: due }) => {
                    assert_eq!(conn.reconnect_target(due).as_deref(), Some("c1"));
                    conn.open("c1", url());
                }
                other => panic!("expected reconnect, got {other:?}"),
            }
        }
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);

        let epoch = conn.epoch();
        conn.on_opened(epoch);
        conn.on_closed(epoch);
        assert_eq!(conn.backoff().attempt(), 1);
    }

    #[tokio::test]
    async fn stale_epochs_are_rejected() {
        let (mut conn, connector, _rx) = manager();
        conn.open("a", url());
        let stale = connector.last_request().epoch;
        conn.close();
        conn.open("b", url());
        assert!(!conn.accepts(stale));
        assert!(!conn.on_opened(stale));
        assert_eq!(conn.on_closed(stale), None);
        assert_eq!(conn.conversation(), Some("b"));
        assert_eq!(connector.dial_count(), 2);
    }

    #[tokio::test]
    async fn close_cancels_pending_reconnect() {
        let (mut conn, _connector, _rx) = manager();
        conn.open("c1", url());
        let epoch = conn.epoch();
        conn.on_closed(epoch);
        conn.close();
        assert_eq!(conn.reconnect_target(epoch), None);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.conversation(), None);
    }

    #[tokio::test]
    async fn send_only_goes_out_while_connected() {
        let (mut conn, connector, _rx) = manager();
        conn.open("c1", url());
        let frame = OutboundFrame::Message { content: "hi".into() };
        assert_eq!(conn.send(frame.clone()), Err(frame.clone()));
        let epoch = conn.epoch();
        conn.on_opened(epoch);
        assert_eq!(conn.send(frame.clone()), Ok(()));
        assert_eq!(connector.take_outbound(), vec![frame]);
    }

    /// A channel task that runs until its outbound queue is dropped.
    struct DrainingConnector {
        finished: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Connector for DrainingConnector {
        fn connect(&self, _request: ChannelRequest, _sink: ChannelSink) -> ChannelLink {
            let (outbound, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
            let finished = self.finished.clone();
            let task = tokio::spawn(async move {
                while rx.recv().await.is_some() {}
                finished.store(true, std::sync::atomic::Ordering::SeqCst);
            });
            ChannelLink { outbound, task }
        }
    }

    #[tokio::test]
    async fn close_lets_the_socket_task_finish_on_its_own() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut conn = ConnectionManager::new(Arc::new(DrainingConnector { finished: finished.clone() }), tx);
        conn.open("c1", url());
        conn.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_handshake_counts_as_a_failure() {
        // accepts TCP but never answers the upgrade
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = ConnectionManager::new(Arc::new(WsConnector), tx);
        let url = Url::parse(&format!("ws://{addr}/api/chat/ws/c1?token=t")).unwrap();
        conn.open("c1", url);

        match rx.recv().await {
            Some(CoreMsg::Channel(ChannelEvent { epoch, signal: ChannelSignal::Closed })) => {
                assert_eq!(conn.on_closed(epoch), Some(Duration::from_millis(500)));
            }
            other => panic!("expected a closed channel, got {other:?}"),
        }
        drop(listener);
    }
}
