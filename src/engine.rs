//! The sync engine: one task owning every component, fed through a single
//! inbox. Network calls and timers run in spawned tasks and report back into
//! that inbox, so each state change happens inside one `Core::handle` call.

use crate::api::ApiClient;
use crate::api::events::{LiveEvent, OutboundFrame};
use crate::api::models::{
    ConfirmTradeResponse, ConversationSummary, DeckFilter, DeckListing, Listing, ListingPatch, Match, Message,
    MessageKind, NewListing, ProfilePatch, SwipeDirection, SwipeResult, User,
};
use crate::app::{AppConfig, ConfigStore};
use crate::error::{Error, Result};
use crate::session::SessionStore;
use crate::storage::MatchCache;
use crate::sync::connection::{ChannelEvent, ChannelSignal};
use crate::sync::matches::NOTIFICATION_TIMEOUT;
use crate::sync::source::{ServerSource, SyncSource};
use crate::sync::{
    BackgroundRefresh, ConnectionManager, ConnectionState, Connector, ConversationSync, MatchTracker, Notifier,
    PollingFallback, polling,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub type Reply<T> = oneshot::Sender<Result<T>>;

/// How a sent message left the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SendReceipt {
    /// Written to the live channel; the server's echo adds it to the timeline.
    Live,
    /// Posted over REST; the returned copy is already in the timeline.
    Delivered(Message),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Initial,
    Poll,
}

/// Requests from the view layer.
#[derive(Debug)]
pub enum Command {
    SignIn { email: String, password: String, reply: Reply<User> },
    SignUp { email: String, password: String, display_name: String, city: Option<String>, reply: Reply<User> },
    RestoreSession { reply: oneshot::Sender<bool> },
    SignOut,
    OpenConversation { conversation_id: String },
    CloseConversation,
    LoadInitial { conversation_id: String },
    Send { conversation_id: String, content: String, reply: Reply<SendReceipt> },
    Refresh,
    /// Narrow the deck; re-pulls it right away.
    SetDeckFilter { filter: DeckFilter },
    DismissNotification,
    Swipe { target_listing_id: String, direction: SwipeDirection, reply: Reply<SwipeResult> },
    ConfirmTrade { match_id: String, reply: Reply<ConfirmTradeResponse> },
    CancelMatch { match_id: String, reply: Reply<()> },
    CreateListing { listing: NewListing, reply: Reply<Listing> },
    MyListings { reply: Reply<Vec<Listing>> },
    UpdateListing { listing_id: String, patch: ListingPatch, reply: Reply<Listing> },
    DeleteListing { listing_id: String, reply: Reply<()> },
    UpdateProfile { patch: ProfilePatch, reply: Reply<User> },
    /// Stop every channel and timer and end the engine task. The saved
    /// credential is kept for the next run.
    Shutdown { reply: oneshot::Sender<()> },
}

/// State to refresh after a user action succeeds.
#[derive(Debug, Clone)]
pub enum Followup {
    Matches,
    DeckAndMatches,
    /// A swipe created a match.
    NewMatch,
    User(User),
}

#[derive(Debug)]
pub enum CoreMsg {
    Command(Command),
    Channel(ChannelEvent),
    ReconnectDue { epoch: u64 },
    HistoryLoaded { generation: u64, conversation_id: String, source: HistorySource, messages: Vec<Message> },
    MatchesLoaded { generation: u64, matches: Vec<Match> },
    DeckLoaded { generation: u64, deck: Vec<DeckListing> },
    NotificationExpired { cycle: u64 },
    AuthCompleted { outcome: Result<(String, User)>, reply: Option<Reply<User>> },
    Restored { token: String, outcome: Result<User>, reply: oneshot::Sender<bool> },
    MessageSent { generation: u64, conversation_id: String, outcome: Result<Message>, reply: Reply<SendReceipt> },
    Followup { generation: u64, followup: Followup },
}

/// Everything the view layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub signed_in: bool,
    pub user: Option<User>,
    pub connection: ConnectionState,
    pub connected: bool,
    pub active_conversation: Option<String>,
    pub messages: Vec<Message>,
    pub matches: Vec<Match>,
    pub conversations: Vec<ConversationSummary>,
    pub deck: Vec<DeckListing>,
    pub deck_filter: DeckFilter,
    pub show_notification: bool,
}

pub struct Core {
    api: ApiClient,
    inbox: mpsc::UnboundedSender<CoreMsg>,
    view: watch::Sender<ViewState>,
    session: SessionStore,
    /// Bumped at every sign-in and sign-out; results tagged with an older
    /// generation are dropped.
    generation: u64,
    connection: ConnectionManager,
    polling: PollingFallback,
    conversations: ConversationSync,
    tracker: MatchTracker,
    notifier: Notifier,
    refresh: BackgroundRefresh,
    cache: Option<MatchCache>,
    active: Option<String>,
    deck: Vec<DeckListing>,
    deck_filter: DeckFilter,
    stopped: bool,
}

impl Core {
    pub fn new(
        session: SessionStore,
        connector: Arc<dyn Connector>,
        cache: Option<MatchCache>,
        inbox: mpsc::UnboundedSender<CoreMsg>,
        view: watch::Sender<ViewState>,
    ) -> Self {
        Self {
            api: ApiClient::new(session.base_url()),
            connection: ConnectionManager::new(connector, inbox.clone()),
            inbox,
            view,
            session,
            generation: 0,
            polling: PollingFallback::default(),
            conversations: ConversationSync::new(),
            tracker: MatchTracker::new(),
            notifier: Notifier::default(),
            refresh: BackgroundRefresh::default(),
            cache,
            active: None,
            deck: Vec::new(),
            deck_filter: DeckFilter::default(),
            stopped: false,
        }
    }

    /// Runs until a `Shutdown` command or until every `SyncHandle` (each of
    /// which holds a view receiver) is gone. Spawned work keeps its own inbox
    /// senders, so the inbox alone never closes.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoreMsg>) {
        while !self.stopped {
            let msg = tokio::select! {
                msg = rx.recv() => msg,
                _ = self.view.closed() => None,
            };
            match msg {
                Some(msg) => self.handle(msg),
                None => self.shutdown(),
            }
        }
        log::debug!("sync engine stopped");
    }

    pub fn handle(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Command(command) => self.on_command(command),
            CoreMsg::Channel(event) => self.on_channel(event),
            CoreMsg::ReconnectDue { epoch } => {
                if let Some(id) = self.connection.reconnect_target(epoch) {
                    if self.active.as_deref() == Some(id.as_str()) {
                        self.open_channel(&id);
                    }
                }
            }
            CoreMsg::HistoryLoaded { generation, conversation_id, source, messages } => {
                if generation != self.generation || self.active.as_deref() != Some(conversation_id.as_str()) {
                    log::debug!("dropping stale history for {conversation_id}");
                } else {
                    match source {
                        HistorySource::Initial => self.conversations.load_initial(&conversation_id, messages),
                        HistorySource::Poll => {
                            self.conversations.merge(&conversation_id, messages);
                        }
                    }
                }
            }
            CoreMsg::MatchesLoaded { generation, matches } => {
                if generation == self.generation && self.session.is_signed_in() {
                    self.apply_matches(matches);
                }
            }
            CoreMsg::DeckLoaded { generation, deck } => {
                if generation == self.generation && self.session.is_signed_in() {
                    self.deck = deck;
                }
            }
            CoreMsg::NotificationExpired { cycle } => {
                self.notifier.expire(cycle);
            }
            CoreMsg::AuthCompleted { outcome, reply } => match outcome {
                Ok((token, user)) => {
                    self.begin_session(token, user.clone());
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(user));
                    }
                }
                Err(e) => {
                    if let Some(reply) = reply {
                        let _ = reply.send(Err(e));
                    }
                }
            },
            CoreMsg::Restored { token, outcome, reply } => {
                let restored = match outcome {
                    _ if self.session.is_signed_in() => true,
                    Ok(user) => {
                        self.begin_session(token, user);
                        self.show_cached_matches();
                        true
                    }
                    Err(e) => {
                        log::info!("saved session rejected, signing out: {e}");
                        self.session.clear();
                        false
                    }
                };
                let _ = reply.send(restored);
            }
            CoreMsg::MessageSent { generation, conversation_id, outcome, reply } => {
                let outcome = outcome.map(|message| {
                    if generation == self.generation {
                        self.conversations.merge(&conversation_id, [message.clone()]);
                    }
                    SendReceipt::Delivered(message)
                });
                let _ = reply.send(outcome);
            }
            CoreMsg::Followup { generation, followup } => {
                if generation == self.generation && self.session.is_signed_in() {
                    self.on_followup(followup);
                }
            }
        }
        self.publish();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SignIn { email, password, reply } => {
                let api = self.api.clone();
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    let outcome = api.login(&email, &password).await.map(|t| (t.access_token, t.user));
                    let _ = inbox.send(CoreMsg::AuthCompleted { outcome, reply: Some(reply) });
                });
            }
            Command::SignUp { email, password, display_name, city, reply } => {
                let api = self.api.clone();
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    let outcome = sign_up(&api, &email, &password, &display_name, city).await;
                    let _ = inbox.send(CoreMsg::AuthCompleted { outcome, reply: Some(reply) });
                });
            }
            Command::RestoreSession { reply } => {
                if self.session.is_signed_in() {
                    let _ = reply.send(true);
                    return;
                }
                let Some(token) = self.session.saved_token().map(str::to_string) else {
                    let _ = reply.send(false);
                    return;
                };
                let api = self.api.clone();
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    let outcome = api.me(&token).await;
                    let _ = inbox.send(CoreMsg::Restored { token, outcome, reply });
                });
            }
            Command::SignOut => self.end_session(),
            Command::OpenConversation { conversation_id } => {
                if self.session.is_signed_in() {
                    self.activate(Some(conversation_id));
                } else {
                    log::warn!("ignoring conversation {conversation_id} while signed out");
                }
            }
            Command::CloseConversation => self.activate(None),
            Command::LoadInitial { conversation_id } => {
                if self.active.as_deref() == Some(conversation_id.as_str()) {
                    self.spawn_initial_load(&conversation_id);
                } else if self.session.is_signed_in() {
                    self.activate(Some(conversation_id));
                }
            }
            Command::Send { conversation_id, content, reply } => self.send(conversation_id, content, reply),
            Command::Refresh => self.spawn_match_refresh(),
            Command::SetDeckFilter { filter } => {
                if filter == self.deck_filter {
                    return;
                }
                self.deck_filter = filter;
                // the running loop carries the old filter; its immediate first tick re-pulls the deck
                if let Some(source) = self.server_source() {
                    self.refresh.start(source, self.generation, self.inbox.clone());
                }
            }
            Command::DismissNotification => self.notifier.dismiss(),
            Command::Swipe { target_listing_id, direction, reply } => self.spawn_request(
                reply,
                |result: &SwipeResult| {
                    Some(if result.match_created { Followup::NewMatch } else { Followup::DeckAndMatches })
                },
                move |api, token| async move {
                    let mine = api.my_listings(&token).await?;
                    let offering = mine.first().ok_or(Error::NoOfferingListing)?;
                    api.swipe(&token, &offering.id, &target_listing_id, direction).await
                },
            ),
            Command::ConfirmTrade { match_id, reply } => self.spawn_request(
                reply,
                |_| Some(Followup::Matches),
                move |api, token| async move { api.confirm_trade(&token, &match_id).await },
            ),
            Command::CancelMatch { match_id, reply } => self.spawn_request(
                reply,
                |_| Some(Followup::Matches),
                move |api, token| async move { api.cancel_match(&token, &match_id).await },
            ),
            Command::CreateListing { listing, reply } => self.spawn_request(
                reply,
                |_| Some(Followup::DeckAndMatches),
                move |api, token| async move { api.create_listing(&token, &listing).await },
            ),
            Command::MyListings { reply } => {
                self.spawn_request(reply, |_| None, |api, token| async move { api.my_listings(&token).await })
            }
            Command::UpdateListing { listing_id, patch, reply } => self.spawn_request(
                reply,
                |_| None,
                move |api, token| async move { api.update_listing(&token, &listing_id, &patch).await },
            ),
            Command::DeleteListing { listing_id, reply } => self.spawn_request(
                reply,
                |_| Some(Followup::DeckAndMatches),
                move |api, token| async move { api.delete_listing(&token, &listing_id).await },
            ),
            Command::UpdateProfile { patch, reply } => self.spawn_request(
                reply,
                |user: &User| Some(Followup::User(user.clone())),
                move |api, token| async move { api.update_me(&token, &patch).await },
            ),
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn on_followup(&mut self, followup: Followup) {
        match followup {
            Followup::Matches => self.spawn_match_refresh(),
            Followup::DeckAndMatches => {
                self.spawn_deck_refresh();
                self.spawn_match_refresh();
            }
            Followup::NewMatch => {
                self.trigger_notification();
                self.spawn_deck_refresh();
                self.spawn_match_refresh();
            }
            Followup::User(user) => self.session.update_user(user),
        }
    }

    fn on_channel(&mut self, event: ChannelEvent) {
        match event.signal {
            ChannelSignal::Opened => {
                if self.connection.on_opened(event.epoch) {
                    log::info!("live channel connected for {:?}", self.connection.conversation());
                    self.reconcile_polling();
                }
            }
            ChannelSignal::Closed => {
                if let Some(delay) = self.connection.on_closed(event.epoch) {
                    log::debug!("live channel dropped, reconnecting in {delay:?}");
                    self.reconcile_polling();
                }
            }
            ChannelSignal::Frame(text) => {
                if !self.connection.accepts(event.epoch) {
                    return;
                }
                if let Some(live) = LiveEvent::parse(&text) {
                    self.on_live_event(live);
                }
            }
        }
    }

    fn on_live_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::NewMessage(message) => {
                if message.id.is_empty() {
                    return;
                }
                let target = message
                    .match_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .or_else(|| self.connection.conversation().map(str::to_string));
                if let Some(conversation_id) = target {
                    self.conversations.merge(&conversation_id, [message]);
                }
            }
            LiveEvent::NewMatch(_) => {
                self.trigger_notification();
                self.spawn_match_refresh();
            }
            event if event.is_match_status_change() => self.spawn_match_refresh(),
            _ => {}
        }
    }

    fn apply_matches(&mut self, matches: Vec<Match>) {
        if let Some(cache) = self.cache.as_mut() {
            if let Err(e) = cache.store(&matches) {
                log::debug!("could not cache matches: {e}");
            }
        }
        let outcome = self.tracker.apply(matches, self.active.as_deref());
        if outcome.notify {
            log::info!("new matches: {:?}", outcome.new_ids);
            self.trigger_notification();
        }
        if let Some(id) = outcome.activate {
            self.activate(Some(id));
        }
    }

    fn show_cached_matches(&mut self) {
        let Some(cache) = self.cache.as_ref() else { return };
        match cache.load() {
            Ok(cached) => self.tracker.show_cached(cached),
            Err(e) => log::debug!("could not read cached matches: {e}"),
        }
    }

    /// Switch the active conversation. The old channel and poll loop go away
    /// before anything is started for the new one.
    fn activate(&mut self, conversation_id: Option<String>) {
        if self.active == conversation_id {
            return;
        }
        self.connection.close();
        self.polling.stop();
        self.active = conversation_id;
        if let Some(id) = self.active.clone() {
            log::debug!("active conversation is now {id}");
            self.spawn_initial_load(&id);
            self.open_channel(&id);
        }
        self.reconcile_polling();
    }

    fn open_channel(&mut self, conversation_id: &str) {
        let Some(token) = self.session.token() else { return };
        match crate::utils::chat_socket_url(self.session.base_url(), conversation_id, token) {
            Ok(url) => self.connection.open(conversation_id, url),
            Err(e) => log::warn!("cannot build live channel address: {e}"),
        }
    }

    /// Poll exactly while a conversation is active and the channel is not connected.
    fn reconcile_polling(&mut self) {
        let Some(source) = self.server_source() else {
            self.polling.stop();
            return;
        };
        let target = if self.connection.is_connected() { None } else { self.active.clone() };
        let inbox = self.inbox.clone();
        let generation = self.generation;
        self.polling.reconcile(target.as_deref(), |id| {
            polling::spawn_poll_loop(source, id.to_string(), generation, inbox)
        });
    }

    fn send(&mut self, conversation_id: String, content: String, reply: Reply<SendReceipt>) {
        let content = content.trim().to_string();
        if content.is_empty() {
            let _ = reply.send(Err(Error::EmptyMessage));
            return;
        }
        let Some(token) = self.session.token().map(str::to_string) else {
            let _ = reply.send(Err(Error::NotSignedIn));
            return;
        };

        if self.connection.is_connected() && self.connection.conversation() == Some(conversation_id.as_str()) {
            if self.connection.send(OutboundFrame::Message { content: content.clone() }).is_ok() {
                let _ = reply.send(Ok(SendReceipt::Live));
                return;
            }
            log::debug!("live channel refused the message, posting it instead");
        }

        let api = self.api.clone();
        let inbox = self.inbox.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let outcome = api.post_message(&token, &conversation_id, &content, MessageKind::Text).await;
            let _ = inbox.send(CoreMsg::MessageSent { generation, conversation_id, outcome, reply });
        });
    }

    fn trigger_notification(&mut self) {
        let inbox = self.inbox.clone();
        self.notifier.trigger(|cycle| {
            tokio::spawn(async move {
                tokio::time::sleep(NOTIFICATION_TIMEOUT).await;
                let _ = inbox.send(CoreMsg::NotificationExpired { cycle });
            })
        });
    }

    fn server_source(&self) -> Option<ServerSource> {
        let token = self.session.token()?;
        Some(ServerSource::new(self.api.clone(), token.to_string(), self.deck_filter.clone()))
    }

    fn spawn_initial_load(&self, conversation_id: &str) {
        let Some(source) = self.server_source() else { return };
        let inbox = self.inbox.clone();
        let generation = self.generation;
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            match source.history(&conversation_id).await {
                Ok(messages) => {
                    let source = HistorySource::Initial;
                    let _ = inbox.send(CoreMsg::HistoryLoaded { generation, conversation_id, source, messages });
                }
                Err(e) => log::debug!("initial load of {conversation_id} failed: {e}"),
            }
        });
    }

    fn spawn_match_refresh(&self) {
        let Some(source) = self.server_source() else { return };
        let inbox = self.inbox.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            match source.matches().await {
                Ok(matches) => {
                    let _ = inbox.send(CoreMsg::MatchesLoaded { generation, matches });
                }
                Err(e) => log::debug!("match refresh failed: {e}"),
            }
        });
    }

    fn spawn_deck_refresh(&self) {
        let Some(source) = self.server_source() else { return };
        let inbox = self.inbox.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            match source.deck().await {
                Ok(deck) => {
                    let _ = inbox.send(CoreMsg::DeckLoaded { generation, deck });
                }
                Err(e) => log::debug!("deck refresh failed: {e}"),
            }
        });
    }

    /// Run one user-initiated request. The caller gets the result as is; on
    /// success `followup` may name state to re-pull.
    fn spawn_request<T, P, F, Fut>(&self, reply: Reply<T>, followup: P, call: F)
    where
        T: Send + 'static,
        P: FnOnce(&T) -> Option<Followup> + Send + 'static,
        F: FnOnce(ApiClient, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let Some(token) = self.session.token().map(str::to_string) else {
            let _ = reply.send(Err(Error::NotSignedIn));
            return;
        };
        let api = self.api.clone();
        let inbox = self.inbox.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = call(api, token).await;
            if let Ok(value) = &result {
                if let Some(followup) = followup(value) {
                    let _ = inbox.send(CoreMsg::Followup { generation, followup });
                }
            }
            let _ = reply.send(result);
        });
    }

    fn begin_session(&mut self, token: String, user: User) {
        if self.session.is_signed_in() {
            self.end_session();
        }
        log::info!("signed in as {}", user.display_name);
        self.session.establish(token, user);
        self.generation += 1;
        if let Some(source) = self.server_source() {
            self.refresh.start(source, self.generation, self.inbox.clone());
        }
    }

    /// Engine teardown. Unlike sign-out, the session and the cache stay as
    /// they are so the next run can restore them.
    fn shutdown(&mut self) {
        self.connection.close();
        self.polling.stop();
        self.refresh.stop();
        self.notifier.dismiss();
        self.generation += 1;
        self.stopped = true;
    }

    /// Hard stop: channel, timers and all session state go in one step.
    fn end_session(&mut self) {
        self.connection.close();
        self.polling.stop();
        self.refresh.stop();
        self.notifier.dismiss();
        self.tracker.reset();
        self.conversations.clear();
        self.active = None;
        self.deck.clear();
        self.deck_filter = DeckFilter::default();
        if let Some(cache) = self.cache.as_mut() {
            if let Err(e) = cache.clear() {
                log::debug!("could not clear match cache: {e}");
            }
        }
        if self.session.is_signed_in() {
            log::info!("signed out");
        }
        self.session.clear();
        self.generation += 1;
    }

    pub fn snapshot(&self) -> ViewState {
        let matches = self.tracker.matches().to_vec();
        let conversations = match self.session.user() {
            Some(me) => matches.iter().map(|m| ConversationSummary::from_match(m, &me.id)).collect(),
            None => Vec::new(),
        };
        ViewState {
            signed_in: self.session.is_signed_in(),
            user: self.session.user().cloned(),
            connection: self.connection.state(),
            connected: self.connection.is_connected(),
            active_conversation: self.active.clone(),
            messages: self.active.as_deref().map(|id| self.conversations.messages(id).to_vec()).unwrap_or_default(),
            matches,
            conversations,
            deck: self.deck.clone(),
            deck_filter: self.deck_filter.clone(),
            show_notification: self.notifier.is_visible(),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn sign_up(
    api: &ApiClient,
    email: &str,
    password: &str,
    display_name: &str,
    city: Option<String>,
) -> Result<(String, User)> {
    let registered = api.register(email, password, display_name).await?;
    let mut user = registered.user;
    if let Some(city) = city.filter(|c| !c.trim().is_empty()) {
        let patch = ProfilePatch { city: Some(city.trim().to_string()), ..ProfilePatch::default() };
        match api.update_me(&registered.access_token, &patch).await {
            Ok(updated) => user = updated,
            Err(e) => log::warn!("account created but saving the city failed: {e}"),
        }
    }
    Ok((registered.access_token, user))
}

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<CoreMsg>,
    view: watch::Receiver<ViewState>,
}

impl SyncHandle {
    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }

    fn command(&self, command: Command) -> Result<()> {
        self.tx.send(CoreMsg::Command(command)).map_err(|_| Error::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command(build(reply))?;
        rx.await.map_err(|_| Error::EngineStopped)?
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let (email, password) = (email.trim().to_string(), password.to_string());
        self.request(|reply| Command::SignIn { email, password, reply }).await
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str, city: Option<String>) -> Result<User> {
        let (email, password) = (email.trim().to_string(), password.to_string());
        let display_name = display_name.trim().to_string();
        self.request(|reply| Command::SignUp { email, password, display_name, city, reply }).await
    }

    /// Whether a saved credential was accepted. A rejected one is forgotten.
    pub async fn restore_session(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::RestoreSession { reply })?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    pub fn sign_out(&self) -> Result<()> {
        self.command(Command::SignOut)
    }

    pub fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        self.command(Command::OpenConversation { conversation_id: conversation_id.to_string() })
    }

    pub fn close_conversation(&self) -> Result<()> {
        self.command(Command::CloseConversation)
    }

    pub fn load_initial(&self, conversation_id: &str) -> Result<()> {
        self.command(Command::LoadInitial { conversation_id: conversation_id.to_string() })
    }

    pub async fn send(&self, conversation_id: &str, content: &str) -> Result<SendReceipt> {
        let (conversation_id, content) = (conversation_id.to_string(), content.to_string());
        self.request(|reply| Command::Send { conversation_id, content, reply }).await
    }

    pub fn refresh(&self) -> Result<()> {
        self.command(Command::Refresh)
    }

    pub fn dismiss_notification(&self) -> Result<()> {
        self.command(Command::DismissNotification)
    }

    pub fn set_deck_filter(&self, filter: DeckFilter) -> Result<()> {
        self.command(Command::SetDeckFilter { filter })
    }

    /// Stop the engine and wait until it has let go of its channel and timers.
    /// The session stays saved; use `sign_out` to forget it.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Shutdown { reply })?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    pub async fn swipe(&self, target_listing_id: &str, direction: SwipeDirection) -> Result<SwipeResult> {
        let target_listing_id = target_listing_id.to_string();
        self.request(|reply| Command::Swipe { target_listing_id, direction, reply }).await
    }

    pub async fn confirm_trade(&self, match_id: &str) -> Result<ConfirmTradeResponse> {
        let match_id = match_id.to_string();
        self.request(|reply| Command::ConfirmTrade { match_id, reply }).await
    }

    pub async fn cancel_match(&self, match_id: &str) -> Result<()> {
        let match_id = match_id.to_string();
        self.request(|reply| Command::CancelMatch { match_id, reply }).await
    }

    pub async fn create_listing(&self, listing: NewListing) -> Result<Listing> {
        self.request(|reply| Command::CreateListing { listing, reply }).await
    }

    pub async fn my_listings(&self) -> Result<Vec<Listing>> {
        self.request(|reply| Command::MyListings { reply }).await
    }

    pub async fn update_listing(&self, listing_id: &str, patch: ListingPatch) -> Result<Listing> {
        let listing_id = listing_id.to_string();
        self.request(|reply| Command::UpdateListing { listing_id, patch, reply }).await
    }

    pub async fn delete_listing(&self, listing_id: &str) -> Result<()> {
        let listing_id = listing_id.to_string();
        self.request(|reply| Command::DeleteListing { listing_id, reply }).await
    }

    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<User> {
        self.request(|reply| Command::UpdateProfile { patch, reply }).await
    }
}

/// Start an engine on the current tokio runtime.
pub fn spawn(
    config: AppConfig,
    store: ConfigStore,
    cache: Option<MatchCache>,
    connector: Arc<dyn Connector>,
) -> (SyncHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(ViewState::default());
    let core = Core::new(SessionStore::new(config, store), connector, cache, tx.clone(), view_tx);
    let task = tokio::spawn(core.run(rx));
    (SyncHandle { tx, view: view_rx }, task)
}
