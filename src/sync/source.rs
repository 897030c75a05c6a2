use crate::api::ApiClient;
use crate::api::models::{DeckFilter, DeckListing, Match, Message};
use crate::error::Result;
use std::future::Future;

/// The reads the background loops make against the server.
pub trait SyncSource: Clone + Send + Sync + 'static {
    fn deck(&self) -> impl Future<Output = Result<Vec<DeckListing>>> + Send;
    fn matches(&self) -> impl Future<Output = Result<Vec<Match>>> + Send;
    fn history(&self, conversation_id: &str) -> impl Future<Output = Result<Vec<Message>>> + Send;
}

/// `SyncSource` backed by the REST client and one session's credential.
#[derive(Debug, Clone)]
pub struct ServerSource {
    api: ApiClient,
    token: String,
    filter: DeckFilter,
}

impl ServerSource {
    pub fn new(api: ApiClient, token: String, filter: DeckFilter) -> Self {
        Self { api, token, filter }
    }
}

impl SyncSource for ServerSource {
    /// Deck for the user's first listing; empty when they have nothing to offer.
    async fn deck(&self) -> Result<Vec<DeckListing>> {
        let mine = self.api.my_listings(&self.token).await?;
        match mine.first() {
            Some(offering) => self.api.deck(&self.token, &offering.id, &self.filter).await,
            None => Ok(Vec::new()),
        }
    }

    async fn matches(&self) -> Result<Vec<Match>> {
        self.api.matches(&self.token).await
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.api.full_history(&self.token, conversation_id).await
    }
}
