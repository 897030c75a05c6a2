use crate::api::models::{
    ChatHistory, ConfirmTradeResponse, DeckFilter, DeckListing, Listing, ListingPatch, Match, Message, MessageKind,
    NewListing, ProfilePatch, SwipeDirection, SwipeResult, TokenResponse, User,
};
use crate::error::{Error, Result};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Server caps one history page at this many messages.
pub const HISTORY_PAGE_LIMIT: usize = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// REST client for the Barter backend. Cheap to clone; every clone shares one
/// connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub http: HttpClient,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { http, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", crate::utils::api_base(&self.base_url), path)
    }

    fn with_auth(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(t) => req.header("Authorization", format!("Bearer {}", t)),
            None => req,
        }
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        Self::with_auth(self.http.request(method, self.endpoint(path)), token)
    }

    /// Non-2xx responses carry a `detail` field; fall back to the raw body.
    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Status { status: status.as_u16(), detail: error_detail(&body) })
    }

    async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        let resp = Self::check(req.send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_empty(req: RequestBuilder) -> Result<()> {
        let resp = Self::check(req.send().await?).await?;
        if resp.status() != StatusCode::NO_CONTENT {
            log::debug!("ignoring body of {} response", resp.status());
        }
        Ok(())
    }

    // auth

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let req = self.request(Method::POST, "/auth/login", None).json(&json!({
            "email": email,
            "password": password,
        }));
        Self::send_json(req).await
    }

    pub async fn register(&self, email: &str, password: &str, display_name: &str) -> Result<TokenResponse> {
        let req = self.request(Method::POST, "/auth/register", None).json(&json!({
            "email": email,
            "password": password,
            "display_name": display_name,
        }));
        Self::send_json(req).await
    }

    pub async fn me(&self, token: &str) -> Result<User> {
        Self::send_json(self.request(Method::GET, "/auth/me", Some(token))).await
    }

    pub async fn update_me(&self, token: &str, patch: &ProfilePatch) -> Result<User> {
        Self::send_json(self.request(Method::PATCH, "/auth/me", Some(token)).json(patch)).await
    }

    // listings

    pub async fn create_listing(&self, token: &str, listing: &NewListing) -> Result<Listing> {
        Self::send_json(self.request(Method::POST, "/listings/", Some(token)).json(listing)).await
    }

    pub async fn my_listings(&self, token: &str) -> Result<Vec<Listing>> {
        Self::send_json(self.request(Method::GET, "/listings/mine", Some(token))).await
    }

    pub async fn deck(
        &self,
        token: &str,
        offering_listing_id: &str,
        filter: &DeckFilter,
    ) -> Result<Vec<DeckListing>> {
        let query = deck_query(offering_listing_id, filter);
        Self::send_json(self.request(Method::GET, "/listings/deck", Some(token)).query(&query)).await
    }

    pub async fn delete_listing(&self, token: &str, listing_id: &str) -> Result<()> {
        Self::send_empty(self.request(Method::DELETE, &format!("/listings/{}", listing_id), Some(token))).await
    }

    pub async fn update_listing(&self, token: &str, listing_id: &str, patch: &ListingPatch) -> Result<Listing> {
        let req = self.request(Method::PATCH, &format!("/listings/{}", listing_id), Some(token)).json(patch);
        Self::send_json(req).await
    }

    // swipes

    pub async fn swipe(
        &self,
        token: &str,
        swiper_listing_id: &str,
        target_listing_id: &str,
        direction: SwipeDirection,
    ) -> Result<SwipeResult> {
        let req = self.request(Method::POST, "/swipes/", Some(token)).json(&json!({
            "swiper_listing_id": swiper_listing_id,
            "target_listing_id": target_listing_id,
            "direction": direction,
        }));
        Self::send_json(req).await
    }

    // matches

    pub async fn matches(&self, token: &str) -> Result<Vec<Match>> {
        Self::send_json(self.request(Method::GET, "/matches/", Some(token))).await
    }

    pub async fn get_match(&self, token: &str, match_id: &str) -> Result<Match> {
        Self::send_json(self.request(Method::GET, &format!("/matches/{}", match_id), Some(token))).await
    }

    pub async fn confirm_trade(&self, token: &str, match_id: &str) -> Result<ConfirmTradeResponse> {
        Self::send_json(self.request(Method::POST, &format!("/matches/{}/confirm", match_id), Some(token))).await
    }

    pub async fn cancel_match(&self, token: &str, match_id: &str) -> Result<()> {
        Self::send_empty(self.request(Method::POST, &format!("/matches/{}/cancel", match_id), Some(token))).await
    }

    // chat

    pub async fn messages(&self, token: &str, match_id: &str, limit: usize, offset: usize) -> Result<ChatHistory> {
        let req = self
            .request(Method::GET, &format!("/chat/{}/messages", match_id), Some(token))
            .query(&[("limit", limit), ("offset", offset)]);
        Self::send_json(req).await
    }

    /// Page through the whole history of one conversation, oldest first.
    pub async fn full_history(&self, token: &str, match_id: &str) -> Result<Vec<Message>> {
        let mut out: Vec<Message> = Vec::new();
        loop {
            let page = self.messages(token, match_id, HISTORY_PAGE_LIMIT, out.len()).await?;
            let received = page.messages.len();
            out.extend(page.messages);
            if received == 0 || received < HISTORY_PAGE_LIMIT || out.len() >= page.total {
                return Ok(out);
            }
        }
    }

    pub async fn post_message(&self, token: &str, match_id: &str, content: &str, kind: MessageKind) -> Result<Message> {
        let req = self
            .request(Method::POST, &format!("/chat/{}/messages", match_id), Some(token))
            .json(&json!({ "content": content, "type": kind.as_str() }));
        Self::send_json(req).await
    }
}

fn deck_query(offering_listing_id: &str, filter: &DeckFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![("offering_listing_id", offering_listing_id.to_string())];
    if let Some(category) = filter.category {
        query.push(("category", category.as_str().to_string()));
    }
    if let Some(radius) = filter.radius_km {
        query.push(("radius_km", radius.to_string()));
    }
    query
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => match json.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => json.to_string(),
        },
        Err(_) if body.trim().is_empty() => "empty response".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
