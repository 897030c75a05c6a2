use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub rating_avg: f64,
    #[serde(default)]
    pub rating_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    pub user: User,
}

#[derive(Debug, Serialize, Default, Clone)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_radius_km: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Clothing,
    Books,
    Furniture,
    Sports,
    Instruments,
    Gaming,
    Outdoor,
    Art,
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Electronics,
        Category::Clothing,
        Category::Books,
        Category::Furniture,
        Category::Sports,
        Category::Instruments,
        Category::Gaming,
        Category::Outdoor,
        Category::Art,
        Category::Other,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Clothing => "clothing",
            Category::Books => "books",
            Category::Furniture => "furniture",
            Category::Sports => "sports",
            Category::Instruments => "instruments",
            Category::Gaming => "gaming",
            Category::Outdoor => "outdoor",
            Category::Art => "art",
            Category::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Paused,
    Matched,
    Traded,
    Deleted,
}

/// One of the signed-in user's own listings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    pub condition: Condition,
    pub estimated_value: f64,
    #[serde(default)]
    pub images: Vec<String>,
    pub status: ListingStatus,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A candidate listing from another user. `id` is the server identity that
/// swipes are recorded against, independent of where the card sits in the deck.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeckListing {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub owner_avatar: Option<String>,
    #[serde(default)]
    pub owner_rating: f64,
    #[serde(default)]
    pub owner_trade_count: u32,
}

impl DeckListing {
    pub fn backend_id(&self) -> &str {
        &self.listing.id
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub condition: Condition,
    pub estimated_value: f64,
    pub images: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, Default, Clone)]
pub struct ListingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeckFilter {
    pub category: Option<Category>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SwipeResult {
    #[serde(default)]
    pub swipe_id: String,
    pub direction: SwipeDirection,
    pub match_created: bool,
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Pending,
    TradeConfirmationPending,
    Confirmed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub status: MatchStatus,
    #[serde(default)]
    pub confirmed_by_a: bool,
    #[serde(default)]
    pub confirmed_by_b: bool,
    pub listing_a: Listing,
    pub listing_b: Listing,
    pub user_a: User,
    pub user_b: User,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A chat thread as the conversation list shows it: one match seen from the
/// signed-in user's side.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub match_id: String,
    pub peer_id: String,
    pub peer_name: String,
    pub listing_title: String,
    pub status: MatchStatus,
}

impl ConversationSummary {
    pub fn from_match(m: &Match, me: &str) -> Self {
        let mine_is_a = m.user_a.id == me;
        let (peer, theirs) = if mine_is_a { (&m.user_b, &m.listing_b) } else { (&m.user_a, &m.listing_a) };
        Self {
            match_id: m.id.clone(),
            peer_id: peer.id.clone(),
            peer_name: peer.display_name.clone(),
            listing_title: theirs.title.clone(),
            status: m.status,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    System,
    Image,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
            MessageKind::Image => "image",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    /// Conversation the message belongs to; live events may leave it out.
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatHistory {
    #[serde(default)]
    pub match_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfirmTradeResponse {
    pub match_id: String,
    pub status: MatchStatus,
    pub fully_confirmed: bool,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn user(id: &str, name: &str) -> User {
        User {
            id: id.into(),
            display_name: name.into(),
            email: None,
            avatar_url: None,
            bio: None,
            city: None,
            latitude: None,
            longitude: None,
            rating_avg: 0.0,
            rating_count: 0,
        }
    }

    pub fn listing(id: &str, owner: &str, title: &str) -> Listing {
        Listing {
            id: id.into(),
            user_id: owner.into(),
            title: title.into(),
            description: None,
            category: Category::Gaming,
            condition: Condition::Good,
            estimated_value: 100.0,
            images: Vec::new(),
            status: ListingStatus::Matched,
            created_at: None,
        }
    }

    pub fn a_match(id: &str) -> Match {
        Match {
            id: id.into(),
            status: MatchStatus::Active,
            confirmed_by_a: false,
            confirmed_by_b: false,
            listing_a: listing("la", "ua", "Switch"),
            listing_b: listing("lb", "ub", "Camera"),
            user_a: user("ua", "Ana"),
            user_b: user("ub", "Ben"),
            created_at: None,
        }
    }

    pub fn message(id: &str, conversation: &str) -> Message {
        Message {
            id: id.into(),
            match_id: Some(conversation.into()),
            sender_id: "ua".into(),
            sender_name: "Ana".into(),
            content: format!("message {id}"),
            kind: MessageKind::Text,
            created_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn category_names_match_the_wire() {
        assert_eq!(Category::from_name(" Books "), Some(Category::Books));
        assert_eq!(Category::from_name("boats"), None);
        for category in Category::ALL {
            let wire = serde_json::to_string(&category).unwrap();
            assert_eq!(wire, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn conversation_summary_takes_the_other_side() {
        let m = a_match("m1");
        let from_a = ConversationSummary::from_match(&m, "ua");
        assert_eq!(from_a.peer_name, "Ben");
        assert_eq!(from_a.listing_title, "Camera");
        let from_b = ConversationSummary::from_match(&m, "ub");
        assert_eq!(from_b.peer_name, "Ana");
        assert_eq!(from_b.listing_title, "Switch");
    }

    #[test]
    fn message_without_match_id_still_decodes() {
        let msg: Message = serde_json::from_str(
            r#"{"id":"x","sender_id":"u","sender_name":"U","content":"hi","type":"system"}"#,
        )
        .unwrap();
        assert_eq!(msg.match_id, None);
        assert_eq!(msg.kind, MessageKind::System);
    }

    #[test]
    fn unknown_match_status_is_tolerated() {
        let status: MatchStatus = serde_json::from_str("\"archived\"").unwrap();
        assert_eq!(status, MatchStatus::Unknown);
        let status: MatchStatus = serde_json::from_str("\"trade_confirmation_pending\"").unwrap();
        assert_eq!(status, MatchStatus::TradeConfirmationPending);
    }

    #[test]
    fn deck_listing_flattens_listing_fields() {
        let card: DeckListing = serde_json::from_str(
            r#"{"id":"l9","user_id":"u2","title":"Tent","category":"outdoor","condition":"like_new",
                "estimated_value":80.0,"images":[],"status":"active","owner_name":"Cleo","owner_rating":4.5,
                "owner_trade_count":3,"distance_km":2.5}"#,
        )
        .unwrap();
        assert_eq!(card.backend_id(), "l9");
        assert_eq!(card.listing.condition, Condition::LikeNew);
        assert_eq!(card.owner_name, "Cleo");
    }
}
