use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eid::Eid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Eid,
    pub name: String,
    pub email: String,
    /// bcrypt hash, never the plaintext password.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Lost,
    Found,
}

impl ItemKind {
    pub fn opposite(self) -> ItemKind {
        match self {
            ItemKind::Lost => ItemKind::Found,
            ItemKind::Found => ItemKind::Lost,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Lost => "lost",
            ItemKind::Found => "found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Matched,
    Claimed,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Eid,
    pub kind: ItemKind,

    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    /// Date and time the item was lost or found, as reported by the user.
    pub date: String,
    pub time: String,
    pub location: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifying_features: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<bool>,

    pub user_id: Eid,
    pub created_at: DateTime<Utc>,
    pub status: ItemStatus,

    /// Description produced by the image classifier, if the report had an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_description: Option<String>,
    /// Lowercased at creation time.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifying_features: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<bool>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// System-proposed pairing of one lost and one found item.
///
/// At most one persisted match exists per (lost_item_id, found_item_id) pair;
/// see [`crate::db::Database::save_match`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMatch {
    pub id: Eid,
    pub lost_item_id: Eid,
    pub found_item_id: Eid,
    /// Similarity score in [0, 1].
    pub similarity: f64,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Eid,
    pub user_id: Eid,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_item_id: Option<Eid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Eid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}
