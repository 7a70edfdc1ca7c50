//! Capability resources and the records the server hands back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-issued URL together with the capability that grants access to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub url: String,
    pub capability: String,
}

/// A named channel messages are published to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(flatten)]
    pub resource: Resource,
    pub name: String,
}

impl Channel {
    pub fn url(&self) -> &str {
        &self.resource.url
    }

    pub fn capability(&self) -> &str {
        &self.resource.capability
    }
}

/// A subscription as described by the server, without any client-side state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(flatten)]
    pub resource: Resource,
    pub name: String,
    /// URLs of the channels feeding this subscription.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// The account behind a password-authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Account {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Server-assigned message marker, in milliseconds since the Unix epoch.
///
/// Used as the `last-message` cursor when retrieving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Convert to a UTC datetime, if the marker is in range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message delivered through a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Message {
    /// Message URL, when the server exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Message payload.
    pub content: serde_json::Value,
    /// Server timestamp used for ordering and as the cursor marker.
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Message {
    #[cfg(test)]
    pub(crate) fn at(content: impl Into<serde_json::Value>, timestamp: i64) -> Self {
        Self {
            url: None,
            content: content.into(),
            timestamp: Timestamp(timestamp),
            key: None,
        }
    }
}

// Request bodies

#[derive(Debug, Serialize)]
pub(crate) struct CreateChannelRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSubscriptionRequest<'a> {
    pub name: &'a str,
    pub channels: &'a [String],
    pub events: &'a [&'a str],
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishRequest<'a> {
    pub content: &'a serde_json::Value,
}

/// Response to an events retrieval.
#[derive(Debug, Deserialize)]
pub(crate) struct EventsResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}
