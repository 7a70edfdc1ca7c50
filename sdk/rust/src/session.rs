//! Authenticated sessions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::description::Description;
use crate::error::Result;
use crate::resource::{Account, Channel, Resource};
use crate::subscription::Subscription;
use crate::transport::{HttpRequest, Transport};

/// How the client authenticates.
#[derive(Clone)]
pub enum Credentials {
    /// Account secret key.
    Key(String),
    /// Email and password of an existing account.
    Login { email: String, password: String },
    /// Create a new account with this email and password, then use it.
    Register { email: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Key(_) => f.write_str("Key(..)"),
            Credentials::Login { email, .. } => {
                f.debug_struct("Login").field("email", email).finish_non_exhaustive()
            }
            Credentials::Register { email, .. } => {
                f.debug_struct("Register").field("email", email).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SessionRequest<'a> {
    Key { key: &'a str },
    Password { email: &'a str, password: &'a str },
}

#[derive(Debug, Deserialize)]
struct SessionDocument {
    #[serde(flatten)]
    resource: Resource,
    resources: SessionResources,
}

#[derive(Debug, Deserialize)]
struct SessionResources {
    channels: Resource,
    subscriptions: Resource,
    #[serde(default)]
    account: Option<Account>,
}

/// An authenticated session.
///
/// Holds the capabilities for the channel and subscription collections and
/// remembers every channel and subscription resolved through it, so repeat
/// lookups by name never touch the network.
pub struct Session {
    resource: Resource,
    channels_collection: Resource,
    subscriptions_collection: Resource,
    account: Option<Account>,
    pub(crate) channels: RwLock<HashMap<String, Channel>>,
    pub(crate) subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.resource.url)
            .field("account", &self.account.as_ref().map(|a| &a.resource.url))
            .finish_non_exhaustive()
    }
}

impl Session {
    fn from_document(doc: SessionDocument) -> Self {
        Self {
            resource: doc.resource,
            channels_collection: doc.resources.channels,
            subscriptions_collection: doc.resources.subscriptions,
            account: doc.resources.account,
            channels: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session with a key or an existing account's password.
    pub(crate) async fn create(
        transport: &dyn Transport,
        description: &Description,
        credentials: &Credentials,
    ) -> Result<Self> {
        let body = match credentials {
            Credentials::Key(key) => SessionRequest::Key { key },
            Credentials::Login { email, password } | Credentials::Register { email, password } => {
                SessionRequest::Password { email, password }
            }
        };
        let url = description.resource_url("sessions")?;
        Self::open(transport, description, url, &body).await
    }

    /// Create a new account; the server answers with a session for it.
    pub(crate) async fn register(
        transport: &dyn Transport,
        description: &Description,
        email: &str,
        password: &str,
    ) -> Result<Self> {
        let body = SessionRequest::Password { email, password };
        let url = description.resource_url("accounts")?;
        Self::open(transport, description, url, &body).await
    }

    async fn open(
        transport: &dyn Transport,
        description: &Description,
        url: &str,
        body: &SessionRequest<'_>,
    ) -> Result<Self> {
        let request = HttpRequest::post(url)
            .header("Accept", description.media_type("session")?)
            .header("Content-Type", description.media_type("account")?)
            .json(body)?;

        let doc: SessionDocument = transport.send(request).await?.into_json()?;
        info!(session = %doc.resource.url, "session established");
        Ok(Self::from_document(doc))
    }

    pub fn url(&self) -> &str {
        &self.resource.url
    }

    pub fn capability(&self) -> &str {
        &self.resource.capability
    }

    /// The account, present only for password-authenticated sessions.
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn channels_collection(&self) -> &Resource {
        &self.channels_collection
    }

    pub fn subscriptions_collection(&self) -> &Resource {
        &self.subscriptions_collection
    }

    /// A channel previously resolved through this session.
    pub async fn cached_channel(&self, name: &str) -> Option<Channel> {
        self.channels.read().await.get(name).cloned()
    }

    /// A subscription previously resolved through this session.
    pub async fn cached_subscription(&self, name: &str) -> Option<Subscription> {
        self.subscriptions.read().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_session_has_no_account() {
        let doc: SessionDocument = serde_json::from_value(json!({
            "url": "http://hub.test/sessions/1",
            "capability": "session-cap",
            "resources": {
                "channels": {"url": "http://hub.test/channels", "capability": "ch-cap"},
                "subscriptions": {"url": "http://hub.test/subscriptions", "capability": "sub-cap"}
            }
        }))
        .unwrap();

        let session = Session::from_document(doc);
        assert!(session.account().is_none());
        assert_eq!(session.channels_collection().capability, "ch-cap");
        assert_eq!(session.subscriptions_collection().url, "http://hub.test/subscriptions");
    }

    #[test]
    fn test_password_session_carries_account() {
        let doc: SessionDocument = serde_json::from_value(json!({
            "url": "http://hub.test/sessions/2",
            "capability": "session-cap",
            "resources": {
                "channels": {"url": "http://hub.test/channels", "capability": "ch-cap"},
                "subscriptions": {"url": "http://hub.test/subscriptions", "capability": "sub-cap"},
                "account": {"url": "http://hub.test/accounts/7", "capability": "acct-cap", "email": "a@b.test"}
            }
        }))
        .unwrap();

        let session = Session::from_document(doc);
        let account = session.account().unwrap();
        assert_eq!(account.email.as_deref(), Some("a@b.test"));
    }

    #[test]
    fn test_session_request_shapes() {
        let key = serde_json::to_value(SessionRequest::Key { key: "secret" }).unwrap();
        assert_eq!(key, json!({"key": "secret"}));

        let pw = serde_json::to_value(SessionRequest::Password {
            email: "a@b.test",
            password: "hunter2",
        })
        .unwrap();
        assert_eq!(pw, json!({"email": "a@b.test", "password": "hunter2"}));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let debug = format!("{:?}", Credentials::Key("secret".into()));
        assert!(!debug.contains("secret"));

        let debug = format!(
            "{:?}",
            Credentials::Login {
                email: "a@b.test".into(),
                password: "hunter2".into()
            }
        );
        assert!(debug.contains("a@b.test"));
        assert!(!debug.contains("hunter2"));
    }
}
