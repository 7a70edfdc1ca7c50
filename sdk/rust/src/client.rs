//! Hubcap client implementation.

use std::collections::VecDeque;
use std::env;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tracing::debug;

use crate::connection::ConnectionState;
use crate::description::{Description, DEFAULT_SCHEMA_VERSION};
use crate::error::{HubcapError, Result};
use crate::publish::PendingPublish;
use crate::resolver::{Resolver, DEFAULT_MAX_RESOLVE_ATTEMPTS};
use crate::resource::{
    Channel, CreateChannelRequest, CreateSubscriptionRequest, Message, SubscriptionRecord,
};
use crate::session::{Credentials, Session};
use crate::subscription::{ListenOptions, Subscription};
use crate::transport::{ReqwestTransport, Transport};

const DEFAULT_SERVER: &str = "https://api.hubcap.dev/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const KEY_ENV_VAR: &str = "HUBCAP_KEY";
const URL_ENV_VAR: &str = "HUBCAP_URL";
const SUBSCRIPTION_EVENTS: &[&str] = &["messages"];

/// Builder for creating a Hubcap client with custom options.
#[derive(Clone)]
pub struct HubcapBuilder {
    credentials: Option<Credentials>,
    conflicting_credentials: bool,
    server: String,
    timeout: Duration,
    schema_version: String,
    max_resolve_attempts: u32,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for HubcapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HubcapBuilder {
    /// Create a builder with default settings and no credentials.
    pub fn new() -> Self {
        Self {
            credentials: None,
            conflicting_credentials: false,
            server: DEFAULT_SERVER.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            max_resolve_attempts: DEFAULT_MAX_RESOLVE_ATTEMPTS,
            transport: None,
        }
    }

    fn credentials(mut self, credentials: Credentials) -> Self {
        if self.credentials.is_some() {
            self.conflicting_credentials = true;
        }
        self.credentials = Some(credentials);
        self
    }

    /// Authenticate with an account secret key.
    pub fn key(self, key: impl Into<String>) -> Self {
        self.credentials(Credentials::Key(key.into()))
    }

    /// Authenticate with the email and password of an existing account.
    pub fn login(self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials(Credentials::Login {
            email: email.into(),
            password: password.into(),
        })
    }

    /// Create a new account on first connect and authenticate as it.
    pub fn register(self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials(Credentials::Register {
            email: email.into(),
            password: password.into(),
        })
    }

    /// Set the API root URL.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the description schema version to use.
    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Bound the create/lookup rounds when resolving a name.
    pub fn max_resolve_attempts(mut self, attempts: u32) -> Self {
        self.max_resolve_attempts = attempts;
        self
    }

    /// Use a custom transport instead of the default reqwest client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the Hubcap client.
    pub fn build(self) -> Result<Hubcap> {
        if self.conflicting_credentials {
            return Err(HubcapError::config(
                "only one of a key, a login or a registration may be given",
            ));
        }
        let credentials = self.credentials.ok_or_else(|| {
            HubcapError::config("a key or an email and password is required")
        })?;
        if self.max_resolve_attempts == 0 {
            return Err(HubcapError::config("max_resolve_attempts must be at least 1"));
        }
        url::Url::parse(&self.server)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };
        let (state, _) = watch::channel(ConnectionState::Idle);

        Ok(Hubcap {
            inner: Arc::new(HubcapInner {
                server: self.server.trim_end_matches('/').to_string(),
                credentials,
                registered: AtomicBool::new(false),
                transport,
                timeout: self.timeout,
                schema_version: self.schema_version,
                max_resolve_attempts: self.max_resolve_attempts,
                description: OnceCell::new(),
                state,
                bootstrap: tokio::sync::Mutex::new(()),
                publish_gate: tokio::sync::Mutex::new(()),
                publish_queue: Mutex::new(VecDeque::new()),
            }),
        })
    }
}

/// Internal shared state for the client.
pub(crate) struct HubcapInner {
    pub(crate) server: String,
    pub(crate) credentials: Credentials,
    /// Set once a `Register` credential has created its account.
    pub(crate) registered: AtomicBool,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) timeout: Duration,
    pub(crate) schema_version: String,
    pub(crate) max_resolve_attempts: u32,
    pub(crate) description: OnceCell<Arc<Description>>,
    /// Written only by the connection bootstrapper.
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) bootstrap: tokio::sync::Mutex<()>,
    /// Serializes publishes so queued ones go out before later live ones.
    pub(crate) publish_gate: tokio::sync::Mutex<()>,
    pub(crate) publish_queue: Mutex<VecDeque<PendingPublish>>,
}

impl HubcapInner {
    pub(crate) fn resolver<'a>(&'a self, description: &'a Description) -> Resolver<'a> {
        Resolver {
            transport: self.transport.as_ref(),
            description,
            max_attempts: self.max_resolve_attempts,
        }
    }

    pub(crate) async fn channel_in(&self, session: &Session, name: &str) -> Result<Channel> {
        if let Some(channel) = session.cached_channel(name).await {
            return Ok(channel);
        }
        let description = self.description().await?;
        self.resolver(&description)
            .resolve::<Channel, _, _>(
                &session.channels,
                session.channels_collection(),
                name,
                &CreateChannelRequest { name },
                |channel| channel,
            )
            .await
    }

    async fn subscription_in(
        &self,
        session: &Session,
        name: &str,
        channel_names: &[&str],
    ) -> Result<Subscription> {
        if let Some(subscription) = session.cached_subscription(name).await {
            return Ok(subscription);
        }

        let mut channel_urls = Vec::with_capacity(channel_names.len());
        for channel_name in channel_names {
            let channel = self.channel_in(session, channel_name).await?;
            if !channel_urls.contains(&channel.resource.url) {
                channel_urls.push(channel.resource.url);
            }
        }

        let description = self.description().await?;
        let params = CreateSubscriptionRequest {
            name,
            channels: &channel_urls,
            events: SUBSCRIPTION_EVENTS,
        };
        let transport = self.transport.clone();
        let timeout = self.timeout;
        self.resolver(&description)
            .resolve::<SubscriptionRecord, _, _>(
                &session.subscriptions,
                session.subscriptions_collection(),
                name,
                &params,
                |record| Subscription::new(record, transport.clone(), description.clone(), timeout),
            )
            .await
    }
}

/// The hubcap client.
///
/// # Example
///
/// ```no_run
/// use hubcap::{Hubcap, ListenOptions};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> hubcap::Result<()> {
///     let client = Hubcap::from_env()?;
///
///     let message = client.publish("orders", json!({"order_id": "123"})).await?;
///     println!("published at {}", message.timestamp);
///
///     let subscription = client.subscription("order-feed", &["orders"]).await?;
///     let messages = subscription.long_poll(ListenOptions::new()).await?;
///     println!("{} new messages", messages.len());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Hubcap {
    pub(crate) inner: Arc<HubcapInner>,
}

impl Hubcap {
    /// Create a new client from environment variables.
    ///
    /// Reads the account key from `HUBCAP_KEY` and, if set, the API root
    /// from `HUBCAP_URL`.
    pub fn from_env() -> Result<Self> {
        let key = env::var(KEY_ENV_VAR).map_err(|_| {
            HubcapError::config(format!("{} environment variable not set", KEY_ENV_VAR))
        })?;

        let mut builder = HubcapBuilder::new().key(key);
        if let Ok(server) = env::var(URL_ENV_VAR) {
            builder = builder.server(server);
        }
        builder.build()
    }

    /// Create a new builder.
    pub fn builder() -> HubcapBuilder {
        HubcapBuilder::new()
    }

    /// Get the configured API root URL.
    pub fn server_url(&self) -> &str {
        &self.inner.server
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// The current session, if connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        match &*self.inner.state.borrow() {
            ConnectionState::Connected(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Number of publishes waiting for the connection to come up.
    pub fn pending_publishes(&self) -> usize {
        self.inner.pending_publishes()
    }

    /// Make sure the description is loaded and a session exists.
    ///
    /// Concurrent calls share a single session request.
    pub async fn connect(&self) -> Result<Arc<Session>> {
        self.inner.connect().await
    }

    /// Drop the current session. The next operation authenticates again.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await
    }

    /// Get or create the channel called `name`.
    pub async fn channel(&self, name: &str) -> Result<Channel> {
        let session = self.connect().await?;
        self.inner.channel_in(&session, name).await
    }

    /// List every channel of the account.
    pub async fn channels(&self) -> Result<Vec<Channel>> {
        let session = self.connect().await?;
        let description = self.inner.description().await?;
        self.inner
            .resolver(&description)
            .list::<Channel>(session.channels_collection())
            .await
    }

    /// Publish a message to the channel called `channel`, creating the
    /// channel if needed.
    ///
    /// Publishes issued while the client is connecting are queued and sent,
    /// in order, as soon as the session is up.
    pub async fn publish<T: Serialize>(&self, channel: &str, content: T) -> Result<Message> {
        let content = serde_json::to_value(content)?;
        self.inner.publish(channel, content).await
    }

    /// Get or create the subscription called `name` over the named channels.
    ///
    /// Channels are created as needed. A subscription already resolved in
    /// this session is returned as is, whatever `channels` says.
    pub async fn subscription(&self, name: &str, channels: &[&str]) -> Result<Subscription> {
        let session = self.connect().await?;
        self.inner.subscription_in(&session, name, channels).await
    }

    /// Resolve a subscription and start listening on it.
    pub async fn subscribe(
        &self,
        name: &str,
        channels: &[&str],
        options: ListenOptions,
    ) -> Result<Subscription> {
        let subscription = self.subscription(name, channels).await?;
        subscription.start_listening(options);
        Ok(subscription)
    }

    /// Delete the channel called `name`. Returns false if it does not exist.
    pub async fn delete_channel(&self, name: &str) -> Result<bool> {
        let session = self.connect().await?;
        let description = self.inner.description().await?;
        let resolver = self.inner.resolver(&description);

        let channel = match session.cached_channel(name).await {
            Some(channel) => Some(channel),
            None => {
                resolver
                    .get_by_name::<Channel>(session.channels_collection(), name)
                    .await?
            }
        };
        let Some(channel) = channel else {
            return Ok(false);
        };

        resolver.delete::<Channel>(&channel.resource).await?;
        session.channels.write().await.remove(name);
        debug!(channel = name, "channel deleted");
        Ok(true)
    }

    /// Delete the subscription called `name`, stopping it first if it is
    /// listening. Returns false if it does not exist.
    pub async fn delete_subscription(&self, name: &str) -> Result<bool> {
        let session = self.connect().await?;
        let description = self.inner.description().await?;
        let resolver = self.inner.resolver(&description);

        let resource = match session.cached_subscription(name).await {
            Some(subscription) => {
                subscription.stop_listening();
                Some(subscription.resource().clone())
            }
            None => resolver
                .get_by_name::<SubscriptionRecord>(session.subscriptions_collection(), name)
                .await?
                .map(|record| record.resource),
        };
        let Some(resource) = resource else {
            return Ok(false);
        };

        resolver.delete::<SubscriptionRecord>(&resource).await?;
        session.subscriptions.write().await.remove(name);
        debug!(subscription = name, "subscription deleted");
        Ok(true)
    }
}
