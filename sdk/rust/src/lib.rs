//! # hubcap
//!
//! Rust SDK for hubcap - capability-secured publish/subscribe over HTTP.
//!
//! Channels and subscriptions are addressed by name and created on demand:
//! asking for a name that already exists simply returns the existing
//! resource. Subscriptions aggregate one or more channels and deliver
//! messages through long-polling, remembering the last message they have
//! seen so nothing is delivered twice.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hubcap::{Hubcap, ListenOptions, SubscriptionEvent};
//! use serde_json::json;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> hubcap::Result<()> {
//!     // Create client from environment
//!     let client = Hubcap::from_env()?;
//!
//!     // Publish a message (the channel is created if needed)
//!     let message = client.publish("orders", json!({"order_id": "123"})).await?;
//!     println!("Published at {}", message.timestamp);
//!
//!     // Listen on a subscription
//!     let subscription = client.subscription("order-feed", &["orders"]).await?;
//!     let mut listener = subscription.listen();
//!     subscription.start_listening(ListenOptions::new());
//!
//!     while let Some(event) = listener.next().await {
//!         if let SubscriptionEvent::Message(message) = event {
//!             println!("{}: {}", message.timestamp, message.content);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The client can be configured using environment variables or the builder pattern:
//!
//! ```no_run
//! use hubcap::Hubcap;
//! use std::time::Duration;
//!
//! // From environment (HUBCAP_KEY, optionally HUBCAP_URL)
//! let client = Hubcap::from_env()?;
//!
//! // Using builder
//! let client = Hubcap::builder()
//!     .login("ops@example.com", "correct horse battery staple")
//!     .server("http://localhost:8080/v1")
//!     .timeout(Duration::from_secs(60))
//!     .max_resolve_attempts(5)
//!     .build()?;
//! # Ok::<(), hubcap::HubcapError>(())
//! ```
//!
//! ## One-shot retrieval
//!
//! ```no_run
//! use hubcap::{Hubcap, ListenOptions, Order};
//!
//! # async fn example() -> hubcap::Result<()> {
//! let client = Hubcap::from_env()?;
//! let subscription = client.subscription("audit", &["orders", "payments"]).await?;
//!
//! // Whatever is waiting right now
//! let now = subscription.poll(ListenOptions::new()).await?;
//!
//! // Wait up to 10 seconds, oldest first
//! let later = subscription
//!     .long_poll(ListenOptions::new().timeout(10).order_by(Order::Ascending))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod cursor;
mod description;
mod error;
mod publish;
mod resolver;
mod resource;
mod session;
mod subscription;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{Hubcap, HubcapBuilder};
pub use connection::ConnectionState;
pub use cursor::{Cursor, Order};
pub use description::{Description, DEFAULT_SCHEMA_VERSION};
pub use error::{HubcapError, Result};
pub use resolver::DEFAULT_MAX_RESOLVE_ATTEMPTS;
pub use resource::{Account, Channel, Message, Resource, SubscriptionRecord, Timestamp};
pub use session::{Credentials, Session};
pub use subscription::{
    ListenOptions, ListenState, Listener, ListenerId, Subscription, SubscriptionEvent,
    DEFAULT_LONG_POLL_TIMEOUT_SECS,
};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};
