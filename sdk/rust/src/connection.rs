//! Connection bootstrapping.
//!
//! Every high-level operation starts here: the description is fetched once
//! and cached, then a session is created unless one already exists. The
//! bootstrapper is the only writer of the client's [`ConnectionState`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info};

use crate::client::HubcapInner;
use crate::description::Description;
use crate::error::{HubcapError, Result};
use crate::session::{Credentials, Session};

/// Lifecycle of a client's session.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    /// No session and no bootstrap in progress.
    Idle,
    /// A bootstrap is running; publishes are queued.
    Connecting,
    /// A session is available.
    Connected(Arc<Session>),
}

impl ConnectionState {
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl HubcapInner {
    /// The service description, fetched on first use.
    pub(crate) async fn description(&self) -> Result<Arc<Description>> {
        self.description
            .get_or_try_init(|| async {
                Description::fetch(self.transport.as_ref(), &self.server, &self.schema_version)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        match &*self.state.borrow() {
            ConnectionState::Connected(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Return the current session, bootstrapping one if needed.
    ///
    /// The bootstrap and the publish queue drain run in their own task, so
    /// dropping the caller never leaves the client stuck in `Connecting`.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<Arc<Session>> {
        if let Some(session) = self.current_session() {
            return Ok(session);
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.bootstrap().await })
            .await
            .map_err(|e| HubcapError::transport(format!("bootstrap task failed: {}", e)))?
    }

    async fn bootstrap(&self) -> Result<Arc<Session>> {
        let _bootstrap = self.bootstrap.lock().await;
        // Someone else may have finished while we waited.
        if let Some(session) = self.current_session() {
            debug!("joined an existing session");
            return Ok(session);
        }

        self.state.send_replace(ConnectionState::Connecting);
        match self.establish().await {
            Ok(session) => {
                let session = Arc::new(session);
                let _publishes = self.publish_gate.lock().await;
                {
                    // Flip under the queue lock so no publish can enqueue
                    // after the drain below has started.
                    let _queue = self.lock_queue();
                    self.state
                        .send_replace(ConnectionState::Connected(session.clone()));
                }
                self.drain_publish_queue(&session).await;
                Ok(session)
            }
            Err(e) => {
                {
                    let _queue = self.lock_queue();
                    self.state.send_replace(ConnectionState::Idle);
                }
                self.fail_publish_queue(&e);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<Session> {
        let description = self.description().await?;
        let transport = self.transport.as_ref();

        match &self.credentials {
            Credentials::Register { email, password }
                if !self.registered.load(Ordering::SeqCst) =>
            {
                info!(email = %email, "registering account");
                let session = Session::register(transport, &description, email, password).await?;
                self.registered.store(true, Ordering::SeqCst);
                Ok(session)
            }
            credentials => Session::create(transport, &description, credentials).await,
        }
    }

    pub(crate) async fn disconnect(&self) {
        let _bootstrap = self.bootstrap.lock().await;
        if self.current_session().is_some() {
            info!("session dropped");
        }
        self.state.send_replace(ConnectionState::Idle);
    }
}
