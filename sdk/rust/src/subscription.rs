//! Long-polling subscriptions.
//!
//! A [`Subscription`] retrieves messages from the channels it aggregates,
//! either one request at a time ([`Subscription::poll`],
//! [`Subscription::long_poll`]) or continuously from a background task
//! ([`Subscription::start_listening`]). Retrieved batches advance the
//! subscription's [`Cursor`] so nothing is delivered twice, and while
//! listening each batch is dispatched to every registered [`Listener`].

use std::collections::VecDeque;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::cursor::{Cursor, Order};
use crate::description::Description;
use crate::error::{HubcapError, Result};
use crate::resource::{EventsResponse, Message, Resource, SubscriptionRecord, Timestamp};
use crate::transport::{HttpRequest, Transport, TransportError};

/// Server-side wait used by [`Subscription::long_poll`] and listening.
pub const DEFAULT_LONG_POLL_TIMEOUT_SECS: u64 = 30;

/// Extra client-side allowance so the server's long-poll window elapses first.
const REQUEST_GRACE: Duration = Duration::from_secs(5);
/// Undelivered batches a listener may hold before it is dropped.
const LISTENER_CAPACITY: usize = 256;
/// Shortest long-poll window the listen loop will use.
const MIN_LISTEN_TIMEOUT_SECS: u64 = 1;
const ERROR_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Options for retrieving messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    /// Seconds the server may hold the request open waiting for messages.
    /// `0` returns immediately with whatever is available.
    pub timeout: u64,
    /// Seconds the server waits before answering.
    pub delay: u64,
    /// Order of messages within a batch.
    pub order_by: Order,
    /// Retrieve messages after this marker instead of the cursor's.
    pub last: Option<Timestamp>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenOptions {
    /// Defaults: 30 second long-poll, no delay, newest first.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_LONG_POLL_TIMEOUT_SECS,
            delay: 0,
            order_by: Order::Descending,
            last: None,
        }
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn delay(mut self, secs: u64) -> Self {
        self.delay = secs;
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order_by = order;
        self
    }

    pub fn last(mut self, last: Timestamp) -> Self {
        self.last = Some(last);
        self
    }
}

/// Something a listener is told about.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// A whole non-empty batch, in server order. Sent once per batch, before
    /// the per-message events.
    Messages(Vec<Message>),
    /// A single message of the preceding batch.
    Message(Message),
    /// A retrieval failed while listening. Listening continues.
    Error(Arc<HubcapError>),
}

/// Whether a subscription is running its listen loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    Stopped,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Stopped,
    Listening(u64),
}

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What travels over a listener channel: a whole batch or one error.
#[derive(Debug, Clone)]
enum Delivery {
    Batch(Arc<Vec<Message>>),
    Error(Arc<HubcapError>),
}

/// A stream of events from a subscription.
///
/// Implements `futures::Stream<Item = SubscriptionEvent>`. The stream ends
/// once the listener is removed and its buffered events are drained.
///
/// A listener that falls more than 256 batches behind is removed, so one
/// idle listener never holds up the others.
pub struct Listener {
    id: ListenerId,
    rx: mpsc::Receiver<Delivery>,
    pending: VecDeque<SubscriptionEvent>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }
}

impl Stream for Listener {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pending.pop_front() {
            return Poll::Ready(Some(event));
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Delivery::Batch(batch))) => {
                self.pending.extend(batch.iter().cloned().map(SubscriptionEvent::Message));
                Poll::Ready(Some(SubscriptionEvent::Messages(batch.to_vec())))
            }
            Poll::Ready(Some(Delivery::Error(e))) => {
                Poll::Ready(Some(SubscriptionEvent::Error(e)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct SubscriptionInner {
    record: SubscriptionRecord,
    transport: Arc<dyn Transport>,
    description: Arc<Description>,
    default_timeout: Duration,
    /// Held for the whole of each retrieval, which serializes them.
    cursor: tokio::sync::Mutex<Cursor>,
    run: watch::Sender<Run>,
    runs: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, mpsc::Sender<Delivery>)>>,
    listener_ids: AtomicU64,
}

/// A subscription to one or more channels.
///
/// Cheap to clone; clones share the cursor, listen state and listeners.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.inner.record.name)
            .field("url", &self.inner.record.resource.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        record: SubscriptionRecord,
        transport: Arc<dyn Transport>,
        description: Arc<Description>,
        default_timeout: Duration,
    ) -> Self {
        let (run, _) = watch::channel(Run::Stopped);
        Self {
            inner: Arc::new(SubscriptionInner {
                record,
                transport,
                description,
                default_timeout,
                cursor: tokio::sync::Mutex::new(Cursor::default()),
                run,
                runs: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
                listener_ids: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.record.name
    }

    pub fn url(&self) -> &str {
        &self.inner.record.resource.url
    }

    pub(crate) fn resource(&self) -> &Resource {
        &self.inner.record.resource
    }

    /// URLs of the channels this subscription aggregates.
    pub fn channel_urls(&self) -> &[String] {
        &self.inner.record.channels
    }

    /// A snapshot of the cursor. Waits for an in-flight retrieval to finish.
    pub async fn cursor(&self) -> Cursor {
        *self.inner.cursor.lock().await
    }

    pub fn state(&self) -> ListenState {
        match *self.inner.run.borrow() {
            Run::Stopped => ListenState::Stopped,
            Run::Listening(_) => ListenState::Listening,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ListenState::Listening
    }

    /// Register a listener for batches, messages and listen errors.
    pub fn listen(&self) -> Listener {
        let id = ListenerId(self.inner.listener_ids.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(LISTENER_CAPACITY);
        self.listeners().push((id, tx));
        Listener {
            id,
            rx,
            pending: VecDeque::new(),
        }
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, mpsc::Sender<Delivery>)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Return immediately with whatever messages are waiting.
    pub async fn poll(&self, options: ListenOptions) -> Result<Vec<Message>> {
        self.retrieve_messages(options.timeout(0)).await
    }

    /// Wait up to the long-poll timeout (30 seconds) for messages.
    ///
    /// A timeout is an empty result, not an error.
    pub async fn long_poll(&self, options: ListenOptions) -> Result<Vec<Message>> {
        self.retrieve_messages(options).await
    }

    /// Issue exactly one retrieval and advance the cursor past its result.
    ///
    /// The batch is returned in server order. If the subscription is
    /// listening, a non-empty batch is also dispatched to listeners.
    pub async fn retrieve_messages(&self, options: ListenOptions) -> Result<Vec<Message>> {
        let messages = {
            let mut cursor = self.inner.cursor.lock().await;
            let messages = self.fetch(&options, cursor.last()).await?;
            cursor.set_order(options.order_by);
            if cursor.advance(&messages) {
                debug!(subscription = %self.name(), last = ?cursor.last(), "cursor advanced");
            }
            messages
        };

        if !messages.is_empty() {
            self.dispatch(&messages, None);
        }
        Ok(messages)
    }

    /// Start the background listen loop. Returns false if already listening.
    ///
    /// Must be called from within a Tokio runtime. The loop keeps the
    /// subscription alive until [`stop_listening`](Self::stop_listening).
    /// A `timeout` below one second is raised to one second, since the loop
    /// reissues each request as soon as the previous one returns.
    pub fn start_listening(&self, mut options: ListenOptions) -> bool {
        options.timeout = options.timeout.max(MIN_LISTEN_TIMEOUT_SECS);

        let run = self.inner.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let started = self.inner.run.send_if_modified(|state| match state {
            Run::Listening(_) => false,
            Run::Stopped => {
                *state = Run::Listening(run);
                true
            }
        });

        if !started {
            debug!(subscription = %self.name(), "already listening");
            return false;
        }

        tokio::spawn(self.clone().listen_loop(options, run));
        true
    }

    /// Stop listening. An in-flight request completes but its result is
    /// discarded. Returns false if the subscription was not listening.
    pub fn stop_listening(&self) -> bool {
        let stopped = self.inner.run.send_if_modified(|state| match state {
            Run::Listening(_) => {
                *state = Run::Stopped;
                true
            }
            Run::Stopped => false,
        });
        if stopped {
            info!(subscription = %self.name(), "stopped listening");
        }
        stopped
    }

    fn is_current(&self, run: u64) -> bool {
        *self.inner.run.borrow() == Run::Listening(run)
    }

    async fn listen_loop(self, mut options: ListenOptions, run: u64) {
        info!(subscription = %self.name(), run, "listening");

        if let Some(last) = options.last.take() {
            self.inner.cursor.lock().await.reset(Some(last));
        }

        let mut state = self.inner.run.subscribe();
        let mut consecutive_errors = 0u32;

        while self.is_current(run) {
            match self.listen_once(&options, run).await {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        subscription = %self.name(),
                        error = %e,
                        consecutive_errors,
                        "retrieval failed while listening"
                    );
                    if self.is_current(run) {
                        self.deliver(Delivery::Error(Arc::new(e)));
                    }

                    let backoff = (ERROR_BACKOFF * consecutive_errors).min(MAX_ERROR_BACKOFF);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = state.changed() => {}
                    }
                }
            }
        }

        debug!(subscription = %self.name(), run, "listen loop exited");
    }

    /// One retrieval on behalf of listen run `run`. A result arriving after
    /// that run was stopped is dropped without touching the cursor.
    async fn listen_once(&self, options: &ListenOptions, run: u64) -> Result<()> {
        let messages = {
            let mut cursor = self.inner.cursor.lock().await;
            let messages = self.fetch(options, cursor.last()).await?;
            if !self.is_current(run) {
                debug!(
                    subscription = %self.name(),
                    count = messages.len(),
                    "discarding result received after stop"
                );
                return Ok(());
            }
            cursor.set_order(options.order_by);
            cursor.advance(&messages);
            messages
        };

        if !messages.is_empty() {
            self.dispatch(&messages, Some(run));
        }
        Ok(())
    }

    async fn fetch(&self, options: &ListenOptions, cursor: Option<Timestamp>) -> Result<Vec<Message>> {
        let record = &self.inner.record;
        let mut request = HttpRequest::get(&record.resource.url)
            .capability(&record.resource.capability)
            .query("timeout", options.timeout)
            .query("order-by", options.order_by.as_str())
            .query("delay", options.delay);
        if let Some(last) = options.last.or(cursor) {
            request = request.query("last-message", last);
        }
        let request = self
            .inner
            .description
            .accept(request, "events")?
            .timeout(self.request_timeout(options));

        debug!(subscription = %record.name, timeout = options.timeout, "retrieving messages");
        let response = match self.inner.transport.send(request).await {
            Ok(response) => response,
            Err(TransportError::Timeout) => {
                debug!(subscription = %record.name, "long-poll elapsed without messages");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let events: EventsResponse = response.into_json()?;
        Ok(events.messages)
    }

    fn request_timeout(&self, options: &ListenOptions) -> Duration {
        let wait = Duration::from_secs(options.timeout.saturating_add(options.delay));
        if wait.is_zero() {
            self.inner.default_timeout
        } else {
            wait + REQUEST_GRACE
        }
    }

    /// Hand a batch to listeners, unless listen run `run` (or any run, for
    /// `None`) has stopped by now.
    fn dispatch(&self, messages: &[Message], run: Option<u64>) {
        let live = match run {
            Some(run) => self.is_current(run),
            None => self.is_listening(),
        };
        if !live {
            return;
        }
        self.deliver(Delivery::Batch(Arc::new(messages.to_vec())));
    }

    /// Never waits: full listeners are dropped along with closed ones.
    fn deliver(&self, delivery: Delivery) {
        let name = self.name();
        self.listeners().retain(|(id, tx)| match tx.try_send(delivery.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(subscription = %name, listener = id.0, "listener fell behind, dropping it");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}
