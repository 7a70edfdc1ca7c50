//! An in-memory hub speaking the HTTP API through the `Transport` trait.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hubcap::{
    Hubcap, HttpRequest, HttpResponse, Method, Transport, TransportError,
};
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

pub const BASE_URL: &str = "http://hub.test/v1";
pub const ACCOUNT_KEY: &str = "test-key";

const KINDS: &[&str] = &[
    "account",
    "session",
    "channel",
    "channels",
    "subscription",
    "subscriptions",
    "message",
    "events",
];

pub fn media_type(kind: &str) -> String {
    format!("application/vnd.hubcap.{}+json;version=1.0", kind)
}

#[derive(Debug, Clone)]
struct StoredChannel {
    id: u64,
    name: String,
}

#[derive(Debug, Clone)]
struct StoredSubscription {
    id: u64,
    name: String,
    channels: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    channel_url: String,
    content: Value,
    timestamp: i64,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    clock: i64,
    sessions_created: usize,
    accounts_created: usize,
    channels: BTreeMap<String, StoredChannel>,
    subscriptions: BTreeMap<String, StoredSubscription>,
    messages: Vec<StoredMessage>,
    requests: Vec<HttpRequest>,
    session_gate: Option<Arc<Semaphore>>,
    /// Scripted failures for upcoming events retrievals.
    event_faults: Vec<TransportError>,
    /// Names whose creation always conflicts while lookups come back empty.
    phantom_names: Vec<String>,
}

/// Fake hub. Clone to share between clients.
#[derive(Clone, Default)]
pub struct FakeHub {
    state: Arc<Mutex<HubState>>,
    published: Arc<Notify>,
}

impl FakeHub {
    pub fn new() -> Self {
        let hub = Self::default();
        hub.state.lock().unwrap().clock = 1_700_000_000_000;
        hub
    }

    pub fn client(&self) -> Hubcap {
        Hubcap::builder()
            .key(ACCOUNT_KEY)
            .server(BASE_URL)
            .transport(Arc::new(self.clone()))
            .build()
            .expect("client builds")
    }

    /// Park session creation until `release_sessions`.
    pub fn hold_sessions(&self) {
        self.state.lock().unwrap().session_gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_sessions(&self) {
        if let Some(gate) = self.state.lock().unwrap().session_gate.take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn fail_next_events(&self, error: TransportError) {
        self.state.lock().unwrap().event_faults.push(error);
    }

    pub fn phantom(&self, name: &str) {
        self.state.lock().unwrap().phantom_names.push(name.to_string());
    }

    pub fn sessions_created(&self) -> usize {
        self.state.lock().unwrap().sessions_created
    }

    pub fn accounts_created(&self) -> usize {
        self.state.lock().unwrap().accounts_created
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests matching a method and a URL prefix.
    pub fn requests_to(&self, method: Method, prefix: &str) -> Vec<HttpRequest> {
        let prefix = format!("{}{}", BASE_URL, prefix);
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url.starts_with(&prefix))
            .collect()
    }

    fn channel_json(channel: &StoredChannel) -> Value {
        json!({
            "url": format!("{}/channels/{}", BASE_URL, channel.id),
            "capability": format!("channel-cap-{}", channel.id),
            "name": channel.name,
        })
    }

    fn subscription_json(subscription: &StoredSubscription) -> Value {
        json!({
            "url": format!("{}/subscriptions/{}", BASE_URL, subscription.id),
            "capability": format!("subscription-cap-{}", subscription.id),
            "name": subscription.name,
            "channels": subscription.channels,
        })
    }

    fn message_json(message: &StoredMessage) -> Value {
        json!({
            "url": format!("{}/messages/{}", BASE_URL, message.id),
            "content": message.content,
            "timestamp": message.timestamp,
        })
    }

    fn description() -> Value {
        let schema: serde_json::Map<String, Value> = KINDS
            .iter()
            .map(|kind| (kind.to_string(), json!({"mediaType": media_type(kind)})))
            .collect();
        json!({
            "resources": {
                "accounts": {"url": format!("{}/accounts", BASE_URL)},
                "sessions": {"url": format!("{}/sessions", BASE_URL)}
            },
            "schema": {"1.0": schema}
        })
    }

    fn session(with_account: bool) -> Value {
        let mut resources = json!({
            "channels": {"url": format!("{}/channels", BASE_URL), "capability": "channels-cap"},
            "subscriptions": {"url": format!("{}/subscriptions", BASE_URL), "capability": "subscriptions-cap"}
        });
        if with_account {
            resources["account"] = json!({
                "url": format!("{}/accounts/1", BASE_URL),
                "capability": "account-cap",
                "email": "ops@hub.test"
            });
        }
        json!({
            "url": format!("{}/sessions/1", BASE_URL),
            "capability": "session-cap",
            "resources": resources
        })
    }

    async fn open_session(&self, body: &Value, with_account: bool) -> HttpResponse {
        let gate = self.state.lock().unwrap().session_gate.clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if let Some(key) = body.get("key") {
            if *key != ACCOUNT_KEY {
                return HttpResponse::new(401, "unknown key");
            }
        }
        self.state.lock().unwrap().sessions_created += 1;
        ok(201, Self::session(with_account))
    }

    fn create_channel(&self, body: &Value) -> HttpResponse {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        if state.phantom_names.contains(&name) || state.channels.contains_key(&name) {
            return HttpResponse::new(409, "channel name taken");
        }
        state.next_id += 1;
        let channel = StoredChannel {
            id: state.next_id,
            name: name.clone(),
        };
        let json = Self::channel_json(&channel);
        state.channels.insert(name, channel);
        ok(201, json)
    }

    fn create_subscription(&self, body: &Value) -> HttpResponse {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let channels: Vec<String> = body["channels"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        if state.phantom_names.contains(&name) || state.subscriptions.contains_key(&name) {
            return HttpResponse::new(409, "subscription name taken");
        }
        state.next_id += 1;
        let subscription = StoredSubscription {
            id: state.next_id,
            name: name.clone(),
            channels,
        };
        let json = Self::subscription_json(&subscription);
        state.subscriptions.insert(name, subscription);
        ok(201, json)
    }

    fn lookup(&self, request: &HttpRequest, collection: &str) -> HttpResponse {
        let state = self.state.lock().unwrap();
        let wanted = request.query_value("name");
        let found: serde_json::Map<String, Value> = match collection {
            "channels" => state
                .channels
                .values()
                .filter(|c| wanted.map_or(true, |n| n == c.name))
                .map(|c| (c.name.clone(), Self::channel_json(c)))
                .collect(),
            _ => state
                .subscriptions
                .values()
                .filter(|s| wanted.map_or(true, |n| n == s.name))
                .map(|s| (s.name.clone(), Self::subscription_json(s)))
                .collect(),
        };
        ok(200, Value::Object(found))
    }

    fn publish(&self, channel_url: &str, body: &Value) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.clock += 1;
        let message = StoredMessage {
            id: state.next_id,
            channel_url: channel_url.to_string(),
            content: body["content"].clone(),
            timestamp: state.clock,
        };
        let json = Self::message_json(&message);
        state.messages.push(message);
        drop(state);
        self.published.notify_waiters();
        ok(201, json)
    }

    fn pending_for(&self, subscription_url: &str, request: &HttpRequest) -> Option<Vec<Value>> {
        let state = self.state.lock().unwrap();
        let subscription = state
            .subscriptions
            .values()
            .find(|s| format!("{}/subscriptions/{}", BASE_URL, s.id) == subscription_url)?;
        let after: i64 = request
            .query_value("last-message")
            .and_then(|v| v.parse().ok())
            .unwrap_or(i64::MIN);

        let mut messages: Vec<&StoredMessage> = state
            .messages
            .iter()
            .filter(|m| subscription.channels.contains(&m.channel_url) && m.timestamp > after)
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        if request.query_value("order-by") != Some("asc") {
            messages.reverse();
        }
        Some(messages.into_iter().map(Self::message_json).collect())
    }

    async fn events(&self, subscription_url: &str, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let fault = {
            let mut state = self.state.lock().unwrap();
            if state.event_faults.is_empty() {
                None
            } else {
                Some(state.event_faults.remove(0))
            }
        };
        if let Some(fault) = fault {
            return Err(fault);
        }

        let wait: u64 = request
            .query_value("timeout")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let notified = self.published.notified();
        let Some(messages) = self.pending_for(subscription_url, request) else {
            return Ok(HttpResponse::new(404, "no such subscription"));
        };
        if !messages.is_empty() || wait == 0 {
            return Ok(ok(200, json!({ "messages": messages })));
        }

        let _ = tokio::time::timeout(Duration::from_secs(wait), notified).await;
        let messages = self.pending_for(subscription_url, request).unwrap_or_default();
        Ok(ok(200, json!({ "messages": messages })))
    }

    fn delete(&self, path: &str) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        let url = format!("{}{}", BASE_URL, path);
        let before = state.channels.len() + state.subscriptions.len();
        state
            .channels
            .retain(|_, c| format!("{}/channels/{}", BASE_URL, c.id) != url);
        state
            .subscriptions
            .retain(|_, s| format!("{}/subscriptions/{}", BASE_URL, s.id) != url);
        if state.channels.len() + state.subscriptions.len() == before {
            HttpResponse::new(404, "not found")
        } else {
            HttpResponse::new(204, Vec::new())
        }
    }
}

fn ok(status: u16, body: Value) -> HttpResponse {
    HttpResponse::json(status, &body).expect("json body")
}

#[async_trait]
impl Transport for FakeHub {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.state.lock().unwrap().requests.push(request.clone());

        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let body = request.body.clone().unwrap_or(Value::Null);

        let response = match (request.method, segments.as_slice()) {
            (Method::Get, [""]) => ok(200, Self::description()),
            (Method::Post, ["sessions"]) => self.open_session(&body, body.get("email").is_some()).await,
            (Method::Post, ["accounts"]) => {
                self.state.lock().unwrap().accounts_created += 1;
                self.open_session(&body, true).await
            }
            (Method::Post, ["channels"]) => self.create_channel(&body),
            (Method::Get, ["channels"]) => self.lookup(&request, "channels"),
            (Method::Post, ["channels", _]) => self.publish(&request.url, &body),
            (Method::Post, ["subscriptions"]) => self.create_subscription(&body),
            (Method::Get, ["subscriptions"]) => self.lookup(&request, "subscriptions"),
            (Method::Get, ["subscriptions", _]) => return self.events(&request.url, &request).await,
            (Method::Delete, [_, _]) => self.delete(&path),
            _ => HttpResponse::new(404, "unknown route"),
        };
        Ok(response)
    }
}
