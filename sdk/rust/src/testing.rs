//! Test helpers: a canned description and a transport replaying scripted responses.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::description::Description;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub(crate) const BASE_URL: &str = "http://hub.test";

pub(crate) fn description_json() -> serde_json::Value {
    let mut schema = serde_json::Map::new();
    for kind in [
        "account",
        "session",
        "channel",
        "channels",
        "subscription",
        "subscriptions",
        "message",
        "events",
    ] {
        schema.insert(
            kind.to_string(),
            json!({"mediaType": format!("application/vnd.hubcap.{}+json;version=1.0", kind)}),
        );
    }
    json!({
        "resources": {
            "accounts": {"url": format!("{}/accounts", BASE_URL)},
            "sessions": {"url": format!("{}/sessions", BASE_URL)}
        },
        "schema": {"1.0": schema}
    })
}

pub(crate) fn description() -> Description {
    let transport = ScriptedTransport::new();
    transport.push(HttpResponse::json(200, &description_json()).unwrap());
    futures::executor::block_on(Description::fetch(&transport, BASE_URL, "1.0")).unwrap()
}

/// Replays queued outcomes in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: HttpResponse) {
        self.outcomes.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Failed("no scripted response".into())))
    }
}
