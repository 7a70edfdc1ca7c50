//! Service discovery.
//!
//! The API root serves a description document listing the top-level
//! collections and the media types of every resource kind:
//!
//! ```json
//! {
//!   "resources": {
//!     "accounts": { "url": "https://api.example/v1/accounts" },
//!     "sessions": { "url": "https://api.example/v1/sessions" }
//!   },
//!   "schema": {
//!     "1.0": {
//!       "channel": { "mediaType": "application/vnd.hubcap.channel+json;version=1.0" }
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::{HubcapError, Result};
use crate::transport::{HttpRequest, Transport};

/// Default schema version requested from the description.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Deserialize)]
struct DescriptionDocument {
    resources: HashMap<String, ResourceLink>,
    #[serde(default)]
    schema: HashMap<String, HashMap<String, MediaTypeEntry>>,
}

#[derive(Debug, Deserialize)]
struct ResourceLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct MediaTypeEntry {
    #[serde(rename = "mediaType")]
    media_type: String,
}

/// The resolved service description for one schema version.
#[derive(Debug, Clone)]
pub struct Description {
    resources: HashMap<String, String>,
    media_types: HashMap<String, String>,
}

impl Description {
    /// Fetch the description document from the API root.
    pub async fn fetch(transport: &dyn Transport, base_url: &str, version: &str) -> Result<Self> {
        debug!(url = base_url, "fetching service description");
        let request = HttpRequest::get(base_url).header("Accept", "application/json");
        let doc: DescriptionDocument = transport.send(request).await?.into_json()?;
        Self::from_document(doc, version)
    }

    fn from_document(doc: DescriptionDocument, version: &str) -> Result<Self> {
        let mut schema = doc.schema;
        let media_types = schema
            .remove(version)
            .ok_or_else(|| {
                HubcapError::description(format!("schema version '{}' not offered", version))
            })?
            .into_iter()
            .map(|(name, entry)| (name, entry.media_type))
            .collect();

        let resources = doc
            .resources
            .into_iter()
            .map(|(name, link)| (name, link.url))
            .collect();

        Ok(Self {
            resources,
            media_types,
        })
    }

    /// URL of a top-level collection such as `accounts` or `sessions`.
    pub fn resource_url(&self, name: &str) -> Result<&str> {
        self.resources
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| HubcapError::description(format!("no '{}' resource", name)))
    }

    /// Media type registered for a resource kind.
    pub fn media_type(&self, name: &str) -> Result<&str> {
        self.media_types
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| HubcapError::description(format!("no media type for '{}'", name)))
    }

    /// Set the `Accept` header to the media type of `kind`.
    pub(crate) fn accept(&self, request: HttpRequest, kind: &str) -> Result<HttpRequest> {
        Ok(request.header("Accept", self.media_type(kind)?))
    }

    /// Set both `Accept` and `Content-Type` to the media type of `kind`.
    pub(crate) fn exchange(&self, request: HttpRequest, kind: &str) -> Result<HttpRequest> {
        let media_type = self.media_type(kind)?;
        Ok(request
            .header("Accept", media_type)
            .header("Content-Type", media_type))
    }
}
