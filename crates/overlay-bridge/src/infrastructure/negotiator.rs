//! Relay room bootstrap over HTTP.
//!
//! Two plain request/response calls, no retries:
//!
//! 1. optional username resolution: `GET {resolver_url}/{username}` → id
//! 2. room creation: `POST {base_url}/lobby/new?user={id}` → room key
//!
//! The relay address is then built from the same base URL with the scheme
//! switched to WebSocket (`https` → `wss`, `http` → `ws`):
//!
//! ```text
//! wss://websocket.example/lobby/connect/streamer?user={id}&key={key}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::application::ports::{NegotiationError, SessionNegotiator};
use crate::domain::config::RelayConfig;
use crate::domain::NegotiatedSession;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// [`SessionNegotiator`] backed by the relay's lobby HTTP API.
pub struct HttpNegotiator {
    client: Client,
    base_url: Url,
    resolver_url: Option<Url>,
}

impl HttpNegotiator {
    /// Builds a negotiator from the `[relay]` config section.
    pub fn new(config: &RelayConfig) -> Result<Self, NegotiationError> {
        let base_url = parse_url(&config.base_url)?;
        let resolver_url = if config.resolve_username {
            Some(parse_url(&config.resolver_url)?)
        } else {
            None
        };
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NegotiationError::Request {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            resolver_url,
        })
    }

    /// `{ws|wss}://{host}/lobby/connect/streamer?user={user_id}&key={room_key}`.
    pub fn relay_address(&self, user_id: &str, room_key: &str) -> Result<String, NegotiationError> {
        let scheme = match self.base_url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        let mut url = endpoint(&self.base_url, &["lobby", "connect", "streamer"])?;
        url.set_scheme(scheme)
            .map_err(|()| invalid(&self.base_url, "cannot switch to a websocket scheme"))?;
        url.query_pairs_mut()
            .append_pair("user", user_id)
            .append_pair("key", room_key);
        Ok(url.to_string())
    }

    /// Maps a username to the external id the relay rooms are keyed by.
    async fn resolve(&self, username: &str) -> Result<String, NegotiationError> {
        let Some(resolver) = &self.resolver_url else {
            return Ok(username.to_string());
        };
        let url = endpoint(resolver, &[username])?;
        debug!("resolving username via {url}");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_failed(&url, e))?;
        let id = read_text(response, &url).await?;
        info!("resolved username {username} to id {id}");
        Ok(id)
    }

    async fn create_room(&self, user_id: &str) -> Result<String, NegotiationError> {
        let mut url = endpoint(&self.base_url, &["lobby", "new"])?;
        url.query_pairs_mut().append_pair("user", user_id);
        debug!("requesting a new relay room via {url}");

        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| request_failed(&url, e))?;
        read_text(response, &url).await
    }
}

#[async_trait]
impl SessionNegotiator for HttpNegotiator {
    async fn negotiate(&self, identity: &str) -> Result<NegotiatedSession, NegotiationError> {
        let user_id = self.resolve(identity).await?;
        let room_key = self.create_room(&user_id).await?;
        let relay_address = self.relay_address(&user_id, &room_key)?;
        Ok(NegotiatedSession {
            user_id,
            room_key,
            relay_address,
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_url(raw: &str) -> Result<Url, NegotiationError> {
    Url::parse(raw).map_err(|e| NegotiationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Appends `segments` to the path of `base`, keeping any existing prefix.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, NegotiationError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| invalid(base, "url cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Checks the status and returns the trimmed, non-empty body.
async fn read_text(response: reqwest::Response, url: &Url) -> Result<String, NegotiationError> {
    let status = response.status();
    if !status.is_success() {
        return Err(NegotiationError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(|e| request_failed(url, e))?;
    let body = body.trim();
    if body.is_empty() {
        return Err(NegotiationError::EmptyBody {
            url: url.to_string(),
        });
    }
    Ok(body.to_string())
}

fn request_failed(url: &Url, e: reqwest::Error) -> NegotiationError {
    NegotiationError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

fn invalid(url: &Url, reason: &str) -> NegotiationError {
    NegotiationError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
