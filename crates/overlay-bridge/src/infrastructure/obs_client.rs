//! Scene-tool RPC adapter (obs-websocket protocol v5).
//!
//! # Protocol summary
//!
//! Every frame is a JSON text message `{"op": <opcode>, "d": {...}}`:
//!
//! | op | name            | direction       |
//! |----|-----------------|-----------------|
//! | 0  | Hello           | tool → client   |
//! | 1  | Identify        | client → tool   |
//! | 2  | Identified      | tool → client   |
//! | 5  | Event           | tool → client   |
//! | 6  | Request         | client → tool   |
//! | 7  | RequestResponse | tool → client   |
//!
//! The handshake is Hello → Identify → Identified.  When the tool has a
//! password set, Hello carries a `challenge` and a `salt`, and Identify must
//! answer with
//!
//! ```text
//! secret = base64(sha256(password + salt))
//! auth   = base64(sha256(secret + challenge))
//! ```
//!
//! A wrong answer makes the tool close the socket with code 4009.
//!
//! # Request correlation
//!
//! Each request carries a fresh UUID `requestId`.  The caller parks a
//! `oneshot::Sender` in the pending map under that id and a background reader
//! task completes it when the matching RequestResponse arrives.  When the
//! reader leaves it closes the map under the same lock, so no request can
//! register after the last response has been routed.  Several
//! requests may be in flight at once; each waits at most the configured
//! request timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use overlay_core::{ItemTransform, SceneItem, VideoCanvas};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::ports::{ControlClient, ControlConnector, ControlError, VersionInfo};
use crate::domain::config::ControlConfig;

/// RPC version this adapter speaks.
const RPC_VERSION: u32 = 1;

/// Close code the tool uses for a failed authentication.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

const OP_HELLO: u8 = 0;
const OP_IDENTIFY: u8 = 1;
const OP_IDENTIFIED: u8 = 2;
const OP_REQUEST: u8 = 6;
const OP_REQUEST_RESPONSE: u8 = 7;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;
type PendingMap = Arc<Mutex<PendingRequests>>;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Frame {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hello {
    #[serde(default)]
    obs_web_socket_version: String,
    #[serde(default)]
    authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponse {
    request_id: String,
    request_status: RequestStatus,
    #[serde(default)]
    response_data: Value,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    code: u16,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSettings {
    base_width: f64,
    base_height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemList {
    scene_items: Vec<SceneItemEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemEntry {
    scene_item_id: i64,
    source_name: String,
    scene_item_transform: TransformSize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformSize {
    #[serde(default)]
    position_x: f64,
    #[serde(default)]
    position_y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformResponse {
    scene_item_transform: ItemTransform,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Version {
    obs_version: String,
    obs_web_socket_version: String,
    rpc_version: u32,
}

// ── Pending requests ──────────────────────────────────────────────────────────

/// In-flight requests keyed by request id.
#[derive(Default)]
struct PendingRequests {
    closed: bool,
    waiters: HashMap<String, oneshot::Sender<RequestResponse>>,
}

impl PendingRequests {
    /// Parks a waiter for `request_id`.  Refused once the map is closed.
    fn register(
        &mut self,
        request_id: &str,
    ) -> Result<oneshot::Receiver<RequestResponse>, ControlError> {
        if self.closed {
            return Err(ControlError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(request_id.to_string(), tx);
        Ok(rx)
    }

    /// Refuses new requests and wakes every waiter with a closed channel.
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens one authenticated [`ObsClient`] per session.
pub struct ObsConnector {
    config: ControlConfig,
}

impl ObsConnector {
    pub fn new(config: ControlConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ControlConnector for ObsConnector {
    async fn connect(&self) -> Result<Arc<dyn ControlClient>, ControlError> {
        let client = ObsClient::connect(&self.config).await?;
        Ok(Arc::new(client))
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// An identified connection to the scene tool.
pub struct ObsClient {
    writer: Mutex<WsWriter>,
    pending: PendingMap,
    reader: JoinHandle<()>,
    disconnected: AtomicBool,
    request_timeout: Duration,
}

impl ObsClient {
    /// Dials the tool, authenticates and starts the response reader.
    ///
    /// The whole handshake is bounded by the configured request timeout.
    pub async fn connect(config: &ControlConfig) -> Result<Self, ControlError> {
        let address = config.address();
        let timeout = config.request_timeout();

        let (writer, reader) = tokio::time::timeout(timeout, handshake(&address, &config.password))
            .await
            .map_err(|_| ControlError::Timeout {
                request: "Identify".to_string(),
            })??;
        info!("identified with control tool at {address}");

        let pending: PendingMap = Arc::new(Mutex::new(PendingRequests::default()));
        let reader = tokio::spawn(run_reader(reader, Arc::clone(&pending)));
        Ok(Self {
            writer: Mutex::new(writer),
            pending,
            reader,
            disconnected: AtomicBool::new(false),
            request_timeout: timeout,
        })
    }

    /// Sends one request and waits for its response data.
    async fn request(&self, request_type: &str, data: Value) -> Result<Value, ControlError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(ControlError::ConnectionClosed);
        }

        let request_id = Uuid::new_v4().to_string();
        let rx = self.pending.lock().await.register(&request_id)?;

        let mut d = json!({ "requestType": request_type, "requestId": request_id });
        if !data.is_null() {
            d["requestData"] = data;
        }
        let frame = json!({ "op": OP_REQUEST, "d": d });
        debug!("control request {request_type} ({request_id})");
        if let Err(e) = self
            .writer
            .lock()
            .await
            .send(WsMessage::Text(frame.to_string()))
            .await
        {
            debug!("control write failed: {e}");
            self.pending.lock().await.waiters.remove(&request_id);
            return Err(ControlError::ConnectionClosed);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ControlError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&request_id);
                return Err(ControlError::Timeout {
                    request: request_type.to_string(),
                });
            }
        };

        let status = response.request_status;
        if !status.result {
            return Err(ControlError::Request {
                request: request_type.to_string(),
                code: status.code,
                comment: status.comment,
            });
        }
        Ok(response.response_data)
    }
}

#[async_trait]
impl ControlClient for ObsClient {
    async fn get_video_canvas(&self) -> Result<VideoCanvas, ControlError> {
        let data = self.request("GetVideoSettings", Value::Null).await?;
        let settings: VideoSettings = decode("GetVideoSettings", data)?;
        Ok(VideoCanvas::new(settings.base_width, settings.base_height))
    }

    async fn list_scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, ControlError> {
        let data = self
            .request("GetSceneItemList", json!({ "sceneName": scene }))
            .await?;
        let list: SceneItemList = decode("GetSceneItemList", data)?;
        Ok(list
            .scene_items
            .into_iter()
            .map(|entry| SceneItem {
                item_id: entry.scene_item_id,
                source_name: entry.source_name,
                width: entry.scene_item_transform.width,
                height: entry.scene_item_transform.height,
                x: entry.scene_item_transform.position_x,
                y: entry.scene_item_transform.position_y,
            })
            .collect())
    }

    async fn get_item_transform(
        &self,
        scene: &str,
        item_id: i64,
    ) -> Result<ItemTransform, ControlError> {
        let data = self
            .request(
                "GetSceneItemTransform",
                json!({ "sceneName": scene, "sceneItemId": item_id }),
            )
            .await?;
        let response: TransformResponse = decode("GetSceneItemTransform", data)?;
        Ok(response.scene_item_transform)
    }

    async fn set_item_transform(
        &self,
        scene: &str,
        item_id: i64,
        transform: &ItemTransform,
    ) -> Result<(), ControlError> {
        let transform = serde_json::to_value(transform).map_err(|e| ControlError::InvalidResponse {
            request: "SetSceneItemTransform".to_string(),
            reason: e.to_string(),
        })?;
        self.request(
            "SetSceneItemTransform",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemTransform": transform,
            }),
        )
        .await?;
        Ok(())
    }

    async fn get_version_info(&self) -> Result<VersionInfo, ControlError> {
        let data = self.request("GetVersion", Value::Null).await?;
        let version: Version = decode("GetVersion", data)?;
        Ok(VersionInfo {
            tool_version: version.obs_version,
            adapter_version: version.obs_web_socket_version,
            rpc_version: version.rpc_version,
        })
    }

    async fn disconnect(&self) -> Result<(), ControlError> {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.writer.lock().await.close().await;
        self.reader.abort();
        self.pending.lock().await.close();
        match result {
            Ok(()) => {
                info!("control connection closed");
                Ok(())
            }
            Err(e) => {
                debug!("control close failed: {e}");
                Err(ControlError::ConnectionClosed)
            }
        }
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

async fn handshake(address: &str, password: &str) -> Result<(WsWriter, WsReader), ControlError> {
    let connect_error = |reason: String| ControlError::Connect {
        address: address.to_string(),
        reason,
    };

    let (ws, _) = connect_async(address)
        .await
        .map_err(|e| connect_error(e.to_string()))?;
    let (mut writer, mut reader) = ws.split();

    let hello: Hello = expect_op(&mut reader, OP_HELLO, "Hello").await?;
    debug!(
        "control tool hello (websocket {})",
        hello.obs_web_socket_version
    );

    let authentication = match hello.authentication {
        Some(_) if password.is_empty() => {
            return Err(ControlError::Authentication(
                "tool requires a password but none is configured".to_string(),
            ));
        }
        Some(challenge) => Some(auth_response(password, &challenge.salt, &challenge.challenge)),
        None => None,
    };

    let mut identify = json!({ "rpcVersion": RPC_VERSION, "eventSubscriptions": 0 });
    if let Some(authentication) = authentication {
        identify["authentication"] = Value::String(authentication);
    }
    let frame = json!({ "op": OP_IDENTIFY, "d": identify });
    writer
        .send(WsMessage::Text(frame.to_string()))
        .await
        .map_err(|e| connect_error(e.to_string()))?;

    let _: Value = expect_op(&mut reader, OP_IDENTIFIED, "Identified").await?;
    Ok((writer, reader))
}

/// Reads frames until one with opcode `op` arrives and decodes its `d`.
async fn expect_op<T: DeserializeOwned>(
    reader: &mut WsReader,
    op: u8,
    name: &str,
) -> Result<T, ControlError> {
    loop {
        let text = match reader.next().await {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(Some(frame))))
                if u16::from(frame.code) == CLOSE_AUTHENTICATION_FAILED =>
            {
                return Err(ControlError::Authentication(frame.reason.into_owned()));
            }
            Some(Ok(WsMessage::Close(_))) | None => return Err(ControlError::ConnectionClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(ControlError::InvalidResponse {
                    request: name.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let frame: Frame = serde_json::from_str(&text).map_err(|e| invalid(name, e))?;
        if frame.op == op {
            return serde_json::from_value(frame.d).map_err(|e| invalid(name, e));
        }
        debug!("skipping op {} while waiting for {name}", frame.op);
    }
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

// ── Reader task ───────────────────────────────────────────────────────────────

async fn run_reader(mut reader: WsReader, pending: PendingMap) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => route_response(&text, &pending).await,
            Ok(WsMessage::Close(frame)) => {
                warn!("control tool closed the connection: {frame:?}");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("control connection error: {e}");
                break;
            }
        }
    }
    // Dropping the senders wakes every waiter with ConnectionClosed.
    pending.lock().await.close();
}

async fn route_response(text: &str, pending: &PendingMap) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("undecodable control frame: {e}");
            return;
        }
    };
    if frame.op != OP_REQUEST_RESPONSE {
        debug!("ignoring control op {}", frame.op);
        return;
    }

    let response: RequestResponse = match serde_json::from_value(frame.d) {
        Ok(response) => response,
        Err(e) => {
            warn!("undecodable control response: {e}");
            return;
        }
    };
    match pending.lock().await.waiters.remove(&response.request_id) {
        Some(waiter) => {
            let _ = waiter.send(response);
        }
        None => debug!("response for unknown request {}", response.request_id),
    }
}

fn decode<T: DeserializeOwned>(request: &str, data: Value) -> Result<T, ControlError> {
    serde_json::from_value(data).map_err(|e| invalid(request, e))
}

fn invalid(request: &str, e: serde_json::Error) -> ControlError {
    ControlError::InvalidResponse {
        request: request.to_string(),
        reason: e.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
