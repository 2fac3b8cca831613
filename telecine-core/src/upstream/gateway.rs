//! Framed RPC client for the session gateway daemon.
//!
//! The gateway owns the platform's proprietary wire codec and the auth
//! keys on disk; this process drives it over a single multiplexed TCP
//! connection with length-delimited JSON frames. Replies are matched to
//! requests by id; updates are pushed and routed to the owning client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use super::wire::{
    ChatMessage, Connection, Connector, DcId, ExportedAuthorization, Location, MediaSession,
    Update, WireError,
};

/// Per-request guard against a gateway that stops answering entirely.
/// Individual RPC timeouts are reported by the gateway as
/// [`WireError::Timeout`] and retried by the caller.
const INVOKE_DEADLINE: Duration = Duration::from_secs(30);

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Serialize)]
struct RequestFrame {
    id: u64,
    #[serde(flatten)]
    body: RequestBody,
}

#[derive(Debug, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
enum RequestBody {
    Connect {
        slot_id: usize,
        api_id: i32,
        api_hash: String,
        bot_token: String,
        receive_updates: bool,
    },
    ExportAuthorization {
        conn: u64,
        dc_id: DcId,
    },
    OpenMediaSession {
        conn: u64,
        dc_id: DcId,
        fresh_auth: bool,
    },
    ImportAuthorization {
        session: u64,
        auth: ExportedAuthorization,
    },
    GetFile {
        session: u64,
        location: Location,
        offset: u64,
        limit: u32,
    },
    CloseSession {
        session: u64,
    },
    ResolveChat {
        conn: u64,
        username: String,
    },
    GetMessages {
        conn: u64,
        chat_id: i64,
        message_id: i64,
    },
    SendMessage {
        conn: u64,
        chat_id: i64,
        text: String,
    },
    SendPhoto {
        conn: u64,
        chat_id: i64,
        photo_url: String,
        caption: String,
    },
    ForwardMessage {
        conn: u64,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        drop_author: bool,
    },
    DeleteMessage {
        conn: u64,
        chat_id: i64,
        message_id: i64,
    },
    Disconnect {
        conn: u64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
enum InboundFrame {
    Reply {
        id: u64,
        #[serde(default)]
        ok: Option<Value>,
        #[serde(default)]
        err: Option<WireError>,
    },
    Update {
        conn: u64,
        update: Update,
    },
}

#[derive(Debug, Deserialize)]
struct ConnectReply {
    conn: u64,
    dc_id: DcId,
}

#[derive(Debug, Deserialize)]
struct OpenSessionReply {
    session: u64,
}

#[derive(Debug, Deserialize)]
struct MessageReply {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct GetMessagesReply {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct GetFileReply {
    bytes: Vec<u8>,
}

struct Shared {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, WireError>>>>,
    update_routes: Mutex<HashMap<u64, mpsc::Sender<Update>>>,
    writer_tx: mpsc::Sender<RequestFrame>,
}

impl Shared {
    async fn invoke<T: DeserializeOwned>(&self, body: RequestBody) -> Result<T, WireError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.writer_tx.send(RequestFrame { id, body }).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(WireError::Disconnected);
        }

        let reply = match tokio::time::timeout(INVOKE_DEADLINE, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(WireError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(WireError::Timeout)
            }
        }?;

        serde_json::from_value(reply).map_err(|e| WireError::Rpc(format!("malformed reply: {e}")))
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(WireError::Disconnected));
        }
        self.update_routes.lock().await.clear();
    }
}

/// Connects worker clients through a session gateway daemon.
pub struct GatewayConnector {
    addr: String,
    api_id: i32,
    api_hash: String,
    shared: OnceCell<Arc<Shared>>,
}

impl GatewayConnector {
    #[must_use]
    pub fn new(addr: impl Into<String>, api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            api_id,
            api_hash: api_hash.into(),
            shared: OnceCell::new(),
        }
    }

    async fn shared(&self) -> Result<Arc<Shared>, WireError> {
        self.shared
            .get_or_try_init(|| async {
                let stream = TcpStream::connect(&self.addr)
                    .await
                    .map_err(|e| WireError::Io(format!("gateway connect failed: {e}")))?;
                let (read_half, write_half) = stream.into_split();
                let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
                let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());

                let (writer_tx, mut writer_rx) = mpsc::channel::<RequestFrame>(64);
                let shared = Arc::new(Shared {
                    next_id: AtomicU64::new(1),
                    pending: Mutex::new(HashMap::new()),
                    update_routes: Mutex::new(HashMap::new()),
                    writer_tx,
                });

                tokio::spawn(async move {
                    while let Some(frame) = writer_rx.recv().await {
                        let encoded = match serde_json::to_vec(&frame) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                warn!("failed to encode gateway frame: {e}");
                                continue;
                            }
                        };
                        if writer.send(Bytes::from(encoded)).await.is_err() {
                            break;
                        }
                    }
                });

                let reader_shared = shared.clone();
                tokio::spawn(async move {
                    while let Some(frame) = reader.next().await {
                        let frame = match frame {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("gateway read error: {e}");
                                break;
                            }
                        };
                        let inbound: InboundFrame = match serde_json::from_slice(&frame) {
                            Ok(inbound) => inbound,
                            Err(e) => {
                                warn!("malformed gateway frame: {e}");
                                continue;
                            }
                        };
                        match inbound {
                            InboundFrame::Reply { id, ok, err } => {
                                let slot = reader_shared.pending.lock().await.remove(&id);
                                if let Some(tx) = slot {
                                    let result = match err {
                                        Some(err) => Err(err),
                                        None => Ok(ok.unwrap_or(Value::Null)),
                                    };
                                    let _ = tx.send(result);
                                } else {
                                    debug!(id, "reply for unknown request");
                                }
                            }
                            InboundFrame::Update { conn, update } => {
                                let routes = reader_shared.update_routes.lock().await;
                                if let Some(tx) = routes.get(&conn) {
                                    if tx.try_send(update).is_err() {
                                        warn!(conn, "update channel full, dropping update");
                                    }
                                }
                            }
                        }
                    }
                    reader_shared.fail_all_pending().await;
                });

                Ok(shared)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn connect(
        &self,
        slot_id: usize,
        bot_token: &str,
        receive_updates: bool,
    ) -> Result<Arc<dyn Connection>, WireError> {
        let shared = self.shared().await?;
        let reply: ConnectReply = shared
            .invoke(RequestBody::Connect {
                slot_id,
                api_id: self.api_id,
                api_hash: self.api_hash.clone(),
                bot_token: bot_token.to_string(),
                receive_updates,
            })
            .await?;

        let updates_rx = if receive_updates {
            let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
            shared.update_routes.lock().await.insert(reply.conn, tx);
            Some(Mutex::new(rx))
        } else {
            None
        };

        debug!(slot_id, dc_id = reply.dc_id, "gateway client connected");
        Ok(Arc::new(GatewayConnection {
            shared,
            handle: reply.conn,
            slot_id,
            dc_id: reply.dc_id,
            updates_rx,
        }))
    }
}

struct GatewayConnection {
    shared: Arc<Shared>,
    handle: u64,
    slot_id: usize,
    dc_id: DcId,
    updates_rx: Option<Mutex<mpsc::Receiver<Update>>>,
}

#[async_trait]
impl Connection for GatewayConnection {
    fn slot_id(&self) -> usize {
        self.slot_id
    }

    fn dc_id(&self) -> DcId {
        self.dc_id
    }

    async fn export_authorization(&self, dc_id: DcId) -> Result<ExportedAuthorization, WireError> {
        self.shared
            .invoke(RequestBody::ExportAuthorization {
                conn: self.handle,
                dc_id,
            })
            .await
    }

    async fn open_media_session(
        &self,
        dc_id: DcId,
        fresh_auth: bool,
    ) -> Result<Arc<dyn MediaSession>, WireError> {
        let reply: OpenSessionReply = self
            .shared
            .invoke(RequestBody::OpenMediaSession {
                conn: self.handle,
                dc_id,
                fresh_auth,
            })
            .await?;
        Ok(Arc::new(GatewaySession {
            shared: self.shared.clone(),
            handle: reply.session,
        }))
    }

    async fn resolve_chat(&self, username: &str) -> Result<i64, WireError> {
        #[derive(Debug, Deserialize)]
        struct ResolveChatReply {
            chat_id: i64,
        }
        let reply: ResolveChatReply = self
            .shared
            .invoke(RequestBody::ResolveChat {
                conn: self.handle,
                username: username.to_string(),
            })
            .await?;
        Ok(reply.chat_id)
    }

    async fn get_messages(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<ChatMessage>, WireError> {
        let reply: GetMessagesReply = self
            .shared
            .invoke(RequestBody::GetMessages {
                conn: self.handle,
                chat_id,
                message_id,
            })
            .await?;
        Ok(reply.message)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, WireError> {
        let reply: MessageReply = self
            .shared
            .invoke(RequestBody::SendMessage {
                conn: self.handle,
                chat_id,
                text: text.to_string(),
            })
            .await?;
        Ok(reply.message_id)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
    ) -> Result<i64, WireError> {
        let reply: MessageReply = self
            .shared
            .invoke(RequestBody::SendPhoto {
                conn: self.handle,
                chat_id,
                photo_url: photo_url.to_string(),
                caption: caption.to_string(),
            })
            .await?;
        Ok(reply.message_id)
    }

    async fn forward_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        drop_author: bool,
    ) -> Result<i64, WireError> {
        let reply: MessageReply = self
            .shared
            .invoke(RequestBody::ForwardMessage {
                conn: self.handle,
                to_chat_id,
                from_chat_id,
                message_id,
                drop_author,
            })
            .await?;
        Ok(reply.message_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), WireError> {
        let _: Value = self
            .shared
            .invoke(RequestBody::DeleteMessage {
                conn: self.handle,
                chat_id,
                message_id,
            })
            .await?;
        Ok(())
    }

    async fn next_update(&self) -> Result<Update, WireError> {
        match &self.updates_rx {
            Some(rx) => rx.lock().await.recv().await.ok_or(WireError::Disconnected),
            // Auxiliary clients are update-disabled.
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&self) {
        let result: Result<Value, WireError> = self
            .shared
            .invoke(RequestBody::Disconnect { conn: self.handle })
            .await;
        if let Err(e) = result {
            debug!(slot_id = self.slot_id, "disconnect rpc failed: {e}");
        }
        self.shared.update_routes.lock().await.remove(&self.handle);
    }
}

struct GatewaySession {
    shared: Arc<Shared>,
    handle: u64,
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("handle", &self.handle)
            .finish()
    }
}

#[async_trait]
impl MediaSession for GatewaySession {
    async fn import_authorization(&self, auth: &ExportedAuthorization) -> Result<(), WireError> {
        let _: Value = self
            .shared
            .invoke(RequestBody::ImportAuthorization {
                session: self.handle,
                auth: auth.clone(),
            })
            .await?;
        Ok(())
    }

    async fn get_file(
        &self,
        location: &Location,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, WireError> {
        let reply: GetFileReply = self
            .shared
            .invoke(RequestBody::GetFile {
                session: self.handle,
                location: location.clone(),
                offset,
                limit,
            })
            .await?;
        Ok(Bytes::from(reply.bytes))
    }

    async fn stop(&self) {
        let result: Result<Value, WireError> = self
            .shared
            .invoke(RequestBody::CloseSession {
                session: self.handle,
            })
            .await;
        if let Err(e) = result {
            debug!("close session rpc failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_encoding() {
        let frame = RequestFrame {
            id: 7,
            body: RequestBody::ExportAuthorization { conn: 3, dc_id: 4 },
        };
        let encoded = serde_json::to_value(&frame).unwrap();
        assert_eq!(encoded["id"], 7);
        assert_eq!(encoded["method"], "export_authorization");
        assert_eq!(encoded["params"]["dc_id"], 4);
    }

    #[test]
    fn inbound_frame_decoding() {
        let reply: InboundFrame = serde_json::from_str(
            r#"{"frame":"reply","id":9,"ok":{"conn":1,"dc_id":2}}"#,
        )
        .unwrap();
        match reply {
            InboundFrame::Reply { id, ok, err } => {
                assert_eq!(id, 9);
                assert!(err.is_none());
                let parsed: ConnectReply = serde_json::from_value(ok.unwrap()).unwrap();
                assert_eq!(parsed.dc_id, 2);
            }
            InboundFrame::Update { .. } => panic!("expected reply"),
        }

        let err: InboundFrame = serde_json::from_str(
            r#"{"frame":"reply","id":10,"err":{"FloodWait":30}}"#,
        )
        .unwrap();
        match err {
            InboundFrame::Reply { err, .. } => {
                assert_eq!(err, Some(WireError::FloodWait(30)));
            }
            InboundFrame::Update { .. } => panic!("expected reply"),
        }
    }
}
