//! In-memory upstream platform for tests.
//!
//! Simulates stored media messages, per-DC file reads, the
//! export/import authorization handshake, and injectable timeouts and
//! flood waits, without any network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::wire::{
    ChatMessage, Connection, Connector, DcId, ExportedAuthorization, FileKind, FileLocator,
    Location, MediaAttachment, MediaKind, MediaSession, Update, WireError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Text {
        chat_id: i64,
        text: String,
    },
    Photo {
        chat_id: i64,
        photo_url: String,
        caption: String,
    },
    Forward {
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        forwarded_id: i64,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
}

struct State {
    home_dc: DcId,
    messages: Mutex<HashMap<(i64, i64), ChatMessage>>,
    file_bytes: Mutex<HashMap<i64, Vec<u8>>>,
    next_media_id: AtomicI64,
    next_message_id: AtomicI64,
    sent: Mutex<Vec<SentMessage>>,
    updates: Mutex<VecDeque<Update>>,
    update_notify: Notify,
    auth_exports: AtomicUsize,
    auth_import_failures: AtomicUsize,
    sessions_opened: AtomicUsize,
    get_file_calls: AtomicUsize,
    get_file_timeouts: AtomicUsize,
    get_messages_flood: Mutex<Option<u64>>,
    connect_failures: Mutex<Vec<usize>>,
    chat_usernames: Mutex<HashMap<String, i64>>,
}

/// Handle shared by the test and every connection it creates.
#[derive(Clone)]
pub struct MemoryPlatform {
    state: Arc<State>,
}

impl MemoryPlatform {
    #[must_use]
    pub fn new(home_dc: DcId) -> Self {
        Self {
            state: Arc::new(State {
                home_dc,
                messages: Mutex::new(HashMap::new()),
                file_bytes: Mutex::new(HashMap::new()),
                next_media_id: AtomicI64::new(1000),
                next_message_id: AtomicI64::new(50_000),
                sent: Mutex::new(Vec::new()),
                updates: Mutex::new(VecDeque::new()),
                update_notify: Notify::new(),
                auth_exports: AtomicUsize::new(0),
                auth_import_failures: AtomicUsize::new(0),
                sessions_opened: AtomicUsize::new(0),
                get_file_calls: AtomicUsize::new(0),
                get_file_timeouts: AtomicUsize::new(0),
                get_messages_flood: Mutex::new(None),
                connect_failures: Mutex::new(Vec::new()),
                chat_usernames: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Store a media message whose file lives on `dc_id` and return it.
    #[allow(clippy::too_many_arguments)]
    pub fn add_media_message(
        &self,
        chat_id: i64,
        message_id: i64,
        kind: MediaKind,
        dc_id: DcId,
        unique_id: &str,
        file_name: Option<&str>,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> ChatMessage {
        let media_id = self.state.next_media_id.fetch_add(1, Ordering::Relaxed);
        self.state.file_bytes.lock().insert(media_id, bytes.clone());

        let locator = FileLocator {
            dc_id,
            media_id,
            access_hash: media_id.wrapping_mul(7919),
            file_reference: vec![0xAB, 0xCD],
            kind: FileKind::Document,
            unique_id: unique_id.to_string(),
            file_name: file_name.map(str::to_string),
            file_size: bytes.len() as u64,
            mime_type: mime_type.map(str::to_string),
            thumb_size: String::new(),
            chat_id: None,
            chat_access_hash: None,
            big_photo: false,
        };
        let message = ChatMessage {
            id: message_id,
            chat_id,
            from_user: None,
            text: None,
            caption: None,
            media: Some(MediaAttachment { kind, locator }),
        };
        self.state
            .messages
            .lock()
            .insert((chat_id, message_id), message.clone());
        message
    }

    pub fn add_text_message(
        &self,
        chat_id: i64,
        message_id: i64,
        from_user: Option<i64>,
        text: &str,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: message_id,
            chat_id,
            from_user,
            text: Some(text.to_string()),
            caption: None,
            media: None,
        };
        self.state
            .messages
            .lock()
            .insert((chat_id, message_id), message.clone());
        message
    }

    pub fn push_update(&self, update: Update) {
        self.state.updates.lock().push_back(update);
        self.state.update_notify.notify_one();
    }

    /// Make the next `n` `GetFile` calls time out.
    pub fn inject_get_file_timeouts(&self, n: usize) {
        self.state.get_file_timeouts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` authorization imports fail with
    /// `AuthBytesInvalid`.
    pub fn fail_auth_imports(&self, n: usize) {
        self.state.auth_import_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `get_messages` call fail with `FloodWait(seconds)`.
    pub fn flood_next_get_messages(&self, seconds: u64) {
        *self.state.get_messages_flood.lock() = Some(seconds);
    }

    /// Make `connect` fail for the given slot ids.
    pub fn fail_connect_for(&self, slots: &[usize]) {
        self.state.connect_failures.lock().extend_from_slice(slots);
    }

    /// Register a public username for a chat id.
    pub fn add_chat_username(&self, username: &str, chat_id: i64) {
        self.state
            .chat_usernames
            .lock()
            .insert(username.to_string(), chat_id);
    }

    #[must_use]
    pub fn auth_exports(&self) -> usize {
        self.state.auth_exports.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn get_file_calls(&self) -> usize {
        self.state.get_file_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.sent.lock().clone()
    }

    pub async fn connect(
        &self,
        slot_id: usize,
        _bot_token: &str,
        receive_updates: bool,
    ) -> Result<Arc<dyn Connection>, WireError> {
        if self.state.connect_failures.lock().contains(&slot_id) {
            return Err(WireError::Rpc(format!("slot {slot_id} rejected")));
        }
        Ok(Arc::new(MemoryConnection {
            state: self.state.clone(),
            slot_id,
            receive_updates,
        }))
    }
}

#[async_trait]
impl Connector for MemoryPlatform {
    async fn connect(
        &self,
        slot_id: usize,
        bot_token: &str,
        receive_updates: bool,
    ) -> Result<Arc<dyn Connection>, WireError> {
        MemoryPlatform::connect(self, slot_id, bot_token, receive_updates).await
    }
}

struct MemoryConnection {
    state: Arc<State>,
    slot_id: usize,
    receive_updates: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn slot_id(&self) -> usize {
        self.slot_id
    }

    fn dc_id(&self) -> DcId {
        self.state.home_dc
    }

    async fn export_authorization(&self, dc_id: DcId) -> Result<ExportedAuthorization, WireError> {
        self.state.auth_exports.fetch_add(1, Ordering::SeqCst);
        Ok(ExportedAuthorization {
            id: i64::from(dc_id),
            bytes: vec![0xEE; 16],
        })
    }

    async fn open_media_session(
        &self,
        _dc_id: DcId,
        fresh_auth: bool,
    ) -> Result<Arc<dyn MediaSession>, WireError> {
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            state: self.state.clone(),
            authorized: AtomicBool::new(!fresh_auth),
        }))
    }

    async fn resolve_chat(&self, username: &str) -> Result<i64, WireError> {
        self.state
            .chat_usernames
            .lock()
            .get(username)
            .copied()
            .ok_or_else(|| WireError::NotFound(format!("no chat named {username}")))
    }

    async fn get_messages(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<ChatMessage>, WireError> {
        if let Some(seconds) = self.state.get_messages_flood.lock().take() {
            return Err(WireError::FloodWait(seconds));
        }
        Ok(self.state.messages.lock().get(&(chat_id, message_id)).cloned())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, WireError> {
        let id = self.state.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.state.sent.lock().push(SentMessage::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
    ) -> Result<i64, WireError> {
        let id = self.state.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.state.sent.lock().push(SentMessage::Photo {
            chat_id,
            photo_url: photo_url.to_string(),
            caption: caption.to_string(),
        });
        Ok(id)
    }

    async fn forward_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        _drop_author: bool,
    ) -> Result<i64, WireError> {
        if !self
            .state
            .messages
            .lock()
            .contains_key(&(from_chat_id, message_id))
        {
            return Err(WireError::NotFound("message to forward not found".to_string()));
        }
        let forwarded_id = self.state.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.state.sent.lock().push(SentMessage::Forward {
            to_chat_id,
            from_chat_id,
            message_id,
            forwarded_id,
        });
        Ok(forwarded_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), WireError> {
        self.state.sent.lock().push(SentMessage::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn next_update(&self) -> Result<Update, WireError> {
        if !self.receive_updates {
            return std::future::pending().await;
        }
        loop {
            if let Some(update) = self.state.updates.lock().pop_front() {
                return Ok(update);
            }
            self.state.update_notify.notified().await;
        }
    }

    async fn disconnect(&self) {}
}

struct MemorySession {
    state: Arc<State>,
    authorized: AtomicBool,
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("authorized", &self.authorized)
            .finish()
    }
}

#[async_trait]
impl MediaSession for MemorySession {
    async fn import_authorization(&self, _auth: &ExportedAuthorization) -> Result<(), WireError> {
        let remaining = self.state.auth_import_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .auth_import_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(WireError::AuthBytesInvalid);
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_file(
        &self,
        location: &Location,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, WireError> {
        self.state.get_file_calls.fetch_add(1, Ordering::SeqCst);

        if !self.authorized.load(Ordering::SeqCst) {
            return Err(WireError::Rpc("AUTH_KEY_UNREGISTERED".to_string()));
        }

        let timeouts = self.state.get_file_timeouts.load(Ordering::SeqCst);
        if timeouts > 0 {
            self.state
                .get_file_timeouts
                .store(timeouts - 1, Ordering::SeqCst);
            return Err(WireError::Timeout);
        }

        let media_id = match location {
            Location::Document { id, .. } | Location::Photo { id, .. } => *id,
            Location::ChatPhoto { .. } => {
                return Err(WireError::Rpc("chat photos not stored".to_string()))
            }
        };

        let files = self.state.file_bytes.lock();
        let bytes = files
            .get(&media_id)
            .ok_or_else(|| WireError::NotFound("file bytes missing".to_string()))?;
        let start = (offset as usize).min(bytes.len());
        let end = (start + limit as usize).min(bytes.len());
        Ok(Bytes::copy_from_slice(&bytes[start..end]))
    }

    async fn stop(&self) {}
}
