//! One worker slot: an authenticated connection plus its cached
//! per-data-center media sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::wire::{Connection, DcId, MediaSession, WireError};

/// Attempts to import an exported authorization into a freshly created
/// media session before giving up.
const AUTH_IMPORT_ATTEMPTS: usize = 6;

pub struct WorkerClient {
    slot_id: usize,
    conn: Arc<dyn Connection>,
    media_sessions: Mutex<HashMap<DcId, Arc<dyn MediaSession>>>,
}

impl WorkerClient {
    #[must_use]
    pub fn new(slot_id: usize, conn: Arc<dyn Connection>) -> Self {
        Self {
            slot_id,
            conn,
            media_sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn slot_id(&self) -> usize {
        self.slot_id
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Media session for `dc_id`, created and cached on first use.
    ///
    /// Foreign DCs get a session on a fresh auth key, bootstrapped by
    /// exporting authorization from the primary session and importing it
    /// into the new one; `AuthBytesInvalid` is retried, any other import
    /// failure is fatal. The home DC reuses the primary auth key.
    pub async fn media_session(&self, dc_id: DcId) -> Result<Arc<dyn MediaSession>, WireError> {
        let mut sessions = self.media_sessions.lock().await;
        if let Some(session) = sessions.get(&dc_id) {
            debug!(dc_id, "using cached media session");
            return Ok(session.clone());
        }

        let session = if dc_id == self.conn.dc_id() {
            self.conn.open_media_session(dc_id, false).await?
        } else {
            let session = self.conn.open_media_session(dc_id, true).await?;
            let mut imported = false;
            for _ in 0..AUTH_IMPORT_ATTEMPTS {
                let exported = self.conn.export_authorization(dc_id).await?;
                match session.import_authorization(&exported).await {
                    Ok(()) => {
                        imported = true;
                        break;
                    }
                    Err(WireError::AuthBytesInvalid) => {
                        debug!(dc_id, "invalid authorization bytes, retrying import");
                    }
                    Err(e) => {
                        session.stop().await;
                        return Err(e);
                    }
                }
            }
            if !imported {
                session.stop().await;
                return Err(WireError::AuthBytesInvalid);
            }
            session
        };

        debug!(dc_id, slot_id = self.slot_id, "created media session");
        sessions.insert(dc_id, session.clone());
        Ok(session)
    }

    /// Stop all media sessions and drop the connection.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.media_sessions.lock().await.drain().collect();
        for (dc_id, session) in sessions {
            debug!(dc_id, slot_id = self.slot_id, "stopping media session");
            session.stop().await;
        }
        self.conn.disconnect().await;
    }
}
