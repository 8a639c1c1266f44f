//! The process-wide simulator state: item store, auth engine, the single
//! upload session, the permission blocklist and the simulated quota, plus
//! the test-control surface the harness drives fault injection through.
//!
//! One `DriveSim` lives behind one mutex for the whole test run. Handlers
//! lock it briefly and never hold it across an await point.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::{AuthState, Creds};
use crate::config::Config;
use crate::error::{DriveError, DriveResult};
use crate::query;
use crate::store::{Item, ItemStore};
use crate::upload::{ChunkProgress, ContentRange, UploadSession};
use crate::util::generate_id;

pub type SharedSim = Arc<Mutex<DriveSim>>;

pub struct DriveSim {
    pub config: Config,
    pub store: ItemStore,
    pub auth: AuthState,
    session: Option<UploadSession>,
    blocklist: HashSet<String>,
    space_available: u64,
    /// Sizes of every chunk received so far, across sessions. Diagnostic.
    chunks: Vec<usize>,
}

impl DriveSim {
    pub fn new(config: Config) -> DriveSim {
        let auth =
            AuthState::new(config.default_client_id.clone(), config.default_client_secret.clone());
        let space_available = config.space_bytes;
        DriveSim {
            config,
            store: ItemStore::default(),
            auth,
            session: None,
            blocklist: HashSet::new(),
            space_available,
            chunks: Vec::new(),
        }
    }

    pub fn shared(config: Config) -> SharedSim {
        Arc::new(Mutex::new(DriveSim::new(config)))
    }

    // --- CRUD ---

    /// Create a metadata-only item from a caller-supplied body; returns the
    /// generated id.
    pub fn create_item(&mut self, metadata: Map<String, Value>) -> String {
        let id = generate_id(30);
        let item = Item::format(metadata, &id);
        self.store.insert(id.clone(), item);
        debug!(id = %id, "item created");
        id
    }

    /// Read access with the blocklist applied: unknown id is NotFound,
    /// blocklisted id is Forbidden even though the item exists.
    pub fn read_item(&self, id: &str) -> DriveResult<&Item> {
        let item = self.store.get(id).ok_or(DriveError::NotFound)?;
        if self.blocklist.contains(id) {
            return Err(DriveError::Forbidden);
        }
        Ok(item)
    }

    pub fn update_item(&mut self, id: &str, update: Map<String, Value>) -> DriveResult<()> {
        let item = self.store.get_mut(id).ok_or(DriveError::NotFound)?;
        item.merge_update(update);
        Ok(())
    }

    pub fn delete_item(&mut self, id: &str) -> DriveResult<()> {
        self.store.remove(id).ok_or(DriveError::NotFound)?;
        Ok(())
    }

    pub fn query(&self, q: &str, fields: &[String]) -> DriveResult<Vec<Map<String, Value>>> {
        query::run_query(&self.store, &self.blocklist, q, fields)
    }

    // --- resumable upload ---

    /// Begin a resumable upload session. All validation happens before any
    /// state changes: upload type, content headers, quota, then parents.
    /// Returns the new upload id; the progress URL is derived from it.
    pub fn start_upload(
        &mut self,
        upload_type: Option<&str>,
        mime: Option<&str>,
        declared_length: Option<&str>,
        metadata: Map<String, Value>,
    ) -> DriveResult<String> {
        if upload_type != Some("resumable") {
            return Err(DriveError::BadRequest);
        }
        let Some(mime) = mime else {
            return Err(DriveError::BadRequest);
        };
        let size = declared_length
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|n| *n >= 0)
            .ok_or(DriveError::BadRequest)? as u64;
        if self.store.total_size() + size > self.space_available {
            info!(declared = size, available = self.space_available, "upload rejected: quota");
            return Err(DriveError::QuotaExceeded);
        }
        if let Some(parents) = metadata.get("parents").and_then(Value::as_array) {
            for parent in parents {
                let parent_id = parent.as_str().ok_or(DriveError::BadRequest)?;
                if !self.store.contains(parent_id) {
                    return Err(DriveError::NotFound);
                }
                if self.blocklist.contains(parent_id) {
                    return Err(DriveError::Forbidden);
                }
            }
        }
        let id = generate_id(30);
        let mut item = Item::format(metadata, &id);
        item.fields.insert("size".into(), Value::from(size));
        self.session = Some(UploadSession::new(id.clone(), size, mime.to_string(), item));
        info!(id = %id, size, mime, "resumable upload started");
        Ok(id)
    }

    /// The Location URL returned from the session-start response.
    pub fn progress_location(&self, id: &str) -> String {
        format!("http://localhost:{}/upload/drive/v3/files/progress/{}", self.config.http_port, id)
    }

    /// Apply one upload-progress request (probe or chunk) to the in-flight
    /// session. A completing chunk commits the item into the store.
    pub fn upload_chunk(
        &mut self,
        id: &str,
        range: ContentRange,
        content_length: u64,
        body: &[u8],
    ) -> DriveResult<ChunkProgress> {
        let Some(session) = self.session.as_mut() else {
            return Err(DriveError::BadRequest);
        };
        if session.id != id {
            return Err(DriveError::BadRequest);
        }
        let progress = session.apply_chunk(range, content_length, body)?;
        if matches!(range, ContentRange::Chunk { .. }) {
            self.chunks.push(body.len());
        }
        if let ChunkProgress::Complete { .. } = &progress {
            let session = self.session.take().expect("session checked above");
            let (id, item) = session.into_item();
            info!(id = %id, bytes = item.content.as_ref().map(Vec::len).unwrap_or(0), "upload committed");
            self.store.insert(id, item);
        }
        Ok(progress)
    }

    pub fn upload_in_flight(&self) -> bool {
        self.session.is_some()
    }

    // --- test-control surface ---

    pub fn set_space_available(&mut self, bytes: u64) {
        self.space_available = bytes;
    }

    /// Simulate lost sharing permission on an item.
    pub fn block_permission(&mut self, id: &str) {
        self.blocklist.insert(id.to_string());
    }

    pub fn restore_permission(&mut self, id: &str) {
        self.blocklist.remove(id);
    }

    /// Chunk sizes received so far, for harness assertions on transfer shape.
    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    pub fn creds(&self) -> Creds {
        self.auth.creds()
    }
}
