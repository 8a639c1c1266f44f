//! Resumable upload state machine: Content-Range parsing, strict sequential
//! chunk validation, and the test-controlled pause gate.
//!
//! The protocol contract mirrors the live service: all chunks arrive in
//! order with no gaps or overlap, every chunk except the last must be a
//! multiple of 256 KiB, and a status probe (`bytes */total`) reports the
//! received range without consuming the body. Validation is strictly
//! validate-then-commit: a rejected chunk leaves the buffer untouched.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::watch;

use crate::error::{DriveError, DriveResult};
use crate::store::Item;

/// All non-final chunks must be a multiple of this (256 KiB).
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;

static PROBE_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^bytes \*/(\d+)$").unwrap());
static CHUNK_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^bytes (\d+)-(\d+)/(\d+)$").unwrap());

/// Parsed `Content-Range` header of an upload-progress request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// `bytes */<total>`: status probe, no payload consumed.
    Probe { total: u64 },
    /// `bytes <start>-<end>/<total>`: one chunk of payload.
    Chunk { start: u64, end: u64, total: u64 },
}

impl ContentRange {
    pub fn parse(header: &str) -> DriveResult<ContentRange> {
        if let Some(caps) = PROBE_RANGE.captures(header) {
            let total = caps[1].parse::<u64>().map_err(|_| DriveError::BadRequest)?;
            return Ok(ContentRange::Probe { total });
        }
        if let Some(caps) = CHUNK_RANGE.captures(header) {
            let start = caps[1].parse::<u64>().map_err(|_| DriveError::BadRequest)?;
            let end = caps[2].parse::<u64>().map_err(|_| DriveError::BadRequest)?;
            let total = caps[3].parse::<u64>().map_err(|_| DriveError::BadRequest)?;
            return Ok(ContentRange::Chunk { start, end, total });
        }
        Err(DriveError::BadRequest)
    }
}

/// Progress reported back to the client after a valid request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkProgress {
    /// 308 Resume Incomplete; `received` bytes buffered so far (the Range
    /// header is omitted when zero).
    Incomplete { received: u64 },
    /// Final chunk received; the session was consumed and the item committed
    /// under this id.
    Complete { id: String },
}

/// The single in-flight resumable upload. `next_start` always equals the
/// length of the accumulated buffer.
#[derive(Debug)]
pub struct UploadSession {
    pub id: String,
    pub size: u64,
    pub mime: String,
    pub item: Item,
    pub next_start: u64,
    buffer: Vec<u8>,
}

impl UploadSession {
    pub fn new(id: String, size: u64, mime: String, item: Item) -> Self {
        UploadSession { id, size, mime, item, next_start: 0, buffer: Vec::new() }
    }

    pub fn received(&self) -> u64 {
        self.next_start
    }

    /// Validate and apply one chunk. On any violation the session state is
    /// unchanged. Returns `Complete` when this chunk's end offset reaches
    /// `size - 1`; the caller takes the session and commits the item.
    pub fn apply_chunk(
        &mut self,
        range: ContentRange,
        content_length: u64,
        body: &[u8],
    ) -> DriveResult<ChunkProgress> {
        let ContentRange::Chunk { start, end, total } = range else {
            // Status probe: report what we have, touch nothing.
            return Ok(ChunkProgress::Incomplete { received: self.next_start });
        };
        if total != self.size {
            return Err(DriveError::BadRequest);
        }
        if start != self.next_start {
            return Err(DriveError::BadRequest);
        }
        // Reject inverted or out-of-bounds ranges up front; everything past
        // this point may assume start <= end < total without overflow.
        if end < start || end >= total {
            return Err(DriveError::BadRequest);
        }
        let is_final = end + 1 == total;
        if !(is_final || content_length % CHUNK_ALIGNMENT == 0) {
            return Err(DriveError::BadRequest);
        }
        if body.len() as u64 != content_length {
            return Err(DriveError::BadRequest);
        }
        if body.len() as u64 != end - start + 1 {
            return Err(DriveError::BadRequest);
        }
        self.buffer.extend_from_slice(body);
        // Protocol invariant: the buffer now ends exactly at `end`.
        if self.buffer.len() as u64 != end + 1 {
            return Err(DriveError::BadRequest);
        }
        if is_final {
            Ok(ChunkProgress::Complete { id: self.id.clone() })
        } else {
            self.next_start = end + 1;
            Ok(ChunkProgress::Incomplete { received: self.next_start })
        }
    }

    /// Consume the session, yielding the fully materialized item.
    pub fn into_item(mut self) -> (String, Item) {
        self.item.content = Some(self.buffer);
        (self.id, self.item)
    }
}

#[derive(Debug)]
struct GateState {
    wait_on_chunk: u32,
    current_chunk: u32,
}

/// Test-controlled pause point for upload-progress requests.
///
/// Configured with `wait_on_chunk(n)`: the n-th progress request signals
/// "reached" exactly once and then suspends until `resume()` is called.
/// Both signals are latched (Event-like), so a late `reached().await` or a
/// progress request arriving after `resume()` does not block. The gate is
/// entered before any validation and holds no other lock while suspended.
#[derive(Debug)]
pub struct UploadGate {
    state: Mutex<GateState>,
    reached_tx: watch::Sender<bool>,
    resume_tx: watch::Sender<bool>,
}

impl Default for UploadGate {
    fn default() -> Self {
        let (reached_tx, _) = watch::channel(false);
        let (resume_tx, _) = watch::channel(false);
        UploadGate {
            state: Mutex::new(GateState { wait_on_chunk: 0, current_chunk: 1 }),
            reached_tx,
            resume_tx,
        }
    }
}

impl UploadGate {
    /// Arm the gate to trip on the `n`-th progress request (0 disarms).
    /// Resets both signals.
    pub fn wait_on_chunk(&self, n: u32) {
        let mut st = self.state.lock();
        st.wait_on_chunk = n;
        st.current_chunk = 1;
        let _ = self.reached_tx.send(false);
        let _ = self.resume_tx.send(false);
    }

    /// Called by the progress handler before doing anything else. Suspends
    /// when the armed chunk number is reached, until `resume()`.
    pub async fn checkpoint(&self) {
        let trip = {
            let mut st = self.state.lock();
            if st.wait_on_chunk == 0 {
                false
            } else if st.current_chunk == st.wait_on_chunk {
                true
            } else {
                st.current_chunk += 1;
                false
            }
        };
        if trip {
            self.reached_tx.send_if_modified(|v| {
                if *v {
                    false
                } else {
                    *v = true;
                    true
                }
            });
            let mut rx = self.resume_tx.subscribe();
            let _ = rx.wait_for(|resumed| *resumed).await;
        }
    }

    /// Await the "reached" signal; used by the test coordinator to observe
    /// upload progress deterministically.
    pub async fn reached(&self) {
        let mut rx = self.reached_tx.subscribe();
        let _ = rx.wait_for(|reached| *reached).await;
    }

    /// Release a suspended progress handler (and any later ones).
    pub fn resume(&self) {
        let _ = self.resume_tx.send(true);
    }
}
