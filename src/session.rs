use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ledger_lift_core::Document;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::DocumentHandle;

const PDF_MAGIC: &[u8] = b"%PDF";

struct Entry {
    document: Arc<Document>,
    uploaded_at: DateTime<Utc>,
    last_used: Instant,
}

/// Uploaded documents, bounded in count and evicted after sitting idle.
pub struct DocumentStore {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<DocumentHandle, Entry>>,
}

/// Rejects payloads that cannot be a PDF before any parsing.
pub fn check_upload(bytes: &[u8]) -> Result<(), ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }
    let head = &bytes[..bytes.len().min(1024)];
    if !head.windows(PDF_MAGIC.len()).any(|window| window == PDF_MAGIC) {
        return Err(ApiError::BadRequest(
            "uploaded file is not a PDF".to_string(),
        ));
    }
    Ok(())
}

impl DocumentStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `document`, evicting idle entries and then the least recently
    /// used one when the store is full.
    pub fn insert(&self, document: Document) -> (DocumentHandle, DateTime<Utc>) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::evict_idle_locked(&mut entries, self.ttl, now);

        while entries.len() >= self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(handle, _)| *handle)
            else {
                break;
            };
            entries.remove(&oldest);
            info!(document = %oldest, "evicted document to make room");
        }

        let handle = DocumentHandle::new();
        let uploaded_at = Utc::now();
        entries.insert(
            handle,
            Entry {
                document: Arc::new(document),
                uploaded_at,
                last_used: now,
            },
        );
        (handle, uploaded_at)
    }

    /// The document behind `handle`; touching it resets its idle timer.
    pub fn get(&self, handle: DocumentHandle) -> Result<Arc<Document>, ApiError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::evict_idle_locked(&mut entries, self.ttl, now);

        let entry = entries.get_mut(&handle).ok_or_else(|| {
            ApiError::NotFound(format!("document {handle} is unknown or has expired"))
        })?;
        entry.last_used = now;
        Ok(Arc::clone(&entry.document))
    }

    pub fn uploaded_at(&self, handle: DocumentHandle) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&handle).map(|entry| entry.uploaded_at)
    }

    pub fn remove(&self, handle: DocumentHandle) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&handle).is_some()
    }

    /// Drops every entry idle for longer than the TTL as of `now`. Returns
    /// how many were dropped.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::evict_idle_locked(&mut entries, self.ttl, now)
    }

    fn evict_idle_locked(
        entries: &mut HashMap<DocumentHandle, Entry>,
        ttl: Duration,
        now: Instant,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_used) <= ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted idle documents");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::check_upload;

    #[test]
    fn uploads_must_look_like_pdf() {
        assert_eq!(
            check_upload(b"").map_err(|error| error.code()),
            Err("bad_request")
        );
        assert_eq!(
            check_upload(b"PK\x03\x04 not a pdf").map_err(|error| error.code()),
            Err("bad_request")
        );
        assert!(check_upload(b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n").is_ok());
        assert!(check_upload(b"\xEF\xBB\xBF%PDF-1.7").is_ok());
    }
}
