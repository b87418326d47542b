use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Creative-file storage owned by the upload service. The booking core only
/// keeps the opaque reference it hands back.
pub trait AttachmentStore: Send + Sync {
    /// Stores one upload. Every call yields a fresh reference, even for a
    /// file name seen before.
    fn persist(&self, name: &str) -> Result<String, String>;
    fn release(&self, reference: &str) -> Result<(), String>;
}

#[derive(Default)]
pub struct InMemoryAttachments {
    stored: Mutex<HashSet<String>>,
    uploads: AtomicU64,
}

impl InMemoryAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.stored
            .lock()
            .map(|stored| stored.contains(reference))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.stored.lock().map_or(0, |stored| stored.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttachmentStore for InMemoryAttachments {
    fn persist(&self, name: &str) -> Result<String, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("attachment name is empty".to_string());
        }
        let upload = self.uploads.fetch_add(1, Ordering::Relaxed) + 1;
        let reference = format!("uploads/{upload}-{name}");
        self.stored
            .lock()
            .map_err(|_| "attachment index poisoned".to_string())?
            .insert(reference.clone());
        Ok(reference)
    }

    fn release(&self, reference: &str) -> Result<(), String> {
        let removed = self
            .stored
            .lock()
            .map_err(|_| "attachment index poisoned".to_string())?
            .remove(reference);
        if removed {
            Ok(())
        } else {
            Err(format!("no stored attachment {reference}"))
        }
    }
}
