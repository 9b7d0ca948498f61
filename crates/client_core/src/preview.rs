//! Scoped preview resources for the selected image.
//!
//! A [`PreviewHandle`] stands in for the display resource a view creates for
//! the current file (an object URL, a texture, a temp file). Handles are
//! registered with the [`PreviewRegistry`] that issued them and release
//! themselves on drop, so replacing or clearing a selection can never leak a
//! preview.

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex},
};

use uuid::Uuid;

use crate::file::ImageFile;

#[derive(Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, file: &ImageFile) -> PreviewHandle {
        let id = Uuid::new_v4();
        if let Ok(mut live) = self.live.lock() {
            live.insert(id);
        }
        tracing::debug!(preview_id = %id, file = file.name(), "acquired preview handle");
        PreviewHandle {
            id,
            uri: format!("preview://{id}/{}", file.name()),
            live: Arc::clone(&self.live),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn is_live(&self, id: Uuid) -> bool {
        self.live
            .lock()
            .map(|live| live.contains(&id))
            .unwrap_or(false)
    }
}

pub struct PreviewHandle {
    id: Uuid,
    uri: String,
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&self.id);
        }
        tracing::debug!(preview_id = %self.id, "released preview handle");
    }
}
