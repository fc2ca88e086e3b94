use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod highlight;
pub mod link;
pub mod page;
pub mod search;
pub mod selection;
pub mod text;
pub mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use backend::{DocumentBackend, Pixmap, RasterPage};
pub use config::ViewerConfig;
pub use error::{BackendError, ConfigError};
pub use events::{EventQueue, ViewerEvent};
pub use geometry::{Matrix, Point, Quad, Rect};
pub use highlight::{Highlight, HighlightId, HighlightSet, Rgba};
pub use link::{
    format_internal_uri, is_external_uri, parse_internal_uri, resolve_link, Link,
    LinkDestination, LinkTarget,
};
pub use page::{PageOffset, PageRenderer};
pub use search::{DocumentSearcher, SearchHit, SearchOptions, SearchState, SearchSummary};
pub use selection::{rects_on_same_line, selection_anchor, TextSelector};
pub use text::{SnapMode, StructuredText, TextChar, TextLayer, TextLine};
pub use transform::CoordinateTransform;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c7a52-8d1e-5b49-9a3c-1d6e2f8b4c07").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    Uuid::new_v5(&DOCUMENT_NAMESPACE, resolved.to_string_lossy().as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }

    pub fn invert(&mut self) {
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk[0] = 255 - chunk[0];
            chunk[1] = 255 - chunk[1];
            chunk[2] = 255 - chunk[2];
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineItem {
    pub title: String,
    pub page_index: usize,
    pub depth: usize,
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
