use std::sync::Arc;

use parking_lot::Mutex;

use crate::geometry::Rect;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    GoToPosition { page: usize, y_offset: f32 },
    SelectText { page: usize, rect: Rect },
}

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: ViewerEvent) {
        self.inner.lock().push(event);
    }

    pub fn drain(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
