use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::DocumentBackend;
use crate::events::{EventQueue, ViewerEvent};
use crate::geometry::Quad;
use crate::text::TextLayer;

pub const DEFAULT_MAX_HITS_PER_PAGE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub from_start: bool,
    pub whole_words: bool,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub page: usize,
    pub quad: Quad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    HasHits,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSummary {
    pub query: String,
    pub total: usize,
    pub current_index: Option<usize>,
}

pub struct DocumentSearcher {
    backend: Arc<dyn DocumentBackend>,
    events: EventQueue,
    max_hits_per_page: usize,
    query: Option<String>,
    hits: Vec<SearchHit>,
    cursor: Option<usize>,
}

impl DocumentSearcher {
    pub fn new(backend: Arc<dyn DocumentBackend>, events: EventQueue) -> Self {
        Self {
            backend,
            events,
            max_hits_per_page: DEFAULT_MAX_HITS_PER_PAGE,
            query: None,
            hits: Vec::new(),
            cursor: None,
        }
    }

    pub fn with_max_hits(mut self, max_hits_per_page: usize) -> Self {
        self.max_hits_per_page = max_hits_per_page;
        self
    }

    #[instrument(skip(self), fields(pages = self.backend.page_count()))]
    pub fn search(
        &mut self,
        text: &str,
        options: SearchOptions,
        reference_page: usize,
    ) -> Option<SearchHit> {
        self.clear_search();
        self.query = Some(text.to_owned());

        let page_count = self.backend.page_count();
        let mut hits = Vec::new();
        for page in 0..page_count {
            let layer = match self.backend.load_text_page(page) {
                Ok(layer) => layer,
                Err(err) => {
                    warn!(?err, page, "skipping page without text layer");
                    continue;
                }
            };
            let before = hits.len();
            hits.extend(
                layer
                    .search(text, self.max_hits_per_page)
                    .into_iter()
                    .filter(|quad| accept_hit(layer.as_ref(), quad, text, options))
                    .map(|quad| SearchHit { page, quad }),
            );
            let found = hits.len() - before;
            if found > 0 {
                debug!(page, found, "page hits");
            }
        }

        if !options.from_start {
            rotate_to_reference_page(&mut hits, reference_page);
        }

        info!(total = hits.len(), "search finished");
        self.hits = hits;
        if self.hits.is_empty() {
            return None;
        }
        self.move_cursor(0)
    }

    pub fn next_search_hit(&mut self) -> Option<SearchHit> {
        let cursor = self.cursor?;
        if self.hits.is_empty() {
            return None;
        }
        let next = if cursor + 1 >= self.hits.len() {
            0
        } else {
            cursor + 1
        };
        self.move_cursor(next)
    }

    pub fn previous_search_hit(&mut self) -> Option<SearchHit> {
        let cursor = self.cursor?;
        if self.hits.is_empty() {
            return None;
        }
        let previous = match cursor.checked_sub(1) {
            Some(previous) => previous,
            None => self.hits.len() - 1,
        };
        self.move_cursor(previous)
    }

    pub fn clear_search(&mut self) {
        self.query = None;
        self.hits.clear();
        self.cursor = None;
    }

    pub fn state(&self) -> SearchState {
        match (&self.query, self.hits.is_empty()) {
            (None, _) => SearchState::Idle,
            (Some(_), true) => SearchState::Exhausted,
            (Some(_), false) => SearchState::HasHits,
        }
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn hits_on_page(&self, page: usize) -> impl Iterator<Item = &SearchHit> + '_ {
        self.hits.iter().filter(move |hit| hit.page == page)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current_hit(&self) -> Option<SearchHit> {
        self.cursor.and_then(|idx| self.hits.get(idx).copied())
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn summary(&self) -> Option<SearchSummary> {
        let query = self.query.clone()?;
        Some(SearchSummary {
            query,
            total: self.hits.len(),
            current_index: self.cursor,
        })
    }

    fn move_cursor(&mut self, index: usize) -> Option<SearchHit> {
        let hit = *self.hits.get(index)?;
        self.cursor = Some(index);
        self.events.push(ViewerEvent::GoToPosition {
            page: hit.page,
            y_offset: hit.quad.ul.y,
        });
        self.events.push(ViewerEvent::SelectText {
            page: hit.page,
            rect: hit.quad.bounds(),
        });
        Some(hit)
    }
}

fn accept_hit(layer: &dyn TextLayer, quad: &Quad, needle: &str, options: SearchOptions) -> bool {
    if options.whole_words && !layer.is_whole_word(quad) {
        return false;
    }
    if options.case_sensitive {
        let (begin, end) = quad.midline();
        let found = layer.copy_selection(begin, end, true);
        if collapse_whitespace(&found) != collapse_whitespace(needle) {
            return false;
        }
    }
    true
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hits on `reference_page` and later first, the earlier ones after; order within each
/// group is kept.
fn rotate_to_reference_page(hits: &mut Vec<SearchHit>, reference_page: usize) {
    let (mut ordered, earlier): (Vec<_>, Vec<_>) =
        hits.drain(..).partition(|hit| hit.page >= reference_page);
    ordered.extend(earlier);
    *hits = ordered;
}
