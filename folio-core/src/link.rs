use serde::Serialize;
use tracing::debug;

use crate::backend::DocumentBackend;
use crate::geometry::Rect;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub rect: Rect,
    pub uri: String,
}

impl Link {
    pub fn new(rect: Rect, uri: impl Into<String>) -> Self {
        Self {
            rect,
            uri: uri.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkTarget {
    pub page: usize,
    pub y_offset: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkDestination {
    External { uri: String },
    Internal(LinkTarget),
    Unresolved,
}

pub fn is_external_uri(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

pub fn format_internal_uri(target: LinkTarget) -> String {
    if target.y_offset > 0.0 {
        format!("#page={}&y={}", target.page + 1, target.y_offset)
    } else {
        format!("#page={}", target.page + 1)
    }
}

pub fn parse_internal_uri(uri: &str) -> Option<LinkTarget> {
    let fragment = uri.strip_prefix('#')?;
    let mut page = None;
    let mut y_offset = 0.0;
    for pair in fragment.split('&') {
        match pair.split_once('=') {
            Some(("page", value)) => {
                let number: usize = value.trim().parse().ok()?;
                page = Some(number.checked_sub(1)?);
            }
            Some(("y", value)) => y_offset = value.trim().parse().ok()?,
            _ => {}
        }
    }
    page.map(|page| LinkTarget { page, y_offset })
}

pub fn resolve_link(backend: &dyn DocumentBackend, uri: &str) -> LinkDestination {
    if backend.link_is_external(uri) {
        return LinkDestination::External {
            uri: uri.to_owned(),
        };
    }
    match backend.resolve_link_uri(uri) {
        Some(target) if target.page < backend.page_count() => LinkDestination::Internal(target),
        _ => {
            debug!(uri, "link does not resolve to a page");
            LinkDestination::Unresolved
        }
    }
}
