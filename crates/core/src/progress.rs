//! Athlete progress history.

use crate::lenient;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Default page size used by the backend.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// One scored session in an athlete's history.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressItem {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub release_angle_deg: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub chain_order_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub v_hand_peak_norm: Option<f64>,
}

impl ProgressItem {
    /// `created_at` parsed as RFC 3339, if present and well-formed.
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        self.created_at
            .as_deref()
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
    }
}

/// One page of progress items.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressPage {
    #[serde(default)]
    pub items: Vec<ProgressItem>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Query parameters for a progress page.
#[derive(Clone, Debug, Default)]
pub struct ProgressQuery {
    pub metrics: Vec<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl ProgressQuery {
    /// Non-empty parameters in request order.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.metrics.is_empty() {
            pairs.push(("metrics", self.metrics.join(",")));
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = self.cursor.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("cursor", cursor.to_string()));
        }
        pairs
    }
}

/// Highest `total` across items, with its session id.
pub fn best_total(items: &[ProgressItem]) -> Option<(&str, f64)> {
    items
        .iter()
        .filter_map(|item| item.total.map(|t| (item.id.as_str(), t)))
        .fold(None, |best, (id, total)| match best {
            Some((_, max)) if max >= total => best,
            _ => Some((id, total)),
        })
}
