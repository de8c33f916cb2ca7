//! Request-scoped cache of feature responses.

use crate::curve::CurveKind;
use crate::features::FeatureCurves;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Cache key: a session and the exact curve list requested for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeatureQuery {
    pub session_id: String,
    pub curves: Vec<CurveKind>,
}

impl FeatureQuery {
    /// Build a key. Curve order is normalized so equivalent queries match.
    pub fn new(session_id: impl Into<String>, curves: &[CurveKind]) -> Self {
        let mut curves = curves.to_vec();
        curves.sort();
        curves.dedup();
        Self {
            session_id: session_id.into(),
            curves,
        }
    }
}

/// Feature responses keyed by query, owned by one client.
#[derive(Debug, Default)]
pub struct FeatureCache {
    entries: Mutex<HashMap<FeatureQuery, Arc<FeatureCurves>>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query: &FeatureQuery) -> Option<Arc<FeatureCurves>> {
        self.lock().get(query).cloned()
    }

    pub fn insert(&self, query: FeatureQuery, features: FeatureCurves) -> Arc<FeatureCurves> {
        let features = Arc::new(features);
        self.lock().insert(query, Arc::clone(&features));
        features
    }

    /// Drop every cached response for `session_id`.
    pub fn invalidate(&self, session_id: &str) {
        self.lock().retain(|query, _| query.session_id != session_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FeatureQuery, Arc<FeatureCurves>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
