//! Curves and timestamp-aligned merging.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Biomechanical signals served by the feature endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CurveKind {
    /// Hip-shoulder separation angle (degrees).
    Separation,
    /// Pelvis angular velocity (degrees/second).
    OmegaPelvis,
    /// Thorax angular velocity (degrees/second).
    OmegaThorax,
    /// Normalized throwing-hand speed.
    VHand,
}

impl CurveKind {
    /// All curves requested when the caller names none.
    pub const DEFAULTS: [CurveKind; 4] = [
        CurveKind::Separation,
        CurveKind::OmegaPelvis,
        CurveKind::OmegaThorax,
        CurveKind::VHand,
    ];

    /// Name used in query strings and payload keys.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Separation => "separation",
            Self::OmegaPelvis => "ω_pelvis",
            Self::OmegaThorax => "ω_thorax",
            Self::VHand => "v_hand",
        }
    }

    /// Parse a comma-separated list, skipping blanks and duplicates.
    ///
    /// Fails on the first name the feature endpoint does not serve.
    pub fn parse_list(list: &str) -> Result<Vec<CurveKind>> {
        let mut kinds: Vec<CurveKind> = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// Join kinds into the comma-separated query form.
    pub fn join(kinds: &[CurveKind]) -> String {
        kinds
            .iter()
            .map(CurveKind::key)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for CurveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "separation" => Ok(Self::Separation),
            "ω_pelvis" | "omega_pelvis" => Ok(Self::OmegaPelvis),
            "ω_thorax" | "omega_thorax" => Ok(Self::OmegaThorax),
            "v_hand" | "v_hand_norm" => Ok(Self::VHand),
            other => Err(Error::UnknownCurve(other.to_string())),
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One sample of a curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Milliseconds from the session origin.
    #[serde(rename = "t_ms")]
    pub timestamp: i64,
    /// Measurement, `None` for a gap.
    pub value: Option<f64>,
}

impl CurvePoint {
    pub fn new(timestamp: i64, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

/// A named series of points, ordered by timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    pub field: String,
    pub points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new(field: impl Into<String>, points: Vec<CurvePoint>) -> Self {
        Self {
            field: field.into(),
            points,
        }
    }

    /// Build from `(timestamp, value)` pairs.
    pub fn from_pairs(
        field: impl Into<String>,
        pairs: impl IntoIterator<Item = (i64, Option<f64>)>,
    ) -> Self {
        Self::new(
            field,
            pairs
                .into_iter()
                .map(|(t, v)| CurvePoint::new(t, v))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Values of several curves at one timestamp.
///
/// A field never contributed at this timestamp is absent, which differs from
/// a field present with a null value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedRow {
    pub timestamp: i64,
    values: BTreeMap<String, Option<f64>>,
}

impl MergedRow {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Numeric value of `field`, if contributed and non-null.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().flatten()
    }

    /// Whether any curve contributed `field` here (even as null).
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn set(&mut self, field: &str, value: Option<f64>) {
        self.values.insert(field.to_string(), value);
    }

    /// Contributed fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Serialize for MergedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("t_ms", &self.timestamp)?;
        for (field, value) in &self.values {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Align curves on their exact timestamps.
///
/// Produces one row per distinct timestamp across all curves, ascending.
/// No interpolation happens: a curve missing a timestamp leaves its field
/// absent in that row.
pub fn merge_curves<'a, I>(curves: I) -> Vec<MergedRow>
where
    I: IntoIterator<Item = &'a Curve>,
{
    let mut rows: BTreeMap<i64, MergedRow> = BTreeMap::new();
    for curve in curves {
        for point in &curve.points {
            rows.entry(point.timestamp)
                .or_insert_with(|| MergedRow::new(point.timestamp))
                .set(&curve.field, point.value);
        }
    }
    rows.into_values().collect()
}
