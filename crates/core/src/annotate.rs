//! Read-only annotations derived from feature payloads.

use crate::curve::{Curve, CurveKind};
use crate::features::{Envelope, FeatureCurves, Phases};
use serde::Serialize;

pub use crate::features::BandFit;

/// Acceptable value range for a metric. `low <= high`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnvelopeBand {
    pub low: f64,
    pub high: f64,
}

impl EnvelopeBand {
    /// Build from two bounds in either order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }
}

/// Named shading interval `[start_ms, end_ms)`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Phase {
    pub name: String,
    pub start_ms: f64,
    pub end_ms: f64,
}

/// Headline metric with its envelope verdict.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Badge {
    pub key: &'static str,
    pub label: &'static str,
    pub value: Option<f64>,
    pub fit: BandFit,
}

/// Timestamp of the curve's maximum value.
///
/// The first maximum wins on ties. Null and non-finite values are skipped;
/// `None` when no numeric value exists.
pub fn peak_time(curve: &Curve) -> Option<i64> {
    let mut best: Option<(f64, i64)> = None;
    for point in &curve.points {
        let Some(value) = point.value.filter(|v| v.is_finite()) else {
            continue;
        };
        if best.is_none_or(|(max, _)| value > max) {
            best = Some((value, point.timestamp));
        }
    }
    best.map(|(_, t)| t)
}

/// Peak times of the pelvis, thorax and hand curves, in that order.
pub fn peak_markers(features: &FeatureCurves) -> Vec<i64> {
    [
        CurveKind::OmegaPelvis,
        CurveKind::OmegaThorax,
        CurveKind::VHand,
    ]
    .iter()
    .filter_map(|kind| features.curve(kind).as_ref().and_then(peak_time))
    .collect()
}

/// Separation band from `separation.band`, else `separation_sequencing.separation_deg`.
pub fn separation_band(envelope: Option<&Envelope>) -> Option<EnvelopeBand> {
    let envelope = envelope?;
    let band = envelope
        .separation
        .as_ref()
        .and_then(|c| c.band.as_deref())
        .or_else(|| {
            envelope
                .separation_sequencing
                .as_ref()
                .and_then(|c| c.separation_deg.as_deref())
        })?;
    match band {
        [low, high, ..] if low.is_finite() && high.is_finite() => {
            Some(EnvelopeBand::new(*low, *high))
        }
        _ => None,
    }
}

/// Well-formed phases in name order.
///
/// An entry qualifies when it is an array whose first two items are numbers
/// with `end > start`. Anything else is skipped.
pub fn phase_intervals(phases: &Phases) -> Vec<Phase> {
    phases
        .iter()
        .filter_map(|(name, range)| {
            let range = range.as_array()?;
            let start = range.first()?.as_f64()?;
            let end = range.get(1)?.as_f64()?;
            (end > start).then(|| Phase {
                name: name.clone(),
                start_ms: start,
                end_ms: end,
            })
        })
        .collect()
}

/// Badges for the sequencing metrics.
pub fn metric_badges(features: &FeatureCurves) -> Vec<Badge> {
    let metrics = &features.metrics;
    let fits = &features.metrics_band_fit;
    vec![
        Badge {
            key: "Δhip_torso_ms",
            label: "Δ hip→torso",
            value: metrics.hip_torso_ms,
            fit: fits.hip_torso_ms.unwrap_or_default(),
        },
        Badge {
            key: "Δtorso_hand_ms",
            label: "Δ torso→hand",
            value: metrics.torso_hand_ms,
            fit: fits.torso_hand_ms.unwrap_or_default(),
        },
        Badge {
            key: "chain_order_score",
            label: "Chain order",
            value: metrics.chain_order_score,
            fit: fits.chain_order_score.unwrap_or_default(),
        },
    ]
}
