//! Side-by-side view of one or two sessions.

use crate::annotate::{
    Badge, EnvelopeBand, Phase, metric_badges, peak_markers, phase_intervals, separation_band,
};
use crate::curve::{CurveKind, MergedRow, merge_curves};
use crate::features::FeatureCurves;
use serde::Serialize;

/// Field names used in the separation table.
pub const SEPARATION_A: &str = "sep_a";
pub const SEPARATION_B: &str = "sep_b";

/// Everything needed to chart a comparison.
///
/// Annotations (band, phases, peaks, badges) come from session A; B only
/// contributes its separation curve.
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonView {
    /// Separation of A and B aligned on timestamp.
    pub separation: Vec<MergedRow>,
    /// Pelvis, thorax and hand curves of A aligned on timestamp.
    pub kinematics: Vec<MergedRow>,
    pub band: Option<EnvelopeBand>,
    pub phases: Vec<Phase>,
    pub peaks: Vec<i64>,
    pub badges: Vec<Badge>,
}

impl ComparisonView {
    pub fn build(a: &FeatureCurves, b: Option<&FeatureCurves>) -> Self {
        let mut separation = vec![a.curve_as(&CurveKind::Separation, SEPARATION_A)];
        if let Some(b) = b {
            separation.push(b.curve_as(&CurveKind::Separation, SEPARATION_B));
        }

        let kinematics: Vec<_> = [
            CurveKind::OmegaPelvis,
            CurveKind::OmegaThorax,
            CurveKind::VHand,
        ]
        .iter()
        .filter_map(|kind| a.curve(kind))
        .collect();

        Self {
            separation: merge_curves(&separation),
            kinematics: merge_curves(&kinematics),
            band: separation_band(a.envelope.as_ref()),
            phases: phase_intervals(&a.phases),
            peaks: peak_markers(a),
            badges: metric_badges(a),
        }
    }
}
