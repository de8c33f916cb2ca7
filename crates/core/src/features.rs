//! Typed payload of the per-session feature endpoint.
//!
//! The backend sends optional, loosely-shaped fields. Everything here is
//! parsed leniently: a field with the wrong shape reads as absent instead of
//! failing the whole response.

use crate::curve::{Curve, CurveKind, CurvePoint};
use crate::lenient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Phase name to `[start_ms, end_ms]`, kept loose for lenient extraction.
pub type Phases = BTreeMap<String, serde_json::Value>;

/// Response of `GET /sessions/{id}/features`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FeatureCurves {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub curves: CurveSet,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub phases: Phases,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub envelope: Option<Envelope>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub metrics: SessionMetrics,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub metrics_band_fit: BandFits,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub envelope_version: Option<EnvelopeVersion>,
}

impl FeatureCurves {
    /// The curve for `kind` under its own key, if the backend sent it.
    pub fn curve(&self, kind: &CurveKind) -> Option<Curve> {
        self.curves
            .points(kind)
            .map(|points| Curve::new(kind.key(), points.to_vec()))
    }

    /// The curve for `kind` renamed to `field`, empty when absent.
    pub fn curve_as(&self, kind: &CurveKind, field: &str) -> Curve {
        Curve::new(field, self.curves.points(kind).unwrap_or_default().to_vec())
    }
}

/// Per-curve point sequences, one explicit field per known signal.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CurveSet {
    #[serde(default, deserialize_with = "lenient::deg_points")]
    pub separation: Option<Vec<CurvePoint>>,
    #[serde(rename = "ω_pelvis", default, deserialize_with = "lenient::deg_s_points")]
    pub omega_pelvis: Option<Vec<CurvePoint>>,
    #[serde(rename = "ω_thorax", default, deserialize_with = "lenient::deg_s_points")]
    pub omega_thorax: Option<Vec<CurvePoint>>,
    #[serde(default, deserialize_with = "lenient::norm_points")]
    pub v_hand: Option<Vec<CurvePoint>>,
}

impl CurveSet {
    pub fn points(&self, kind: &CurveKind) -> Option<&[CurvePoint]> {
        let points = match kind {
            CurveKind::Separation => &self.separation,
            CurveKind::OmegaPelvis => &self.omega_pelvis,
            CurveKind::OmegaThorax => &self.omega_thorax,
            CurveKind::VHand => &self.v_hand,
        };
        points.as_deref()
    }
}

/// Envelope components used for boundary shading.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub separation: Option<SeparationComponent>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub separation_sequencing: Option<SequencingComponent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SeparationComponent {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub band: Option<Vec<f64>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SequencingComponent {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub separation_deg: Option<Vec<f64>>,
}

/// Headline metrics reported with the curves.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    #[serde(rename = "Δhip_torso_ms", default, deserialize_with = "lenient::number")]
    pub hip_torso_ms: Option<f64>,
    #[serde(rename = "Δtorso_hand_ms", default, deserialize_with = "lenient::number")]
    pub torso_hand_ms: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub chain_order_score: Option<f64>,
}

/// Qualitative fit of a metric against its envelope band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BandFit {
    Inside,
    Near,
    /// Outside the band, or no verdict given.
    #[default]
    Outside,
}

impl<'de> Deserialize<'de> for BandFit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("inside") => Self::Inside,
            Some("near") => Self::Near,
            _ => Self::Outside,
        })
    }
}

impl fmt::Display for BandFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inside => "inside",
            Self::Near => "near",
            Self::Outside => "outside",
        })
    }
}

/// Band fit per headline metric.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BandFits {
    #[serde(rename = "Δhip_torso_ms", default)]
    pub hip_torso_ms: Option<BandFit>,
    #[serde(rename = "Δtorso_hand_ms", default)]
    pub torso_hand_ms: Option<BandFit>,
    #[serde(default)]
    pub chain_order_score: Option<BandFit>,
}

/// Envelope version tag; the backend sends either form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeVersion {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for EnvelopeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}
