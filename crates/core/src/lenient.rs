//! Deserializers that degrade malformed backend data to "no data".

use crate::curve::CurvePoint;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize `T`, falling back to `T::default()` on any shape mismatch.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Any JSON number as `f64`; everything else is `None`.
pub(crate) fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|v| v.is_finite()))
}

/// Timestamp in whole milliseconds. Fractional values are rounded.
pub(crate) fn timestamp(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| v.round() as i64)
    })
}

/// Read a point array whose measurement lives under `field`.
///
/// Entries without a numeric `t_ms` are dropped; non-numeric measurements
/// become `None`. A non-array value yields `None` for the whole curve.
pub(crate) fn points(value: &Value, field: &str) -> Option<Vec<CurvePoint>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                let t = timestamp(item.get("t_ms")?)?;
                let v = item
                    .get(field)
                    .and_then(Value::as_f64)
                    .filter(|v| v.is_finite());
                Some(CurvePoint::new(t, v))
            })
            .collect(),
    )
}

macro_rules! point_field {
    ($name:ident, $field:literal) => {
        pub(crate) fn $name<'de, D>(deserializer: D) -> Result<Option<Vec<CurvePoint>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let value = Value::deserialize(deserializer)?;
            Ok(points(&value, $field))
        }
    };
}

point_field!(deg_points, "deg");
point_field!(deg_s_points, "deg_s");
point_field!(norm_points, "norm");
