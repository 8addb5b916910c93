use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::error::AppError;

const REQUIRED_KEYS: [&str; 5] = ["x", "y", "r", "g", "b"];

/// A single user-placed color constraint, coordinates in percent of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HintPoint {
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
}

impl HintPoint {
    /// Intensity in `[0, 1]`, defaulting to full strength.
    pub fn alpha(&self) -> f64 {
        self.a.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.r as u8, self.g as u8, self.b as u8]
    }
}

/// Parse the `hints` form field into validated points.
///
/// Every point is checked before anything is returned, so a bad point at any
/// index rejects the whole batch.
pub fn parse_hint_payload(raw: Option<&str>) -> Result<Vec<HintPoint>, AppError> {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(AppError::InvalidHintPayload("No color hints provided".into())),
    };

    let payload: Value = serde_json::from_str(raw)
        .map_err(|_| AppError::InvalidHintPayload("Invalid JSON format for hints".into()))?;

    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::InvalidHintPayload("Hints should be a JSON object".into()))?;

    let points = obj.get("points").ok_or_else(|| {
        AppError::InvalidHintPayload("Hints object missing 'points' array".into())
    })?;

    let points = points
        .as_array()
        .ok_or_else(|| AppError::InvalidHintPayload("'points' should be an array".into()))?;

    points
        .iter()
        .enumerate()
        .map(|(index, point)| validate_point(index, point))
        .collect()
}

fn validate_point(index: usize, point: &Value) -> Result<HintPoint, AppError> {
    let malformed = |reason: String| AppError::MalformedHint { index, reason };

    let obj = point
        .as_object()
        .ok_or_else(|| malformed("should be an object".into()))?;

    if !REQUIRED_KEYS.iter().all(|k| obj.contains_key(*k)) {
        return Err(malformed("missing required attributes (x, y, r, g, b)".into()));
    }

    let number = |key: &str| -> Result<f64, AppError> {
        obj.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("attribute '{}' must be a finite number", key)))
    };

    let x = number("x")?;
    let y = number("y")?;
    let r = number("r")?;
    let g = number("g")?;
    let b = number("b")?;

    for (key, value) in [("r", r), ("g", g), ("b", b)] {
        if !(0.0..=255.0).contains(&value) {
            return Err(malformed(format!("attribute '{}' must be within 0..=255", key)));
        }
    }

    let a = match obj.get("a") {
        None | Some(Value::Null) => None,
        Some(_) => Some(number("a")?),
    };

    Ok(HintPoint { x, y, r, g, b, a })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points_with_optional_alpha() {
        let points = parse_hint_payload(Some(
            r#"{"points":[{"x":50,"y":25,"r":255,"g":0,"b":0},{"x":1,"y":2,"r":3,"g":4,"b":5,"a":0.5}]}"#,
        ))
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].alpha(), 1.0);
        assert_eq!(points[1].alpha(), 0.5);
        assert_eq!(points[0].rgb(), [255, 0, 0]);
    }

    #[test]
    fn alpha_is_clamped() {
        let mut p = HintPoint { x: 0.0, y: 0.0, r: 0.0, g: 0.0, b: 0.0, a: Some(3.0) };
        assert_eq!(p.alpha(), 1.0);
        p.a = Some(-1.0);
        assert_eq!(p.alpha(), 0.0);
    }

    #[test]
    fn missing_channel_names_the_point_index() {
        let err = parse_hint_payload(Some(
            r#"{"points":[
                {"x":1,"y":1,"r":1,"g":1,"b":1},
                {"x":2,"y":2,"r":2,"g":2,"b":2},
                {"x":3,"y":3,"g":3,"b":3}
            ]}"#,
        ))
        .unwrap_err();
        match err {
            AppError::MalformedHint { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn structural_problems_are_reported() {
        let cases = [
            (None, "No color hints provided"),
            (Some("not json"), "Invalid JSON format for hints"),
            (Some("[1,2]"), "Hints should be a JSON object"),
            (Some("{}"), "Hints object missing 'points' array"),
            (Some(r#"{"points":5}"#), "'points' should be an array"),
        ];
        for (raw, expected) in cases {
            let err = parse_hint_payload(raw).unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn rejects_out_of_range_color_and_bad_alpha() {
        let err = parse_hint_payload(Some(r#"{"points":[{"x":1,"y":1,"r":300,"g":0,"b":0}]}"#))
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedHint { index: 0, .. }));

        let err = parse_hint_payload(Some(
            r#"{"points":[{"x":1,"y":1,"r":0,"g":0,"b":0,"a":"full"}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, AppError::MalformedHint { index: 0, .. }));
    }

    #[test]
    fn empty_points_array_is_accepted() {
        assert!(parse_hint_payload(Some(r#"{"points":[]}"#)).unwrap().is_empty());
    }
}
