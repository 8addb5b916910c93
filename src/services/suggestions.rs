use crate::models::error::AppError;
use crate::models::suggestion::{AbRecommendations, Suggestion};
use crate::services::color::{lab_to_rgb, unit_to_byte};

/// Turn engine ab candidates at a pixel with lightness `l` into RGB suggestions.
///
/// Keeps the engine's order and truncates to `k`.
pub fn reconstruct(
    recommendations: Option<AbRecommendations>,
    l: f32,
    k: usize,
) -> Result<Vec<Suggestion>, AppError> {
    let recs = match recommendations {
        Some(r) if !r.is_empty() => r,
        _ => return Err(AppError::NoSuggestionsAvailable),
    };

    let suggestions: Vec<Suggestion> = recs
        .ab
        .iter()
        .zip(recs.confidences.iter())
        .take(k)
        .map(|(&[a, b], &confidence)| {
            let [r, g, b] = unit_to_byte(lab_to_rgb(l, a, b));
            Suggestion { r, g, b, confidence }
        })
        .collect();

    if suggestions.is_empty() {
        return Err(AppError::NoSuggestionsAvailable);
    }
    Ok(suggestions)
}
