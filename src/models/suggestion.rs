use serde::{Deserialize, Serialize};

/// One ranked color proposal for a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub confidence: f32,
}

/// Raw top-K output of the distribution engine at one grid cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbRecommendations {
    pub ab: Vec<[f32; 2]>,
    pub confidences: Vec<f32>,
}

impl AbRecommendations {
    pub fn is_empty(&self) -> bool {
        self.ab.is_empty()
    }
}
