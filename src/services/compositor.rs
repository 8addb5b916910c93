use ndarray::Array3;

use crate::models::hints::HintPoint;
use crate::services::color::rgb_to_lab;
use crate::services::grid::to_grid;

/// Dense engine input built from sparse hints.
#[derive(Debug, Clone, PartialEq)]
pub struct HintTensors {
    /// `(2, D, D)` a/b chrominance.
    pub ab: Array3<f32>,
    /// `(1, D, D)` confidence in `[0, 1]`.
    pub mask: Array3<f32>,
}

impl HintTensors {
    pub fn zeros(grid_size: usize) -> Self {
        Self {
            ab: Array3::zeros((2, grid_size, grid_size)),
            mask: Array3::zeros((1, grid_size, grid_size)),
        }
    }

    pub fn grid_size(&self) -> usize {
        self.mask.shape()[1]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HintCompositor {
    grid_size: usize,
    radius: usize,
}

impl HintCompositor {
    pub fn new(grid_size: usize, radius: usize) -> Self {
        Self { grid_size, radius }
    }

    /// Rasterize `hints` in order onto fresh tensors.
    ///
    /// Inside a hint's radius the color channels are overwritten by every
    /// later hint, while the mask keeps the strongest confidence seen.
    pub fn composite(&self, hints: &[HintPoint]) -> HintTensors {
        let mut out = HintTensors::zeros(self.grid_size);
        for hint in hints {
            self.apply(&mut out, hint);
        }
        out
    }

    fn apply(&self, out: &mut HintTensors, hint: &HintPoint) {
        let d = self.grid_size;
        let cell = to_grid(hint.x, hint.y, d);
        let (row, col) = (cell.row, cell.col);

        let [_, a, b] = rgb_to_lab(hint.rgb());
        let alpha = hint.alpha() as f32;
        let (a_val, b_val) = (a * alpha, b * alpha);

        out.ab[[0, row, col]] = a_val;
        out.ab[[1, row, col]] = b_val;
        out.mask[[0, row, col]] = 1.0;

        let r = self.radius;
        let radius = r as f32;
        let rows = row.saturating_sub(r)..(row + r + 1).min(d);
        for i in rows {
            let cols = col.saturating_sub(r)..(col + r + 1).min(d);
            for j in cols {
                let di = i as f32 - row as f32;
                let dj = j as f32 - col as f32;
                let dist = (di * di + dj * dj).sqrt();
                if dist > radius {
                    continue;
                }
                out.ab[[0, i, j]] = a_val;
                out.ab[[1, i, j]] = b_val;
                let weight = 1.0 - dist / radius;
                let m = &mut out.mask[[0, i, j]];
                *m = m.max(weight);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(x: f64, y: f64, rgb: [u8; 3], a: Option<f64>) -> HintPoint {
        HintPoint {
            x,
            y,
            r: rgb[0] as f64,
            g: rgb[1] as f64,
            b: rgb[2] as f64,
            a,
        }
    }

    #[test]
    fn empty_hint_list_yields_zero_tensors() {
        let t = HintCompositor::new(64, 3).composite(&[]);
        assert_eq!(t.ab.shape(), &[2, 64, 64]);
        assert_eq!(t.mask.shape(), &[1, 64, 64]);
        assert!(t.ab.iter().all(|&v| v == 0.0));
        assert!(t.mask.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn center_hint_radius_boundary() {
        let t = HintCompositor::new(256, 3).composite(&[hint(50.0, 50.0, [255, 0, 0], Some(1.0))]);
        let [_, a, b] = rgb_to_lab([255, 0, 0]);

        assert_eq!(t.mask[[0, 128, 128]], 1.0);
        assert_eq!(t.ab[[0, 128, 128]], a);
        assert_eq!(t.ab[[1, 128, 128]], b);

        // distance 1 and 2 carry decayed confidence
        assert!((t.mask[[0, 127, 128]] - 2.0 / 3.0).abs() < 1e-6);
        assert!((t.mask[[0, 126, 128]] - 1.0 / 3.0).abs() < 1e-6);

        // distance 3 is inside the radius: colored, confidence decays to zero
        for (i, j) in [(125, 128), (131, 128), (128, 125), (128, 131)] {
            assert_eq!(t.ab[[0, i, j]], a);
            assert_eq!(t.mask[[0, i, j]], 0.0);
        }

        // distance 4 is outside
        assert_eq!(t.ab[[0, 124, 128]], 0.0);
        assert_eq!(t.mask[[0, 124, 128]], 0.0);
        assert_eq!(t.ab[[0, 132, 128]], 0.0);
    }

    #[test]
    fn mask_respects_decay_bound_and_is_zero_outside() {
        let t = HintCompositor::new(32, 3).composite(&[hint(25.0, 75.0, [10, 200, 40], None)]);
        let center = to_grid(25.0, 75.0, 32);
        for i in 0..32 {
            for j in 0..32 {
                let di = i as f32 - center.row as f32;
                let dj = j as f32 - center.col as f32;
                let d = (di * di + dj * dj).sqrt();
                let m = t.mask[[0, i, j]];
                assert!((0.0..=1.0).contains(&m));
                if d <= 3.0 {
                    assert!(m >= 1.0 - d / 3.0 - 1e-6);
                } else {
                    assert_eq!(m, 0.0);
                    assert_eq!(t.ab[[0, i, j]], 0.0);
                    assert_eq!(t.ab[[1, i, j]], 0.0);
                }
            }
        }
    }

    #[test]
    fn overlap_color_last_wins_mask_max_wins() {
        // on a 100 grid, x=50 -> col 50 and x=52 -> col 52
        let first = hint(50.0, 50.0, [255, 0, 0], None);
        let second = hint(52.0, 50.0, [0, 0, 255], None);
        let t = HintCompositor::new(100, 3).composite(&[first, second]);
        let [_, blue_a, blue_b] = rgb_to_lab([0, 0, 255]);

        // cell (50, 50): first hint center, distance 2 from second hint
        assert_eq!(t.ab[[0, 50, 50]], blue_a);
        assert_eq!(t.ab[[1, 50, 50]], blue_b);
        assert_eq!(t.mask[[0, 50, 50]], 1.0);

        // cell (50, 51): distance 1 from both
        assert!((t.mask[[0, 50, 51]] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(t.ab[[0, 50, 51]], blue_a);
    }

    #[test]
    fn later_center_overrides_earlier_center() {
        let t = HintCompositor::new(100, 3).composite(&[
            hint(10.0, 10.0, [255, 0, 0], None),
            hint(10.0, 10.0, [0, 255, 0], Some(0.5)),
        ]);
        let [_, a, b] = rgb_to_lab([0, 255, 0]);
        assert!((t.ab[[0, 10, 10]] - a * 0.5).abs() < 1e-5);
        assert!((t.ab[[1, 10, 10]] - b * 0.5).abs() < 1e-5);
        assert_eq!(t.mask[[0, 10, 10]], 1.0);
    }

    #[test]
    fn zero_alpha_hint_still_claims_the_mask() {
        let t = HintCompositor::new(16, 3).composite(&[hint(50.0, 50.0, [255, 0, 0], Some(0.0))]);
        assert_eq!(t.ab[[0, 8, 8]], 0.0);
        assert_eq!(t.mask[[0, 8, 8]], 1.0);
    }

    #[test]
    fn hints_at_the_edge_are_clipped_to_the_grid() {
        let t = HintCompositor::new(16, 3).composite(&[
            hint(0.0, 0.0, [255, 255, 0], None),
            hint(100.0, 100.0, [0, 255, 255], None),
        ]);
        assert_eq!(t.mask[[0, 0, 0]], 1.0);
        assert_eq!(t.mask[[0, 15, 15]], 1.0);
        assert!(t.ab.iter().all(|v| v.is_finite()));
    }
}
