/// A cell on the engine's square working grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

/// Map percentage coordinates onto a `grid_size`×`grid_size` grid.
///
/// Shared by hint placement and suggestion queries so both land on the same
/// cell for the same input.
pub fn to_grid(percent_x: f64, percent_y: f64, grid_size: usize) -> GridCell {
    GridCell {
        row: axis_index(percent_y, grid_size),
        col: axis_index(percent_x, grid_size),
    }
}

fn axis_index(percent: f64, grid_size: usize) -> usize {
    let max = grid_size.saturating_sub(1);
    let scaled = (percent * grid_size as f64 / 100.0).floor();
    // NaN and negatives land on 0
    if !(scaled > 0.0) {
        return 0;
    }
    (scaled as usize).min(max)
}
