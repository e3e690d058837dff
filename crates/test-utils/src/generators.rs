//! Synthetic field values.
//!
//! Every generator is row-major (`row * width + col`) like a decoded GRIB2
//! field scanned west to east, north to south.

/// Cell `(row, col)` holds `col * 1000 + row`, so a transposed or shifted
/// read is obvious.
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    (0..height)
        .flat_map(|row| (0..width).map(move |col| (col * 1000 + row) as f32))
        .collect()
}

/// Cell `k` holds `base + k`, so a stacked array can be checked for frame
/// order by looking at any single cell.
///
/// ```
/// use test_utils::create_frame_grid;
///
/// let frame = create_frame_grid(3, 2, 500.0);
/// assert_eq!(frame, vec![500.0, 501.0, 502.0, 503.0, 504.0, 505.0]);
/// ```
pub fn create_frame_grid(width: usize, height: usize, base: f32) -> Vec<f32> {
    (0..width * height).map(|k| base + k as f32).collect()
}

/// Plausible air temperatures in Kelvin, 250 K in the north-west corner
/// rising towards 310 K in the south-east.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f32> {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    (0..height)
        .flat_map(|row| {
            (0..width).map(move |col| 250.0 + 30.0 * col as f32 / w + 30.0 * row as f32 / h)
        })
        .collect()
}

pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Zeros with NaN at each `(col, row)` listed; out-of-range positions are ignored.
pub fn create_grid_with_nans(width: usize, height: usize, nan_positions: &[(usize, usize)]) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[1], 1000.0);
        assert_eq!(grid[10], 1.0);
        assert_eq!(grid[11], 1001.0);
    }

    #[test]
    fn test_create_frame_grid() {
        let grid = create_frame_grid(4, 4, 3000.0);
        assert_eq!(grid[0], 3000.0);
        assert_eq!(grid[15], 3015.0);
    }

    #[test]
    fn test_temperature_range() {
        let grid = create_temperature_grid(100, 100);
        assert!(grid.iter().all(|t| (250.0..=310.0).contains(t)));
        assert!(grid[0] < grid[99 * 100 + 99]);
    }

    #[test]
    fn test_create_grid_with_nans() {
        let grid = create_grid_with_nans(10, 10, &[(5, 5), (0, 0), (20, 0)]);
        assert!(grid[0].is_nan());
        assert!(grid[55].is_nan());
        assert_eq!(grid.iter().filter(|v| v.is_nan()).count(), 2);
        assert!(create_constant_grid(2, 2, 1.5).iter().all(|&v| v == 1.5));
    }
}
