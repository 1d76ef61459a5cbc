//! Probe geometry: how many shanks a probe has and which channels sit on each.
//!
//! Shanks are separated by a gap in lateral position. Each shank carries two
//! columns of channels, so the sorted unique lateral values pair up into
//! per-shank bounds.
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::collections::BTreeMap;

use super::error::GeometryError;

/// Lateral gap (in probe units, microns) that separates two shanks
pub const SHANK_GAP: f64 = 100.0;

/// Shank count, labels and lateral bounds derived from channel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ShankLayout {
    pub n_shanks: usize,
    /// User facing labels, "i/N" with i starting at 1
    pub labels: Vec<String>,
    /// Inclusive [low, high] lateral bounds keyed by 0-based shank index
    pub bounds: BTreeMap<usize, [f64; 2]>,
}

impl ShankLayout {
    pub fn is_multi_shank(&self) -> bool {
        self.n_shanks > 1
    }

    pub fn bound(&self, shank: usize) -> Result<[f64; 2], GeometryError> {
        self.bounds
            .get(&shank)
            .copied()
            .ok_or(GeometryError::ShankOutOfRange(shank, self.n_shanks))
    }
}

fn validate(coords: &ArrayView2<f64>) -> Result<(), GeometryError> {
    if coords.ncols() != 2 {
        return Err(GeometryError::BadShape(coords.ncols()));
    }
    if coords.nrows() == 0 {
        return Err(GeometryError::Empty);
    }
    if let Some(row) = coords.column(0).iter().position(|x| !x.is_finite()) {
        return Err(GeometryError::NonFinite(row));
    }
    Ok(())
}

/// Sorted, deduplicated lateral coordinates
fn unique_lateral(coords: &ArrayView2<f64>) -> Vec<f64> {
    let mut lateral: Vec<f64> = coords.column(0).to_vec();
    lateral.sort_by(|a, b| a.total_cmp(b));
    lateral.dedup();
    lateral
}

/// Work out the shank layout of a probe from its (lateral, axial) channel coordinates.
///
/// The number of shanks is one more than the number of gaps wider than [`SHANK_GAP`]
/// between neighbouring unique lateral values. Shank `i` is bounded by unique values
/// `2i` and `2i + 1`; the pairing wraps around the value list when a probe has fewer
/// than two columns per shank.
pub fn detect_shanks(coords: ArrayView2<f64>) -> Result<ShankLayout, GeometryError> {
    validate(&coords)?;
    let lateral = unique_lateral(&coords);

    let n_gaps = lateral
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > SHANK_GAP)
        .count();
    let n_shanks = n_gaps + 1;

    let mut bounds = BTreeMap::new();
    if n_shanks == 1 {
        bounds.insert(0, [lateral[0], lateral[lateral.len() - 1]]);
        return Ok(ShankLayout {
            n_shanks,
            labels: vec![String::from("1/1")],
            bounds,
        });
    }

    let n_values = lateral.len();
    for shank in 0..n_shanks {
        let low = lateral[(shank * 2) % n_values];
        let high = lateral[(shank * 2 + 1) % n_values];
        bounds.insert(shank, [low, high]);
    }
    let labels = (1..=n_shanks)
        .map(|shank| format!("{shank}/{n_shanks}"))
        .collect();

    Ok(ShankLayout {
        n_shanks,
        labels,
        bounds,
    })
}

/// Boolean mask of the channels whose lateral coordinate lies inside the shank bound (inclusive)
pub fn channel_mask_for_shank(
    coords: ArrayView2<f64>,
    shank: usize,
    layout: &ShankLayout,
) -> Result<Array1<bool>, GeometryError> {
    validate(&coords)?;
    let [low, high] = layout.bound(shank)?;
    Ok(coords.column(0).mapv(|x| x >= low && x <= high))
}

/// Channel coordinates belonging to one shank, in recording order
pub fn channels_for_shank(
    coords: ArrayView2<f64>,
    shank: usize,
    layout: &ShankLayout,
) -> Result<Array2<f64>, GeometryError> {
    let mask = channel_mask_for_shank(coords, shank, layout)?;
    let rows: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    Ok(coords.select(Axis(0), &rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_single_shank() {
        let coords = array![[43.0, 20.0], [11.0, 20.0], [59.0, 40.0], [27.0, 40.0]];
        let layout = detect_shanks(coords.view()).unwrap();
        assert_eq!(layout.n_shanks, 1);
        assert_eq!(layout.labels, vec!["1/1"]);
        assert!(!layout.is_multi_shank());
        let shank = channels_for_shank(coords.view(), 0, &layout).unwrap();
        assert_eq!(shank, coords);
    }

    #[test]
    fn test_gap_of_exactly_100_is_one_shank() {
        let coords = array![[0.0, 0.0], [100.0, 0.0], [200.0, 0.0]];
        let layout = detect_shanks(coords.view()).unwrap();
        assert_eq!(layout.labels, vec!["1/1"]);
    }

    #[test]
    fn test_two_shanks_partition() {
        let coords = array![
            [0.0, 0.0],
            [32.0, 0.0],
            [0.0, 15.0],
            [32.0, 15.0],
            [250.0, 0.0],
            [282.0, 0.0],
            [250.0, 15.0],
            [282.0, 15.0]
        ];
        let layout = detect_shanks(coords.view()).unwrap();
        assert_eq!(layout.n_shanks, 2);
        assert_eq!(layout.labels, vec!["1/2", "2/2"]);
        assert_eq!(layout.bounds[&0], [0.0, 32.0]);
        assert_eq!(layout.bounds[&1], [250.0, 282.0]);

        let first = channel_mask_for_shank(coords.view(), 0, &layout).unwrap();
        let second = channel_mask_for_shank(coords.view(), 1, &layout).unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(a ^ b, "every channel belongs to exactly one shank");
        }
        assert_eq!(channels_for_shank(coords.view(), 1, &layout).unwrap().nrows(), 4);
    }

    #[test]
    fn test_pairing_wraps_for_single_column_shanks() {
        let coords = array![[0.0, 0.0], [0.0, 50.0], [200.0, 0.0], [200.0, 50.0]];
        let layout = detect_shanks(coords.view()).unwrap();
        assert_eq!(layout.labels, vec!["1/2", "2/2"]);
        assert_eq!(layout.bounds[&0], [0.0, 200.0]);
        assert_eq!(layout.bounds[&1], [0.0, 200.0]);
    }

    #[test]
    fn test_bad_input() {
        let empty = Array2::<f64>::zeros((0, 2));
        assert_eq!(detect_shanks(empty.view()), Err(GeometryError::Empty));
        let wide = Array2::<f64>::zeros((4, 3));
        assert_eq!(detect_shanks(wide.view()), Err(GeometryError::BadShape(3)));
        let coords = array![[0.0, 0.0], [16.0, 0.0]];
        let layout = detect_shanks(coords.view()).unwrap();
        assert_eq!(
            channels_for_shank(coords.view(), 1, &layout),
            Err(GeometryError::ShankOutOfRange(1, 1))
        );
    }
}
