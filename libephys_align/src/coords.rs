//! Transforms between landmark picks (microns), atlas voxel space and physical space (meters).
//!
//! The atlas volumes are stored with axes 0 and 2 running opposite to the anatomical
//! convention used by the picks. Every conversion into voxel space has to apply the same
//! flip the volumes were generated with, otherwise the brain is silently mirrored.
use ndarray::{Array2, ArrayView2};

use super::atlas::AtlasProvider;
use super::error::SpacingError;

/// Microns per meter
pub const MICRONS_PER_METER: f64 = 1e6;

/// Axes stored in reverse index order by the atlas volumes
pub const ATLAS_FLIP_AXES: [bool; 3] = [true, false, true];

/// Check that every spacing component is usable as a divisor
pub fn validate_spacing(spacing: [f64; 3]) -> Result<(), SpacingError> {
    for (axis, value) in spacing.iter().enumerate() {
        if *value == 0.0 || !value.is_finite() {
            return Err(SpacingError::Degenerate {
                axis,
                value: *value,
            });
        }
    }
    Ok(())
}

fn validate_points(points: &ArrayView2<f64>) -> Result<(), SpacingError> {
    if points.ncols() != 3 {
        return Err(SpacingError::BadShape(points.ncols()));
    }
    Ok(())
}

/// Mirror the flagged axes of voxel-space points inside a volume of size `dims`: `v -> dim - v`.
///
/// Applying the same flip twice returns the input.
pub fn flip_axes(points: ArrayView2<f64>, dims: [usize; 3], axes: [bool; 3]) -> Array2<f64> {
    let mut flipped = points.to_owned();
    for (axis, flip) in axes.iter().enumerate() {
        if *flip {
            let dim = dims[axis] as f64;
            flipped.column_mut(axis).mapv_inplace(|v| dim - v);
        }
    }
    flipped
}

/// Fail if any voxel coordinate lies outside `[0, dim]` on its axis
fn check_in_volume(voxels: &Array2<f64>, dims: [usize; 3]) -> Result<(), SpacingError> {
    for (row, point) in voxels.rows().into_iter().enumerate() {
        for (axis, value) in point.iter().enumerate() {
            if !(0.0..=dims[axis] as f64).contains(value) {
                return Err(SpacingError::OutOfVolume {
                    row,
                    axis,
                    value: *value,
                    dim: dims[axis],
                });
            }
        }
    }
    Ok(())
}

/// Convert landmark picks in microns into (flipped) atlas voxel coordinates
pub fn picks_to_voxel_space<A: AtlasProvider + ?Sized>(
    picks: ArrayView2<f64>,
    atlas: &A,
) -> Result<Array2<f64>, SpacingError> {
    validate_points(&picks)?;
    let spacing = atlas.spacing();
    validate_spacing(spacing)?;
    let dims = atlas.shape();

    let mut scaled = picks.to_owned();
    for (axis, step) in spacing.iter().enumerate() {
        scaled.column_mut(axis).mapv_inplace(|v| v / step);
    }
    let voxels = flip_axes(scaled.view(), dims, ATLAS_FLIP_AXES);
    check_in_volume(&voxels, dims)?;
    Ok(voxels)
}

/// Convert voxel coordinates into physical coordinates in meters.
///
/// The axes are not unflipped: physical coordinates stay in the atlas storage frame, so
/// `round(coord * 1e6 / spacing)` recovers the voxel they came from.
pub fn picks_to_physical_space<A: AtlasProvider + ?Sized>(
    voxels: ArrayView2<f64>,
    atlas: &A,
) -> Result<Array2<f64>, SpacingError> {
    validate_points(&voxels)?;
    let spacing = atlas.spacing();
    validate_spacing(spacing)?;
    check_in_volume(&voxels.to_owned(), atlas.shape())?;

    let mut physical = voxels.to_owned();
    for (axis, step) in spacing.iter().enumerate() {
        physical
            .column_mut(axis)
            .mapv_inplace(|v| v * step / MICRONS_PER_METER);
    }
    Ok(physical)
}

/// Exact inverse of [`picks_to_voxel_space`]: unflip and scale back to microns
pub fn voxel_to_picks<A: AtlasProvider + ?Sized>(
    voxels: ArrayView2<f64>,
    atlas: &A,
) -> Result<Array2<f64>, SpacingError> {
    validate_points(&voxels)?;
    let spacing = atlas.spacing();
    validate_spacing(spacing)?;
    let mut picks = flip_axes(voxels, atlas.shape(), ATLAS_FLIP_AXES);
    for (axis, step) in spacing.iter().enumerate() {
        picks.column_mut(axis).mapv_inplace(|v| v * step);
    }
    Ok(picks)
}
