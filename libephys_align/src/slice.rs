//! Atlas cross-sections along the probe track.
//!
//! Channel positions are snapped to their nearest voxel and the atlas is sampled along
//! axis 0 at every retained (axis 1, axis 2) column, giving one image column per channel.
//! Channels that land outside the volume are dropped; the number dropped is reported so
//! callers can tell when a track mostly leaves the atlas.
use fxhash::FxHashMap;
use ndarray::{s, Array2, Array3, ArrayView2, Ix3};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::atlas::AtlasProvider;
use super::coords::{validate_spacing, MICRONS_PER_METER};
use super::error::SliceError;
use super::npy::read_npy_f32;
use super::structure_tree::StructureTree;

const HISTOLOGY_EXTENSION: &str = "npy";

/// Nearest-voxel indices of a set of points, with out-of-volume points removed
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelSelection {
    /// Retained voxel indices, one row of (axis 0, axis 1, axis 2) per point
    pub indices: Array2<usize>,
    /// Position of each retained row in the input
    pub retained: Vec<usize>,
    pub n_dropped: usize,
}

impl VoxelSelection {
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }
}

/// Snap points to voxel indices: `round(coord * scale)` per axis.
///
/// Rows with any index below zero or at/after the volume edge are dropped. Rounding is
/// half to even.
pub fn nearest_voxels(coords: ArrayView2<f64>, scale: [f64; 3], dims: [usize; 3]) -> VoxelSelection {
    let mut kept: Vec<usize> = Vec::with_capacity(coords.nrows() * 3);
    let mut retained = Vec::with_capacity(coords.nrows());
    'rows: for (row, point) in coords.rows().into_iter().enumerate() {
        let mut voxel = [0usize; 3];
        for axis in 0..3 {
            let index = (point[axis] * scale[axis]).round_ties_even();
            if !(index >= 0.0 && index < dims[axis] as f64) {
                continue 'rows;
            }
            voxel[axis] = index as usize;
        }
        kept.extend_from_slice(&voxel);
        retained.push(row);
    }

    let n_dropped = coords.nrows() - retained.len();
    if n_dropped > 0 {
        spdlog::warn!(
            "{} of {} channel(s) fall outside the atlas volume and were dropped",
            n_dropped,
            coords.nrows()
        );
    }
    let indices = Array2::from_shape_vec((retained.len(), 3), kept)
        .unwrap_or_else(|_| Array2::zeros((0, 3)));
    VoxelSelection {
        indices,
        retained,
        n_dropped,
    }
}

/// Sample a volume along axis 0 at each selected (axis 1, axis 2) column: shape (dim0, n)
pub fn extract_columns<T: Copy + Default>(
    volume: &Array3<T>,
    selection: &VoxelSelection,
) -> Array2<T> {
    let mut columns = Array2::<T>::default((volume.shape()[0], selection.len()));
    for (col, voxel) in selection.indices.rows().into_iter().enumerate() {
        columns
            .column_mut(col)
            .assign(&volume.slice(s![.., voxel[1], voxel[2]]));
    }
    columns
}

/// Replace atlas-native region IDs with structure-tree row indices.
///
/// Only the IDs present in `labels` are looked up.
pub fn remap_labels(
    labels: &Array2<i64>,
    tree: &StructureTree,
) -> Result<Array2<usize>, SliceError> {
    let unique: BTreeSet<i64> = labels.iter().copied().collect();
    let mut mapping = FxHashMap::default();
    for id in unique {
        mapping.insert(id, tree.row_index(id)?);
    }
    Ok(labels.mapv(|id| mapping[&id]))
}

/// Images of the atlas along the probe track
#[derive(Debug, Clone)]
pub struct SliceImages {
    /// Template image, (dim0, n retained channels)
    pub ccf: Array2<f32>,
    /// Structure-tree row of every pixel
    pub label_rows: Array2<usize>,
    /// RGB rendering of the label slice, (dim0, n retained channels, 3)
    pub label: Array3<u8>,
    /// Slice pixel size in voxels along (axis 0, axis 2)
    pub scale: [f64; 2],
    /// Voxel position of the first slice pixel
    pub offset: [f64; 2],
    pub n_dropped: usize,
    /// Secondary-modality slices keyed by file stem
    pub histology: BTreeMap<String, Array2<f32>>,
}

/// Extract image and label slices along channels given in physical coordinates (meters).
///
/// If `histology_dir` is set, every `.npy` volume in it is sampled at the same columns.
pub fn extract_slice<A: AtlasProvider + ?Sized>(
    physical_coords: ArrayView2<f64>,
    atlas: &A,
    tree: &StructureTree,
    histology_dir: Option<&Path>,
) -> Result<SliceImages, SliceError> {
    let spacing = atlas.spacing();
    validate_spacing(spacing)?;
    let scale = spacing.map(|step| MICRONS_PER_METER / step);
    let dims = atlas.shape();
    let selection = nearest_voxels(physical_coords, scale, dims);
    if selection.is_empty() {
        return Err(SliceError::NoChannelsInVolume(selection.n_dropped));
    }

    let ccf = extract_columns(atlas.image(), &selection);
    let label_ids = extract_columns(atlas.label(), &selection);
    let label_rows = remap_labels(&label_ids, tree)?;
    let label = atlas.label_to_rgb(&label_rows);

    let first = selection.indices[[0, 2]] as f64;
    let last = selection.indices[[selection.len() - 1, 2]] as f64;
    let width = dims[0] as f64;
    let scale = [
        width / ccf.shape()[0] as f64,
        (last - first) / ccf.shape()[1] as f64,
    ];
    let offset = [0.0, first];

    let histology = match histology_dir {
        Some(dir) => extract_histology(dir, &selection, dims)?,
        None => BTreeMap::new(),
    };

    Ok(SliceImages {
        ccf,
        label_rows,
        label,
        scale,
        offset,
        n_dropped: selection.n_dropped,
        histology,
    })
}

/// Sample every histology volume in `dir` at the selected columns
pub fn extract_histology(
    dir: &Path,
    selection: &VoxelSelection,
    dims: [usize; 3],
) -> Result<BTreeMap<String, Array2<f32>>, SliceError> {
    let mut paths = Vec::new();
    for item in dir.read_dir()? {
        let path = item?.path();
        if path.extension().is_some_and(|ext| ext == HISTOLOGY_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut slices = BTreeMap::new();
    for path in paths {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let volume = read_npy_f32::<Ix3>(&path)?;
        if volume.shape() != dims {
            return Err(SliceError::HistologyShape(name, volume.shape().to_vec()));
        }
        spdlog::info!("Extracting histology slice from {}", path.display());
        slices.insert(name, extract_columns(&volume, selection));
    }
    Ok(slices)
}
