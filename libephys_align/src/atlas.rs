//! Reference atlas volumes and the interface the rest of the crate reads them through.
use ndarray::{Array2, Array3, Ix3};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::coords::validate_spacing;
use super::error::{AtlasError, MissingFileError};
use super::npy::{read_npy_f32, read_npy_i64};
use super::structure_tree::StructureTree;

/// Allen CCF bregma landmark (ML, AP, DV) in microns
pub const ALLEN_CCF_BREGMA_UM: [f64; 3] = [5739.0, 5400.0, 332.0];

const IMAGE_FILE: &str = "image.npy";
const LABEL_FILE: &str = "label.npy";
const META_FILE: &str = "atlas.yml";

/// Capability interface for a reference atlas.
///
/// Provides the template image, the region label volume (same shape, atlas-native region
/// IDs), the voxel spacing in microns and a colour lookup from structure-tree row to RGB.
pub trait AtlasProvider {
    fn image(&self) -> &Array3<f32>;

    fn label(&self) -> &Array3<i64>;

    /// Microns per voxel along each axis
    fn spacing(&self) -> [f64; 3];

    /// Colour for a structure-tree row index
    fn row_color(&self, row: usize) -> [u8; 3];

    /// Anatomical origin in microns
    fn bregma(&self) -> [f64; 3] {
        ALLEN_CCF_BREGMA_UM
    }

    fn shape(&self) -> [usize; 3] {
        let shape = self.image().shape();
        [shape[0], shape[1], shape[2]]
    }

    /// Colour a 2D slice of structure-tree row indices, giving a (rows, cols, 3) RGB image
    fn label_to_rgb(&self, rows: &Array2<usize>) -> Array3<u8> {
        let (n_rows, n_cols) = rows.dim();
        let mut rgb = Array3::<u8>::zeros((n_rows, n_cols, 3));
        for ((r, c), row) in rows.indexed_iter() {
            let color = self.row_color(*row);
            for (channel, value) in color.iter().enumerate() {
                rgb[[r, c, channel]] = *value;
            }
        }
        rgb
    }
}

/// Metadata stored next to the atlas volumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasMeta {
    pub spacing: [f64; 3],
    pub bregma: Option<[f64; 3]>,
}

/// An atlas held entirely in memory
#[derive(Debug, Clone)]
pub struct VolumeAtlas {
    image: Array3<f32>,
    label: Array3<i64>,
    spacing: [f64; 3],
    bregma: [f64; 3],
    palette: Vec<[u8; 3]>,
}

impl VolumeAtlas {
    /// Build an atlas from volumes already in memory. `palette` is indexed by structure-tree row.
    pub fn from_volumes(
        image: Array3<f32>,
        label: Array3<i64>,
        spacing: [f64; 3],
        palette: Vec<[u8; 3]>,
    ) -> Result<Self, AtlasError> {
        if image.shape() != label.shape() {
            return Err(AtlasError::ShapeMismatch(
                image.shape().to_vec(),
                label.shape().to_vec(),
            ));
        }
        validate_spacing(spacing)?;
        Ok(Self {
            image,
            label,
            spacing,
            bregma: ALLEN_CCF_BREGMA_UM,
            palette,
        })
    }

    pub fn with_bregma(mut self, bregma: [f64; 3]) -> Self {
        self.bregma = bregma;
        self
    }

    /// Load `image.npy`, `label.npy` and `atlas.yml` from an atlas directory
    pub fn from_directory(dir: &Path, tree: &StructureTree) -> Result<Self, AtlasError> {
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(MissingFileError::NotFound(meta_path).into());
        }
        let meta: AtlasMeta = serde_yaml::from_str(&std::fs::read_to_string(&meta_path)?)?;

        let image = read_npy_f32::<Ix3>(&dir.join(IMAGE_FILE))?;
        let label = read_npy_i64::<Ix3>(&dir.join(LABEL_FILE))?;
        spdlog::info!(
            "Loaded atlas volumes of shape {:?} with spacing {:?} um from {}",
            image.shape(),
            meta.spacing,
            dir.display()
        );

        let atlas = Self::from_volumes(image, label, meta.spacing, tree.palette())?;
        Ok(match meta.bregma {
            Some(bregma) => atlas.with_bregma(bregma),
            None => atlas,
        })
    }

    /// Load an atlas from an HDF5 file holding `image` and `label` datasets and a
    /// `spacing` attribute on the file root
    #[cfg(feature = "hdf5")]
    pub fn from_hdf5(path: &Path, tree: &StructureTree) -> Result<Self, AtlasError> {
        if !path.exists() {
            return Err(MissingFileError::NotFound(path.to_path_buf()).into());
        }
        let file = hdf5::File::open(path)?;
        let image = file.dataset("image")?.read::<f32, Ix3>()?;
        let label = file.dataset("label")?.read::<i64, Ix3>()?;
        let spacing = file.attr("spacing")?.read_1d::<f64>()?;
        if spacing.len() != 3 {
            return Err(AtlasError::ShapeMismatch(vec![3], vec![spacing.len()]));
        }
        spdlog::info!(
            "Loaded atlas volumes of shape {:?} from {}",
            image.shape(),
            path.display()
        );
        Self::from_volumes(
            image,
            label,
            [spacing[0], spacing[1], spacing[2]],
            tree.palette(),
        )
    }
}

impl AtlasProvider for VolumeAtlas {
    fn image(&self) -> &Array3<f32> {
        &self.image
    }

    fn label(&self) -> &Array3<i64> {
        &self.label
    }

    fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    fn row_color(&self, row: usize) -> [u8; 3] {
        self.palette.get(row).copied().unwrap_or([0, 0, 0])
    }

    fn bregma(&self) -> [f64; 3] {
        self.bregma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure_tree::StructureRow;
    use ndarray::array;

    #[test]
    fn test_shape_mismatch() {
        let result = VolumeAtlas::from_volumes(
            Array3::zeros((2, 2, 2)),
            Array3::zeros((2, 2, 3)),
            [10.0, 10.0, 10.0],
            vec![],
        );
        assert!(matches!(result, Err(AtlasError::ShapeMismatch(_, _))));
    }

    #[test]
    fn test_label_to_rgb() {
        let atlas = VolumeAtlas::from_volumes(
            Array3::zeros((1, 1, 1)),
            Array3::zeros((1, 1, 1)),
            [10.0, 10.0, 10.0],
            vec![[1, 2, 3], [4, 5, 6]],
        )
        .unwrap();
        let rgb = atlas.label_to_rgb(&array![[0usize, 1], [1, 0]]);
        assert_eq!(rgb.dim(), (2, 2, 3));
        assert_eq!(rgb[[0, 1, 2]], 6);
        assert_eq!(rgb[[1, 1, 0]], 1);
    }

    #[test]
    fn test_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let image = Array3::<f32>::from_elem((3, 4, 5), 2.5);
        let label = Array3::<u32>::from_elem((3, 4, 5), 997);
        ndarray_npy::write_npy(dir.path().join(IMAGE_FILE), &image).unwrap();
        ndarray_npy::write_npy(dir.path().join(LABEL_FILE), &label).unwrap();
        std::fs::write(
            dir.path().join(META_FILE),
            "spacing: [25.0, 25.0, 25.0]\nbregma: [1.0, 2.0, 3.0]\n",
        )
        .unwrap();
        let tree = StructureTree::from_rows(vec![StructureRow {
            id: 997,
            acronym: String::from("root"),
            name: String::from("root"),
            row_index: 0,
            rgb: [255, 255, 255],
        }])
        .unwrap();

        let atlas = VolumeAtlas::from_directory(dir.path(), &tree).unwrap();
        assert_eq!(atlas.shape(), [3, 4, 5]);
        assert_eq!(atlas.label()[[2, 3, 4]], 997);
        assert_eq!(atlas.bregma(), [1.0, 2.0, 3.0]);
        assert_eq!(atlas.row_color(0), [255, 255, 255]);
    }
}
