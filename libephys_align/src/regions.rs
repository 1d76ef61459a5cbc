//! Brain region of every channel, the channel locations file, and the commit that writes it
//! together with the alignment history.
use ndarray::{Array2, ArrayView2, Axis};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

use super::atlas::AtlasProvider;
use super::error::{CommitError, ConsistencyFault, RegionError};
use super::history::{
    history_file_name, history_to_json, insert_record, now_timestamp, AlignmentHistory,
    AlignmentRecord,
};
use super::slice::nearest_voxels;
use super::structure_tree::StructureTree;
use super::transaction::CommitTransaction;

const NO_DESCRIPTION: &str = "No information available for this region";

/// Brain region of every channel that landed inside the atlas
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRegions {
    pub ids: Vec<i64>,
    pub acronyms: Vec<String>,
    pub names: Vec<String>,
    /// Channel positions, (n, 3)
    pub xyz: Array2<f64>,
    pub lateral: Vec<f64>,
    pub axial: Vec<f64>,
    pub n_dropped: usize,
}

impl ChannelRegions {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Every per-channel field must have one entry per channel
    pub fn check_lengths(&self) -> Result<(), ConsistencyFault> {
        let expected = self.ids.len();
        let fields = [
            ("acronym", self.acronyms.len()),
            ("name", self.names.len()),
            ("xyz", self.xyz.nrows()),
            ("lateral", self.lateral.len()),
            ("axial", self.axial.len()),
        ];
        for (field, len) in fields {
            if len != expected {
                return Err(ConsistencyFault::FieldLength {
                    field,
                    len,
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// Look up the region of every channel.
///
/// `voxel_coords` are (n, 3) positions already in voxel units, rounded to the nearest voxel.
/// `channel_coords` are the matching (lateral, axial) probe coordinates. Channels outside the
/// volume are dropped from every field.
pub fn assign_regions<A: AtlasProvider + ?Sized>(
    voxel_coords: ArrayView2<f64>,
    channel_coords: ArrayView2<f64>,
    atlas: &A,
    tree: &StructureTree,
) -> Result<ChannelRegions, RegionError> {
    if voxel_coords.ncols() != 3 {
        return Err(RegionError::BadShape(voxel_coords.ncols()));
    }
    if voxel_coords.nrows() != channel_coords.nrows() {
        return Err(ConsistencyFault::ChannelCount(voxel_coords.nrows(), channel_coords.nrows()).into());
    }

    let selection = nearest_voxels(voxel_coords, [1.0, 1.0, 1.0], atlas.shape());
    let label = atlas.label();
    let mut ids = Vec::with_capacity(selection.len());
    let mut acronyms = Vec::with_capacity(selection.len());
    let mut names = Vec::with_capacity(selection.len());
    for voxel in selection.indices.rows() {
        let id = label[[voxel[0], voxel[1], voxel[2]]];
        let row = tree.lookup(id)?;
        ids.push(id);
        acronyms.push(row.acronym.clone());
        names.push(row.name.clone());
    }

    let channels = channel_coords.select(Axis(0), &selection.retained);
    let regions = ChannelRegions {
        ids,
        acronyms,
        names,
        xyz: voxel_coords.select(Axis(0), &selection.retained),
        lateral: channels.column(0).to_vec(),
        axial: channels.column(1).to_vec(),
        n_dropped: selection.n_dropped,
    };
    regions.check_lengths()?;
    Ok(regions)
}

/// One channel entry of the channel locations file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLocation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub axial: f64,
    pub lateral: f64,
    pub brain_region_id: i64,
    pub brain_region: String,
}

#[derive(Serialize)]
struct Origin<'a> {
    bregma: &'a [f64; 3],
}

/// Contents of the channel locations file.
///
/// Serializes as `{"channel_0": {...}, ..., "origin": {"bregma": [x, y, z]}}` with the
/// channels in recording order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLocationRecord {
    pub channels: Vec<ChannelLocation>,
    /// Bregma in microns
    pub bregma: [f64; 3],
}

impl Serialize for ChannelLocationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.channels.len() + 1))?;
        for (idx, channel) in self.channels.iter().enumerate() {
            map.serialize_entry(&format!("channel_{idx}"), channel)?;
        }
        map.serialize_entry(
            "origin",
            &Origin {
                bregma: &self.bregma,
            },
        )?;
        map.end()
    }
}

impl ChannelLocationRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn build_channel_location_record(
    regions: &ChannelRegions,
    bregma: [f64; 3],
) -> ChannelLocationRecord {
    let channels = (0..regions.len())
        .map(|i| ChannelLocation {
            x: regions.xyz[[i, 0]],
            y: regions.xyz[[i, 1]],
            z: regions.xyz[[i, 2]],
            axial: regions.axial[i],
            lateral: regions.lateral[i],
            brain_region_id: regions.ids[i],
            brain_region: regions.acronyms[i].clone(),
        })
        .collect();
    ChannelLocationRecord { channels, bregma }
}

/// Channel locations file name for a shank
pub fn channel_locations_file_name(shank: usize, n_shanks: usize) -> String {
    if n_shanks == 1 {
        String::from("channel_locations.json")
    } else {
        format!("channel_locations_shank{}.json", shank + 1)
    }
}

/// Human readable summary of a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDescription {
    /// "acronym: name"
    pub lookup: String,
    pub description: String,
}

pub fn describe_region(tree: &StructureTree, id: i64) -> Result<RegionDescription, RegionError> {
    let row = tree.lookup(id)?;
    let mut lookup = format!("{}: {}", row.acronym, row.name);
    if lookup == "void: void" {
        lookup = String::from("root: root");
    }
    Ok(RegionDescription {
        description: format!("{lookup}\n{NO_DESCRIPTION}"),
        lookup,
    })
}

/// Write the channel locations and the updated alignment history of a shank together.
///
/// Both files are staged in `output_dir` (created if absent) and moved into place only once
/// both are written. `history` is updated only if the commit succeeds.
pub fn commit_alignment_at(
    record: AlignmentRecord,
    locations: &ChannelLocationRecord,
    history: &mut AlignmentHistory,
    timestamp: String,
    shank: usize,
    n_shanks: usize,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CommitError> {
    let mut updated = history.clone();
    insert_record(&mut updated, timestamp, record);

    let mut transaction = CommitTransaction::new(output_dir)?;
    transaction.stage(
        &channel_locations_file_name(shank, n_shanks),
        locations.to_json()?.as_bytes(),
    )?;
    transaction.stage(
        &history_file_name(shank, n_shanks),
        history_to_json(&updated)?.as_bytes(),
    )?;
    let written = transaction.commit()?;

    *history = updated;
    Ok(written)
}

/// [`commit_alignment_at`] stamped with the current local time
pub fn commit_alignment(
    feature: Vec<f64>,
    track: Vec<f64>,
    locations: &ChannelLocationRecord,
    history: &mut AlignmentHistory,
    shank: usize,
    n_shanks: usize,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CommitError> {
    let record = AlignmentRecord::new(feature, track)?;
    let timestamp = now_timestamp()?;
    commit_alignment_at(record, locations, history, timestamp, shank, n_shanks, output_dir)
}
