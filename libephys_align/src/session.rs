//! Editing state for one recording session: probe layout, active shank, alignment history
//! and the session files the alignment works from.
use ndarray::{Array1, Array2, ArrayView2, Ix1, Ix2};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::atlas::{AtlasProvider, VolumeAtlas};
use super::config::Config;
use super::coords::{picks_to_physical_space, picks_to_voxel_space};
use super::error::{CommitError, MissingFileError, SessionError};
use super::history::{
    display_list, load_history, now_timestamp, resolve_entry, AlignmentHistory,
    AlignmentRecord,
};
use super::npy::read_npy_f64;
use super::objects::{load_recording_data, DataStatus, LocalObjectSource, ObjectSource};
use super::regions::{
    assign_regions, build_channel_location_record, commit_alignment_at, describe_region,
    ChannelRegions, RegionDescription,
};
use super::shank::{channels_for_shank, detect_shanks, ShankLayout};
use super::slice::{extract_slice, SliceImages};
use super::structure_tree::StructureTree;

const CHANNEL_COORDS_FILE: &str = "channels.localCoordinates.npy";
const SESSION_NOTES_FILE: &str = "session_notes.txt";
const SPIKE_SHANKS_FILE: &str = "spike_shank_indices.npy";
const UNIT_SHANKS_FILE: &str = "unit_shank_indices.npy";
const NO_NOTES: &str = "No notes for this session";

#[derive(Debug, Deserialize)]
struct PicksFile {
    xyz_picks: Vec<Vec<f64>>,
}

/// Everything loaded for the active shank of a session
#[derive(Debug, Clone)]
pub struct SessionData {
    pub folder: PathBuf,
    /// (lateral, axial) coordinates of the active shank's channels
    pub chn_coords: Array2<f64>,
    pub chn_depths: Array1<f64>,
    pub notes: String,
    pub recordings: BTreeMap<String, DataStatus>,
    pub spike_shanks: Option<Array1<f64>>,
    pub unit_shank_indices: Option<Array1<f64>>,
}

/// Editing state of one recording session with one active shank.
///
/// The atlas and structure tree are shared read-only. The alignment history of the active
/// shank is read on first use and replaced only by [`AlignmentSession::commit`].
pub struct AlignmentSession {
    config: Config,
    chn_coords_all: Array2<f64>,
    layout: ShankLayout,
    shank: usize,
    history: Option<AlignmentHistory>,
    atlas: Arc<dyn AtlasProvider>,
    tree: Arc<StructureTree>,
}

impl std::fmt::Debug for AlignmentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentSession")
            .field("session", &self.config.session_path)
            .field("layout", &self.layout)
            .field("shank", &self.shank)
            .finish()
    }
}

impl AlignmentSession {
    /// Open a session, loading the structure tree and atlas named in the config
    pub fn open(config: Config) -> Result<Self, SessionError> {
        let tree = StructureTree::from_csv_file(&config.structure_tree_path)?;
        let atlas = VolumeAtlas::from_directory(&config.atlas_path, &tree)?;
        Self::with_atlas(config, Arc::new(atlas), Arc::new(tree))
    }

    /// Open a session using an already loaded atlas and structure tree
    pub fn with_atlas(
        config: Config,
        atlas: Arc<dyn AtlasProvider>,
        tree: Arc<StructureTree>,
    ) -> Result<Self, SessionError> {
        let session_dir = config.get_session_directory()?;
        let coords_path = session_dir.join(CHANNEL_COORDS_FILE);
        if !coords_path.exists() {
            return Err(MissingFileError::NotFound(coords_path).into());
        }
        let chn_coords_all = read_npy_f64::<Ix2>(&coords_path)?;
        let layout = detect_shanks(chn_coords_all.view())?;
        layout.bound(config.shank_index)?;
        spdlog::info!(
            "Opened session {} with {} channel(s) on {} shank(s)",
            session_dir.display(),
            chn_coords_all.nrows(),
            layout.n_shanks
        );

        let shank = config.shank_index;
        Ok(Self {
            config,
            chn_coords_all,
            layout,
            shank,
            history: None,
            atlas,
            tree,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_dir(&self) -> &Path {
        &self.config.session_path
    }

    pub fn layout(&self) -> &ShankLayout {
        &self.layout
    }

    pub fn shank_labels(&self) -> &[String] {
        &self.layout.labels
    }

    pub fn n_shanks(&self) -> usize {
        self.layout.n_shanks
    }

    pub fn active_shank(&self) -> usize {
        self.shank
    }

    pub fn atlas(&self) -> &dyn AtlasProvider {
        self.atlas.as_ref()
    }

    pub fn structure_tree(&self) -> &StructureTree {
        &self.tree
    }

    /// Switch the active shank. The history of the new shank is read on next use.
    pub fn set_active_shank(&mut self, shank: usize) -> Result<(), SessionError> {
        self.layout.bound(shank)?;
        if shank != self.shank {
            self.shank = shank;
            self.history = None;
        }
        Ok(())
    }

    /// Channel coordinates of the active shank
    pub fn active_channels(&self) -> Result<Array2<f64>, SessionError> {
        if self.layout.is_multi_shank() {
            Ok(channels_for_shank(
                self.chn_coords_all.view(),
                self.shank,
                &self.layout,
            )?)
        } else {
            Ok(self.chn_coords_all.clone())
        }
    }

    /// History of the active shank: entries found next to the session data, merged with
    /// those already committed to the output directory
    fn history(&mut self) -> Result<&mut AlignmentHistory, SessionError> {
        if self.history.is_none() {
            let (shank, n_shanks) = (self.shank, self.layout.n_shanks);
            let (mut history, _) = load_history(&self.config.session_path, shank, n_shanks)?;
            let output_dir = self.config.get_output_directory();
            if output_dir != self.config.session_path.as_path() {
                let (committed, _) = load_history(output_dir, shank, n_shanks)?;
                history.extend(committed);
            }
            self.history = Some(history);
        }
        Ok(self.history.get_or_insert_with(AlignmentHistory::new))
    }

    /// Previous alignments of the active shank, newest first, ending with "original"
    pub fn previous_alignments(&mut self) -> Result<Vec<String>, SessionError> {
        Ok(display_list(self.history()?))
    }

    /// Alignment at position `idx` of [`AlignmentSession::previous_alignments`].
    ///
    /// `None` is the unaligned original.
    pub fn starting_alignment(
        &mut self,
        idx: usize,
    ) -> Result<Option<AlignmentRecord>, SessionError> {
        let keys = self.previous_alignments()?;
        let key = keys
            .get(idx)
            .ok_or(SessionError::AlignmentIndex(idx, keys.len()))?;
        Ok(resolve_entry(self.history()?, key).cloned())
    }

    fn picks_file(&self) -> Result<PathBuf, SessionError> {
        let suffix = if self.layout.is_multi_shank() {
            format!("xyz_picks_shank{}.json", self.shank + 1)
        } else {
            String::from("xyz_picks.json")
        };
        let dir = self.session_dir();
        let mut matches = Vec::new();
        for item in dir.read_dir()? {
            let path = item?.path();
            let is_match = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(&suffix));
            if is_match {
                matches.push(path);
            }
        }
        if matches.len() != 1 {
            return Err(MissingFileError::MatchCount {
                pattern: format!("*{suffix}"),
                dir: dir.to_path_buf(),
                found: matches.len(),
            }
            .into());
        }
        Ok(matches.remove(0))
    }

    /// Raw landmark picks of the active shank, in microns
    pub fn raw_xyz_picks(&self) -> Result<Array2<f64>, SessionError> {
        let path = self.picks_file()?;
        let picks: PicksFile = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        let n_points = picks.xyz_picks.len();
        if n_points == 0 || picks.xyz_picks.iter().any(|point| point.len() != 3) {
            return Err(SessionError::BadPicks(path));
        }
        let flat: Vec<f64> = picks.xyz_picks.into_iter().flatten().collect();
        Array2::from_shape_vec((n_points, 3), flat).map_err(|_| SessionError::BadPicks(path))
    }

    /// Landmark picks of the active shank in physical atlas coordinates (meters)
    pub fn xyz_picks(&self) -> Result<Array2<f64>, SessionError> {
        let picks = self.raw_xyz_picks()?;
        let voxels = picks_to_voxel_space(picks.view(), self.atlas())?;
        Ok(picks_to_physical_space(voxels.view(), self.atlas())?)
    }

    /// Load the channel coordinates, notes and recording objects of the active shank
    pub fn load_data(&self) -> Result<SessionData, SessionError> {
        self.load_data_from(&LocalObjectSource::new(self.session_dir()))
    }

    /// As [`AlignmentSession::load_data`], reading recording objects from `source`
    pub fn load_data_from<S: ObjectSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<SessionData, SessionError> {
        let dir = self.session_dir();
        let chn_coords = self.active_channels()?;
        let chn_depths = chn_coords.column(1).to_owned();

        let notes_path = dir.join(SESSION_NOTES_FILE);
        let notes = if notes_path.exists() {
            std::fs::read_to_string(notes_path)?
        } else {
            String::from(NO_NOTES)
        };

        let optional_array = |name: &str| -> Result<Option<Array1<f64>>, SessionError> {
            let path = dir.join(name);
            if path.exists() {
                Ok(Some(read_npy_f64::<Ix1>(&path)?))
            } else {
                Ok(None)
            }
        };

        Ok(SessionData {
            folder: dir.to_path_buf(),
            chn_coords,
            chn_depths,
            notes,
            recordings: load_recording_data(source)?,
            spike_shanks: optional_array(SPIKE_SHANKS_FILE)?,
            unit_shank_indices: optional_array(UNIT_SHANKS_FILE)?,
        })
    }

    /// Atlas slices along channels given in physical coordinates (meters)
    pub fn slice_images(&self, xyz_channels: ArrayView2<f64>) -> Result<SliceImages, SessionError> {
        Ok(extract_slice(
            xyz_channels,
            self.atlas(),
            &self.tree,
            self.config.histology_path.as_deref(),
        )?)
    }

    /// Regions of the active shank's channels given in voxel coordinates
    pub fn assign_regions(
        &self,
        xyz_channels: ArrayView2<f64>,
    ) -> Result<ChannelRegions, SessionError> {
        let chn_coords = self.active_channels()?;
        Ok(assign_regions(
            xyz_channels,
            chn_coords.view(),
            self.atlas(),
            &self.tree,
        )?)
    }

    pub fn describe_region(&self, id: i64) -> Result<RegionDescription, SessionError> {
        Ok(describe_region(&self.tree, id)?)
    }

    /// Save channel locations and append the alignment to the active shank's history
    pub fn commit(
        &mut self,
        feature: Vec<f64>,
        track: Vec<f64>,
        xyz_channels: ArrayView2<f64>,
    ) -> Result<Vec<PathBuf>, SessionError> {
        let timestamp = now_timestamp()?;
        self.commit_at(feature, track, xyz_channels, timestamp)
    }

    /// As [`AlignmentSession::commit`], keying the alignment by `timestamp`
    pub fn commit_at(
        &mut self,
        feature: Vec<f64>,
        track: Vec<f64>,
        xyz_channels: ArrayView2<f64>,
        timestamp: String,
    ) -> Result<Vec<PathBuf>, SessionError> {
        let record = AlignmentRecord::new(feature, track).map_err(CommitError::from)?;
        let regions = self.assign_regions(xyz_channels)?;
        let locations = build_channel_location_record(&regions, self.atlas.bregma());
        let output_dir = self.config.get_output_directory().to_path_buf();
        let (shank, n_shanks) = (self.shank, self.layout.n_shanks);
        let history = self.history()?;
        Ok(commit_alignment_at(
            record,
            &locations,
            history,
            timestamp,
            shank,
            n_shanks,
            &output_dir,
        )?)
    }
}
