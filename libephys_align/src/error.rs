use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Channel coordinate array is empty")]
    Empty,
    #[error("Channel coordinate array has {0} columns; expected 2 (lateral, axial)")]
    BadShape(usize),
    #[error("Channel coordinate array contains a non-finite lateral value at row {0}")]
    NonFinite(usize),
    #[error("Shank index {0} is out of range for a probe with {1} shank(s)")]
    ShankOutOfRange(usize, usize),
}

#[derive(Debug, Error)]
pub enum MissingFileError {
    #[error("Required file {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("Expected exactly one file matching {pattern} in {dir:?}, found {found}")]
    MatchCount {
        pattern: String,
        dir: PathBuf,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpacingError {
    #[error("Atlas spacing along axis {axis} is degenerate ({value})")]
    Degenerate { axis: usize, value: f64 },
    #[error("Point {row} axis {axis} maps to voxel coordinate {value}, outside the volume [0, {dim}]")]
    OutOfVolume {
        row: usize,
        axis: usize,
        value: f64,
        dim: usize,
    },
    #[error("Point array has {0} columns; expected 3")]
    BadShape(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Atlas region ID {0} is not present in the structure tree")]
pub struct UnknownRegionError(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyFault {
    #[error("Alignment feature has {0} values but track has {1}")]
    AlignmentLength(usize, usize),
    #[error("Got {0} channel positions but {1} channel coordinates")]
    ChannelCount(usize, usize),
    #[error("Per-channel field {field} has length {len}; expected {expected}")]
    FieldLength {
        field: &'static str,
        len: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("Could not open npy file {0:?} because it does not exist")]
    BadFilePath(PathBuf),
    #[error("Npy read failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Npy read failed to parse array: {0}")]
    ReadError(#[from] ndarray_npy::ReadNpyError),
}

#[derive(Debug, Error)]
pub enum StructureTreeError {
    #[error("StructureTree failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("StructureTree failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
    #[error("StructureTree header is missing required column {0}")]
    MissingColumn(&'static str),
    #[error("StructureTree line {0} has the wrong number of columns")]
    BadFileFormat(usize),
    #[error("StructureTree contains region ID {0} more than once")]
    DuplicateId(i64),
    #[error("StructureTree line {0} has an invalid colour triplet {1}")]
    BadColor(usize, String),
}

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("Atlas failed to load volume: {0}")]
    NpyError(#[from] NpyError),
    #[error("Atlas failed due to missing file: {0}")]
    MissingFile(#[from] MissingFileError),
    #[error("Atlas failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Atlas failed to parse YAML metadata: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Atlas image shape {0:?} does not match label shape {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
    #[error("Atlas has invalid spacing: {0}")]
    Spacing(#[from] SpacingError),
    #[cfg(feature = "hdf5")]
    #[error("Atlas failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("AlignmentHistory failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("AlignmentHistory failed to parse JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
    #[error("AlignmentHistory failed to format timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("AlignmentHistory rejected record: {0}")]
    Consistency(#[from] ConsistencyFault),
}

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("SliceExtractor failed due to spacing error: {0}")]
    Spacing(#[from] SpacingError),
    #[error("SliceExtractor found unknown region: {0}")]
    UnknownRegion(#[from] UnknownRegionError),
    #[error("SliceExtractor found no channel inside the atlas volume ({0} dropped)")]
    NoChannelsInVolume(usize),
    #[error("SliceExtractor failed to load histology volume: {0}")]
    Histology(#[from] NpyError),
    #[error("SliceExtractor failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Histology volume {0} has shape {1:?}, which does not match the atlas")]
    HistologyShape(String, Vec<usize>),
}

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("RegionAssigner found unknown region: {0}")]
    UnknownRegion(#[from] UnknownRegionError),
    #[error("RegionAssigner consistency fault: {0}")]
    Consistency(#[from] ConsistencyFault),
    #[error("RegionAssigner expected voxel coordinates with 3 columns, got {0}")]
    BadShape(usize),
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Commit failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Commit failed to serialize JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
    #[error("Commit failed to persist staged file: {0}")]
    PersistError(#[from] tempfile::PersistError),
    #[error("Commit failed due to history error: {0}")]
    HistoryError(#[from] HistoryError),
    #[error("Commit rejected record: {0}")]
    Consistency(#[from] ConsistencyFault),
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("Object {0} was not found in {1:?}")]
    NotFound(String, PathBuf),
    #[error("Object failed to load attribute: {0}")]
    NpyError(#[from] NpyError),
    #[error("Object lookup failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Session failed due to missing file: {0}")]
    MissingFile(#[from] MissingFileError),
    #[error("Session failed to load structure tree: {0}")]
    StructureTree(#[from] StructureTreeError),
    #[error("Session failed to load atlas: {0}")]
    Atlas(#[from] AtlasError),
    #[error("Session failed due to geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("Session failed to load array: {0}")]
    NpyError(#[from] NpyError),
    #[error("Session failed due to history error: {0}")]
    HistoryError(#[from] HistoryError),
    #[error("Session failed due to spacing error: {0}")]
    Spacing(#[from] SpacingError),
    #[error("Session failed due to slice error: {0}")]
    SliceError(#[from] SliceError),
    #[error("Session failed due to region error: {0}")]
    RegionError(#[from] RegionError),
    #[error("Session failed due to commit error: {0}")]
    CommitError(#[from] CommitError),
    #[error("Session failed due to object error: {0}")]
    ObjectError(#[from] ObjectError),
    #[error("Session failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Session failed to parse picks JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
    #[error("Picks file {0:?} holds a malformed xyz_picks array")]
    BadPicks(PathBuf),
    #[error("Alignment index {0} is out of range ({1} entries available)")]
    AlignmentIndex(usize, usize),
}
