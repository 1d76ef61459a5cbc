use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::ObjectError;
use super::npy::read_npy_f64;

/// Attributes of a recording object, e.g. `spikes.times`, `spikes.depths`
pub type LabeledObject = BTreeMap<String, ArrayD<f64>>;

/// Object name of a file name stem part, with any `_{namespace}_` prefix removed
fn object_name(part: &str) -> &str {
    match part.strip_prefix('_').and_then(|rest| rest.split_once('_')) {
        Some((_, object)) => object,
        None => part,
    }
}

/// Source of named recording objects. Reports `ObjectError::NotFound` when an object is absent.
pub trait ObjectSource {
    fn load_object(&self, name: &str) -> Result<LabeledObject, ObjectError>;
}

/// Reads objects stored as `[_{namespace}_]{object}.{attribute}[.{extra}].npy` files in one directory
#[derive(Debug, Clone)]
pub struct LocalObjectSource {
    dir: PathBuf,
}

impl LocalObjectSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl ObjectSource for LocalObjectSource {
    fn load_object(&self, name: &str) -> Result<LabeledObject, ObjectError> {
        let mut object = LabeledObject::new();
        if !self.dir.exists() {
            return Err(ObjectError::NotFound(name.to_string(), self.dir.clone()));
        }
        for item in self.dir.read_dir()? {
            let path = item?.path();
            let file_name = match path.file_name() {
                Some(f) => f.to_string_lossy().into_owned(),
                None => continue,
            };
            let parts: Vec<&str> = file_name.split('.').collect();
            if parts.len() < 3 || object_name(parts[0]) != name || parts[parts.len() - 1] != "npy" {
                continue;
            }
            object.insert(parts[1].to_string(), read_npy_f64::<IxDyn>(&path)?);
        }

        if object.is_empty() {
            Err(ObjectError::NotFound(name.to_string(), self.dir.clone()))
        } else {
            Ok(object)
        }
    }
}

/// Result of trying to load one recording object
#[derive(Debug, Clone, PartialEq)]
pub enum DataStatus {
    Available {
        object: LabeledObject,
        /// Axis label for time-resolved objects
        x_axis: Option<&'static str>,
    },
    Unavailable,
}

impl DataStatus {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// (data key, object name) pairs loaded for every session
pub const RECORDING_OBJECTS: [(&str, &str); 9] = [
    ("spikes", "spikes"),
    ("clusters", "clusters"),
    ("channels", "channels"),
    ("rms_AP", "ephysTimeRmsAP"),
    ("rms_LF", "ephysTimeRmsLF"),
    ("rms_AP_main", "ephysTimeRmsAPMain"),
    ("rms_LF_main", "ephysTimeRmsLFMain"),
    ("psd_lf", "ephysSpectralDensityLF"),
    ("psd_lf_main", "ephysSpectralDensityLFMain"),
];

/// Data types the plots expect but that are never produced locally
pub const UNAVAILABLE_KEYS: [&str; 3] = ["rf_map", "pass_stim", "gabor"];

const RMS_X_AXIS: &str = "Time (s)";

/// Load every recording object, marking absent ones unavailable.
///
/// Other load errors still propagate.
pub fn load_recording_data<S: ObjectSource + ?Sized>(
    source: &S,
) -> Result<BTreeMap<String, DataStatus>, ObjectError> {
    let mut data = BTreeMap::new();
    for (key, name) in RECORDING_OBJECTS {
        let status = match source.load_object(name) {
            Ok(object) => DataStatus::Available {
                object,
                x_axis: key.contains("rms").then_some(RMS_X_AXIS),
            },
            Err(ObjectError::NotFound(..)) => {
                spdlog::warn!("{key} data was not found, some plots will not display");
                DataStatus::Unavailable
            }
            Err(e) => return Err(e),
        };
        data.insert(key.to_string(), status);
    }
    for key in UNAVAILABLE_KEYS {
        data.insert(key.to_string(), DataStatus::Unavailable);
    }
    Ok(data)
}
