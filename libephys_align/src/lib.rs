//! # ephys_align
//!
//! ephys_align aligns the channels of an implanted electrophysiology probe to a reference
//! brain atlas and keeps a revisable history of alignment attempts for every probe shank.
//! It takes the channel layout of a recording session and the landmark picks tracing the
//! probe through the tissue, samples the atlas along that track, and writes the brain
//! region of every channel next to the session data.
//!
//! ## Building
//!
//! Build and install the command line tool using `cargo install --path ./ephys_align_cli`
//! from the top level of the repository. Reading the atlas from an HDF5 file is optional;
//! enable it with `--features libephys_align/hdf5`. HDF5 must then be installed on the
//! system (see the hdf5-rust documentation for custom install locations).
//!
//! ## Configuration
//!
//! A session is described by a YAML configuration file. `ephys_align_cli new -p config.yml`
//! writes a template:
//!
//! ```yml
//! session_path: None
//! output_path: null
//! atlas_path: None
//! structure_tree_path: None
//! histology_path: null
//! shank_index: 0
//! ```
//!
//! - `session_path`: directory holding the session data (see below).
//! - `output_path`: directory to write channel locations and new alignments to. If `null`
//!   the session directory is used.
//! - `atlas_path`: directory holding `image.npy`, `label.npy` and `atlas.yml`.
//! - `structure_tree_path`: CSV file of brain regions, with at least the columns `id`,
//!   `acronym` and `name`. A `color_hex_triplet` column sets the region colours.
//! - `histology_path`: optional directory of `.npy` histology volumes registered to the
//!   atlas. Each one is sampled along the probe track together with the atlas.
//! - `shank_index`: the shank to align, starting from 0.
//!
//! ## Session data
//!
//! ```text
//! session/
//! |---- channels.localCoordinates.npy   (N x 2, lateral and axial position; required)
//! |---- *xyz_picks.json                 (single shank probes)
//! |---- *xyz_picks_shank{K}.json        (multi shank probes, one per shank)
//! |---- session_notes.txt               (optional)
//! |---- spike_shank_indices.npy         (optional)
//! |---- unit_shank_indices.npy          (optional)
//! |---- {object}.{attribute}.npy        (spikes, clusters, channels, ephysTimeRms*, ...)
//! ```
//!
//! The picks files hold a JSON object with a single `xyz_picks` key: a list of
//! `[x, y, z]` points in microns.
//!
//! ## Output
//!
//! Probes with a single shank write `channel_locations.json` and `prev_alignments.json`.
//! Multi shank probes suffix both with `_shank{K}`, K starting from 1.
//!
//! ```text
//! channel_locations.json
//! |---- channel_#  - x, y, z, axial, lateral, brain_region_id, brain_region
//! |---- origin     - bregma
//! prev_alignments.json
//! |---- YYYY-MM-DDTHH:MM:SS - [feature, track]
//! ```
//!
//! Both files are written together: they are staged next to their targets and only moved
//! into place once both have been written. The alignment history only ever grows; each
//! commit adds an entry keyed by the local time of the commit.
pub mod atlas;
pub mod config;
pub mod coords;
pub mod error;
pub mod history;
pub mod npy;
pub mod objects;
pub mod regions;
pub mod session;
pub mod shank;
pub mod slice;
pub mod structure_tree;
pub mod transaction;
