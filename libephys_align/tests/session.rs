use libephys_align::atlas::{AtlasProvider, VolumeAtlas};
use libephys_align::config::Config;
use libephys_align::error::{MissingFileError, SessionError};
use libephys_align::history::ORIGINAL;
use libephys_align::session::AlignmentSession;
use libephys_align::structure_tree::StructureTree;
use ndarray::{array, Array2, Array3};
use std::path::Path;
use std::sync::Arc;

const TREE_CSV: &str = "\
id,acronym,name,color_hex_triplet
0,void,void,000000
997,root,root,FFFFFF
315,Isocortex,Isocortex,70FF71
";

fn tree() -> StructureTree {
    StructureTree::from_csv_str(TREE_CSV).unwrap()
}

/// 20^3 voxels at 10um; label 315 where axis 2 < 10, root elsewhere
fn atlas(tree: &StructureTree) -> VolumeAtlas {
    let image = Array3::from_shape_fn((20, 20, 20), |(i, j, k)| (i + j + k) as f32);
    let label = Array3::from_shape_fn((20, 20, 20), |(_, _, k)| if k < 10 { 315 } else { 997 });
    VolumeAtlas::from_volumes(image, label, [10.0, 10.0, 10.0], tree.palette()).unwrap()
}

fn write_session(dir: &Path, coords: &Array2<f64>) {
    ndarray_npy::write_npy(dir.join("channels.localCoordinates.npy"), coords).unwrap();
}

fn write_picks(path: &Path) {
    std::fs::write(
        path,
        r#"{"xyz_picks": [[50.0, 100.0, 50.0], [50.0, 100.0, 150.0]]}"#,
    )
    .unwrap();
}

fn config_for(dir: &Path) -> Config {
    Config {
        session_path: dir.to_path_buf(),
        ..Config::default()
    }
}

fn single_shank_coords() -> Array2<f64> {
    array![[0.0, 0.0], [16.0, 0.0], [0.0, 20.0], [16.0, 20.0]]
}

fn open(config: Config) -> AlignmentSession {
    let tree = tree();
    let atlas = atlas(&tree);
    AlignmentSession::with_atlas(config, Arc::new(atlas), Arc::new(tree)).unwrap()
}

#[test]
fn single_shank_session_starts_unaligned() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    let mut session = open(config_for(dir.path()));

    assert_eq!(session.shank_labels(), &["1/1"]);
    assert_eq!(session.previous_alignments().unwrap(), vec![ORIGINAL]);
    assert_eq!(session.starting_alignment(0).unwrap(), None);
    assert!(matches!(
        session.starting_alignment(1),
        Err(SessionError::AlignmentIndex(1, 1))
    ));
}

#[test]
fn picks_are_flipped_into_atlas_frame() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    write_picks(&dir.path().join("probe00_xyz_picks.json"));
    let session = open(config_for(dir.path()));

    let picks = session.xyz_picks().unwrap();
    // (50, 100, 50) um -> voxel (5, 10, 5) -> flipped (15, 10, 15) -> meters
    let expected = array![[150e-6, 100e-6, 150e-6], [150e-6, 100e-6, 50e-6]];
    for (a, b) in picks.iter().zip(expected.iter()) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    let slice = session.slice_images(picks.view()).unwrap();
    assert_eq!(slice.ccf.dim(), (20, 2));
    assert_eq!(slice.n_dropped, 0);
    assert_eq!(slice.offset, [0.0, 15.0]);
}

#[test]
fn multi_shank_picks_need_exactly_one_match() {
    let dir = tempfile::tempdir().unwrap();
    let coords = array![
        [0.0, 0.0],
        [32.0, 0.0],
        [250.0, 0.0],
        [282.0, 0.0],
        [0.0, 20.0],
        [282.0, 20.0]
    ];
    write_session(dir.path(), &coords);
    let mut config = config_for(dir.path());
    config.shank_index = 1;
    let mut session = open(config);
    assert_eq!(session.shank_labels(), &["1/2", "2/2"]);
    assert_eq!(session.active_channels().unwrap().nrows(), 3);

    match session.xyz_picks() {
        Err(SessionError::MissingFile(MissingFileError::MatchCount { found, .. })) => {
            assert_eq!(found, 0)
        }
        other => panic!("unexpected result {other:?}"),
    }

    write_picks(&dir.path().join("a_xyz_picks_shank2.json"));
    write_picks(&dir.path().join("b_xyz_picks_shank2.json"));
    write_picks(&dir.path().join("a_xyz_picks_shank1.json"));
    match session.xyz_picks() {
        Err(SessionError::MissingFile(MissingFileError::MatchCount { found, .. })) => {
            assert_eq!(found, 2)
        }
        other => panic!("unexpected result {other:?}"),
    }

    session.set_active_shank(0).unwrap();
    assert!(session.xyz_picks().is_ok());
    assert!(session.set_active_shank(2).is_err());
}

#[test]
fn missing_channel_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let tree = tree();
    let atlas = atlas(&tree);
    match AlignmentSession::with_atlas(config_for(dir.path()), Arc::new(atlas), Arc::new(tree)) {
        Err(SessionError::MissingFile(MissingFileError::NotFound(path))) => {
            assert!(path.ends_with("channels.localCoordinates.npy"))
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn commit_writes_locations_and_history() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    let mut session = open(config_for(dir.path()));

    let xyz = array![
        [15.0, 10.0, 2.0],
        [15.0, 10.0, 4.0],
        [15.0, 10.0, 12.0],
        [15.0, 10.0, 14.0]
    ];
    let written = session
        .commit(vec![0.0, 1.5, 3.0], vec![0.0, 1.0, 3.0], xyz.view())
        .unwrap();
    assert_eq!(written.len(), 2);

    let locations: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("channel_locations.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(locations["channel_0"]["brain_region"], "Isocortex");
    assert_eq!(locations["channel_3"]["brain_region_id"], 997);
    assert_eq!(locations["channel_3"]["axial"], 20.0);
    assert_eq!(locations["channel_1"]["lateral"], 16.0);
    assert_eq!(
        locations["origin"]["bregma"],
        serde_json::json!([5739.0, 5400.0, 332.0])
    );

    let keys = session.previous_alignments().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[1], ORIGINAL);
    let record = session.starting_alignment(0).unwrap().unwrap();
    assert_eq!(record.feature(), &[0.0, 1.5, 3.0]);

    // a fresh session reads the same history back from disk
    let mut reopened = open(config_for(dir.path()));
    assert_eq!(reopened.previous_alignments().unwrap(), keys);
}

#[test]
fn commit_creates_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    let mut config = config_for(dir.path());
    let output = dir.path().join("results").join("alignment");
    config.output_path = Some(output.clone());
    let mut session = open(config);

    let xyz = array![[1.0, 1.0, 1.0], [1.0, 1.0, 2.0], [1.0, 1.0, 3.0], [1.0, 1.0, 4.0]];
    session.commit(vec![1.0], vec![2.0], xyz.view()).unwrap();
    assert!(output.join("channel_locations.json").exists());
    assert!(output.join("prev_alignments.json").exists());
    assert!(!dir.path().join("prev_alignments.json").exists());
}

#[test]
fn sessions_sharing_an_output_directory_keep_every_alignment() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    std::fs::write(
        dir.path().join("prev_alignments.json"),
        r#"{"2023-01-01T00:00:00": [[0.5], [0.5]]}"#,
    )
    .unwrap();
    let output = dir.path().join("out");
    let config = Config {
        output_path: Some(output.clone()),
        ..config_for(dir.path())
    };
    let xyz = array![[1.0, 1.0, 1.0], [1.0, 1.0, 2.0], [1.0, 1.0, 3.0], [1.0, 1.0, 4.0]];

    let mut first = open(config.clone());
    first
        .commit_at(vec![1.0], vec![1.0], xyz.view(), String::from("2024-01-01T00:00:00"))
        .unwrap();

    let mut second = open(config);
    assert_eq!(
        second.previous_alignments().unwrap(),
        vec!["2024-01-01T00:00:00", "2023-01-01T00:00:00", ORIGINAL]
    );
    second
        .commit_at(vec![2.0], vec![2.0], xyz.view(), String::from("2024-01-02T00:00:00"))
        .unwrap();

    let on_disk: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output.join("prev_alignments.json")).unwrap(),
    )
    .unwrap();
    let keys: Vec<&String> = on_disk.as_object().unwrap().keys().collect();
    assert_eq!(
        keys,
        vec!["2023-01-01T00:00:00", "2024-01-01T00:00:00", "2024-01-02T00:00:00"]
    );
    // the session copy is read, never rewritten
    let session_copy = std::fs::read_to_string(dir.path().join("prev_alignments.json")).unwrap();
    assert!(!session_copy.contains("2024"));
}

#[test]
fn commit_rejects_unequal_alignment() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    let mut session = open(config_for(dir.path()));
    let xyz = array![[1.0, 1.0, 1.0], [1.0, 1.0, 2.0], [1.0, 1.0, 3.0], [1.0, 1.0, 4.0]];
    assert!(session.commit(vec![1.0, 2.0], vec![2.0], xyz.view()).is_err());
    assert!(!dir.path().join("channel_locations.json").exists());
    assert_eq!(session.previous_alignments().unwrap(), vec![ORIGINAL]);
}

#[test]
fn load_data_reads_optional_files() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &single_shank_coords());
    std::fs::write(dir.path().join("session_notes.txt"), "deep track").unwrap();
    ndarray_npy::write_npy(
        dir.path().join("spike_shank_indices.npy"),
        &array![0i64, 0, 0],
    )
    .unwrap();
    ndarray_npy::write_npy(dir.path().join("clusters.depths.npy"), &array![10.0, 20.0]).unwrap();
    let session = open(config_for(dir.path()));

    let data = session.load_data().unwrap();
    assert_eq!(data.notes, "deep track");
    assert_eq!(data.chn_depths.to_vec(), vec![0.0, 0.0, 20.0, 20.0]);
    assert_eq!(data.spike_shanks.unwrap().len(), 3);
    assert!(data.unit_shank_indices.is_none());
    assert!(data.recordings["clusters"].exists());
    assert!(!data.recordings["spikes"].exists());
}

#[test]
fn open_reads_tree_and_atlas_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let session_dir = dir.path().join("session");
    let atlas_dir = dir.path().join("atlas");
    std::fs::create_dir_all(&session_dir).unwrap();
    std::fs::create_dir_all(&atlas_dir).unwrap();
    write_session(&session_dir, &single_shank_coords());

    let tree_path = dir.path().join("structure_tree.csv");
    std::fs::write(&tree_path, TREE_CSV).unwrap();
    let reference = atlas(&tree());
    ndarray_npy::write_npy(atlas_dir.join("image.npy"), reference.image()).unwrap();
    ndarray_npy::write_npy(atlas_dir.join("label.npy"), reference.label()).unwrap();
    std::fs::write(atlas_dir.join("atlas.yml"), "spacing: [10.0, 10.0, 10.0]\nbregma: null\n").unwrap();

    let config = Config {
        session_path: session_dir,
        atlas_path: atlas_dir,
        structure_tree_path: tree_path,
        ..Config::default()
    };
    let session = AlignmentSession::open(config).unwrap();
    assert_eq!(session.atlas().shape(), [20, 20, 20]);
    assert_eq!(session.structure_tree().len(), 3);
    assert_eq!(
        session.describe_region(315).unwrap().lookup,
        "Isocortex: Isocortex"
    );
}
