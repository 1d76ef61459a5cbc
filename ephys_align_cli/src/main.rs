use clap::{Arg, ArgMatches, Command};
use ndarray::Array2;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libephys_align::config::Config;
use libephys_align::session::AlignmentSession;

/// Alignment to commit, as written by whatever tool placed the features
#[derive(Debug, Deserialize)]
struct CommitRequest {
    feature: Vec<f64>,
    track: Vec<f64>,
    /// Channel positions in voxel units, one [x, y, z] per channel of the shank
    xyz_channels: Vec<[f64; 3]>,
}

impl CommitRequest {
    fn read(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        }
    }

    fn xyz(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.xyz_channels.len(), 3), |(row, col)| {
            self.xyz_channels[row][col]
        })
    }
}

fn make_template_config(path: &Path) {
    if let Err(e) = Config::default().write_config_file(path) {
        log::error!("Could not create template config file: {e}");
    }
}

fn setup_file_logger() {
    let file_sink = spdlog::sink::FileSink::builder()
        .path(PathBuf::from("./ephys_align.log"))
        .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
            spdlog::formatter::pattern!("[{date_short} {time_short}] - [{^{level}}] - {payload}{eol}"),
        )))
        .truncate(true)
        .build();
    let file_sink = match file_sink {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            log::warn!("Could not open log file, library messages go to stdout: {e}");
            return;
        }
    };
    match spdlog::Logger::builder()
        .flush_level_filter(spdlog::LevelFilter::All)
        .sink(file_sink)
        .build()
    {
        Ok(logger) => spdlog::set_default_logger(Arc::new(logger)),
        Err(e) => log::warn!("Could not create file logger: {e}"),
    }
}

fn print_info(session: &mut AlignmentSession) -> Result<(), String> {
    log::info!("Shanks: {}", session.shank_labels().join(", "));
    log::info!(
        "Active shank: {}",
        session.shank_labels()[session.active_shank()]
    );
    let channels = session.active_channels().map_err(|e| e.to_string())?;
    log::info!("Channels on active shank: {}", channels.nrows());

    let previous = session.previous_alignments().map_err(|e| e.to_string())?;
    log::info!("Previous alignments:");
    for (idx, key) in previous.iter().enumerate() {
        log::info!("  [{idx}] {key}");
    }

    match session.xyz_picks() {
        Ok(picks) => log::info!("Found {} landmark pick(s)", picks.nrows()),
        Err(e) => log::warn!("Landmark picks unavailable: {e}"),
    }
    Ok(())
}

fn run_slice(session: &AlignmentSession) -> Result<(), String> {
    let picks = session.xyz_picks().map_err(|e| e.to_string())?;
    let slice = session
        .slice_images(picks.view())
        .map_err(|e| e.to_string())?;
    let (depth, width) = slice.ccf.dim();
    log::info!("Extracted a {depth} x {width} slice along the picks");
    log::info!(
        "Scale: [{:.3}, {:.3}] Offset: [{}, {}]",
        slice.scale[0],
        slice.scale[1],
        slice.offset[0],
        slice.offset[1]
    );
    if slice.n_dropped > 0 {
        log::warn!("{} pick(s) fell outside the atlas", slice.n_dropped);
    }
    for name in slice.histology.keys() {
        log::info!("Sampled histology volume {name}");
    }
    Ok(())
}

fn run_commit(session: &mut AlignmentSession, request_path: &Path) -> Result<(), String> {
    log::info!("Reading alignment from {}...", request_path.to_string_lossy());
    let request = CommitRequest::read(request_path)?;
    let xyz = request.xyz();
    let written = session
        .commit(request.feature, request.track, xyz.view())
        .map_err(|e| e.to_string())?;
    for path in written {
        log::info!("Wrote {}", path.to_string_lossy());
    }
    Ok(())
}

fn run(matches: &ArgMatches, config: Config) -> Result<(), String> {
    let mut session = AlignmentSession::open(config).map_err(|e| e.to_string())?;
    if let Some(shank) = matches.get_one::<usize>("shank") {
        session
            .set_active_shank(*shank)
            .map_err(|e| e.to_string())?;
    }

    match matches.subcommand() {
        Some(("slice", _)) => run_slice(&session),
        Some(("commit", sub)) => {
            let request = sub
                .get_one::<String>("alignment")
                .ok_or_else(|| String::from("commit requires an alignment file"))?;
            run_commit(&mut session, &PathBuf::from(request))
        }
        _ => print_info(&mut session),
    }
}

fn main() {
    // Only reliable while this is the only thread
    let local_offset = libephys_align::history::capture_local_offset();

    // Create a cli
    let matches = Command::new("ephys_align_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(Command::new("info").about("Show shanks and previous alignments"))
        .subcommand(Command::new("slice").about("Sample the atlas along the landmark picks"))
        .subcommand(
            Command::new("commit")
                .about("Save channel locations and record an alignment")
                .arg(
                    Arg::new("alignment")
                        .short('a')
                        .long("alignment")
                        .required(true)
                        .help("JSON or YAML file with feature, track and xyz_channels"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .global(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("shank")
                .short('s')
                .long("shank")
                .global(true)
                .value_parser(clap::value_parser!(usize))
                .help("Shank to work on, overriding the configuration"),
        )
        .get_matches();

    // Initialize feedback
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logging!");
    setup_file_logger();
    if let Err(e) = local_offset {
        log::warn!("Could not read the local UTC offset, alignments are stamped in UTC: {e}");
    }

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Session Path: {}", config.session_path.to_string_lossy());
    log::info!(
        "Output Path: {}",
        config.get_output_directory().to_string_lossy()
    );
    log::info!("Atlas Path: {}", config.atlas_path.to_string_lossy());
    log::info!(
        "Structure Tree Path: {}",
        config.structure_tree_path.to_string_lossy()
    );
    if let Some(histology) = &config.histology_path {
        log::info!("Histology Path: {}", histology.to_string_lossy());
    }

    match run(&matches, config) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Failed with error: {e}"),
    }
}
