use std::{path::PathBuf, process};

use anyhow::{Context, anyhow};
use clap::Parser;
use log::info;

use rigshift::asset::{load_clip_file, load_skeleton_file, save_clip};
use rigshift::logging::{LogLevel, ResultExt, init_logging};
use rigshift::mapping::{BoneMap, BoneMapStore, SavedBoneMap, load_bone_map_file};
use rigshift::pipeline::{RetargetResult, retarget_animation, write_report};
use rigshift::pose::ReferencePose;
use rigshift::settings::{RetargetSettings, load_settings};
use rigshift::{RetargetError, exit_code_for};

/// Retarget a skeletal animation clip from one skeleton to another.
#[derive(Debug, Parser)]
#[command(name = "retarget", version, about)]
struct Cli {
    /// Skeleton the clip was authored for (.json, .gltf, .glb).
    #[arg(long)]
    source: PathBuf,
    /// Skeleton that should play the clip.
    #[arg(long)]
    target: PathBuf,
    /// File holding the source clip.
    #[arg(long)]
    clip: PathBuf,
    /// Clip to pick from a library or glTF file.
    #[arg(long)]
    clip_name: Option<String>,
    /// Saved bone map file; without it a map is generated from bone names.
    #[arg(long)]
    map: Option<PathBuf>,
    /// Settings file; explicit flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Normalize both skeletons to a reference pose before binding.
    #[arg(long)]
    apply_tpose: bool,
    /// Use the A-pose as reference instead of the T-pose.
    #[arg(long)]
    a_pose: bool,
    /// Include the skeletons' parent transforms in the bind frames.
    #[arg(long)]
    embed_transforms: bool,
    /// Emit root translation keys scaled to the target's proportions.
    /// Off unless given here or enabled in the settings file.
    #[arg(long, conflicts_with = "no_root_motion")]
    preserve_root_motion: bool,
    /// Drop root translation keys even when the settings file enables them.
    #[arg(long)]
    no_root_motion: bool,
    /// Write the retarget report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Store the applied bone map under this name.
    #[arg(long, requires = "map_dir")]
    save_map: Option<String>,
    /// Directory of saved bone maps.
    #[arg(long)]
    map_dir: Option<PathBuf>,
    #[arg(long, value_parser = LogLevel::parse)]
    log_level: Option<LogLevel>,
    /// Output clip (.json).
    #[arg(long)]
    out: PathBuf,
}

/// A failed run and the exit code it maps to.
struct Failure {
    code: i32,
    error: anyhow::Error,
}

impl Failure {
    fn bad_input(error: anyhow::Error) -> Self {
        Self { code: 2, error }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        let code = error
            .downcast_ref::<RetargetError>()
            .map(|e| exit_code_for(e.kind()))
            .unwrap_or(2);
        Self { code, error }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(failure) = run(cli) {
        eprintln!("{:#}", failure.error);
        process::exit(failure.code);
    }
}

fn run(cli: Cli) -> Result<(), Failure> {
    let mut settings = match &cli.config {
        Some(path) => load_settings(path).map_err(Failure::bad_input)?,
        None => RetargetSettings::default(),
    };
    apply_flags(&cli, &mut settings);
    init_logging(settings.log_level);

    let source = load_skeleton_file(&cli.source).map_err(Failure::bad_input)?;
    let target = load_skeleton_file(&cli.target).map_err(Failure::bad_input)?;
    let clip = load_clip_file(&cli.clip, cli.clip_name.as_deref()).map_err(Failure::bad_input)?;
    info!(
        "loaded '{}' ({} bones), '{}' ({} bones), clip '{}' ({} tracks)",
        source.name,
        source.len(),
        target.name,
        target.len(),
        clip.name,
        clip.tracks.len()
    );

    let map_dir = cli
        .map_dir
        .clone()
        .or_else(|| settings.map_dir.as_ref().map(PathBuf::from));
    let saved_map = match (&cli.map, &settings.map_name, &map_dir) {
        (Some(path), _, _) => Some(load_bone_map_file(path).map_err(Failure::bad_input)?),
        (None, Some(name), Some(dir)) => {
            Some(BoneMapStore::new(dir).load(name).map_err(Failure::bad_input)?)
        }
        (None, Some(name), None) => {
            return Err(Failure::bad_input(anyhow!(
                "settings name bone map '{}' but no map directory is set",
                name
            )));
        }
        (None, None, _) => None,
    };
    let map = saved_map
        .as_ref()
        .map(|saved| BoneMap::from_names(&saved.mapping, &source, &target))
        .transpose()
        .log_error(Some("bone map"))
        .context("failed to apply bone map")?;

    let result = retarget_animation(&source, &target, &clip, map.as_ref(), &settings.options)
        .log_error(Some("retarget"))
        .context("retargeting failed")?;

    save_clip(&cli.out, &result.clip)?;
    if let Some(path) = &cli.report {
        write_report(path, &result.report)?;
    }
    if let Some(name) = &cli.save_map {
        let dir = map_dir.ok_or_else(|| anyhow!("--save-map needs --map-dir"))?;
        let saved = SavedBoneMap::new(
            name.as_str(),
            result.report.source_rig,
            result.report.target_rig,
            result.map.to_names(&source, &target),
            result.report.confidence,
        );
        let path = BoneMapStore::new(dir).save(&saved)?;
        println!("Saved bone map: {}", path.display());
    }

    print_summary(&result);
    Ok(())
}

fn apply_flags(cli: &Cli, settings: &mut RetargetSettings) {
    let options = &mut settings.options;
    if cli.apply_tpose || cli.a_pose {
        options.apply_t_pose = true;
    }
    if cli.a_pose {
        options.reference_pose = ReferencePose::A;
    }
    if cli.embed_transforms {
        options.embed_source_world = true;
        options.embed_target_world = true;
    }
    if cli.preserve_root_motion {
        options.preserve_root_motion = true;
    }
    if cli.no_root_motion {
        options.preserve_root_motion = false;
    }
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
}

fn print_summary(result: &RetargetResult) {
    let report = &result.report;
    println!("Clip: {}", result.clip.name);
    println!(
        "Rigs: {} -> {} (confidence {:.2})",
        report.source_rig.as_str(),
        report.target_rig.as_str(),
        report.confidence
    );
    println!(
        "Mapped bones: {}, proportion ratio {:.4}",
        report.mapped_bones, report.proportion_ratio
    );
    println!(
        "Tracks: {} emitted, {} dropped",
        report.emitted_tracks,
        report.dropped_tracks.len()
    );
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
}
