//! Subcommand handlers.
//!
//! Each handler resolves its inputs (CLI flag, then config file, then
//! built-in default), calls into the library and prints a summary.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use super::args::ConfigAction;
use super::enums::{BackendArg, DeckKind};
use crate::camera::{self, CameraSettings, PROBE_LIMIT};
use crate::config::{default_path as get_config_path, Config};
use crate::console::{self, RosterLoader};
use crate::deck::{build_class_deck, DeckLayout};
use crate::error::{Error, Result};
use crate::ffmpeg::{self, EncoderError};
use crate::headshot::{HeadshotExtractor, YuNetDetector};
use crate::matcher::{self, MEDIA_EXTENSIONS};
use crate::recording::{self, Backend, DirectSettings};
use crate::rename::{self as renamer, RenameAction, RenameOutcome};
use crate::report;
use crate::roster::{self, SheetSelector, Student};
use crate::session::{Session, SessionConfig};

fn roster_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    flag.or_else(|| config.roster.path.clone())
        .ok_or_else(|| Error::Usage("No roster given. Use --roster or set [roster] path in the config".to_string()))
}

fn require_ffmpeg() -> Result<()> {
    if ffmpeg::is_available() {
        Ok(())
    } else {
        Err(EncoderError::NotFound.into())
    }
}

fn camera_settings(config: &Config, index: u32) -> CameraSettings {
    CameraSettings {
        device_index: index,
        resolution: config.camera.resolution(),
        fps: config.camera.fps,
    }
}

/// List devices and probe camera indices.
pub fn cameras(config: &Config, no_probe: bool) -> Result<()> {
    require_ffmpeg()?;

    let devices = camera::list_devices()?;
    if devices.is_empty() {
        println!("No named video devices found.");
    } else {
        println!("Video devices:");
        for device in &devices {
            println!("  {}", device);
        }
    }
    match camera::list_audio_devices() {
        Ok(audio) if !audio.is_empty() => {
            println!("Audio devices:");
            for device in audio {
                println!("  [{}] {}", device.index, device.name);
            }
        }
        Ok(_) => {}
        Err(e) => log::warn!("Can't list audio devices: {}", e),
    }

    if no_probe {
        return Ok(());
    }

    println!();
    println!("Probing camera indices 0-{}...", PROBE_LIMIT - 1);
    let found = camera::probe_cameras(PROBE_LIMIT, &camera_settings(config, 0));
    if found.is_empty() {
        println!("No working camera found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
        println!("On macOS, grant access in System Settings > Privacy & Security > Camera.");
    } else {
        println!("Working cameras:");
        for probed in &found {
            println!("  {}", probed);
        }
        println!();
        println!("Use --camera <index> or [camera] index to select one.");
    }
    Ok(())
}

/// Compare the roster against the photo directory.
pub fn check(config: &Config, roster: Option<PathBuf>, photos: Option<PathBuf>, json: bool, no_report: bool) -> Result<()> {
    let roster_path = roster_path(roster, config)?;
    let photo_dir = photos.unwrap_or_else(|| config.deck.photo_dir.clone());

    let classes = roster::load_all(&roster_path)?;
    let photos: HashSet<Student> = matcher::photo_index(&photo_dir)?.into_keys().collect();
    let report = report::find_missing(&classes, &photos);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{:<16} {:>6} {:>6} {:>8} {:>8}", "Class", "Total", "Photo", "Missing", "Done");
        for (class, stats) in &report.classes {
            println!(
                "{:<16} {:>6} {:>6} {:>8} {:>7.1}%",
                class,
                stats.total,
                stats.has_photo,
                stats.missing,
                stats.completion_rate()
            );
        }
        println!();

        if report.missing.is_empty() {
            println!("Every student has a photo.");
        } else {
            println!("Missing photos:");
            for (class, students) in report.missing_by_class() {
                println!("  [{}] {} missing", class, students.len());
                for s in students {
                    println!("    {} {}", s.exam_id, s.name);
                }
            }
        }
        println!();
        println!(
            "Total: {}  With photo: {}  Missing: {}  Completion: {:.1}%",
            report.total(),
            report.has_photo.len(),
            report.missing.len(),
            report.completion_rate()
        );
    }

    if !report.missing.is_empty() && !no_report {
        let path = report.write_to(&photo_dir).map_err(|source| Error::Io {
            path: photo_dir.join(report::REPORT_FILE_NAME),
            source,
        })?;
        if !json {
            println!("Report written to {}", path.display());
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Normalize media file names against the roster.
pub fn rename(config: &Config, roster: Option<PathBuf>, dir: &Path, execute: bool, yes: bool) -> Result<()> {
    let roster_path = roster_path(roster, config)?;
    let classes = roster::load_all(&roster_path)?;
    let names = renamer::name_index(&classes);
    let files = matcher::scan_media(dir, &MEDIA_EXTENSIONS)?;
    let plan = renamer::plan(&files, &names);
    let summary = renamer::summarize_plan(&plan);

    for p in &plan {
        match &p.action {
            RenameAction::AlreadyCorrect => println!("  ok       {}", p.file_name),
            RenameAction::Rename { to } => println!("  rename   {} -> {}", p.file_name, to),
            RenameAction::NotFound { name } => println!("  unknown  {} (no student named '{}')", p.file_name, name),
        }
    }
    println!();
    println!(
        "{} file(s): {} already correct, {} to rename, {} not in roster",
        summary.total, summary.already_correct, summary.renamed, summary.not_found
    );

    if summary.renamed == 0 {
        return Ok(());
    }
    if !execute {
        println!("Dry run. Use --execute to rename.");
        return Ok(());
    }
    if !yes && !confirm(&format!("Rename {} file(s)?", summary.renamed)) {
        println!("Cancelled.");
        return Ok(());
    }

    let (outcomes, applied) = renamer::apply(&plan);
    for outcome in &outcomes {
        match outcome {
            RenameOutcome::Renamed { .. } => {}
            RenameOutcome::Collision { from, to } => println!("  skipped  {} ({} already exists)", from, to),
            RenameOutcome::Failed { from, error } => println!("  failed   {}: {}", from, error),
        }
    }
    println!(
        "Renamed {}, skipped {} collision(s), {} failure(s).",
        applied.renamed, applied.collisions, applied.failed
    );
    Ok(())
}

/// Write one deck per class.
pub fn deck(
    config: &Config,
    roster: Option<PathBuf>,
    kind: DeckKind,
    images: Option<PathBuf>,
    output: Option<PathBuf>,
    grid: Option<(u32, u32)>,
) -> Result<()> {
    let roster_path = roster_path(roster, config)?;
    let classes = roster::load_all(&roster_path)?;
    let out_dir = output.unwrap_or_else(|| config.deck.output_dir.clone());

    let summaries = match kind {
        DeckKind::Photos => {
            let dir = images.unwrap_or_else(|| config.deck.photo_dir.clone());
            let photos = matcher::photo_index(&dir)?;
            println!("Found {} photo(s) in {}", photos.len(), dir.display());
            classes
                .iter()
                .map(|class| {
                    build_class_deck(class, |s| photos.get(s).cloned(), DeckLayout::Single, &out_dir)
                })
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        DeckKind::Headshots => {
            let dir = images.unwrap_or_else(|| config.deck.headshot_dir.clone());
            let headshots = matcher::scan_headshots(&dir)?;
            if headshots.is_empty() {
                println!(
                    "Warning: no headshots found in {}. Run 'rollcam headshots' first; decks will show placeholders.",
                    dir.display()
                );
            } else {
                println!("Found {} headshot(s) in {}", headshots.len(), dir.display());
            }
            let (cols, rows) = grid.unwrap_or((config.deck.cols, config.deck.rows));
            let layout = DeckLayout::Grid { cols, rows };
            classes
                .iter()
                .map(|class| {
                    build_class_deck(class, |s| headshots.get(&s.exam_id).cloned(), layout, &out_dir)
                })
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    println!();
    for s in &summaries {
        println!(
            "  {:<16} {:>3} slide(s), {:>3}/{:<3} with image  {}",
            s.class_label,
            s.slides,
            s.with_image,
            s.students,
            s.path.display()
        );
    }
    let missing: usize = summaries.iter().map(|s| s.without_image()).sum();
    println!();
    println!("Wrote {} deck(s) to {}", summaries.len(), out_dir.display());
    if missing > 0 {
        println!("{} student(s) without an image got a placeholder.", missing);
    }
    Ok(())
}

/// Batch headshot extraction.
pub fn headshots(
    config: &Config,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    pattern: Option<String>,
    scale: Option<f32>,
    model: Option<PathBuf>,
) -> Result<()> {
    let settings = &config.headshot;
    let input = input.unwrap_or_else(|| settings.input_dir.clone());
    let output = output.unwrap_or_else(|| settings.output_dir.clone());
    let pattern = pattern.unwrap_or_else(|| settings.pattern.clone());
    let scale = scale.unwrap_or(settings.scale);
    let model = model.unwrap_or_else(|| settings.model.clone());

    let detector = YuNetDetector::load(&model, settings.threshold)?;
    let extractor = HeadshotExtractor::new(detector, &output, scale);
    let summary = extractor.batch(&input, &pattern)?;

    if summary.total == 0 {
        println!("No files matching '{}' in {}", pattern, input.display());
        return Ok(());
    }
    println!("Found {} image(s), writing to {}", summary.total, output.display());
    for extracted in &summary.extracted {
        println!("  ok      {} ({:.2})", extracted.path.display(), extracted.score);
    }
    println!();
    println!("Succeeded: {}/{}", summary.success_count(), summary.total);
    println!("Failed:    {}/{}", summary.failure_count(), summary.total);
    if !summary.failed.is_empty() {
        println!();
        println!("Failed files:");
        for (name, reason) in &summary.failed {
            println!("  - {} ({})", name, reason);
        }
    }
    Ok(())
}

/// Convert an enrollment export, then re-read the output to verify it.
pub fn convert(input: &Path, output: &Path) -> Result<()> {
    let groups = crate::convert::convert(input, output)?;
    println!("Read {} student(s) in {} class(es)", groups.student_count(), groups.classes.len());
    if groups.skipped_rows > 0 {
        println!("Skipped {} incomplete or header row(s)", groups.skipped_rows);
    }
    println!("Wrote {}", output.display());

    println!();
    println!("Verifying...");
    let written = roster::load_all(output)?;
    let mut total = 0;
    for class in &written {
        println!("  {:<16} {:>4} student(s)", class.class_label, class.students.len());
        total += class.students.len();
    }
    if total == groups.student_count() {
        println!("OK: {} student(s) in {} sheet(s)", total, written.len());
    } else {
        println!(
            "Warning: wrote {} student(s) but read back {}",
            groups.student_count(),
            total
        );
    }
    Ok(())
}

/// Options of the capture subcommand.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub roster: Option<PathBuf>,
    pub sheet: Option<String>,
    pub camera: Option<u32>,
    pub output: Option<PathBuf>,
    pub backend: Option<BackendArg>,
    pub photo: bool,
    pub rotate: bool,
    pub volume: Option<u8>,
    pub audio_device: Option<String>,
}

/// Run the interactive capture session.
pub fn capture(config: &Config, options: CaptureOptions) -> Result<()> {
    require_ffmpeg()?;
    if let Err(e) = ffmpeg::setup_ctrlc_handler() {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    let recording_config = &config.recording;
    let index = options.camera.unwrap_or(config.camera.index);
    let backend = options.backend.map(Backend::from).unwrap_or(recording_config.backend);
    let volume = options.volume.unwrap_or(recording_config.volume);
    let rotate = options.rotate || recording_config.rotate;

    let direct = DirectSettings {
        device_index: index,
        audio_device: options
            .audio_device
            .unwrap_or_else(|| recording_config.audio_device.clone()),
        volume,
        rotate,
        resolution: config.camera.resolution(),
        fps: config.camera.fps,
    };
    let factory = recording::factory(backend, recording_config.output_size(), direct);
    let session_config = SessionConfig {
        output_dir: options
            .output
            .unwrap_or_else(|| recording_config.output_dir.clone()),
        photo_mode: options.photo,
        rotate,
        volume,
    };

    println!("Opening camera {}...", index);
    let opener = camera::ffmpeg_opener(camera_settings(config, index));
    let mut session = Session::open(opener, index, factory, session_config)?;
    println!("Camera {} ready ({:.1} fps), backend: {:?}", index, session.fps(), backend);

    let loader = options
        .roster
        .or_else(|| config.roster.path.clone())
        .map(RosterLoader::new);
    match &loader {
        Some(loader) => {
            let sheet = options.sheet.or_else(|| config.roster.sheet.clone()).unwrap_or_default();
            println!("Loading {}...", loader.path().display());
            loader.request(SheetSelector::parse(&sheet));
        }
        None => println!("No roster given; use --roster to load students."),
    }

    let input = std::io::BufReader::new(std::io::stdin());
    console::run(&mut session, input, loader.as_ref())?;
    Ok(())
}

/// Record a short microphone check.
pub fn audio_test(config: &Config, audio_device: Option<String>, output: &Path) -> Result<()> {
    require_ffmpeg()?;
    let device = audio_device.unwrap_or_else(|| config.recording.audio_device.clone());
    println!(
        "Recording {} seconds of audio{}... speak now",
        recording::direct::AUDIO_TEST_SECONDS,
        if device.is_empty() {
            String::new()
        } else {
            format!(" from '{}'", device)
        }
    );
    let report = recording::audio_test(&device, output)?;
    println!("OK: wrote {} bytes to {}", report.bytes, report.path.display());
    println!("Play it back to check the level and noise filtering.");
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(config_path: Option<&Path>, config: &Config, action: ConfigAction) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    match action {
        ConfigAction::Show => {
            if path.exists() {
                println!("# Config file: {} (exists)", path.display());
            } else {
                println!("# Config file: {} (not found, showing defaults)", path.display());
            }
            println!();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init { force } => {
            Config::default().save(&path, force)?;
            println!("Created config file: {}", path.display());
            println!("Use 'rollcam config show' to view current settings.");
        }
    }
    Ok(())
}
