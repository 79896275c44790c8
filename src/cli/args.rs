//! CLI argument parsing with clap.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{BackendArg, DeckKind};

/// Parse and validate microphone volume (0-100)
pub fn parse_volume(s: &str) -> Result<u8, String> {
    let volume: u8 = s.parse().map_err(|_| format!("'{}' is not a valid volume", s))?;
    if volume > 100 {
        return Err(format!("Volume must be between 0 and 100, got {}", volume));
    }
    Ok(volume)
}

/// Parse and validate a deck grid (COLSxROWS format)
pub fn parse_grid(s: &str) -> Result<(u32, u32), String> {
    let (cols, rows) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Invalid grid format '{}'. Use COLSxROWS (e.g., 6x4)", s))?;
    let cols: u32 = cols
        .parse()
        .map_err(|_| format!("Invalid column count '{}' in grid", cols))?;
    let rows: u32 = rows
        .parse()
        .map_err(|_| format!("Invalid row count '{}' in grid", rows))?;
    if !(1..=12).contains(&cols) || !(1..=12).contains(&rows) {
        return Err(format!("Grid must be between 1x1 and 12x12, got {}x{}", cols, rows));
    }
    Ok((cols, rows))
}

/// Parse and validate the headshot crop scale (0.5-5.0)
pub fn parse_scale(s: &str) -> Result<f32, String> {
    let scale: f32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(0.5..=5.0).contains(&scale) {
        return Err(format!("Scale must be between 0.5 and 5.0, got {}", scale));
    }
    Ok(scale)
}

/// rollcam: classroom photo and video capture toolkit
#[derive(Parser, Debug)]
#[command(name = "rollcam")]
#[command(version, about = "Classroom roster photo and video capture toolkit")]
#[command(long_about = "Capture one photo or video per student from a class roster \
    spreadsheet, check which students are still missing, normalize file names, \
    build per-class slide decks and extract headshots.")]
#[command(after_help = "EXAMPLES:
    # Record one video per student of the second sheet
    rollcam capture --roster students.xlsx --sheet 1

    # Who still needs a photo?
    rollcam check --roster students.xlsx --photos photos/

    # Preview, then apply file renames
    rollcam rename --roster students.xlsx --dir photos/ --execute

    # Headshots, then a 6x4 headshot deck per class
    rollcam headshots --input photos/
    rollcam deck --roster students.xlsx --kind headshots --grid 6x4")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List named capture devices and probe which camera indices work
    #[command(after_help = "EXAMPLES:
    rollcam cameras              # Devices and probed cameras
    rollcam cameras --no-probe   # Device names only")]
    Cameras {
        /// Skip opening each camera index
        #[arg(long)]
        no_probe: bool,
    },

    /// Report roster students without a photo
    #[command(after_help = "EXAMPLES:
    rollcam check --roster students.xlsx --photos photos/
    rollcam check --roster students.xlsx --json > missing.json")]
    Check {
        /// Roster workbook (default: [roster] path)
        #[arg(long, short)]
        roster: Option<PathBuf>,
        /// Directory of `<exam_id>_<name>.png` photos (default: [deck] photo_dir)
        #[arg(long, short)]
        photos: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Don't write missing_students.txt
        #[arg(long)]
        no_report: bool,
    },

    /// Rename media files to `<exam_id>_<name>.<ext>` using the roster
    #[command(after_help = "EXAMPLES:
    rollcam rename --roster students.xlsx --dir photos/              # Dry run
    rollcam rename --roster students.xlsx --dir photos/ --execute    # Preview, confirm, apply
    rollcam rename --roster students.xlsx --dir photos/ --execute -y # Apply without asking")]
    Rename {
        /// Roster workbook (default: [roster] path)
        #[arg(long, short)]
        roster: Option<PathBuf>,
        /// Directory holding the png/mp4 files
        #[arg(long, short, default_value = ".")]
        dir: PathBuf,
        /// Actually rename (default is a dry run)
        #[arg(long)]
        execute: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Build one slide deck per class
    #[command(after_help = "EXAMPLES:
    rollcam deck --roster students.xlsx                            # One photo per slide
    rollcam deck --roster students.xlsx --kind headshots --grid 5x4")]
    Deck {
        /// Roster workbook (default: [roster] path)
        #[arg(long, short)]
        roster: Option<PathBuf>,
        /// Photos or headshots
        #[arg(long, short, default_value = "photos")]
        kind: DeckKind,
        /// Image directory (default: [deck] photo_dir or headshot_dir)
        #[arg(long, short)]
        images: Option<PathBuf>,
        /// Output directory (default: [deck] output_dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Headshot grid COLSxROWS (default: [deck] cols x rows)
        #[arg(long, value_parser = parse_grid)]
        grid: Option<(u32, u32)>,
    },

    /// Crop the most confident face out of each photo
    #[command(after_help = "EXAMPLES:
    rollcam headshots --input photos/
    rollcam headshots --input photos/ --pattern '*.jpg' --scale 2.0

Output files are named after the id before the first '_' in the source name.")]
    Headshots {
        /// Input directory (default: [headshot] input_dir)
        #[arg(long, short)]
        input: Option<PathBuf>,
        /// Output directory (default: cuted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// File name pattern (default: *.png)
        #[arg(long, short)]
        pattern: Option<String>,
        /// Crop side relative to the face box (default: 1.8)
        #[arg(long, short, value_parser = parse_scale)]
        scale: Option<f32>,
        /// YuNet ONNX model (default: [headshot] model)
        #[arg(long, short)]
        model: Option<PathBuf>,
    },

    /// Convert a raw enrollment export into a per-class roster workbook
    #[command(after_help = "EXAMPLES:
    rollcam convert enrollment.xlsx students.xlsx")]
    Convert {
        /// Enrollment workbook
        input: PathBuf,
        /// Roster workbook to write
        output: PathBuf,
    },

    /// Interactive capture session: record or photograph each student
    #[command(after_help = "EXAMPLES:
    rollcam capture --roster students.xlsx --sheet Class3
    rollcam capture --roster students.xlsx --photo --camera 1
    rollcam capture --roster students.xlsx --backend direct --volume 70

COMMANDS (while running):
    r  record / stop (photo mode: snapshot)   n, p  next / previous
    m  toggle photo mode    o  rotate 180°    c N   switch camera
    l S  load sheet         v N  volume       i  status    q  quit")]
    Capture {
        /// Roster workbook (default: [roster] path)
        #[arg(long, short)]
        roster: Option<PathBuf>,
        /// Sheet index or name to start with
        #[arg(long, short)]
        sheet: Option<String>,
        /// Camera device index (from `rollcam cameras`)
        #[arg(long)]
        camera: Option<u32>,
        /// Output directory for videos and snapshots
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Recording backend
        #[arg(long, short)]
        backend: Option<BackendArg>,
        /// Start in photo mode
        #[arg(long)]
        photo: bool,
        /// Rotate 180°
        #[arg(long)]
        rotate: bool,
        /// Microphone volume 0-100 (direct backend)
        #[arg(long, value_parser = parse_volume)]
        volume: Option<u8>,
        /// Audio device name (direct backend)
        #[arg(long)]
        audio_device: Option<String>,
    },

    /// Record a few seconds of audio to check the microphone
    #[command(after_help = "EXAMPLES:
    rollcam audio-test
    rollcam audio-test --audio-device \"MacBook Pro Microphone\"")]
    AudioTest {
        /// Audio device name (default: [recording] audio_device)
        #[arg(long)]
        audio_device: Option<String>,
        /// Where to write audio_test.aac
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume() {
        assert_eq!(parse_volume("0"), Ok(0));
        assert_eq!(parse_volume("100"), Ok(100));
        assert!(parse_volume("101").is_err());
        assert!(parse_volume("-1").is_err());
        assert!(parse_volume("loud").is_err());
    }

    #[test]
    fn test_parse_grid() {
        assert_eq!(parse_grid("6x4"), Ok((6, 4)));
        assert_eq!(parse_grid("5X4"), Ok((5, 4)));
        assert!(parse_grid("6").is_err());
        assert!(parse_grid("0x4").is_err());
        assert!(parse_grid("6x13").is_err());
        assert!(parse_grid("axb").is_err());
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale("1.8"), Ok(1.8));
        assert!(parse_scale("0.1").is_err());
        assert!(parse_scale("wide").is_err());
    }

    #[test]
    fn test_global_flags() {
        let args = Args::parse_from(["rollcam", "-vv", "cameras", "--config", "/tmp/c.toml"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(args.command, Command::Cameras { no_probe: false }));
    }

    #[test]
    fn test_check_subcommand() {
        let args = Args::parse_from(["rollcam", "check", "-r", "s.xlsx", "--photos", "p", "--json"]);
        match args.command {
            Command::Check {
                roster,
                photos,
                json,
                no_report,
            } => {
                assert_eq!(roster, Some(PathBuf::from("s.xlsx")));
                assert_eq!(photos, Some(PathBuf::from("p")));
                assert!(json);
                assert!(!no_report);
            }
            other => panic!("Expected Check, got {:?}", other),
        }
    }

    #[test]
    fn test_rename_defaults_to_dry_run() {
        let args = Args::parse_from(["rollcam", "rename"]);
        match args.command {
            Command::Rename {
                roster,
                dir,
                execute,
                yes,
            } => {
                assert!(roster.is_none());
                assert_eq!(dir, PathBuf::from("."));
                assert!(!execute);
                assert!(!yes);
            }
            other => panic!("Expected Rename, got {:?}", other),
        }
    }

    #[test]
    fn test_deck_headshots_grid() {
        let args = Args::parse_from(["rollcam", "deck", "--kind", "headshots", "--grid", "5x4"]);
        match args.command {
            Command::Deck { kind, grid, .. } => {
                assert_eq!(kind, DeckKind::Headshots);
                assert_eq!(grid, Some((5, 4)));
            }
            other => panic!("Expected Deck, got {:?}", other),
        }
    }

    #[test]
    fn test_deck_rejects_bad_grid() {
        assert!(Args::try_parse_from(["rollcam", "deck", "--grid", "big"]).is_err());
    }

    #[test]
    fn test_capture_options() {
        let args = Args::parse_from([
            "rollcam", "capture", "--sheet", "Class3", "--camera", "1", "--backend", "direct", "--photo",
            "--volume", "70",
        ]);
        match args.command {
            Command::Capture {
                sheet,
                camera,
                backend,
                photo,
                rotate,
                volume,
                ..
            } => {
                assert_eq!(sheet.as_deref(), Some("Class3"));
                assert_eq!(camera, Some(1));
                assert_eq!(backend, Some(BackendArg::Direct));
                assert!(photo);
                assert!(!rotate);
                assert_eq!(volume, Some(70));
            }
            other => panic!("Expected Capture, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_rejects_loud_volume() {
        assert!(Args::try_parse_from(["rollcam", "capture", "--volume", "150"]).is_err());
    }

    #[test]
    fn test_convert_positionals() {
        let args = Args::parse_from(["rollcam", "convert", "in.xlsx", "out.xlsx"]);
        match args.command {
            Command::Convert { input, output } => {
                assert_eq!(input, PathBuf::from("in.xlsx"));
                assert_eq!(output, PathBuf::from("out.xlsx"));
            }
            other => panic!("Expected Convert, got {:?}", other),
        }
    }

    #[test]
    fn test_config_subcommands() {
        let args = Args::parse_from(["rollcam", "config", "show"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));

        let args = Args::parse_from(["rollcam", "config", "init", "--force"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["rollcam"]).is_err());
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
