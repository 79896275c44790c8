use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use rollcam::cli::{self, Args, CaptureOptions, Command};
use rollcam::config::Config;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn run(args: Args) -> rollcam::Result<()> {
    // An explicit --config must parse; a missing one falls back to defaults.
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Cameras { no_probe } => cli::cameras(&config, no_probe),
        Command::Check {
            roster,
            photos,
            json,
            no_report,
        } => cli::check(&config, roster, photos, json, no_report),
        Command::Rename {
            roster,
            dir,
            execute,
            yes,
        } => cli::rename(&config, roster, &dir, execute, yes),
        Command::Deck {
            roster,
            kind,
            images,
            output,
            grid,
        } => cli::deck(&config, roster, kind, images, output, grid),
        Command::Headshots {
            input,
            output,
            pattern,
            scale,
            model,
        } => cli::headshots(&config, input, output, pattern, scale, model),
        Command::Convert { input, output } => cli::convert(&input, &output),
        Command::Capture {
            roster,
            sheet,
            camera,
            output,
            backend,
            photo,
            rotate,
            volume,
            audio_device,
        } => cli::capture(
            &config,
            CaptureOptions {
                roster,
                sheet,
                camera,
                output,
                backend,
                photo,
                rotate,
                volume,
                audio_device,
            },
        ),
        Command::AudioTest { audio_device, output } => cli::audio_test(&config, audio_device, &output),
        Command::Config { action } => cli::handle_config_action(args.config.as_deref(), &config, action),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
