use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use narration_kit::audio::FfmpegCodec;
use narration_kit::config::Config;
use narration_kit::measure::{measure_durations, MeasurementReport};
use narration_kit::publish::{publish, PublishOptions};
use narration_kit::scene::{render_plan, timing_plan};
use narration_kit::synthesis::{synthesize_narration, NarrationJob};
use narration_kit::tts::{create_synthesizer, SpeechRate};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use yt_upload::{parse_tags, Category, Privacy, UploadError};

const DEFAULT_FILTER: &str = "narration_kit=info,yt_upload=info,warn";

fn build_cli() -> Command {
    let voice = Arg::new("voice")
        .long("voice")
        .value_name("VOICE")
        .help("TTS voice name (e.g. ja-JP-NanamiNeural)");
    let rate = Arg::new("rate")
        .long("rate")
        .value_name("RATE")
        .allow_hyphen_values(true)
        .help("Speaking rate such as +0% or -20%");

    Command::new("narration-kit")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Narration synthesis, timing and YouTube publishing for explainer videos")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: search for narration-kit.toml)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("generate")
                .about("Synthesize the configured cues into one narration track")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output audio file"),
                )
                .arg(voice.clone())
                .arg(rate.clone())
                .arg(
                    Arg::new("duration-ms")
                        .long("duration-ms")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64))
                        .help("Total track length in milliseconds"),
                ),
        )
        .subcommand(
            Command::new("measure")
                .about("Measure how long each narration line takes to speak")
                .arg(voice)
                .arg(rate)
                .arg(
                    Arg::new("animation-secs")
                        .long("animation-secs")
                        .value_name("SECS")
                        .value_parser(clap::value_parser!(f64))
                        .help("Animation time per section; prints self.wait() hints"),
                )
                .arg(
                    Arg::new("texts")
                        .value_name("TEXT")
                        .num_args(0..)
                        .help("Lines to measure (default: [measure] texts from config)"),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a finished video to YouTube")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .help("Video file to upload"),
                )
                .arg(
                    Arg::new("title")
                        .long("title")
                        .value_name("TITLE")
                        .required(true)
                        .help("Video title"),
                )
                .arg(
                    Arg::new("description")
                        .long("description")
                        .value_name("TEXT")
                        .default_value("")
                        .help("Video description"),
                )
                .arg(
                    Arg::new("tags")
                        .long("tags")
                        .value_name("TAGS")
                        .default_value("")
                        .help("Comma-separated tags"),
                )
                .arg(
                    Arg::new("privacy")
                        .long("privacy")
                        .value_name("STATUS")
                        .value_parser(["private", "unlisted", "public"])
                        .default_value("private")
                        .help("Privacy status"),
                )
                .arg(
                    Arg::new("category")
                        .long("category")
                        .value_name("ID|NAME")
                        .default_value("22")
                        .help("Category id or name (22 = People & Blogs, 27 = education)"),
                )
                .arg(
                    Arg::new("publish-at")
                        .long("publish-at")
                        .value_name("ISO8601")
                        .help("Scheduled publish time, e.g. 2025-01-15T15:30:00Z"),
                )
                .arg(
                    Arg::new("credentials")
                        .long("credentials")
                        .value_name("PATH")
                        .default_value(yt_upload::credentials::DEFAULT_CREDENTIALS_NAME)
                        .help("OAuth client secrets file"),
                )
                .arg(
                    Arg::new("playlist")
                        .long("playlist")
                        .value_name("ID")
                        .help("Playlist to add the video to"),
                ),
        )
}

fn init_logging(verbose: bool) {
    let filter = if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        let level = std::env::var("NARRATION_LOG_LEVEL")
            .map(|level| format!("narration_kit={level},yt_upload={level},warn"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let explicit = matches.get_one::<String>("config").map(PathBuf::from);
    let config = Config::load(explicit.as_deref())?;
    debug!("{}", config.summary());
    Ok(config)
}

/// Apply `--voice` and `--rate` on top of the configured voice
fn apply_voice_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(voice) = matches.get_one::<String>("voice") {
        config.tts.voice = voice.clone();
    }
    if let Some(rate) = matches.get_one::<String>("rate") {
        config.tts.rate = rate.parse::<SpeechRate>()?;
    }
    Ok(())
}

async fn run_generate(mut config: Config, matches: &ArgMatches) -> Result<()> {
    apply_voice_overrides(&mut config, matches)?;
    if let Some(output) = matches.get_one::<String>("output") {
        config.narration.output = PathBuf::from(output);
    }
    if let Some(duration_ms) = matches.get_one::<u64>("duration-ms") {
        config.narration.total_duration_ms = *duration_ms;
    }
    config.validate()?;

    if config.narration.cues.is_empty() {
        warn!("No [narration] cues configured, the output will be silent");
    }

    let tts = create_synthesizer(&config.tts)?;
    let codec = FfmpegCodec::new(config.narration.bitrate.clone());
    let job = NarrationJob::from_config(&config);

    let report = synthesize_narration(&job, tts.as_ref(), &codec).await?;
    let truncated = report.truncated_cues().count();
    if truncated > 0 {
        warn!("{} cue(s) were cut off at the end of the track", truncated);
    }

    println!("Next step, combine the narration with the rendered video:");
    println!("  {}", mux_command(&report.output));

    Ok(())
}

/// ffmpeg invocation that lays the narration under a rendered video
fn mux_command(narration: &Path) -> String {
    format!(
        "ffmpeg -i video.mp4 -i {} -c:v copy -c:a aac \
         -map 0:v:0 -map 1:a:0 -shortest output.mp4 -y",
        narration.display()
    )
}

async fn run_measure(mut config: Config, matches: &ArgMatches) -> Result<()> {
    apply_voice_overrides(&mut config, matches)?;
    config.validate()?;

    let texts: Vec<String> = match matches.get_many::<String>("texts") {
        Some(values) => values.cloned().collect(),
        None => config.measure.texts.clone(),
    };
    if texts.is_empty() {
        bail!("Nothing to measure: pass TEXT arguments or set [measure] texts in the config");
    }

    let tts = create_synthesizer(&config.tts)?;
    let codec = FfmpegCodec::new(config.narration.bitrate.clone());
    let voice = config.tts.voice_settings();

    let sample_rate = config.narration.sample_rate;
    let measurements = measure_durations(&texts, &voice, tts.as_ref(), &codec, sample_rate).await?;
    let report = MeasurementReport::new(&measurements);

    println!("{}", report.table());
    println!("Cues for [narration] in narration-kit.toml:");
    println!("cues = [");
    print!("{}", report.cue_list());
    println!("]");

    let animation_secs = matches
        .get_one::<f64>("animation-secs")
        .copied()
        .or(config.measure.animation_secs);
    if let Some(animation_secs) = animation_secs {
        println!();
        print!("{}", render_plan(&timing_plan(&measurements, animation_secs)));
    }

    Ok(())
}

async fn run_upload(config: Config, matches: &ArgMatches) -> Result<()> {
    let string_arg = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();

    let options = PublishOptions {
        file: PathBuf::from(string_arg("file")),
        title: string_arg("title"),
        description: string_arg("description"),
        tags: parse_tags(&string_arg("tags")),
        privacy: string_arg("privacy").parse::<Privacy>()?,
        category: string_arg("category").parse::<Category>()?,
        publish_at: matches.get_one::<String>("publish-at").cloned(),
        credentials: PathBuf::from(string_arg("credentials")),
        playlist: matches.get_one::<String>("playlist").cloned(),
    };

    // The uploader logs the details; stdout carries just the URL for scripts
    let result = publish(&options, &config.upload).await?;
    println!("{}", result.url);

    Ok(())
}

async fn run(matches: ArgMatches) -> Result<()> {
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("generate", sub)) => run_generate(config, sub).await,
        Some(("measure", sub)) => run_measure(config, sub).await,
        Some(("upload", sub)) => run_upload(config, sub).await,
        _ => bail!("Unknown command"),
    }
}

/// Line printed to stderr when a command fails
fn failure_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<UploadError>() {
        Some(upload_err) if upload_err.is_api_error() => {
            format!("❌ YouTube API Error: {}", upload_err)
        }
        _ => format!("❌ Error: {:#}", error),
    }
}

/// Process exit status and the stderr line, if any
fn outcome(result: Result<()>) -> (u8, Option<String>) {
    match result {
        Ok(()) => (0, None),
        Err(e) => (1, Some(failure_message(&e))),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    info!("🚀 narration-kit starting...");

    let (code, message) = outcome(run(matches).await);
    if let Some(message) = message {
        eprintln!("{}", message);
    }
    ExitCode::from(code)
}
