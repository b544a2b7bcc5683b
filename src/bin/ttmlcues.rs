use anyhow::Context;
use bmffcues::{DocumentDecoder, ExtractMode, Mp4TextExtractor, TimeContext};
use clap::{ArgAction, Parser};
use serde::Serialize;
use std::fs;

#[derive(Parser, Debug)]
#[command(version, about = "Extract TTML cues from MP4 (stpp) segments")]
struct Args {
    /// Media segment(s) to extract cues from
    #[arg(required = true)]
    media: Vec<String>,

    /// Initialization segment to validate before extracting
    #[arg(long)]
    init: Option<String>,

    /// Tolerate an initialization segment cut short (progressive download)
    #[arg(long, action = ArgAction::SetTrue)]
    partial: bool,

    /// Decode only the first cue of each segment
    #[arg(long, action = ArgAction::SetTrue)]
    first_cue: bool,

    #[arg(long, default_value_t = 0.0)]
    period_start: f64,

    #[arg(long, default_value_t = 0.0)]
    segment_start: f64,

    #[arg(long, default_value_t = 0.0)]
    segment_end: f64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct SegmentCues {
    path: String,
    cues: Vec<bmffcues::Cue>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let extractor = Mp4TextExtractor::new(DocumentDecoder);

    if let Some(init) = &args.init {
        let data = fs::read(init).with_context(|| format!("reading {}", init))?;
        extractor
            .parse_init(&data, args.partial)
            .with_context(|| format!("checking init segment {}", init))?;
        log::info!("{} declares an stpp track", init);
    }

    let time = TimeContext {
        period_start: args.period_start,
        segment_start: args.segment_start,
        segment_end: args.segment_end,
    };
    let mode = if args.first_cue {
        ExtractMode::FirstCue
    } else {
        ExtractMode::Full
    };

    let mut out = Vec::with_capacity(args.media.len());
    for path in &args.media {
        let data = fs::read(path).with_context(|| format!("reading {}", path))?;
        let cues = extractor
            .parse_media(&data, &time, mode)
            .with_context(|| format!("extracting cues from {}", path))?;
        out.push(SegmentCues {
            path: path.clone(),
            cues,
        });
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
