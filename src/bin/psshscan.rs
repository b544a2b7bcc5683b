use anyhow::Context;
use bmffcues::pssh::{dedupe_with, parse_pssh, scan_boundaries};
use clap::{ArgAction, Parser};
use serde::Serialize;
use std::fs;

#[derive(Parser, Debug)]
#[command(version, about = "Split, de-duplicate and summarize concatenated pssh boxes")]
struct Args {
    /// File holding back-to-back pssh boxes (or an MP4 init segment with --summary)
    path: String,

    /// Also report system ids and key ids of every pssh box found
    #[arg(long, action = ArgAction::SetTrue)]
    summary: bool,

    /// Write the de-duplicated boxes to this file
    #[arg(long = "raw-out")]
    raw_out: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Report {
    size: usize,
    boundaries: Vec<bmffcues::PsshBoundary>,
    deduped_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pssh: Option<Vec<bmffcues::PsshInfo>>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let data = fs::read(&args.path).with_context(|| format!("reading {}", args.path))?;

    let boundaries = scan_boundaries(&data);
    let deduped = dedupe_with(&data, &boundaries);

    if let Some(out) = &args.raw_out {
        fs::write(out, &deduped).with_context(|| format!("writing {}", out))?;
    }

    let pssh = if args.summary {
        Some(parse_pssh(&data).context("parsing pssh boxes")?)
    } else {
        None
    };

    let report = Report {
        size: data.len(),
        deduped_size: deduped.len(),
        boundaries,
        pssh,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
