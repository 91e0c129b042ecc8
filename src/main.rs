mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::Path;

use beatgrid::audio::decode;
use beatgrid::audio::onset::SpectralFluxOnsets;
use beatgrid::audio::pitch::McLeodPitchTracker;
use beatgrid::config::{self, Config};
use beatgrid::engine::{CsvAuditLog, DenseClassifier};
use beatgrid::{Capabilities, Engine, TempoSpec};
use cli::{Cli, Mode};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::discover(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };

    // Config values apply only when the CLI is at its default
    if cli.tempo == 120.0 { cli.tempo = cfg.grid.tempo; }
    if cli.bars == 1 { cli.bars = cfg.grid.bars; }
    if cli.model.is_none() { cli.model = cfg.classify.model.clone(); }
    let audit_log = cli.audit_log.clone().unwrap_or_else(|| cfg.classify.audit_log.clone());

    let spec = match cli.mode {
        Mode::Classify => TempoSpec::classification(cli.tempo, cli.bars)?,
        Mode::Pitch => TempoSpec::pitch(cli.tempo, cli.bars)?,
    };

    let engine = build_engine(&cli, &cfg, &audit_log)?;

    log::info!("beatgrid - {:?} at {} BPM, {} bar(s)", cli.mode, cli.tempo, cli.bars);

    let pb = ProgressBar::new(cli.inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(cli.inputs.len());
    let mut failures = 0;
    for input in &cli.inputs {
        pb.set_message(input.display().to_string());
        match analyze(&engine, cli.mode, input, &spec) {
            Ok(value) => results.push(value),
            Err(err) => {
                failures += 1;
                pb.suspend(|| log::error!("{}: {:#}", input.display(), err));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let document = if results.len() == 1 && cli.inputs.len() == 1 {
        results.remove(0)
    } else {
        serde_json::Value::Array(results)
    };
    let text = if cli.pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, text + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }

    if failures > 0 {
        anyhow::bail!("{} of {} file(s) failed", failures, cli.inputs.len());
    }
    Ok(())
}

fn build_engine(cli: &Cli, cfg: &Config, audit_log: &Path) -> Result<Engine> {
    let mut caps = Capabilities::new(
        SpectralFluxOnsets::default(),
        McLeodPitchTracker::new(cfg.pitch.smoothing),
    );

    if let Some(model) = &cli.model {
        caps = caps.with_classifier(DenseClassifier::load(model)?);
    }
    if cli.mode == Mode::Classify && !caps.has_classifier() {
        log::warn!("No classifier model configured (--model or [classify] model)");
    }

    if !cli.no_audit {
        log::info!("Audit log: {}", audit_log.display());
        caps = caps.with_audit(CsvAuditLog::new(audit_log));
    }

    Ok(Engine::new(caps).with_policies(cfg.classify.policy.clone(), cfg.pitch.policy.clone()))
}

fn analyze(engine: &Engine, mode: Mode, input: &Path, spec: &TempoSpec) -> Result<serde_json::Value> {
    let waveform = decode::decode_file(input)?;
    log::info!("{}: {:.2}s of audio", input.display(), waveform.duration());

    let file = input.display().to_string();
    let value = match mode {
        Mode::Classify => {
            let segments = engine.segment_for_classification(&waveform, spec)?;
            json!({ "file": file, "segments": segments })
        }
        Mode::Pitch => {
            let pitch_series = engine.segment_for_pitch(&waveform, spec)?;
            json!({ "file": file, "pitch_series": pitch_series })
        }
    };
    Ok(value)
}
