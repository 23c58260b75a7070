// The binary only drives a slice of the library surface.
#![allow(dead_code)]

mod auth;
mod cli;
mod engine;
mod errors;
mod events;
mod model;
mod preview;
mod signals;
mod tui;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::engine::{Backend, RequestEngine};
use crate::model::BrowserModel;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // The TUI owns the terminal, so logs go to a file.
    let log_path = std::env::temp_dir().join("s3scope.log");
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("creating log file {}", log_path.display()))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    // First Ctrl+C asks the loop to wind down; a second one force-exits.
    ctrlc::set_handler(move || {
        signals::set_interrupted();
        static SECOND: AtomicBool = AtomicBool::new(false);
        if SECOND.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .ok();

    let profiles = auth::load_profiles();
    if profiles.is_empty() {
        eprintln!("warning: no usable AWS profiles found under ~/.aws");
    }

    let wanted = args
        .profile
        .clone()
        .unwrap_or_else(auth::default_profile_name);
    let initial_index = profiles
        .iter()
        .position(|p| p.name == wanted)
        .unwrap_or(0);
    let initial_profile = profiles.get(initial_index).cloned().unwrap_or_default();

    let engine = Arc::new(
        RequestEngine::with_workers(initial_profile, args.workers)
            .context("starting request engine")?,
    );
    let backend: Arc<dyn Backend> = engine.clone();

    let mut model = BrowserModel::new(backend);
    model.set_profiles(profiles);
    model.select_initial_profile(&wanted);
    model.refresh();
    if let Some(path) = &args.path {
        model.navigate_to(path);
    }

    tui::run(&mut model, &engine)?;
    Ok(())
}
