use std::{process, sync::Arc};

use clap::Parser;
use log::{error, info};

use notepad::{
    App, Cli, Config, JsonStorage, NotesEngine, PersistenceProvider, PersistenceWorker, Result,
    SystemClock,
};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }

    let storage = JsonStorage::open(&config.data_dir)?;
    let snapshot = storage.load_all()?;
    info!(
        "Loaded {} notes and {} reminders from {}",
        snapshot.notes.len(),
        snapshot.reminders.len(),
        config.data_dir.display()
    );

    let mut engine = NotesEngine::new(config, Arc::new(SystemClock));
    let (worker, mut control) = PersistenceWorker::spawn(storage);
    engine.set_sink(Box::new(worker));
    engine.load(snapshot);

    let mut app = App::new(engine, config_path, cli.verbose);
    let outcome = app.run(cli.command);

    // Writes queued before a failed command still reach disk.
    control.flush().await?;
    control.shutdown().await?;

    let status = control.status();
    info!(
        "Persistence worker applied {} writes, {} failed",
        status.applied, status.failed
    );

    let mut engine = app.into_engine();
    let failures = engine.drain_persistence_failures();
    for failure in &failures {
        eprintln!(
            "Warning: change to note {} was not saved: {}",
            failure.op.note_id(),
            failure.message
        );
    }

    outcome
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");
    if let Err(e) = run(cli).await {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    info!("Application shutting down");
}
