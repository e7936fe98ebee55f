use clap::{Parser, Subcommand};
use evolart::image_io::{self, SnapshotSchedule};
use evolart::{Coordinator, CoordinatorOptions, Elite, LocalPool, Peer, Pipeline, Settings, StopCondition};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "evolve")]
#[command(about = "Approximate an image with evolving translucent shapes", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML settings file; omitted fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Image to approximate.
    #[arg(long, global = true)]
    target: Option<PathBuf>,
    /// Where snapshots are written.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    /// Worker threads (default: one per core).
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Hold the shared elite and serve it to peers.
    Coordinator {
        #[arg(long)]
        listen: Option<String>,
        /// Re-score returned genomes instead of trusting peers.
        #[arg(long)]
        verify: bool,
    },
    /// Work for a coordinator.
    Peer {
        #[arg(long)]
        addr: Option<String>,
        /// Trials per worker between exchanges.
        #[arg(long)]
        batch: Option<usize>,
        /// Reconnect after this many seconds when the session ends.
        #[arg(long)]
        reconnect: Option<u64>,
    },
    /// Search alone, in this process.
    Local {
        #[arg(long)]
        rounds: Option<u64>,
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn settings(cli: &Cli) -> evolart::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(target) = &cli.target {
        settings.target = target.clone();
    }
    if let Some(output) = &cli.output {
        settings.output = output.clone();
    }
    if cli.workers.is_some() {
        settings.workers = cli.workers;
    }
    match &cli.mode {
        Mode::Coordinator { listen, verify } => {
            if let Some(listen) = listen {
                settings.listen = listen.clone();
            }
            settings.verify_scores |= *verify;
        }
        Mode::Peer { addr, batch, .. } => {
            if let Some(addr) = addr {
                settings.coordinator = addr.clone();
            }
            if let Some(batch) = batch {
                settings.batch_size = *batch;
            }
        }
        Mode::Local { .. } => {}
    }
    settings.validate()?;
    Ok(settings)
}

fn pipeline(settings: &Settings) -> evolart::Result<Arc<Pipeline>> {
    let target = image_io::load_target(&settings.target, settings.fallback_size);
    info!(
        "target {}: {}x{}",
        settings.target.display(),
        target.width(),
        target.height()
    );
    let pipeline = Pipeline::new(
        Arc::new(target),
        settings.mutation.clone(),
        settings.weights,
    )?;
    let background = pipeline.background();
    info!(
        "average background color: R{} G{} B{}",
        background.r, background.g, background.b
    );
    Ok(Arc::new(pipeline))
}

fn run_coordinator(settings: &Settings) -> evolart::Result<()> {
    let options = CoordinatorOptions {
        snapshots: SnapshotSchedule::new(settings.save_every, settings.output.clone()),
        verify_scores: settings.verify_scores,
    };
    let coordinator = Coordinator::bind(settings.listen.as_str(), pipeline(settings)?, options)?;
    coordinator.save_snapshot();
    coordinator.serve()
}

fn run_peer(settings: &Settings, reconnect: Option<u64>) -> evolart::Result<()> {
    let pool = LocalPool::new(pipeline(settings)?, settings.worker_count())?;
    let peer = Peer::new(pool, settings.batch_size);

    loop {
        let result = peer.connect(settings.coordinator.as_str());
        let delay = match reconnect {
            Some(secs) => Duration::from_secs(secs),
            None => return result.map(|_| ()),
        };
        if let Err(e) = result {
            warn!("session with {} ended: {}", settings.coordinator, e);
        }
        info!("reconnecting in {}s", delay.as_secs());
        thread::sleep(delay);
    }
}

fn run_local(settings: &Settings, rounds: Option<u64>, seconds: Option<u64>) -> evolart::Result<()> {
    let pipeline = pipeline(settings)?;
    let pool = LocalPool::new(Arc::clone(&pipeline), settings.worker_count())?;
    info!("searching locally with {} workers", pool.workers());

    let snapshots = SnapshotSchedule::new(settings.save_every, settings.output.clone());
    let seed = pipeline.seed();
    snapshots.save(seed.rendering());
    let elite = Elite::new(seed);

    let stop = StopCondition {
        max_rounds: rounds,
        time_budget: seconds.map(Duration::from_secs),
    };
    let summary = pool.evolve(&elite, stop, |candidate, improvements| {
        snapshots.maybe_save(improvements, candidate.rendering());
    })?;

    snapshots.save(elite.snapshot_with_rendering().rendering());
    info!(
        "done after {} rounds: {} improvements, score {:.0}",
        summary.rounds, summary.accepted, summary.score
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = settings(&cli).and_then(|settings| match cli.mode {
        Mode::Coordinator { .. } => run_coordinator(&settings),
        Mode::Peer { reconnect, .. } => run_peer(&settings, reconnect),
        Mode::Local { rounds, seconds } => run_local(&settings, rounds, seconds),
    });

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
