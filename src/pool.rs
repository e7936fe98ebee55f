//! A fixed set of worker threads, each with its own scratch canvas and RNG,
//! fed one [`Job`] per round over a crossbeam channel.

use crate::candidate::{Candidate, Pipeline};
use crate::elite::{Elite, Offer};
use crate::error::{Error, Result};
use crate::shape::Genome;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Work handed to one worker: its own copy of the baseline genome.
#[derive(Clone, Debug)]
pub struct Job {
    pub genome: Genome,
    pub score: f64,
    /// Trials to run before reporting. 1 is the plain single-mutation round.
    pub trials: usize,
}

/// What a worker sends back for one job.
#[derive(Debug)]
pub struct Outcome {
    pub candidate: Candidate,
    /// Whether `candidate` strictly beat the job's baseline.
    pub improved: bool,
}

/// When [`LocalPool::evolve`] should return. With neither limit set it runs
/// until the process is stopped.
#[derive(Copy, Clone, Debug, Default)]
pub struct StopCondition {
    pub max_rounds: Option<u64>,
    pub time_budget: Option<Duration>,
}

impl StopCondition {
    fn reached(&self, rounds: u64, started: Instant) -> bool {
        self.max_rounds.map_or(false, |max| rounds >= max)
            || self.time_budget.map_or(false, |budget| started.elapsed() >= budget)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EvolveSummary {
    pub rounds: u64,
    pub accepted: u64,
    pub score: f64,
}

pub struct LocalPool {
    jobs: Option<Sender<Job>>,
    // `None` is sent by a worker that panicked mid-job.
    results: Receiver<Option<Outcome>>,
    handles: Vec<JoinHandle<()>>,
    broken: AtomicBool,
}

impl LocalPool {
    pub fn new(pipeline: Arc<Pipeline>, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let (job_sender, job_receiver) = channel::bounded::<Job>(workers);
        let (result_sender, result_receiver) = channel::bounded::<Option<Outcome>>(workers);

        let handles = (0..workers)
            .map(|id| {
                let pipeline = Arc::clone(&pipeline);
                let jobs = job_receiver.clone();
                let results = result_sender.clone();
                thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn(move || work(&pipeline, jobs, results))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self {
            jobs: Some(job_sender),
            results: result_receiver,
            handles,
            broken: AtomicBool::new(false),
        })
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Broadcasts `base` to every worker, waits for all of them, and returns
    /// the best reported candidate if it strictly beat `base`.
    ///
    /// Once a worker has died every later round fails with
    /// [`Error::PoolClosed`].
    pub fn round(&self, base: &Candidate, trials: usize) -> Result<Option<Candidate>> {
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        let jobs = self.jobs.as_ref().ok_or(Error::PoolClosed)?;
        for _ in 0..self.workers() {
            jobs.send(Job {
                genome: base.genome().clone(),
                score: base.score(),
                trials,
            })
            .map_err(|_| Error::PoolClosed)?;
        }

        let mut best: Option<Candidate> = None;
        for _ in 0..self.workers() {
            let outcome = match self.results.recv() {
                Ok(Some(outcome)) => outcome,
                Ok(None) | Err(_) => {
                    error!("a pool worker died; the pool is closed");
                    self.broken.store(true, Ordering::Release);
                    return Err(Error::PoolClosed);
                }
            };
            if !outcome.improved {
                continue;
            }
            if best.as_ref().map_or(true, |b| outcome.candidate.beats(b)) {
                best = Some(outcome.candidate);
            }
        }
        Ok(best.filter(|b| b.beats(base)))
    }

    /// Repeats single-trial rounds against `elite` until `stop` trips,
    /// calling `on_accept` after each replacement.
    pub fn evolve<F>(&self, elite: &Elite, stop: StopCondition, mut on_accept: F) -> Result<EvolveSummary>
    where
        F: FnMut(&Candidate, u64),
    {
        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut rounds = 0;
        let mut accepted = 0;

        while !stop.reached(rounds, started) {
            let base = elite.snapshot();
            rounds += 1;

            if let Some(winner) = self.round(&base, 1)? {
                let kept = winner.clone();
                if let Offer::Accepted { improvements, .. } = elite.offer(winner) {
                    accepted += 1;
                    debug!("round {}: accepted score {:.0}", rounds, kept.score());
                    on_accept(&kept, improvements);
                }
            }

            if last_report.elapsed() >= Duration::from_secs(1) {
                let best = elite.snapshot();
                info!(
                    "[round {}] shapes: {} | score: {:.0} | rounds/s: {:.0}",
                    rounds,
                    best.genome().len(),
                    best.score(),
                    rounds as f64 / started.elapsed().as_secs_f64()
                );
                last_report = Instant::now();
            }
        }

        Ok(EvolveSummary {
            rounds,
            accepted,
            score: elite.score(),
        })
    }
}

impl Drop for LocalPool {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.jobs.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Tells the pool when its worker unwinds, so a round waiting on it fails
/// instead of blocking forever.
struct PanicSignal<'a>(&'a Sender<Option<Outcome>>);

impl Drop for PanicSignal<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.0.send(None);
        }
    }
}

fn work(pipeline: &Pipeline, jobs: Receiver<Job>, results: Sender<Option<Outcome>>) {
    let _signal = PanicSignal(&results);
    let mut buffer = pipeline.new_buffer();
    let mut rng = StdRng::from_entropy();

    for job in jobs.iter() {
        let base = Candidate::new(job.genome, job.score);
        let candidate = if job.trials <= 1 {
            let candidate = pipeline.trial(base.genome(), &mut buffer, &mut rng);
            if candidate.beats(&base) {
                candidate.with_rendering(buffer.clone())
            } else {
                candidate
            }
        } else {
            pipeline.batch(&base, job.trials, &mut buffer, &mut rng)
        };

        let improved = candidate.beats(&base);
        if results.send(Some(Outcome { candidate, improved })).is_err() {
            break;
        }
    }
}
