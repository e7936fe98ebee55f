//! Network coordinator: owns the global elite and serves it to peers.
//!
//! Each accepted connection runs its own session thread that alternates
//! send-elite / receive-candidate until the peer goes away. Sessions share
//! nothing but the [`Elite`] and the snapshot writer.

use crate::candidate::{Candidate, Pipeline};
use crate::elite::{Elite, Offer};
use crate::error::Result;
use crate::image_io::SnapshotSchedule;
use crate::protocol::Connection;
use image::RgbaImage;
use log::{debug, info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone, Debug)]
pub struct CoordinatorOptions {
    pub snapshots: SnapshotSchedule,
    /// Re-score returned genomes locally instead of trusting the peer.
    pub verify_scores: bool,
}

struct Shared {
    elite: Arc<Elite>,
    pipeline: Arc<Pipeline>,
    options: CoordinatorOptions,
    save_buffer: Mutex<RgbaImage>,
    next_session: AtomicU64,
}

impl Shared {
    fn save_snapshot(&self) -> bool {
        let mut buffer = self.save_buffer.lock().unwrap_or_else(|e| e.into_inner());
        let best = self.elite.snapshot();
        self.pipeline.score_into(best.genome(), &mut buffer);
        self.options.snapshots.save(Some(&buffer))
    }
}

/// Per-session counters, returned when the session ends.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub exchanges: u64,
    pub accepted: u64,
}

pub struct Coordinator {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Binds `addr` and seeds the elite with the empty genome.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        pipeline: Arc<Pipeline>,
        options: CoordinatorOptions,
    ) -> Result<Self> {
        let seed = pipeline.seed().without_rendering();
        Self::with_elite(addr, pipeline, options, seed)
    }

    /// Binds `addr` with an explicit starting elite.
    pub fn with_elite<A: ToSocketAddrs>(
        addr: A,
        pipeline: Arc<Pipeline>,
        options: CoordinatorOptions,
        seed: Candidate,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let save_buffer = Mutex::new(pipeline.new_buffer());
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                elite: Arc::new(Elite::new(seed)),
                pipeline,
                options,
                save_buffer,
                next_session: AtomicU64::new(0),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn elite(&self) -> Arc<Elite> {
        Arc::clone(&self.shared.elite)
    }

    /// Renders the current elite and writes it to the snapshot path.
    pub fn save_snapshot(&self) -> bool {
        self.shared.save_snapshot()
    }

    /// Accepts connections forever, one session thread each.
    pub fn serve(self) -> Result<()> {
        info!(
            "coordinator listening on {} (elite score {:.0})",
            self.listener.local_addr()?,
            self.shared.elite.score()
        );

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("failed to accept connection: {}", e);
                    continue;
                }
            };

            let shared = Arc::clone(&self.shared);
            let id = shared.next_session.fetch_add(1, Ordering::Relaxed);
            let spawned = thread::Builder::new()
                .name(format!("session-{}", id))
                .spawn(move || {
                    if let Err(e) = start_session(&shared, stream, id) {
                        warn!("session {} failed to start: {}", id, e);
                    }
                });
            if let Err(e) = spawned {
                warn!("failed to spawn session {}: {}", id, e);
            }
        }
        Ok(())
    }
}

fn start_session(shared: &Shared, stream: TcpStream, id: u64) -> Result<()> {
    let connection = Connection::new(stream)?;
    let peer = connection.peer_addr();
    info!("session {}: peer {} connected", id, peer);

    let mut session = Session {
        shared,
        connection,
        id,
        buffer: None,
        stats: SessionStats::default(),
    };
    match session.run() {
        Ok(()) => info!(
            "session {}: peer {} left after {} exchanges ({} accepted)",
            id, peer, session.stats.exchanges, session.stats.accepted
        ),
        Err(e) => warn!(
            "session {}: dropping peer {} after {} exchanges: {}",
            id, peer, session.stats.exchanges, e
        ),
    }
    Ok(())
}

struct Session<'a> {
    shared: &'a Shared,
    connection: Connection,
    id: u64,
    // Only allocated when scores are verified.
    buffer: Option<RgbaImage>,
    stats: SessionStats,
}

impl<'a> Session<'a> {
    /// Runs until the peer closes (`Ok`) or a transport error (`Err`).
    fn run(&mut self) -> Result<()> {
        loop {
            self.connection.send(self.shared.elite.snapshot())?;

            let reply = match self.connection.receive()? {
                Some(reply) => reply,
                None => return Ok(()),
            };
            self.stats.exchanges += 1;

            let reply = if self.shared.options.verify_scores {
                self.rescore(reply)
            } else {
                reply
            };
            self.consider(reply);
        }
    }

    fn rescore(&mut self, claimed: Candidate) -> Candidate {
        let pipeline = &self.shared.pipeline;
        let buffer = self.buffer.get_or_insert_with(|| pipeline.new_buffer());
        let score = pipeline.score_into(claimed.genome(), buffer);
        if score != claimed.score() {
            debug!(
                "session {}: peer claimed {:.0}, rendering scores {:.0}",
                self.id,
                claimed.score(),
                score
            );
        }
        Candidate::new(claimed.into_genome(), score)
    }

    fn consider(&mut self, candidate: Candidate) {
        let shapes = candidate.genome().len();
        let score = candidate.score();
        match self.shared.elite.offer(candidate) {
            Offer::Accepted {
                improvements,
                previous,
            } => {
                self.stats.accepted += 1;
                info!(
                    "[improvement {}] score {:.0} -> {:.0}, {} shapes (session {}, {})",
                    improvements,
                    previous,
                    score,
                    shapes,
                    self.id,
                    self.connection.peer_addr()
                );
                if self.shared.options.snapshots.is_due(improvements) {
                    self.shared.save_snapshot();
                }
            }
            Offer::Rejected { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::ChannelWeights;
    use crate::mutation::MutationConfig;
    use crate::shape::{Color, Genome, Shape, ShapeKind};
    use image::Rgba;
    use std::io::Write;
    use tempfile::tempdir;

    fn pipeline() -> Arc<Pipeline> {
        let target = RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        Arc::new(
            Pipeline::new(
                Arc::new(target),
                MutationConfig::default(),
                ChannelWeights::default(),
            )
            .unwrap(),
        )
    }

    fn start(options: CoordinatorOptions) -> (SocketAddr, Arc<Elite>) {
        let coordinator = Coordinator::bind("127.0.0.1:0", pipeline(), options).unwrap();
        let addr = coordinator.local_addr().unwrap();
        let elite = coordinator.elite();
        thread::spawn(move || coordinator.serve());
        (addr, elite)
    }

    fn options(dir: &std::path::Path, verify_scores: bool) -> CoordinatorOptions {
        CoordinatorOptions {
            snapshots: SnapshotSchedule::new(1, dir.join("snap.png")),
            verify_scores,
        }
    }

    fn white_left_half() -> Genome {
        Genome::from(vec![Shape {
            kind: ShapeKind::Rectangle,
            x: 4,
            y: 8,
            size: 4,
            color: Color::new(255, 255, 255, 255),
        }])
    }

    #[test]
    fn session_adopts_strict_improvement_and_saves() {
        let dir = tempdir().unwrap();
        let (addr, elite) = start(options(dir.path(), false));
        let mut peer = Connection::new(TcpStream::connect(addr).unwrap()).unwrap();

        let first = peer.receive().unwrap().unwrap();
        assert_eq!(first.score(), elite.score());
        peer.send(Candidate::new(white_left_half(), first.score() - 1.0))
            .unwrap();

        let second = peer.receive().unwrap().unwrap();
        assert_eq!(second.genome(), &white_left_half());
        assert_eq!(elite.improvements(), 1);
        assert!(dir.path().join("snap.png").exists());
    }

    #[test]
    fn verification_replaces_claimed_scores() {
        let dir = tempdir().unwrap();
        let (addr, elite) = start(options(dir.path(), true));
        let mut peer = Connection::new(TcpStream::connect(addr).unwrap()).unwrap();

        let first = peer.receive().unwrap().unwrap();
        peer.send(Candidate::new(Genome::new(), 0.0)).unwrap();
        let second = peer.receive().unwrap().unwrap();
        assert_eq!(second.score(), first.score());
        assert_eq!(elite.improvements(), 0);

        peer.send(Candidate::new(white_left_half(), f64::MAX)).unwrap();
        let third = peer.receive().unwrap().unwrap();
        assert!(third.score() < first.score());
        assert_eq!(third.genome(), &white_left_half());
    }

    #[test]
    fn malformed_frame_ends_only_that_session() {
        let dir = tempdir().unwrap();
        let (addr, elite) = start(options(dir.path(), false));

        let mut bad = TcpStream::connect(addr).unwrap();
        let mut good = Connection::new(TcpStream::connect(addr).unwrap()).unwrap();
        bad.write_all(&[0, 0, 0, 3, 0xff, 0xff, 0xff]).unwrap();
        drop(bad);

        let first = good.receive().unwrap().unwrap();
        good.send(Candidate::new(white_left_half(), first.score() - 1.0))
            .unwrap();
        let second = good.receive().unwrap().unwrap();
        assert_eq!(second.genome(), &white_left_half());
        assert_eq!(elite.improvements(), 1);
    }
}
