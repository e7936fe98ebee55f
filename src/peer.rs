use crate::error::Result;
use crate::pool::LocalPool;
use crate::protocol::Connection;
use log::{debug, info};
use std::net::{TcpStream, ToSocketAddrs};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerSummary {
    pub rounds: u64,
    pub improvements: u64,
}

/// Works for a coordinator: receives its elite, runs one batched round on
/// the local pool, and answers with the round's winner, or with the elite
/// unchanged when nothing beat it.
pub struct Peer {
    pool: LocalPool,
    batch_size: usize,
}

impl Peer {
    pub fn new(pool: LocalPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    pub fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<PeerSummary> {
        let connection = Connection::new(TcpStream::connect(addr)?)?;
        info!(
            "connected to {} with {} workers x {} trials",
            connection.peer_addr(),
            self.pool.workers(),
            self.batch_size
        );
        self.run(connection)
    }

    /// Runs one session until the coordinator closes the stream.
    pub fn run(&self, mut connection: Connection) -> Result<PeerSummary> {
        let mut summary = PeerSummary::default();

        while let Some(base) = connection.receive()? {
            summary.rounds += 1;
            let reply = match self.pool.round(&base, self.batch_size)? {
                Some(better) => {
                    summary.improvements += 1;
                    debug!(
                        "round {}: {:.0} -> {:.0}",
                        summary.rounds,
                        base.score(),
                        better.score()
                    );
                    better.without_rendering()
                }
                None => base,
            };
            connection.send(reply)?;
        }

        info!(
            "coordinator closed the session after {} rounds ({} improvements sent)",
            summary.rounds, summary.improvements
        );
        Ok(summary)
    }
}
