//! Approximates a target image with an evolving list of translucent circles
//! and squares.
//!
//! A [`Genome`] is mutated, rendered and scored against the target by
//! squared color distance; only strict improvements replace the current
//! [`Elite`]. The search runs either inside one process on a [`LocalPool`]
//! of worker threads, or across many processes: a [`Coordinator`] serves its
//! elite over TCP to any number of [`Peer`]s, each of which runs batched
//! rounds on its own pool and reports back what it found.

pub mod candidate;
pub mod config;
pub mod coordinator;
pub mod elite;
pub mod error;
pub mod fitness;
pub mod image_io;
pub mod mutation;
pub mod peer;
pub mod pool;
pub mod protocol;
pub mod render;
pub mod shape;

pub use candidate::{Candidate, Pipeline};
pub use config::Settings;
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use elite::{Elite, Offer};
pub use error::{Error, Result};
pub use mutation::MutationConfig;
pub use peer::Peer;
pub use pool::{LocalPool, StopCondition};
pub use shape::{Color, Genome, Shape, ShapeKind};
