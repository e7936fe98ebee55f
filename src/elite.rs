use crate::candidate::Candidate;
use std::sync::{Mutex, MutexGuard};

/// Result of offering a candidate to an [`Elite`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Offer {
    /// The candidate replaced the elite. `improvements` counts every
    /// replacement so far, this one included.
    Accepted { improvements: u64, previous: f64 },
    /// Not strictly better; the elite is unchanged.
    Rejected { elite: f64 },
}

impl Offer {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

struct State {
    best: Candidate,
    improvements: u64,
}

/// The authoritative best candidate of one coordination scope.
///
/// All access goes through one lock. `offer` compares and replaces under that
/// lock, so the elite's score never increases no matter how many sessions
/// race.
pub struct Elite {
    state: Mutex<State>,
}

impl Elite {
    pub fn new(seed: Candidate) -> Self {
        Self {
            state: Mutex::new(State {
                best: seed,
                improvements: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Replacement is a single assignment, so a poisoned state is still whole.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A private copy of the current elite, without its cached rendering.
    pub fn snapshot(&self) -> Candidate {
        let state = self.lock();
        Candidate::new(state.best.genome().clone(), state.best.score())
    }

    /// A private copy including the cached rendering, if any.
    pub fn snapshot_with_rendering(&self) -> Candidate {
        self.lock().best.clone()
    }

    pub fn score(&self) -> f64 {
        self.lock().best.score()
    }

    pub fn improvements(&self) -> u64 {
        self.lock().improvements
    }

    /// Replaces the elite with `candidate` iff it scores strictly lower.
    pub fn offer(&self, candidate: Candidate) -> Offer {
        let mut state = self.lock();
        if candidate.beats(&state.best) {
            let previous = state.best.score();
            state.best = candidate;
            state.improvements += 1;
            Offer::Accepted {
                improvements: state.improvements,
                previous,
            }
        } else {
            Offer::Rejected {
                elite: state.best.score(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Color, Genome, Shape, ShapeKind};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn genome(n: usize) -> Genome {
        Genome::from(
            (0..n)
                .map(|i| Shape {
                    kind: ShapeKind::Circle,
                    x: i as i32,
                    y: 0,
                    size: 3,
                    color: Color::new(1, 2, 3, 100),
                })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn ties_do_not_replace() {
        let elite = Elite::new(Candidate::new(genome(1), 100.0));
        let offer = elite.offer(Candidate::new(genome(2), 100.0));
        assert_eq!(offer, Offer::Rejected { elite: 100.0 });
        assert_eq!(elite.snapshot().genome().len(), 1);
        assert_eq!(elite.improvements(), 0);
    }

    #[test]
    fn strict_improvement_replaces() {
        let elite = Elite::new(Candidate::new(genome(1), 100.0));
        let offer = elite.offer(Candidate::new(genome(2), 99.5));
        assert_eq!(
            offer,
            Offer::Accepted {
                improvements: 1,
                previous: 100.0
            }
        );
        assert_eq!(elite.score(), 99.5);
        assert_eq!(elite.snapshot().genome().len(), 2);
    }

    #[test]
    fn snapshot_is_detached() {
        let elite = Elite::new(Candidate::new(genome(3), 10.0));
        let mut copy = elite.snapshot().into_genome();
        copy.shapes.clear();
        assert_eq!(elite.snapshot().genome().len(), 3);
    }

    #[test]
    fn concurrent_offers_keep_the_minimum() {
        let elite = Arc::new(Elite::new(Candidate::new(Genome::new(), 1e9)));
        crossbeam::thread::scope(|s| {
            for t in 0..8u32 {
                let elite = &elite;
                s.spawn(move |_| {
                    for i in 0..500u32 {
                        let score = ((i * 7919 + t * 104729) % 10007) as f64 + 1.0;
                        elite.offer(Candidate::new(genome(1), score));
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(elite.score(), 1.0);
    }

    proptest! {
        #[test]
        fn accepted_scores_are_non_increasing(scores in prop::collection::vec(0.0f64..1000.0, 1..100)) {
            let elite = Elite::new(Candidate::new(Genome::new(), 1000.0));
            let mut last = elite.score();
            for score in scores {
                let offer = elite.offer(Candidate::new(Genome::new(), score));
                let now = elite.score();
                prop_assert!(now <= last);
                prop_assert_eq!(offer.is_accepted(), score < last);
                last = now;
            }
        }
    }
}
