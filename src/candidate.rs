use crate::error::Result;
use crate::fitness::{self, ChannelWeights};
use crate::mutation::{self, MutationConfig};
use crate::render::{self, average_color};
use crate::shape::{Color, Genome};
use image::RgbaImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A genome together with its score against the current target (lower is
/// better). Fields are read-only so a score can't drift from its genome;
/// build a new candidate to change either.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    genome: Genome,
    score: f64,
    #[serde(skip)]
    rendering: Option<RgbaImage>,
}

impl Candidate {
    pub fn new(genome: Genome, score: f64) -> Self {
        Self {
            genome,
            score,
            rendering: None,
        }
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn rendering(&self) -> Option<&RgbaImage> {
        self.rendering.as_ref()
    }

    pub fn with_rendering(mut self, rendering: RgbaImage) -> Self {
        self.rendering = Some(rendering);
        self
    }

    pub fn without_rendering(mut self) -> Self {
        self.rendering = None;
        self
    }

    pub fn into_genome(self) -> Genome {
        self.genome
    }

    pub fn beats(&self, other: &Candidate) -> bool {
        self.score < other.score
    }
}

/// Mutate, render, score: the one step every worker repeats.
pub struct Pipeline {
    target: Arc<RgbaImage>,
    background: Color,
    weights: ChannelWeights,
    mutation: MutationConfig,
}

impl Pipeline {
    /// Fails if `mutation` doesn't pass [`MutationConfig::validate`].
    pub fn new(
        target: Arc<RgbaImage>,
        mutation: MutationConfig,
        weights: ChannelWeights,
    ) -> Result<Self> {
        mutation.validate()?;
        Ok(Self::unchecked(target, mutation, weights))
    }

    pub(crate) fn unchecked(
        target: Arc<RgbaImage>,
        mutation: MutationConfig,
        weights: ChannelWeights,
    ) -> Self {
        let background = average_color(&target);
        Self {
            target,
            background,
            weights,
            mutation,
        }
    }

    pub fn target(&self) -> &RgbaImage {
        &self.target
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn mutation(&self) -> &MutationConfig {
        &self.mutation
    }

    /// A scratch canvas matching the target, for use with [`Self::score_into`].
    pub fn new_buffer(&self) -> RgbaImage {
        RgbaImage::new(self.target.width(), self.target.height())
    }

    /// Renders `genome` into `buffer` and scores it. `buffer` must come from
    /// [`Self::new_buffer`]; a mismatched one scores `f64::MAX`.
    pub fn score_into(&self, genome: &Genome, buffer: &mut RgbaImage) -> f64 {
        render::render_into(genome, buffer, self.background);
        fitness::weighted_distance(buffer, &self.target, &self.weights).unwrap_or(f64::MAX)
    }

    pub fn evaluate(&self, genome: Genome) -> Candidate {
        let mut buffer = self.new_buffer();
        let score = self.score_into(&genome, &mut buffer);
        Candidate::new(genome, score).with_rendering(buffer)
    }

    /// The starting elite: no shapes, just the average-color background.
    pub fn seed(&self) -> Candidate {
        self.evaluate(Genome::new())
    }

    /// One mutate-render-score trial starting from `base`.
    pub fn trial<R: Rng + ?Sized>(
        &self,
        base: &Genome,
        buffer: &mut RgbaImage,
        rng: &mut R,
    ) -> Candidate {
        let progress = mutation::progress(base, &self.mutation);
        let genome = mutation::mutate(base, &self.target, progress, &self.mutation, rng);
        let score = self.score_into(&genome, buffer);
        Candidate::new(genome, score)
    }

    /// Runs `trials` trials, each starting from the best seen so far in this
    /// batch, and returns that best. Returns a copy of `base` if nothing beat
    /// it. The winner carries its rendering.
    pub fn batch<R: Rng + ?Sized>(
        &self,
        base: &Candidate,
        trials: usize,
        buffer: &mut RgbaImage,
        rng: &mut R,
    ) -> Candidate {
        let mut best = Candidate::new(base.genome.clone(), base.score);
        for _ in 0..trials {
            let candidate = self.trial(&best.genome, buffer, rng);
            if candidate.beats(&best) {
                best = candidate.with_rendering(buffer.clone());
            }
        }
        best
    }
}
