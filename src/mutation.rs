//! Single-step genome mutation.
//!
//! Each call picks exactly one operation (add, remove, reorder, perturb or
//! type flip) with the probabilities held in [`MutationConfig`], applies it
//! to a private copy, and returns that copy. The input genome is never
//! touched, and no score travels with the result: the caller re-renders.

use crate::config::ConfigError;
use crate::shape::{Color, Genome, Shape, ShapeKind};
use image::RgbaImage;
use rand::distributions::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tuning policy for [`mutate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub p_add: f64,
    pub p_remove: f64,
    pub p_reorder: f64,
    pub p_perturb: f64,
    // Remainder of the unit interval flips a shape's kind.
    pub min_size: i32,
    pub max_size: i32,
    /// Shape count at which the drawing is considered mature (progress 1).
    pub target_complexity: f64,
    pub alpha_min: u8,
    pub alpha_max: u8,
    /// Largest positional nudge at progress 0; shrinks as the drawing matures.
    pub move_range: i32,
    pub min_move_range: i32,
    pub size_delta: i32,
    pub alpha_delta: i32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            p_add: 0.30,
            p_remove: 0.05,
            p_reorder: 0.05,
            p_perturb: 0.50,
            min_size: 3,
            max_size: 50,
            target_complexity: 5000.0,
            alpha_min: 30,
            alpha_max: 200,
            move_range: 20,
            min_move_range: 2,
            size_delta: 2,
            alpha_delta: 10,
        }
    }
}

impl MutationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [self.p_add, self.p_remove, self.p_reorder, self.p_perturb];
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(ConfigError::Probability(
                "each mutation probability must lie in [0, 1]".into(),
            ));
        }
        let total: f64 = probabilities.iter().sum();
        if total > 1.0 + 1e-9 {
            return Err(ConfigError::Probability(format!(
                "mutation probabilities sum to {}, above 1",
                total
            )));
        }
        if self.min_size <= 0 || self.min_size > self.max_size {
            return Err(ConfigError::Range {
                field: "mutation.min_size..max_size",
                min: self.min_size as i64,
                max: self.max_size as i64,
            });
        }
        if self.alpha_min == 0 || self.alpha_min > self.alpha_max {
            return Err(ConfigError::Range {
                field: "mutation.alpha_min..alpha_max",
                min: self.alpha_min as i64,
                max: self.alpha_max as i64,
            });
        }
        if !(self.target_complexity > 0.0) {
            return Err(ConfigError::NotPositive("mutation.target_complexity"));
        }
        if self.move_range <= 0 || self.min_move_range <= 0 {
            return Err(ConfigError::NotPositive("mutation.move_range"));
        }
        if self.size_delta < 0 || self.alpha_delta < 0 {
            return Err(ConfigError::NotPositive("mutation.size_delta/alpha_delta"));
        }
        Ok(())
    }

    /// Upper size bound at `progress`: coarse shapes early, fine ones late.
    pub fn max_size_at(&self, progress: f64) -> i32 {
        ((self.max_size as f64 * (1.1 - progress)) as i32).max(self.min_size)
    }

    fn move_range_at(&self, progress: f64) -> i32 {
        ((self.move_range as f64 * (1.1 - progress)) as i32).max(self.min_move_range)
    }
}

/// Ratio of `genome`'s shape count to the configured target complexity,
/// capped at 1.
pub fn progress(genome: &Genome, config: &MutationConfig) -> f64 {
    (genome.len() as f64 / config.target_complexity).clamp(0.0, 1.0)
}

/// Samples fresh shapes whose color is picked from the target at the shape's
/// center.
pub struct ShapeSampler<'a> {
    target: &'a RgbaImage,
    config: &'a MutationConfig,
    max_size: i32,
}

impl<'a> ShapeSampler<'a> {
    pub fn new(target: &'a RgbaImage, config: &'a MutationConfig, progress: f64) -> Self {
        Self {
            target,
            config,
            max_size: config.max_size_at(progress),
        }
    }
}

impl<'a> Distribution<Shape> for ShapeSampler<'a> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Shape {
        let x = rng.gen_range(0..self.target.width());
        let y = rng.gen_range(0..self.target.height());
        let [r, g, b, _] = self.target.get_pixel(x, y).0;

        Shape {
            kind: if rng.gen_bool(0.5) {
                ShapeKind::Circle
            } else {
                ShapeKind::Rectangle
            },
            x: x as i32,
            y: y as i32,
            size: rng.gen_range(self.config.min_size..=self.max_size),
            color: Color::new(
                r,
                g,
                b,
                rng.gen_range(self.config.alpha_min..=self.config.alpha_max),
            ),
        }
    }
}

/// Returns a mutated deep copy of `genome`.
pub fn mutate<R: Rng + ?Sized>(
    genome: &Genome,
    target: &RgbaImage,
    progress: f64,
    config: &MutationConfig,
    rng: &mut R,
) -> Genome {
    let mut child = genome.clone();
    mutate_owned(&mut child, target, progress, config, rng);
    child
}

fn mutate_owned<R: Rng + ?Sized>(
    genome: &mut Genome,
    target: &RgbaImage,
    progress: f64,
    config: &MutationConfig,
    rng: &mut R,
) {
    if target.width() == 0 || target.height() == 0 {
        return;
    }

    let roulette: f64 = rng.gen();
    let shapes = &mut genome.shapes;
    let mut threshold = config.p_add;

    if shapes.is_empty() || roulette < threshold {
        shapes.push(ShapeSampler::new(target, config, progress).sample(rng));
        return;
    }
    let len = shapes.len();

    threshold += config.p_remove;
    if roulette < threshold {
        shapes.remove(rng.gen_range(0..len));
        return;
    }

    threshold += config.p_reorder;
    if roulette < threshold {
        shapes.swap(rng.gen_range(0..len), rng.gen_range(0..len));
        return;
    }

    let shape = &mut shapes[rng.gen_range(0..len)];
    threshold += config.p_perturb;
    if roulette < threshold {
        perturb(shape, target, progress, config, rng);
    } else {
        shape.kind = shape.kind.flipped();
    }
}

fn perturb<R: Rng + ?Sized>(
    shape: &mut Shape,
    target: &RgbaImage,
    progress: f64,
    config: &MutationConfig,
    rng: &mut R,
) {
    match rng.gen_range(0..4) {
        0 => {
            let range = config.move_range_at(progress);
            let max_x = target.width() as i32 - 1;
            let max_y = target.height() as i32 - 1;
            shape.x = shape.x.clamp(0, max_x)
                .saturating_add(rng.gen_range(-range..=range))
                .clamp(0, max_x);
            shape.y = shape.y.clamp(0, max_y)
                .saturating_add(rng.gen_range(-range..=range))
                .clamp(0, max_y);
        }
        1 => {
            let delta = rng.gen_range(-config.size_delta..=config.size_delta);
            shape.size = shape
                .size
                .saturating_add(delta)
                .clamp(config.min_size, config.max_size_at(progress));
        }
        2 => {
            let value = rng.gen();
            match rng.gen_range(0..3) {
                0 => shape.color.r = value,
                1 => shape.color.g = value,
                2 => shape.color.b = value,
                _ => unreachable!(),
            }
        }
        3 => {
            let delta = rng.gen_range(-config.alpha_delta..=config.alpha_delta);
            shape.color.a = (shape.color.a as i32 + delta)
                .clamp(config.alpha_min as i32, config.alpha_max as i32)
                as u8;
        }
        _ => unreachable!(),
    }
}
