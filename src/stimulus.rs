//! Test plan generation
//!
//! The testing phase mixes inputs the participant has already seen during
//! training with novel inputs from the rest of the value range, so that both
//! interpolation and extrapolation of the learned function can be measured.

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::ExperimentConfig;
use crate::error::SessionError;
use crate::types::{Stimuli, TestPlan, TrainingSet};

/// Derives the testing sequence from a training set
pub struct StimulusGenerator;

impl StimulusGenerator {
    /// Build stimuli using the configured seed, or the thread RNG when unseeded
    pub fn generate(
        training: TrainingSet,
        config: &ExperimentConfig,
    ) -> Result<Stimuli, SessionError> {
        config.validate()?;
        let test_plan = match config.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                Self::test_plan(&training, config.x_max, &mut rng)?
            }
            None => Self::test_plan(&training, config.x_max, &mut rand::rng())?,
        };
        Ok(Stimuli {
            training,
            test_plan,
        })
    }

    /// Sample `M/2` seen inputs and `M - M/2` novel inputs from `1..=x_max`, then shuffle.
    ///
    /// Sampling is without replacement within each subset, and the two subsets are
    /// disjoint, so the plan never contains duplicates.
    pub fn test_plan<R: Rng + ?Sized>(
        training: &TrainingSet,
        x_max: u32,
        rng: &mut R,
    ) -> Result<TestPlan, SessionError> {
        let m = training.len();
        let from_training = m / 2;
        let novel = m - from_training;

        let seen = distinct_training_xs(training);
        if seen.len() < from_training {
            return Err(SessionError::InsufficientTrainingValues {
                needed: from_training,
                available: seen.len(),
            });
        }

        let pool = novel_pool(&seen, x_max);
        if pool.len() < novel {
            return Err(SessionError::InsufficientNovelValues {
                x_max,
                needed: novel,
                available: pool.len(),
            });
        }

        let mut xs: Vec<f64> = seen.choose_multiple(rng, from_training).copied().collect();
        xs.extend(pool.choose_multiple(rng, novel).copied());
        xs.shuffle(rng);

        debug!(
            trials = xs.len(),
            from_training, novel, "Built test plan"
        );
        Ok(TestPlan::new(xs))
    }
}

/// Training inputs with duplicates removed
fn distinct_training_xs(training: &TrainingSet) -> Vec<f64> {
    let mut xs: Vec<f64> = training.xs().collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    xs
}

/// Integer values in `1..=x_max` that never appear as a training input
fn novel_pool(seen: &[f64], x_max: u32) -> Vec<f64> {
    (1..=x_max)
        .map(f64::from)
        .filter(|v| !seen.contains(v))
        .collect()
}
