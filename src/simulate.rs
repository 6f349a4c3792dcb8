//! Scripted participants
//!
//! Drives a [`Session`] end to end with a synthetic learner. Used by the CLI
//! to produce example result payloads and by tests to exercise full runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExperimentConfig;
use crate::error::SessionError;
use crate::render::TrialRenderer;
use crate::session::{ResultSink, Session, SessionEvent, Step};
use crate::types::{Phase, TrainingSet};

/// Correction attempts per trial before a learner gives the exact answer
const MAX_ATTEMPTS: usize = 100;

/// Built-in learner behaviours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    /// Answers every training trial exactly and predicts test trials from the
    /// nearest training input
    Perfect,
    /// Misses the first response by twice the tolerance, then corrects
    FirstTryMiss,
    /// Adds uniform noise of the given amplitude to every response
    Noisy { amplitude: f64 },
}

/// Chooses response values for trials
pub trait Learner {
    /// First response on a training trial
    fn first_response(&mut self, x: f64, y_true: f64) -> f64;
    /// Response after seeing feedback; `attempt` starts at 1
    fn correction(&mut self, x: f64, y_true: f64, attempt: usize) -> f64;
    /// Response on a testing trial
    fn predict(&mut self, x: f64) -> f64;
}

/// A learner built from a [`LearnerKind`]
pub struct ScriptedLearner {
    kind: LearnerKind,
    tolerance: f64,
    memory: Vec<(f64, f64)>,
    rng: StdRng,
}

impl ScriptedLearner {
    pub fn new(kind: LearnerKind, training: &TrainingSet, tolerance: f64, seed: u64) -> Self {
        Self {
            kind,
            tolerance,
            memory: training.pairs().iter().map(|p| (p.x, p.y)).collect(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn noise(&mut self) -> f64 {
        match self.kind {
            LearnerKind::Noisy { amplitude } if amplitude > 0.0 => {
                self.rng.random_range(-amplitude..=amplitude)
            }
            _ => 0.0,
        }
    }

    fn nearest(&self, x: f64) -> f64 {
        self.memory
            .iter()
            .min_by(|a, b| (a.0 - x).abs().total_cmp(&(b.0 - x).abs()))
            .map(|&(_, y)| y)
            .unwrap_or(x)
    }
}

impl Learner for ScriptedLearner {
    fn first_response(&mut self, _x: f64, y_true: f64) -> f64 {
        match self.kind {
            LearnerKind::FirstTryMiss => y_true + 2.0 * self.tolerance,
            _ => y_true + self.noise(),
        }
    }

    fn correction(&mut self, _x: f64, y_true: f64, attempt: usize) -> f64 {
        if attempt >= MAX_ATTEMPTS {
            return y_true;
        }
        y_true + self.noise()
    }

    fn predict(&mut self, x: f64) -> f64 {
        self.nearest(x) + self.noise()
    }
}

/// Page y coordinate that produces `value` on the response bar
pub fn pointer_for(value: f64, config: &ExperimentConfig) -> f64 {
    config.geometry.surface_top + config.geometry.bar_baseline - config.to_pixels(value)
}

/// Drive a loaded session to completion, returning the number of events dispatched
pub fn run_to_completion<R, S, L>(
    session: &mut Session<R, S>,
    learner: &mut L,
) -> Result<usize, SessionError>
where
    R: TrialRenderer,
    S: ResultSink,
    L: Learner + ?Sized,
{
    let config = session.machine().config().clone();
    let mut events = 0;
    let mut send = |session: &mut Session<R, S>, event: SessionEvent| {
        events += 1;
        session.dispatch(event)
    };

    loop {
        let machine = session.machine();
        let phase = machine.phase();
        let x = machine.current_stimulus_x();
        let y_true = machine.current_target();

        match (phase, x) {
            (Phase::Complete, _) => break,
            (Phase::Training, Some(x)) => {
                let y_true = y_true.ok_or_else(|| {
                    SessionError::InvalidState("training trial without a target".to_string())
                })?;
                let first = learner.first_response(x, y_true);
                send(
                    session,
                    SessionEvent::PointerMove {
                        page_y: pointer_for(first, &config),
                    },
                );
                send(session, SessionEvent::Commit);

                let mut attempt = 1;
                while !session.machine().is_ready() {
                    if attempt > MAX_ATTEMPTS {
                        return Err(SessionError::InvalidState(format!(
                            "trial {} never accepted a correction",
                            session.machine().trial_index()
                        )));
                    }
                    let value = learner.correction(x, y_true, attempt);
                    send(
                        session,
                        SessionEvent::PointerMove {
                            page_y: pointer_for(value, &config),
                        },
                    );
                    send(session, SessionEvent::Commit);
                    attempt += 1;
                }
                debug!(x, y_true, attempts = attempt, "Training trial done");
            }
            (Phase::Testing, Some(x)) => {
                let value = learner.predict(x);
                send(
                    session,
                    SessionEvent::PointerMove {
                        page_y: pointer_for(value, &config),
                    },
                );
                send(session, SessionEvent::Commit);
            }
            _ => {
                return Err(SessionError::InvalidState(format!(
                    "cannot simulate from phase {}",
                    phase.as_str()
                )))
            }
        }

        if send(session, SessionEvent::Proceed) == Step::Ignored {
            return Err(SessionError::InvalidState(format!(
                "trial {} did not advance",
                session.machine().trial_index()
            )));
        }
    }

    Ok(events)
}
