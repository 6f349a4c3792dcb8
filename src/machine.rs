//! Trial state machine
//!
//! Sequences `M` training trials followed by `M` testing trials. Training
//! trials show the true value after the first response and then require a
//! correction within tolerance; testing trials accept any single response.
//! Moving to the next trial always needs an explicit proceed signal once the
//! current trial's exit criterion is met.
//!
//! The machine is pure with respect to its collaborators: every transition
//! returns the [`RenderCommand`]s for the host to apply and, on the final
//! trial, the [`ResultPayload`] to report.

use tracing::{debug, info};

use crate::config::ExperimentConfig;
use crate::error::SessionError;
use crate::render::RenderCommand;
use crate::types::{CorrectionState, Phase, ResultPayload, Stimuli};

/// The effect of one event on the machine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Commands for the rendering surface, in order
    pub commands: Vec<RenderCommand>,
    /// Present only on the transition into `Complete`
    pub finished: Option<ResultPayload>,
}

impl Transition {
    fn noop() -> Self {
        Self::default()
    }

    fn render(commands: Vec<RenderCommand>) -> Self {
        Self {
            commands,
            finished: None,
        }
    }

    /// Whether the event was ignored
    pub fn is_noop(&self) -> bool {
        self.commands.is_empty() && self.finished.is_none()
    }
}

/// Owns all trial state for one session
#[derive(Debug, Clone)]
pub struct TrialStateMachine {
    config: ExperimentConfig,
    stimuli: Option<Stimuli>,
    phase: Phase,
    trial_index: usize,
    correction: CorrectionState,
    ready: bool,
    /// Response recorded for the trial in progress, appended on advance
    staged: Option<f64>,
    training_responses: Vec<f64>,
    test_responses: Vec<f64>,
}

impl TrialStateMachine {
    /// Create an idle machine; the configuration is validated first
    pub fn new(config: ExperimentConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            stimuli: None,
            phase: Phase::Idle,
            trial_index: 0,
            correction: CorrectionState::AwaitingFirstResponse,
            ready: false,
            staged: None,
            training_responses: Vec::new(),
            test_responses: Vec::new(),
        })
    }

    /// Install stimuli and start the first training trial
    pub fn load(&mut self, stimuli: Stimuli) -> Result<Transition, SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::InvalidState(format!(
                "stimuli already loaded (phase {})",
                self.phase.as_str()
            )));
        }
        if stimuli.test_plan.len() != stimuli.training.len() {
            return Err(SessionError::MalformedTrainingSet(format!(
                "test plan has {} entries for {} training trials",
                stimuli.test_plan.len(),
                stimuli.training.len()
            )));
        }

        info!(
            training_trials = stimuli.training.len(),
            total_trials = stimuli.training.len() * 2,
            "Stimuli loaded"
        );
        self.stimuli = Some(stimuli);
        self.phase = Phase::Training;
        Ok(Transition::render(self.start_trial()))
    }

    /// Handle a discrete commit of the current response
    pub fn commit(&mut self, response: f64) -> Transition {
        if self.ready {
            return Transition::noop();
        }
        let response = self.clamp_response(response);

        match self.phase {
            Phase::Training => self.commit_training(response),
            Phase::Testing => self.commit_testing(response),
            Phase::Idle | Phase::Complete => Transition::noop(),
        }
    }

    /// Handle the proceed trigger; a no-op until the current trial is ready
    pub fn proceed(&mut self) -> Transition {
        if !self.ready || !matches!(self.phase, Phase::Training | Phase::Testing) {
            return Transition::noop();
        }
        let (Some(total), Some(half)) = (self.total_trials(), self.training_trials()) else {
            return Transition::noop();
        };

        if let Some(response) = self.staged.take() {
            if self.trial_index < half {
                self.training_responses.push(response);
            } else {
                self.test_responses.push(response);
            }
        }

        self.trial_index += 1;
        info!("Trial {} completed.", self.trial_index);

        if self.trial_index == total {
            self.phase = Phase::Complete;
            self.ready = false;
            info!(trials = total, "Session complete");
            return Transition {
                commands: vec![RenderCommand::DisableProceed, RenderCommand::Detach],
                finished: self.result(),
            };
        }

        if self.trial_index == half {
            self.phase = Phase::Testing;
            info!("Entering testing phase");
        }

        Transition::render(self.start_trial())
    }

    fn start_trial(&mut self) -> Vec<RenderCommand> {
        self.correction = CorrectionState::AwaitingFirstResponse;
        self.ready = false;
        self.staged = None;

        let mut commands = Vec::with_capacity(3);
        if let Some(x) = self.current_stimulus_x() {
            commands.push(RenderCommand::ShowStimulus {
                width_px: self.config.to_pixels(x),
            });
        }
        commands.push(RenderCommand::HideFeedback);
        commands.push(RenderCommand::DisableProceed);
        commands
    }

    fn commit_training(&mut self, response: f64) -> Transition {
        let Some(y_true) = self.current_target() else {
            return Transition::noop();
        };

        match self.correction {
            CorrectionState::AwaitingFirstResponse => {
                debug!(trial = self.trial_index, response, "Training response recorded");
                self.staged = Some(response);
                self.correction = CorrectionState::AwaitingCorrection;
                Transition::render(vec![RenderCommand::ShowFeedback {
                    height_px: self.config.to_pixels(y_true),
                }])
            }
            CorrectionState::AwaitingCorrection => {
                if (response - y_true).abs() < self.config.tolerance {
                    info!("Successful correction.");
                    self.ready = true;
                    Transition::render(vec![
                        RenderCommand::HideFeedback,
                        RenderCommand::HideBars,
                        RenderCommand::EnableProceed,
                    ])
                } else {
                    debug!(trial = self.trial_index, response, y_true, "Failure to correct.");
                    Transition::render(vec![RenderCommand::FlashFeedback])
                }
            }
        }
    }

    fn commit_testing(&mut self, response: f64) -> Transition {
        debug!(trial = self.trial_index, response, "Test response recorded");
        self.staged = Some(response);
        self.ready = true;
        Transition::render(vec![
            RenderCommand::HideFeedback,
            RenderCommand::HideBars,
            RenderCommand::EnableProceed,
        ])
    }

    fn clamp_response(&self, response: f64) -> f64 {
        let (lo, hi) = (self.config.min_response(), self.config.max_response());
        if response.is_nan() {
            lo
        } else {
            response.clamp(lo, hi)
        }
    }

    fn result(&self) -> Option<ResultPayload> {
        let stimuli = self.stimuli.as_ref()?;
        Some(ResultPayload {
            x: stimuli.test_plan.as_slice().to_vec(),
            y: self.test_responses.clone(),
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn stimuli(&self) -> Option<&Stimuli> {
        self.stimuli.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trial_index(&self) -> usize {
        self.trial_index
    }

    /// `N = 2M`, unknown until stimuli are loaded
    pub fn total_trials(&self) -> Option<usize> {
        self.stimuli.as_ref().map(|s| s.training.len() * 2)
    }

    /// `N/2`, unknown until stimuli are loaded
    pub fn training_trials(&self) -> Option<usize> {
        self.stimuli.as_ref().map(|s| s.training.len())
    }

    pub fn correction_state(&self) -> CorrectionState {
        self.correction
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Response given on the trial in progress, if any
    pub fn current_response(&self) -> Option<f64> {
        self.staged
    }

    pub fn training_responses(&self) -> &[f64] {
        &self.training_responses
    }

    pub fn test_responses(&self) -> &[f64] {
        &self.test_responses
    }

    /// Input value shown on the current trial
    pub fn current_stimulus_x(&self) -> Option<f64> {
        let stimuli = self.stimuli.as_ref()?;
        let half = stimuli.training.len();
        if self.trial_index < half {
            stimuli.training.get(self.trial_index).map(|p| p.x)
        } else {
            stimuli.test_plan.get(self.trial_index - half)
        }
    }

    /// True output for the current trial; only defined during training
    pub fn current_target(&self) -> Option<f64> {
        if self.phase != Phase::Training {
            return None;
        }
        let stimuli = self.stimuli.as_ref()?;
        stimuli.training.get(self.trial_index).map(|p| p.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TestPlan, TrainingSet};
    use pretty_assertions::assert_eq;

    fn stimuli() -> Stimuli {
        Stimuli {
            training: TrainingSet::from_columns(vec![1.0, 2.0, 3.0, 4.0], vec![2.0, 4.0, 5.0, 8.0])
                .unwrap(),
            test_plan: TestPlan::new(vec![3.0, 50.0, 1.0, 70.0]),
        }
    }

    fn loaded() -> TrialStateMachine {
        let mut machine = TrialStateMachine::new(ExperimentConfig::default()).unwrap();
        machine.load(stimuli()).unwrap();
        machine
    }

    fn assert_counts(machine: &TrialStateMachine) {
        assert_eq!(
            machine.training_responses().len() + machine.test_responses().len(),
            machine.trial_index()
        );
    }

    #[test]
    fn test_idle_blocks_everything() {
        let mut machine = TrialStateMachine::new(ExperimentConfig::default()).unwrap();
        assert_eq!(machine.phase(), Phase::Idle);
        assert_eq!(machine.total_trials(), None);
        assert!(machine.commit(10.0).is_noop());
        assert!(machine.proceed().is_noop());
        assert_eq!(machine.trial_index(), 0);
    }

    #[test]
    fn test_load_starts_first_training_trial() {
        let mut machine = TrialStateMachine::new(ExperimentConfig::default()).unwrap();
        let transition = machine.load(stimuli()).unwrap();
        assert_eq!(machine.phase(), Phase::Training);
        assert_eq!(machine.total_trials(), Some(8));
        assert_eq!(
            transition.commands,
            vec![
                RenderCommand::ShowStimulus { width_px: 3.0 },
                RenderCommand::HideFeedback,
                RenderCommand::DisableProceed,
            ]
        );
    }

    #[test]
    fn test_load_twice_is_rejected() {
        let mut machine = loaded();
        assert!(matches!(
            machine.load(stimuli()),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_load_rejects_mismatched_plan() {
        let mut machine = TrialStateMachine::new(ExperimentConfig::default()).unwrap();
        let mut bad = stimuli();
        bad.test_plan = TestPlan::new(vec![1.0]);
        assert!(machine.load(bad).is_err());
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_first_commit_shows_feedback_and_never_readies() {
        let mut machine = loaded();
        // Exactly right on the first try still requires a correction commit
        let transition = machine.commit(2.0);
        assert_eq!(
            transition.commands,
            vec![RenderCommand::ShowFeedback { height_px: 6.0 }]
        );
        assert!(!machine.is_ready());
        assert_eq!(machine.correction_state(), CorrectionState::AwaitingCorrection);
        assert_eq!(machine.current_response(), Some(2.0));
    }

    #[test]
    fn test_failed_correction_flashes_and_stays_in_correction() {
        let mut machine = loaded();
        machine.commit(2.0);
        for _ in 0..5 {
            let transition = machine.commit(90.0);
            assert_eq!(transition.commands, vec![RenderCommand::FlashFeedback]);
            assert!(!machine.is_ready());
            assert_eq!(machine.correction_state(), CorrectionState::AwaitingCorrection);
        }
        // The first response stays the recorded one
        assert_eq!(machine.current_response(), Some(2.0));
        assert!(machine.proceed().is_noop());
    }

    #[test]
    fn test_tolerance_is_exclusive() {
        let mut machine = loaded();
        machine.commit(1.0);
        // y_true = 2, tolerance 5: 7 is exactly 5 away
        assert_eq!(machine.commit(7.0).commands, vec![RenderCommand::FlashFeedback]);
        assert!(!machine.is_ready());
        let transition = machine.commit(6.9);
        assert!(machine.is_ready());
        assert_eq!(
            transition.commands,
            vec![
                RenderCommand::HideFeedback,
                RenderCommand::HideBars,
                RenderCommand::EnableProceed,
            ]
        );
    }

    #[test]
    fn test_repeated_good_corrections_ready_once() {
        let mut machine = loaded();
        machine.commit(2.0);
        assert!(!machine.commit(2.0).is_noop());
        assert!(machine.commit(2.0).is_noop());
        assert!(machine.commit(2.0).is_noop());
        assert!(machine.is_ready());
    }

    #[test]
    fn test_proceed_records_response_and_starts_next_trial() {
        let mut machine = loaded();
        machine.commit(3.0);
        machine.commit(2.5);
        assert_counts(&machine);

        let transition = machine.proceed();
        assert_eq!(machine.trial_index(), 1);
        assert_eq!(machine.training_responses(), &[3.0]);
        assert!(!machine.is_ready());
        assert_eq!(machine.correction_state(), CorrectionState::AwaitingFirstResponse);
        assert_eq!(
            transition.commands[0],
            RenderCommand::ShowStimulus { width_px: 6.0 }
        );
        assert_counts(&machine);
        assert!(machine.proceed().is_noop());
    }

    #[test]
    fn test_testing_trial_accepts_single_response() {
        let mut machine = loaded();
        for y in [2.0, 4.0, 5.0, 8.0] {
            machine.commit(y);
            machine.commit(y);
            machine.proceed();
        }
        assert_eq!(machine.phase(), Phase::Testing);
        assert_eq!(machine.current_stimulus_x(), Some(3.0));
        assert_eq!(machine.current_target(), None);

        let transition = machine.commit(42.0);
        assert!(machine.is_ready());
        assert_eq!(transition.commands.last(), Some(&RenderCommand::EnableProceed));
        assert!(machine.commit(1.0).is_noop());

        machine.proceed();
        assert_eq!(machine.test_responses(), &[42.0]);
        assert_counts(&machine);
    }

    #[test]
    fn test_responses_are_clamped() {
        let mut machine = loaded();
        machine.commit(-40.0);
        assert_eq!(machine.current_response(), Some(1.0));

        let mut machine = loaded();
        machine.commit(1_000.0);
        assert_eq!(machine.current_response(), Some(100.0));
    }

    #[test]
    fn test_last_trial_finishes_with_result() {
        let mut machine = loaded();
        for y in [2.0, 4.0, 5.0, 8.0] {
            machine.commit(y);
            machine.commit(y);
            machine.proceed();
        }
        for y in [10.0, 20.0, 30.0] {
            machine.commit(y);
            assert!(machine.proceed().finished.is_none());
        }
        assert_eq!(machine.trial_index(), 7);

        machine.commit(40.0);
        let transition = machine.proceed();
        assert_eq!(machine.phase(), Phase::Complete);
        assert_eq!(machine.trial_index(), 8);
        assert_eq!(
            transition.finished,
            Some(ResultPayload {
                x: vec![3.0, 50.0, 1.0, 70.0],
                y: vec![10.0, 20.0, 30.0, 40.0],
            })
        );
        assert_eq!(transition.commands.last(), Some(&RenderCommand::Detach));

        assert!(machine.commit(5.0).is_noop());
        assert!(machine.proceed().is_noop());
        assert_counts(&machine);
    }
}
