//! Session orchestration
//!
//! A [`Session`] is the single owner of all trial state for one participant.
//! Host input is reduced to three event kinds that are dispatched to the state
//! machine; render commands flow out to a [`TrialRenderer`] and the finished
//! result flows out to a [`ResultSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExperimentConfig;
use crate::error::SessionError;
use crate::machine::{Transition, TrialStateMachine};
use crate::render::{RenderCommand, TrialRenderer};
use crate::response::{ResponseMapper, ResponseReading};
use crate::types::{CorrectionState, Phase, SessionReport, Stimuli};

/// Receives the finished session; delivery guarantees belong to the sink
pub trait ResultSink {
    fn submit(&mut self, report: &SessionReport) -> Result<(), SessionError>;
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn submit(&mut self, report: &SessionReport) -> Result<(), SessionError> {
        (**self).submit(report)
    }
}

/// Sink that keeps submitted reports in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    reports: Vec<SessionReport>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[SessionReport] {
        &self.reports
    }
}

impl ResultSink for MemorySink {
    fn submit(&mut self, report: &SessionReport) -> Result<(), SessionError> {
        self.reports.push(report.clone());
        Ok(())
    }
}

/// Abstract host input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Continuous pointer movement; only resizes the response bar
    PointerMove { page_y: f64 },
    /// Submit the current response (a click)
    Commit,
    /// Advance to the next trial (the proceed key)
    Proceed,
}

/// What a dispatched event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The event had no effect
    Ignored,
    /// Trial or display state changed
    Updated,
    /// The event finished the session
    Completed,
}

/// Serializable view of session progress
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    pub trial_index: usize,
    pub total_trials: Option<usize>,
    pub correction: CorrectionState,
    pub ready_to_advance: bool,
    pub current_response: Option<f64>,
    pub training_responses: Vec<f64>,
    pub test_responses: Vec<f64>,
}

/// One participant's run through the trial sequence
pub struct Session<R: TrialRenderer, S: ResultSink> {
    id: Uuid,
    started_at: DateTime<Utc>,
    machine: TrialStateMachine,
    renderer: R,
    sink: S,
    reading: ResponseReading,
    bootstrap_error: Option<SessionError>,
    report: Option<SessionReport>,
    report_error: Option<SessionError>,
}

impl<R: TrialRenderer, S: ResultSink> Session<R, S> {
    /// Create an idle session that waits for stimuli.
    ///
    /// Fails with `InvalidConfig` when the configuration does not validate.
    pub fn new(config: ExperimentConfig, renderer: R, sink: S) -> Result<Self, SessionError> {
        let reading = ResponseMapper::initial(&config);
        Ok(Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            machine: TrialStateMachine::new(config)?,
            renderer,
            sink,
            reading,
            bootstrap_error: None,
            report: None,
            report_error: None,
        })
    }

    /// Create a session and load stimuli immediately
    pub fn with_stimuli(
        config: ExperimentConfig,
        stimuli: Stimuli,
        renderer: R,
        sink: S,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(config, renderer, sink)?;
        session.load(stimuli)?;
        Ok(session)
    }

    /// Stimuli arrived: leave `Idle` and start the first trial
    pub fn load(&mut self, stimuli: Stimuli) -> Result<(), SessionError> {
        let transition = self.machine.load(stimuli)?;
        self.bootstrap_error = None;
        self.renderer.apply(&RenderCommand::SetResponseBar {
            height_px: self.reading.extent_px,
        });
        self.render(&transition);
        Ok(())
    }

    /// The stimulus source failed; stay idle and keep the error for the host
    pub fn bootstrap_failed(&mut self, err: SessionError) {
        error!(session = %self.id, error = %err, "Bootstrap failed; session remains idle");
        self.bootstrap_error = Some(err);
    }

    /// Route one host event to its transition
    pub fn dispatch(&mut self, event: SessionEvent) -> Step {
        match event {
            SessionEvent::PointerMove { page_y } => self.pointer_move(page_y),
            SessionEvent::Commit => self.commit(),
            SessionEvent::Proceed => self.proceed(),
        }
    }

    pub fn pointer_move(&mut self, page_y: f64) -> Step {
        if self.machine.is_complete() {
            return Step::Ignored;
        }
        self.reading = ResponseMapper::map(page_y, self.machine.config());
        self.renderer.apply(&RenderCommand::SetResponseBar {
            height_px: self.reading.extent_px,
        });
        Step::Updated
    }

    pub fn commit(&mut self) -> Step {
        let transition = self.machine.commit(self.reading.value);
        self.render(&transition)
    }

    pub fn proceed(&mut self) -> Step {
        let transition = self.machine.proceed();
        let step = self.render(&transition);

        if let Some(result) = transition.finished {
            let report = SessionReport {
                session_id: self.id,
                started_at: self.started_at,
                completed_at: Utc::now(),
                training_responses: self.machine.training_responses().to_vec(),
                result,
            };
            match self.sink.submit(&report) {
                Ok(()) => info!(session = %self.id, "Results submitted"),
                Err(e) => {
                    warn!(session = %self.id, error = %e, "Result submission failed");
                    self.report_error = Some(e);
                }
            }
            self.report = Some(report);
            return Step::Completed;
        }
        step
    }

    fn render(&mut self, transition: &Transition) -> Step {
        if transition.is_noop() {
            return Step::Ignored;
        }
        for command in &transition.commands {
            self.renderer.apply(command);
        }
        Step::Updated
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn machine(&self) -> &TrialStateMachine {
        &self.machine
    }

    /// Latest pointer reading
    pub fn reading(&self) -> ResponseReading {
        self.reading
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn bootstrap_error(&self) -> Option<&SessionError> {
        self.bootstrap_error.as_ref()
    }

    /// Present once the session is complete
    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    /// Set when the sink rejected the finished report
    pub fn report_error(&self) -> Option<&SessionError> {
        self.report_error.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            phase: self.machine.phase(),
            trial_index: self.machine.trial_index(),
            total_trials: self.machine.total_trials(),
            correction: self.machine.correction_state(),
            ready_to_advance: self.machine.is_ready(),
            current_response: self.machine.current_response(),
            training_responses: self.machine.training_responses().to_vec(),
            test_responses: self.machine.test_responses().to_vec(),
        }
    }
}
