//! End-to-end session scenarios driven through the public API.

use function_learning::bootstrap::InMemoryServer;
use function_learning::config::RetryPolicy;
use function_learning::session::{MemorySink, SessionEvent, Step};
use function_learning::types::{CorrectionState, TrainingPair};
use function_learning::{
    ExperimentConfig, Phase, RecordingRenderer, ServerSink, Session, SessionError, Stimuli,
    StimulusGenerator, TestPlan, TrainingSet,
};
use pretty_assertions::assert_eq;

fn config() -> ExperimentConfig {
    ExperimentConfig::default().with_seed(2024).with_retry(RetryPolicy::no_retry())
}

fn scenario_a_training() -> TrainingSet {
    TrainingSet::new(vec![
        TrainingPair { x: 1.0, y: 2.0 },
        TrainingPair { x: 2.0, y: 4.0 },
        TrainingPair { x: 3.0, y: 5.0 },
        TrainingPair { x: 4.0, y: 8.0 },
    ])
    .unwrap()
}

fn page_y(value: f64) -> f64 {
    function_learning::simulate::pointer_for(value, &ExperimentConfig::default())
}

fn respond(session: &mut Session<RecordingRenderer, MemorySink>, value: f64) -> Step {
    session.dispatch(SessionEvent::PointerMove {
        page_y: page_y(value),
    });
    session.dispatch(SessionEvent::Commit)
}

fn new_session(stimuli: Stimuli) -> Session<RecordingRenderer, MemorySink> {
    Session::with_stimuli(config(), stimuli, RecordingRenderer::new(), MemorySink::new()).unwrap()
}

fn assert_invariants(session: &Session<RecordingRenderer, MemorySink>) {
    let machine = session.machine();
    let index = machine.trial_index();
    let half = machine.training_trials().unwrap_or(0);
    assert_eq!(
        machine.training_responses().len() + machine.test_responses().len(),
        index
    );
    assert_eq!(machine.training_responses().len(), index.min(half));
    assert_eq!(machine.test_responses().len(), index.saturating_sub(half));
}

#[test]
fn scenario_a_perfect_learner_reaches_testing() {
    let stimuli = StimulusGenerator::generate(scenario_a_training(), &config()).unwrap();
    let mut session = new_session(stimuli);

    for pair in scenario_a_training().pairs() {
        respond(&mut session, pair.y);
        assert!(!session.machine().is_ready());
        respond(&mut session, pair.y);
        assert!(session.machine().is_ready());
        assert_eq!(session.dispatch(SessionEvent::Proceed), Step::Updated);
        assert_invariants(&session);
    }

    assert_eq!(session.machine().trial_index(), 4);
    assert_eq!(session.phase(), Phase::Testing);
    assert_eq!(session.machine().training_responses(), &[2.0, 4.0, 5.0, 8.0]);
}

#[test]
fn scenario_b_close_first_response_still_needs_correction() {
    let training = TrainingSet::from_columns(vec![20.0, 30.0], vec![10.0, 15.0]).unwrap();
    let stimuli = Stimuli {
        training,
        test_plan: TestPlan::new(vec![20.0, 70.0]),
    };
    let mut session = new_session(stimuli);

    // First response 7 is within tolerance of 10, but only shows feedback
    respond(&mut session, 7.0);
    assert!(!session.machine().is_ready());
    assert_eq!(
        session.machine().correction_state(),
        CorrectionState::AwaitingCorrection
    );
    assert!(session.renderer().state().feedback_visible);
    assert_eq!(session.renderer().state().feedback_height_px, 30.0);
    assert_eq!(session.dispatch(SessionEvent::Proceed), Step::Ignored);

    // The same value on the correction commit is accepted
    respond(&mut session, 7.0);
    assert!(session.machine().is_ready());
    assert!(!session.renderer().state().feedback_visible);
    assert!(session.renderer().state().proceed_enabled);

    session.dispatch(SessionEvent::Proceed);
    assert_eq!(session.machine().training_responses(), &[7.0]);
}

#[test]
fn failed_corrections_never_ready_the_trial() {
    let stimuli = StimulusGenerator::generate(scenario_a_training(), &config()).unwrap();
    let mut session = new_session(stimuli);

    respond(&mut session, 50.0);
    for _ in 0..10 {
        respond(&mut session, 50.0);
        assert!(!session.machine().is_ready());
        assert_eq!(session.dispatch(SessionEvent::Proceed), Step::Ignored);
        assert_invariants(&session);
    }
    assert_eq!(session.renderer().state().flashes, 10);
    assert_eq!(
        session.machine().correction_state(),
        CorrectionState::AwaitingCorrection
    );
}

#[test]
fn scenario_c_last_trial_reports_once() {
    let stimuli = StimulusGenerator::generate(scenario_a_training(), &config()).unwrap();
    let plan = stimuli.test_plan.clone();
    let mut session = new_session(stimuli);

    for pair in scenario_a_training().pairs() {
        respond(&mut session, pair.y);
        respond(&mut session, pair.y);
        session.dispatch(SessionEvent::Proceed);
    }
    for value in [11.0, 22.0, 33.0] {
        respond(&mut session, value);
        assert_eq!(session.dispatch(SessionEvent::Proceed), Step::Updated);
        assert_invariants(&session);
    }

    let n = session.machine().total_trials().unwrap();
    assert_eq!(session.machine().trial_index(), n - 1);

    respond(&mut session, 44.0);
    assert_eq!(session.machine().test_responses().len(), 3);
    assert_eq!(session.dispatch(SessionEvent::Proceed), Step::Completed);
    assert_eq!(session.phase(), Phase::Complete);
    assert_invariants(&session);

    let reports = session.sink().reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result.x, plan.as_slice().to_vec());
    assert_eq!(reports[0].result.y, vec![11.0, 22.0, 33.0, 44.0]);
    assert_eq!(reports[0].result.x.len(), n / 2);

    for event in [
        SessionEvent::Commit,
        SessionEvent::Proceed,
        SessionEvent::PointerMove { page_y: 10.0 },
    ] {
        assert_eq!(session.dispatch(event), Step::Ignored);
    }
    assert_eq!(session.sink().reports().len(), 1);
    assert!(session.renderer().state().detached);
}

#[test]
fn scenario_d_small_range_is_a_bootstrap_failure() {
    let training = TrainingSet::from_columns(
        (1..=10).map(f64::from).collect(),
        (1..=10).map(|v| f64::from(v) * 2.0).collect(),
    )
    .unwrap();
    let config = config().with_x_max(12);

    let err = StimulusGenerator::generate(training.clone(), &config).unwrap_err();
    assert!(err.is_bootstrap_failure());
    assert!(matches!(
        err,
        SessionError::InsufficientNovelValues {
            needed: 5,
            available: 2,
            ..
        }
    ));

    let mut server = InMemoryServer::new(&training).unwrap();
    let mut session = Session::new(config, RecordingRenderer::new(), MemorySink::new()).unwrap();
    assert!(session.bootstrap_from(&mut server).is_err());
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.bootstrap_error().is_some());
}

#[test]
fn bootstrap_then_report_back_to_server() {
    let mut server = InMemoryServer::new(&scenario_a_training()).unwrap();
    let mut session = Session::new(config(), RecordingRenderer::new(), MemorySink::new()).unwrap();
    let agent = session.bootstrap_from(&mut server).unwrap();
    let stimuli = session.machine().stimuli().cloned().unwrap();

    let mut session = Session::with_stimuli(
        config(),
        stimuli,
        RecordingRenderer::new(),
        ServerSink::new(&mut server, agent.clone()),
    )
    .unwrap();

    for pair in scenario_a_training().pairs() {
        for _ in 0..2 {
            session.dispatch(SessionEvent::PointerMove {
                page_y: page_y(pair.y),
            });
            session.dispatch(SessionEvent::Commit);
        }
        session.dispatch(SessionEvent::Proceed);
    }
    for _ in 0..4 {
        session.dispatch(SessionEvent::PointerMove {
            page_y: page_y(50.0),
        });
        session.dispatch(SessionEvent::Commit);
        session.dispatch(SessionEvent::Proceed);
    }
    assert_eq!(session.phase(), Phase::Complete);
    assert!(session.report_error().is_none());
    drop(session);

    assert_eq!(server.posted().len(), 1);
    assert_eq!(server.posted()[0].0, agent);
    let posted: serde_json::Value = serde_json::from_str(&server.posted()[0].1).unwrap();
    assert_eq!(posted["y"], serde_json::json!([50.0, 50.0, 50.0, 50.0]));
}

#[test]
fn rejected_submission_keeps_session_complete() {
    let mut server = InMemoryServer::new(&scenario_a_training())
        .unwrap()
        .rejecting_posts();
    let stimuli = StimulusGenerator::generate(scenario_a_training(), &config()).unwrap();
    let agent = function_learning::AgentId("agent-1".to_string());
    let mut session = Session::with_stimuli(
        config(),
        stimuli,
        RecordingRenderer::new(),
        ServerSink::new(&mut server, agent),
    )
    .unwrap();

    for pair in scenario_a_training().pairs() {
        for _ in 0..2 {
            session.dispatch(SessionEvent::PointerMove {
                page_y: page_y(pair.y),
            });
            session.dispatch(SessionEvent::Commit);
        }
        session.dispatch(SessionEvent::Proceed);
    }
    for _ in 0..4 {
        session.dispatch(SessionEvent::Commit);
        session.dispatch(SessionEvent::Proceed);
    }

    assert_eq!(session.phase(), Phase::Complete);
    assert!(matches!(
        session.report_error(),
        Some(SessionError::Reporting(_))
    ));
    assert!(session.report().is_some());
}
