//! Function Learning - trial engine for function-learning experiments
//!
//! A participant sees an input bar of length `x` and adjusts a response bar
//! to guess `f(x)`. The engine runs `M` training trials, where the true value
//! is revealed and must be reproduced within tolerance, followed by `M`
//! testing trials without feedback, then hands the test responses to a sink.
//!
//! ## Modules
//!
//! - **Bootstrap**: agent → transmission → info handshake with the experiment server
//! - **Stimulus**: test plan generation from the training set
//! - **Machine / Session**: the trial state machine and its event dispatch
//! - **Response / Render**: pointer mapping and abstract bar rendering

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod machine;
pub mod render;
pub mod response;
pub mod session;
pub mod simulate;
pub mod stimulus;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use bootstrap::{AgentId, Bootstrap, ExperimentServer, InMemoryServer, ServerSink};
pub use config::ExperimentConfig;
pub use error::{BootstrapStage, SessionError};
pub use machine::{Transition, TrialStateMachine};
pub use render::{RecordingRenderer, RenderCommand, TrialRenderer};
pub use response::{ResponseMapper, ResponseReading};
pub use session::{MemorySink, ResultSink, Session, SessionEvent, Step};
pub use stimulus::StimulusGenerator;
pub use types::{Phase, ResultPayload, SessionReport, Stimuli, TestPlan, TrainingSet};

/// Engine version reported by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used by the CLI
pub const PRODUCER_NAME: &str = "function-learning";
