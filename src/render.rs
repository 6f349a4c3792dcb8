//! Rendering commands
//!
//! The trial engine never draws anything itself. It emits [`RenderCommand`]s
//! that a host surface applies to three bars: the input (stimulus) bar, the
//! participant's response bar, and the feedback bar showing the true value.

use serde::{Deserialize, Serialize};

/// One update to the drawing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RenderCommand {
    /// Set the input bar width and show the input and response bars
    ShowStimulus { width_px: f64 },
    /// Resize the response bar
    SetResponseBar { height_px: f64 },
    /// Show the feedback bar at the given height
    ShowFeedback { height_px: f64 },
    HideFeedback,
    /// Hide the input and response bars
    HideBars,
    /// Brief error animation on the feedback bar
    FlashFeedback,
    /// Allow the proceed trigger to fire
    EnableProceed,
    /// Ignore the proceed trigger until re-enabled
    DisableProceed,
    /// Remove the drawing surface; no further commands follow
    Detach,
}

/// A drawing surface that applies render commands
pub trait TrialRenderer {
    fn apply(&mut self, command: &RenderCommand);
}

impl<R: TrialRenderer + ?Sized> TrialRenderer for &mut R {
    fn apply(&mut self, command: &RenderCommand) {
        (**self).apply(command);
    }
}

/// Renderer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl TrialRenderer for NullRenderer {
    fn apply(&mut self, _command: &RenderCommand) {}
}

/// Renderer that keeps a log of commands and the resulting bar state
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    log: Vec<RenderCommand>,
    state: SurfaceState,
}

/// Visible state of the three bars after applying a command sequence
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SurfaceState {
    pub stimulus_width_px: f64,
    pub response_height_px: f64,
    pub feedback_height_px: f64,
    pub bars_visible: bool,
    pub feedback_visible: bool,
    pub proceed_enabled: bool,
    pub flashes: usize,
    pub detached: bool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[RenderCommand] {
        &self.log
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    /// Drain the commands recorded since the last call
    pub fn take_log(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.log)
    }
}

impl TrialRenderer for RecordingRenderer {
    fn apply(&mut self, command: &RenderCommand) {
        let state = &mut self.state;
        match command {
            RenderCommand::ShowStimulus { width_px } => {
                state.stimulus_width_px = *width_px;
                state.bars_visible = true;
            }
            RenderCommand::SetResponseBar { height_px } => state.response_height_px = *height_px,
            RenderCommand::ShowFeedback { height_px } => {
                state.feedback_height_px = *height_px;
                state.feedback_visible = true;
            }
            RenderCommand::HideFeedback => state.feedback_visible = false,
            RenderCommand::HideBars => state.bars_visible = false,
            RenderCommand::FlashFeedback => state.flashes += 1,
            RenderCommand::EnableProceed => state.proceed_enabled = true,
            RenderCommand::DisableProceed => state.proceed_enabled = false,
            RenderCommand::Detach => {
                state.detached = true;
                state.bars_visible = false;
                state.feedback_visible = false;
                state.proceed_enabled = false;
            }
        }
        self.log.push(command.clone());
    }
}
