//! Recording system module
//!
//! - [`CaptureCoordinator`] drives the camera graph and the Idle/Recording
//!   state machine
//! - [`AudioSnippetRecorder`] records fixed-length microphone clips

pub mod audio;
pub mod coordinator;
pub mod state;

pub use audio::AudioSnippetRecorder;
pub use coordinator::{CaptureCoordinator, RecorderEvent, HIGH_FRAME_RATE};
pub use state::{format_elapsed, CaptureGraph, CaptureState, RecordingSession, SwitchOutcome};
