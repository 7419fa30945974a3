//! Capture hardware contracts
//!
//! The camera and microphone are external collaborators; this module only
//! defines what the recorder needs from them.

pub mod traits;

// Re-export traits
pub use traits::{
    first_supporting, AudioSettings, CameraLens, CaptureDevice, CaptureError, CaptureEvent, CaptureResult,
    DeviceFormat, FrameRateRange, MicrophoneDevice, PermissionStatus, Resolution,
};
