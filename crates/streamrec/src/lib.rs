//! Streamrec - supervised stream captures
//!
//! A [`Recorder`] launches one capture pipeline per request, tracks it in an
//! `active` partition while it runs, and moves it to `failed` when it exits
//! abnormally. Clean exits leave no trace in the registry; the recorded file
//! is the only artifact.

pub mod error;
pub mod launcher;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use error::{RecorderError, RecorderResult};
pub use launcher::{
    interrupt_process_group, spawn_in_own_group, CaptureProcess, CaptureRequest, Launcher,
    StreamlinkLauncher,
};
pub use registry::Recorder;
pub use supervisor::ExitOutcome;
pub use types::{
    recording_filename, validate_channel, ActiveRecording, FailedRecording, RecorderEvent,
    RecorderStats, RecordingId, RecordingsSnapshot,
};
