//! Recording Registry
//!
//! Owns the `active` and `failed` partitions behind one mutex. Identities are
//! assigned here, captures are launched from here, and the supervisor's exit
//! transition is the only path that moves a recording out of `active`.

use crate::error::{RecorderError, RecorderResult};
use crate::launcher::{interrupt_process_group, CaptureRequest, Launcher, StreamlinkLauncher};
use crate::supervisor::{self, ExitOutcome};
use crate::types::{
    recording_filename, ActiveRecording, FailedRecording, RecorderEvent, RecorderStats,
    RecordingId, RecordingsSnapshot,
};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use streamconf::StreamConfig;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Link to a running capture. Only the group id is kept here; the child
/// itself belongs to the supervisor task.
#[derive(Debug, Clone, Copy)]
struct ProcessHandle {
    pgid: i32,
}

#[derive(Debug)]
struct Recording {
    channel: String,
    filename: String,
    started_at: DateTime<Local>,
    started: Instant,
    process: Option<ProcessHandle>,
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct Registry {
    active: HashMap<RecordingId, Recording>,
    failed: HashMap<RecordingId, Recording>,
}

impl Registry {
    fn contains(&self, id: &RecordingId) -> bool {
        self.active.contains_key(id) || self.failed.contains_key(id)
    }

    /// A fresh id not held by any live record.
    fn fresh_id(&self) -> RecordingId {
        loop {
            let id = RecordingId::new();
            if !self.contains(&id) {
                return id;
            }
        }
    }
}

struct Shared {
    data_dir: PathBuf,
    launcher: Arc<dyn Launcher>,
    registry: Mutex<Registry>,
    events: broadcast::Sender<RecorderEvent>,
}

/// Handle to the recording registry. Clones share the same state.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Shared>,
}

impl Recorder {
    pub fn new(data_dir: impl Into<PathBuf>, launcher: Arc<dyn Launcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                data_dir: data_dir.into(),
                launcher,
                registry: Mutex::new(Registry::default()),
                events,
            }),
        }
    }

    /// Recorder running the streamlink pipeline with the configured settings.
    pub fn from_config(config: &StreamConfig) -> Self {
        let launcher = StreamlinkLauncher::new(config.capture.clone());
        Self::new(config.paths.data_dir.clone(), Arc::new(launcher))
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    /// Receive lifecycle events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.events.subscribe()
    }

    /// Launch a capture of `channel` and return its id.
    ///
    /// Always yields an id. A launch failure lands the recording directly in
    /// the failed partition instead of being returned. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self, channel: &str, transcode: bool) -> RecordingId {
        let started_at = Local::now();
        let filename = recording_filename(channel, &started_at);
        let request = CaptureRequest {
            channel: channel.to_string(),
            transcode,
            output: self.shared.data_dir.join(&filename),
        };

        let mut recording = Recording {
            channel: channel.to_string(),
            filename,
            started_at,
            started: Instant::now(),
            process: None,
            failure: None,
        };

        match self.shared.launcher.launch(&request) {
            Ok(process) => {
                recording.process = Some(ProcessHandle {
                    pgid: process.pgid(),
                });

                let id = {
                    let mut registry = self.lock();
                    let id = registry.fresh_id();
                    registry.active.insert(id.clone(), recording);
                    id
                };

                tracing::info!(
                    recording.id = %id,
                    recording.channel = %channel,
                    recording.output = %request.output.display(),
                    recording.transcode = transcode,
                    recording.pgid = process.pgid(),
                    "Recording started"
                );
                self.emit(RecorderEvent::Started { id: id.clone() });

                supervisor::spawn(self.clone(), id.clone(), process);
                id
            }
            Err(err) => {
                let reason = err.to_string();
                recording.failure = Some(reason.clone());

                let id = {
                    let mut registry = self.lock();
                    let id = registry.fresh_id();
                    registry.failed.insert(id.clone(), recording);
                    id
                };

                tracing::error!(
                    recording.id = %id,
                    recording.channel = %channel,
                    recording.error = %reason,
                    "Recording could not be launched"
                );
                self.emit(RecorderEvent::LaunchFailed {
                    id: id.clone(),
                    reason,
                });
                id
            }
        }
    }

    /// Ask an active recording's process group to stop.
    ///
    /// The entry stays active until the supervisor observes the exit. The
    /// signal is sent with the registry locked so the exit transition cannot
    /// interleave between lookup and delivery.
    pub fn stop(&self, id: &RecordingId) -> RecorderResult<()> {
        {
            let registry = self.lock();
            let handle = registry
                .active
                .get(id)
                .and_then(|r| r.process)
                .ok_or_else(|| RecorderError::NotFound(id.clone()))?;

            interrupt_process_group(handle.pgid).map_err(|source| {
                tracing::warn!(recording.id = %id, error = %source, "Failed to interrupt recording");
                RecorderError::SignalFailed {
                    id: id.clone(),
                    source,
                }
            })?;
        }

        tracing::info!(recording.id = %id, "Stop requested");
        self.emit(RecorderEvent::StopRequested { id: id.clone() });
        Ok(())
    }

    /// Forget a failed recording. Unknown ids are ignored.
    pub fn dismiss(&self, id: &RecordingId) {
        let removed = self.lock().failed.remove(id);
        if let Some(recording) = removed {
            tracing::debug!(
                recording.id = %id,
                recording.filename = %recording.filename,
                "Failed recording dismissed"
            );
        }
    }

    /// Consistent copy of both partitions, elapsed times computed now.
    pub fn list(&self) -> RecordingsSnapshot {
        let registry = self.lock();

        let mut active: Vec<ActiveRecording> = registry
            .active
            .iter()
            .map(|(id, r)| ActiveRecording {
                id: id.clone(),
                channel: r.channel.clone(),
                filename: r.filename.clone(),
                started_at: r.started_at,
                elapsed_secs: r.started.elapsed().as_secs(),
            })
            .collect();

        let mut failed: Vec<FailedRecording> = registry
            .failed
            .iter()
            .map(|(id, r)| FailedRecording {
                id: id.clone(),
                channel: r.channel.clone(),
                filename: r.filename.clone(),
                started_at: r.started_at,
                reason: r.failure.clone().unwrap_or_default(),
            })
            .collect();
        drop(registry);

        active.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        failed.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));

        RecordingsSnapshot { active, failed }
    }

    /// Interrupt every active recording. Returns how many were signalled.
    pub fn stop_all(&self) -> usize {
        let mut stopped = Vec::new();
        {
            let registry = self.lock();
            for (id, recording) in &registry.active {
                let Some(handle) = recording.process else {
                    continue;
                };
                match interrupt_process_group(handle.pgid) {
                    Ok(()) => stopped.push(id.clone()),
                    Err(e) => {
                        tracing::warn!(recording.id = %id, error = %e, "Failed to interrupt recording")
                    }
                }
            }
        }

        for id in &stopped {
            self.emit(RecorderEvent::StopRequested { id: id.clone() });
        }
        tracing::info!(count = stopped.len(), "Interrupted active recordings");
        stopped.len()
    }

    pub fn stats(&self) -> RecorderStats {
        let registry = self.lock();
        RecorderStats {
            active: registry.active.len(),
            failed: registry.failed.len(),
        }
    }

    /// Exit transition, called once per recording by its supervisor.
    pub(crate) fn finish(&self, id: &RecordingId, outcome: ExitOutcome) {
        let mut registry = self.lock();
        let Some(mut recording) = registry.active.remove(id) else {
            tracing::warn!(recording.id = %id, "Exit reported for a recording that is not active");
            return;
        };
        recording.process = None;
        let duration_secs = recording.started.elapsed().as_secs();

        match outcome {
            ExitOutcome::Clean => {
                drop(registry);
                tracing::info!(
                    recording.id = %id,
                    recording.filename = %recording.filename,
                    recording.duration_secs = duration_secs,
                    "Recording finished"
                );
                self.emit(RecorderEvent::Finished { id: id.clone() });
            }
            ExitOutcome::Failed(reason) => {
                recording.failure = Some(reason.clone());
                let filename = recording.filename.clone();
                registry.failed.insert(id.clone(), recording);
                drop(registry);

                tracing::error!(
                    recording.id = %id,
                    recording.filename = %filename,
                    recording.duration_secs = duration_secs,
                    recording.error = %reason,
                    "Recording failed"
                );
                self.emit(RecorderEvent::Failed {
                    id: id.clone(),
                    reason,
                });
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Every mutation is a single insert or remove, so a poisoned guard
        // still holds a consistent registry.
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    struct MissingBinary;

    impl Launcher for MissingBinary {
        fn command(&self, _request: &CaptureRequest) -> Command {
            Command::new("/nonexistent/streaman-capture")
        }
    }

    fn recorder() -> Recorder {
        Recorder::new("/tmp", Arc::new(MissingBinary))
    }

    #[tokio::test]
    async fn launch_failure_goes_straight_to_failed() {
        let recorder = recorder();
        let id = recorder.start("alice", false);

        let snapshot = recorder.list();
        assert!(snapshot.active.is_empty());
        let failure = snapshot.failure(&id).expect("failed entry");
        assert!(failure.reason.starts_with("launch failed"));
        assert!(failure.filename.starts_with("alice_"));
        assert!(failure.filename.ends_with(".ts"));
        assert_eq!(failure.channel, "alice");
    }

    #[tokio::test]
    async fn stop_unknown_is_not_found() {
        let recorder = recorder();
        let failed_id = recorder.start("alice", false);

        let err = recorder.stop(&RecordingId::from("nonexistent-id")).unwrap_err();
        assert!(matches!(err, RecorderError::NotFound(_)));

        // Failed entries are not stoppable either.
        let err = recorder.stop(&failed_id).unwrap_err();
        assert!(matches!(err, RecorderError::NotFound(_)));

        assert_eq!(recorder.stats(), RecorderStats { active: 0, failed: 1 });
    }

    #[tokio::test]
    async fn dismiss_is_idempotent() {
        let recorder = recorder();
        let id = recorder.start("bob", true);
        assert_eq!(recorder.stats().failed, 1);

        recorder.dismiss(&id);
        recorder.dismiss(&id);
        recorder.dismiss(&RecordingId::from("never-existed"));

        assert_eq!(recorder.stats(), RecorderStats::default());
    }

    #[tokio::test]
    async fn finish_for_unknown_id_changes_nothing() {
        let recorder = recorder();
        let id = recorder.start("carol", false);

        recorder.finish(&id, ExitOutcome::Failed("late".into()));
        recorder.finish(&RecordingId::new(), ExitOutcome::Clean);

        let snapshot = recorder.list();
        assert_eq!(snapshot.failed.len(), 1);
        assert!(snapshot.failure(&id).unwrap().reason.starts_with("launch failed"));
    }

    #[tokio::test]
    async fn launch_failure_is_broadcast() {
        let recorder = recorder();
        let mut events = recorder.subscribe();
        let id = recorder.start("dave", false);

        match events.recv().await.unwrap() {
            RecorderEvent::LaunchFailed { id: got, reason } => {
                assert_eq!(got, id);
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
