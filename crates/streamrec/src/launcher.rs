//! Process Launcher
//!
//! Builds the capture pipeline for a channel and starts it as the leader of
//! a fresh process group. The pipeline is several cooperating processes
//! joined by pipes, so cancellation targets the whole group rather than a
//! single pid.

use crate::error::{RecorderError, RecorderResult};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use streamconf::CaptureConfig;
use tokio::process::{Child, Command};

/// Everything a launcher needs to start one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub channel: String,
    pub transcode: bool,
    pub output: PathBuf,
}

/// A started capture: the child process plus the group it leads.
#[derive(Debug)]
pub struct CaptureProcess {
    child: Child,
    pgid: i32,
}

impl CaptureProcess {
    /// Process group id; equal to the leader's pid.
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub(crate) fn into_child(self) -> Child {
        self.child
    }
}

/// Starts capture processes.
///
/// Implementors only describe the command; [`Launcher::launch`] applies the
/// process-group and stdio setup every capture needs.
pub trait Launcher: Send + Sync {
    fn command(&self, request: &CaptureRequest) -> Command;

    fn launch(&self, request: &CaptureRequest) -> RecorderResult<CaptureProcess> {
        spawn_in_own_group(self.command(request))
    }
}

/// Spawn `command` as the leader of a new process group with stderr piped
/// for the supervisor.
pub fn spawn_in_own_group(mut command: Command) -> RecorderResult<CaptureProcess> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(RecorderError::LaunchFailed)?;
    let pgid = child
        .id()
        .and_then(|pid| i32::try_from(pid).ok())
        .ok_or_else(|| {
            RecorderError::LaunchFailed(io::Error::other("capture exited before its pid was read"))
        })?;

    Ok(CaptureProcess { child, pgid })
}

/// `streamlink | ffmpeg` pipeline run through a bash-compatible shell.
///
/// Channel, output path and codec flags reach the shell as positional
/// parameters, so none of them is ever parsed as shell syntax.
#[derive(Debug, Clone)]
pub struct StreamlinkLauncher {
    settings: CaptureConfig,
}

/// `$1` url, `$2` quality, `$3` skip, `$4` output, `$5..` video flags.
const PIPELINE: &str =
    r#"streamlink "$1" "$2" -O | ffmpeg -i pipe:0 -ss "$3" "${@:5}" -acodec copy "$4""#;

impl StreamlinkLauncher {
    pub fn new(settings: CaptureConfig) -> Self {
        Self { settings }
    }

    pub fn stream_url(&self, channel: &str) -> String {
        self.settings.stream_url.replace("{channel}", channel)
    }

    /// Video flags: stream copy, or re-encode with the configured codec.
    pub fn video_args(&self, transcode: bool) -> Vec<String> {
        if transcode {
            vec![
                "-vcodec".to_string(),
                self.settings.transcode_codec.clone(),
                "-crf".to_string(),
                self.settings.transcode_crf.to_string(),
            ]
        } else {
            vec!["-vcodec".to_string(), "copy".to_string()]
        }
    }

    /// Full argument list passed to the shell.
    pub fn arguments(&self, request: &CaptureRequest) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            PIPELINE.to_string(),
            "streaman".to_string(),
            self.stream_url(&request.channel),
            self.settings.quality.clone(),
            self.settings.skip.clone(),
            request.output.to_string_lossy().into_owned(),
        ];
        args.extend(self.video_args(request.transcode));
        args
    }
}

impl Launcher for StreamlinkLauncher {
    fn command(&self, request: &CaptureRequest) -> Command {
        let mut command = Command::new(&self.settings.shell);
        command.args(self.arguments(request));
        command
    }
}

/// Send SIGINT to every process in group `pgid`.
#[cfg(unix)]
pub fn interrupt_process_group(pgid: i32) -> io::Result<()> {
    // 0 and -1 would address our own group or every process we may signal.
    if pgid <= 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal process group {pgid}"),
        ));
    }

    // SAFETY: `libc::kill` takes plain integers and dereferences nothing;
    // errno is read immediately after the call on the same thread.
    let rc = unsafe { libc::kill(-pgid, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn interrupt_process_group(_pgid: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups are not available on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(transcode: bool) -> CaptureRequest {
        CaptureRequest {
            channel: "alice".to_string(),
            transcode,
            output: PathBuf::from("/data/alice_20240101_000000.ts"),
        }
    }

    #[test]
    fn copy_mode_arguments() {
        let launcher = StreamlinkLauncher::new(CaptureConfig::default());
        let args = launcher.arguments(&request(false));

        assert_eq!(args[0], "-c");
        assert!(args[1].contains("streamlink"));
        assert!(args[1].contains("-acodec copy"));
        assert_eq!(
            &args[2..],
            &[
                "streaman",
                "https://twitch.tv/alice",
                "best",
                "00:00:20.0",
                "/data/alice_20240101_000000.ts",
                "-vcodec",
                "copy",
            ]
        );
    }

    #[test]
    fn transcode_mode_arguments() {
        let launcher = StreamlinkLauncher::new(CaptureConfig::default());
        let args = launcher.arguments(&request(true));
        assert_eq!(&args[7..], &["-vcodec", "libx265", "-crf", "28"]);
    }

    #[test]
    fn channel_never_lands_in_shell_text() {
        let launcher = StreamlinkLauncher::new(CaptureConfig::default());
        let args = launcher.arguments(&request(false));
        assert!(!args[1].contains("alice"));
        assert!(!args[1].contains("/data"));
    }

    #[test]
    fn stream_url_template() {
        let settings = CaptureConfig {
            stream_url: "https://example.tv/live/{channel}?src=rec".to_string(),
            ..CaptureConfig::default()
        };
        let launcher = StreamlinkLauncher::new(settings);
        assert_eq!(
            launcher.stream_url("bob"),
            "https://example.tv/live/bob?src=rec"
        );
    }

    #[tokio::test]
    async fn missing_shell_is_launch_failure() {
        let settings = CaptureConfig {
            shell: PathBuf::from("/nonexistent/streaman-shell"),
            ..CaptureConfig::default()
        };
        let launcher = StreamlinkLauncher::new(settings);
        let err = launcher.launch(&request(false)).unwrap_err();
        assert!(matches!(err, RecorderError::LaunchFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_process_leads_its_own_group() {
        use std::os::unix::process::ExitStatusExt;

        let mut command = Command::new("sleep");
        command.arg("30");
        let process = spawn_in_own_group(command).unwrap();

        let pgid = process.pgid();
        // SAFETY: getpgid only reads kernel state for the given pid.
        let group = unsafe { libc::getpgid(pgid) };
        let ours = unsafe { libc::getpgid(0) };
        assert_eq!(group, pgid);
        assert_ne!(group, ours);

        interrupt_process_group(pgid).unwrap();
        let status = process.into_child().wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGINT));
    }

    #[cfg(unix)]
    #[test]
    fn refuses_degenerate_groups() {
        assert!(interrupt_process_group(0).is_err());
        assert!(interrupt_process_group(1).is_err());
        assert!(interrupt_process_group(-5).is_err());
    }
}
