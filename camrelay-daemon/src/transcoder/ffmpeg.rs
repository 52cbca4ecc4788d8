//! ffmpeg-backed transcode runner

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::progress::ProgressParser;
use super::{task_channel, TaskControl, TaskEvent, TaskHandle, TaskSpec, TranscodeRunner};
use crate::error::RelayError;

/// Spawns one `ffmpeg` process per task.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    ffmpeg_path: String,
    stop_grace: Duration,
}

impl FfmpegRunner {
    pub fn new(ffmpeg_path: impl Into<String>, stop_grace: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            stop_grace,
        }
    }

    /// Full argument list for `spec` (contains the stream key).
    pub fn build_args(spec: &TaskSpec) -> Vec<String> {
        let video = &spec.video;
        let enc = &spec.encoder;
        let gop = video.keyframe_interval().to_string();

        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            // SRT input
            "-fflags",
            "+genpts",
            "-avoid_negative_ts",
            "make_zero",
            "-analyzeduration",
            "2000000",
            "-probesize",
            "2000000",
            "-thread_queue_size",
            "512",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(spec.input_url.clone());

        // Video
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            enc.preset.clone(),
            "-tune".to_string(),
            "zerolatency".to_string(),
            "-profile:v".to_string(),
            enc.profile.clone(),
            "-level".to_string(),
            enc.level.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-s".to_string(),
            format!("{}x{}", video.width, video.height),
            "-r".to_string(),
            video.framerate.to_string(),
            "-b:v".to_string(),
            format!("{}k", video.bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", video.maxrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", video.bufsize_kbps),
            "-g".to_string(),
            gop.clone(),
            "-keyint_min".to_string(),
            gop,
            "-sc_threshold".to_string(),
            "0".to_string(),
            "-threads".to_string(),
            enc.threads.to_string(),
        ]);

        // Audio
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", enc.audio_bitrate_kbps),
            "-ar".to_string(),
            enc.audio_sample_rate.to_string(),
            "-ac".to_string(),
            enc.audio_channels.to_string(),
        ]);

        // RTMP(S) output
        args.extend([
            "-f".to_string(),
            "flv".to_string(),
            "-flvflags".to_string(),
            "no_duration_filesize".to_string(),
            spec.output_url(),
        ]);

        args
    }
}

impl TranscodeRunner for FfmpegRunner {
    fn start(&self, spec: &TaskSpec) -> Result<TaskHandle, RelayError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(Self::build_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::Task(format!("failed to spawn {}: {}", self.ffmpeg_path, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Task("ffmpeg stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RelayError::Task("ffmpeg stderr not captured".to_string()))?;

        info!("🎞️  ffmpeg started (pid {:?})", child.id());

        let (handle, control) = task_channel();
        tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            control,
            spec.clone(),
            self.stop_grace,
        ));

        Ok(handle)
    }
}

/// Owns the child until it exits, then reports exactly one terminal event.
async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    control: TaskControl,
    spec: TaskSpec,
    grace: Duration,
) {
    let TaskControl {
        events,
        mut stop,
        exited,
    } = control;

    let last_error = Arc::new(Mutex::new(None::<String>));
    let progress_task = tokio::spawn(read_progress(stdout, events.clone()));
    let stderr_task = tokio::spawn(read_stderr(stderr, spec, Arc::clone(&last_error)));

    let mut stop_requested = false;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut stop => {
            stop_requested = true;
            terminate_child(&mut child, grace).await
        }
    };

    let _ = progress_task.await;
    let _ = stderr_task.await;

    let terminal = match status {
        _ if stop_requested => TaskEvent::End,
        Ok(status) if status.success() => TaskEvent::End,
        Ok(status) => {
            let message = last_error
                .lock()
                .take()
                .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
            TaskEvent::Error(message)
        }
        Err(e) => TaskEvent::Error(format!("failed to wait for ffmpeg: {}", e)),
    };

    debug!("ffmpeg task finished: {:?}", terminal);
    let _ = events.send(terminal);
    drop(events);
    let _ = exited.send(());
}

/// SIGTERM, then SIGKILL if the process outlives `grace`.
async fn terminate_child(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("ffmpeg did not exit within {:?}, forcing kill", grace);
            child.kill().await?;
            child.wait().await
        }
    }
}

async fn read_progress(stdout: ChildStdout, events: mpsc::UnboundedSender<TaskEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    let mut parser = ProgressParser::new();
    let mut started = false;
    let mut finished = false;

    // Keep draining after `progress=end` so ffmpeg never blocks on the pipe.
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(block) = parser.push_line(&line) else {
            continue;
        };
        if finished {
            continue;
        }
        finished = block.finished;

        // A closing block with no prior output is not the relay going live.
        if finished && !started {
            debug!("ffmpeg ended before producing output");
            continue;
        }

        if !started {
            started = true;
            if events.send(TaskEvent::Started).is_err() {
                return;
            }
        }

        let event = TaskEvent::Progress {
            bitrate_kbps: block.bitrate_kbps.unwrap_or(0.0),
            dropped_frames: block.dropped_frames,
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

/// Keeps the last stderr line; ffmpeg prefixes output errors with the
/// output URL, so lines are redacted before they go anywhere.
async fn read_stderr(
    stderr: ChildStderr,
    spec: TaskSpec,
    last_error: Arc<Mutex<Option<String>>>,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line = spec.redact(line);
        debug!("ffmpeg: {}", line);
        *last_error.lock() = Some(line);
    }
}
