// src/video.rs - Segment video probing and eager frame decoding through FFmpeg
use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::Context;
use image::RgbImage;

use crate::error::{Result, ViewerError};

/// Frames per second of a probed video. Signal timestamps can only be derived
/// from one of these, so a trace cannot exist before its video was opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate(f64);

impl FrameRate {
    pub fn new(fps: f64) -> Result<Self> {
        if fps.is_finite() && fps > 0.0 {
            Ok(Self(fps))
        } else {
            Err(ViewerError::InvalidFrameRate(fps))
        }
    }

    pub fn fps(self) -> f64 {
        self.0
    }

    pub fn timestamp(self, index: usize) -> f64 {
        index as f64 / self.0
    }

    /// Playback clock period, one frame.
    pub fn frame_period(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub duration_seconds: Option<f64>,
}

impl VideoProbe {
    pub fn run(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            anyhow::bail!("Video file does not exist: {}", path.display());
        }

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,duration:format=duration",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(path)
            .output()
            .context("Failed to run ffprobe. Is FFmpeg installed and in PATH?")?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe rejected {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }

    /// Parses `key=value` lines. The stream duration comes first; the
    /// container duration only fills in when the stream has none.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut width = None;
        let mut height = None;
        let mut frame_rate = None;
        let mut duration_seconds = None;

        for line in text.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            match key {
                "width" => width = value.parse::<u32>().ok(),
                "height" => height = value.parse::<u32>().ok(),
                "avg_frame_rate" => frame_rate = parse_rational(value),
                "duration" if duration_seconds.is_none() => {
                    duration_seconds = value.parse::<f64>().ok().filter(|d| *d > 0.0)
                }
                _ => {}
            }
        }

        let width = width.filter(|w| *w > 0).context("Invalid video width")?;
        let height = height.filter(|h| *h > 0).context("Invalid video height")?;
        let fps = frame_rate.context("Video has no average frame rate")?;
        let frame_rate = FrameRate::new(fps).map_err(|e| anyhow::anyhow!("{e}"))?;

        Ok(Self {
            width,
            height,
            frame_rate,
            duration_seconds,
        })
    }

    pub fn estimated_frames(&self) -> Option<usize> {
        self.duration_seconds
            .map(|d| (d * self.frame_rate.fps()) as usize)
            .filter(|n| *n > 0)
    }
}

fn parse_rational(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => value.parse().ok(),
    }
}

/// Output size for a source frame capped at `max_width`, keeping the aspect
/// ratio and an even height for the scaler.
pub fn decode_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    let even = (scaled / 2 * 2).max(2);
    (max_width, even)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadProgress {
    Determinate { decoded: usize, total: usize },
    Indeterminate { decoded: usize },
}

impl LoadProgress {
    pub fn decoded(&self) -> usize {
        match *self {
            LoadProgress::Determinate { decoded, .. } | LoadProgress::Indeterminate { decoded } => {
                decoded
            }
        }
    }

    pub fn fraction(&self) -> Option<f32> {
        match *self {
            LoadProgress::Determinate { decoded, total } => {
                Some((decoded.min(total) as f32 / total as f32).clamp(0.0, 1.0))
            }
            LoadProgress::Indeterminate { .. } => None,
        }
    }
}

/// Splits a raw `rgb24` stream into frames, a bounded number per call.
pub struct FrameCollector<R> {
    reader: R,
    width: u32,
    height: u32,
    frames: Vec<RgbImage>,
    exhausted: bool,
}

impl<R: Read> FrameCollector<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            frames: Vec::new(),
            exhausted: false,
        }
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Reads up to `budget` frames. Returns true once the stream is exhausted.
    pub fn decode_batch(&mut self, budget: usize) -> std::io::Result<bool> {
        for _ in 0..budget {
            if self.exhausted {
                break;
            }
            let mut buffer = vec![0u8; self.frame_bytes()];
            match self.reader.read_exact(&mut buffer) {
                Ok(()) => {
                    if let Some(frame) = RgbImage::from_raw(self.width, self.height, buffer) {
                        self.frames.push(frame);
                    }
                }
                // A truncated trailing frame is dropped along with the EOF.
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => self.exhausted = true,
                Err(e) => return Err(e),
            }
        }
        Ok(self.exhausted)
    }

    pub fn decoded(&self) -> usize {
        self.frames.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }
}

/// The `ffmpeg` child; killed if dropped before it ran to completion.
struct FfmpegProcess {
    child: Child,
}

impl FfmpegProcess {
    fn reap(&mut self, path: &Path) {
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!("ffmpeg exited with {} for {}", status, path.display())
            }
            Err(e) => tracing::warn!("Failed to reap ffmpeg: {}", e),
            _ => {}
        }
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// `ffmpeg` arguments for a raw `rgb24` stream of the first video stream.
/// Rotation metadata is ignored so the frames keep the probed dimensions.
fn decode_args(path: &Path, width: u32, height: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        [
            "-map".to_string(),
            "0:v:0".to_string(),
            "-vf".to_string(),
            format!("scale={width}:{height}"),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args
}

/// An in-progress eager decode of raw frames, normally piped from `ffmpeg`.
pub struct VideoLoader {
    path: PathBuf,
    probe: VideoProbe,
    process: Option<FfmpegProcess>,
    collector: FrameCollector<Box<dyn Read>>,
}

impl VideoLoader {
    pub fn open(path: &Path, max_width: u32) -> Result<Self> {
        let probe = VideoProbe::run(path).map_err(ViewerError::video)?;
        let (width, height) = decode_size(probe.width, probe.height, max_width);

        let mut child = Command::new("ffmpeg")
            .args(decode_args(path, width, height))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn ffmpeg. Is FFmpeg installed and in PATH?")
            .map_err(ViewerError::video)?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(ViewerError::Video("ffmpeg stdout unavailable".into()));
        };

        tracing::info!(
            "Decoding {} ({}x{} -> {}x{} @ {:.2} fps, ~{} frames)",
            path.display(),
            probe.width,
            probe.height,
            width,
            height,
            probe.frame_rate.fps(),
            probe
                .estimated_frames()
                .map_or_else(|| "?".to_string(), |n| n.to_string())
        );

        let reader = BufReader::new(stdout);
        let mut loader = Self::from_reader(path.to_path_buf(), probe, reader, width, height);
        loader.process = Some(FfmpegProcess { child });
        Ok(loader)
    }

    /// Decodes `width` x `height` rgb24 frames from any byte source.
    pub fn from_reader(
        path: PathBuf,
        probe: VideoProbe,
        reader: impl Read + 'static,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            path,
            probe,
            process: None,
            collector: FrameCollector::new(Box::new(reader), width, height),
        }
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.probe.frame_rate
    }

    pub fn decode_batch(&mut self, budget: usize) -> Result<bool> {
        Ok(self.collector.decode_batch(budget)?)
    }

    pub fn progress(&self) -> LoadProgress {
        let decoded = self.collector.decoded();
        match self.probe.estimated_frames() {
            Some(total) => LoadProgress::Determinate { decoded, total },
            None => LoadProgress::Indeterminate { decoded },
        }
    }

    pub fn is_finished(&self) -> bool {
        self.collector.is_exhausted()
    }

    pub fn finish(self) -> Result<VideoAsset> {
        let VideoLoader {
            path,
            probe,
            process,
            collector,
        } = self;
        if let Some(mut process) = process {
            process.reap(&path);
        }
        VideoAsset::new(path, probe.frame_rate, collector.into_frames())
    }
}

/// A fully decoded clip. Immutable once built.
pub struct VideoAsset {
    path: PathBuf,
    frame_rate: FrameRate,
    frames: Vec<RgbImage>,
}

impl VideoAsset {
    pub fn new(path: PathBuf, frame_rate: FrameRate, frames: Vec<RgbImage>) -> Result<Self> {
        if frames.is_empty() {
            return Err(ViewerError::Video(format!(
                "No frames could be decoded from {}",
                path.display()
            )));
        }
        tracing::info!("Loaded {} frames from {}", frames.len(), path.display());
        Ok(Self {
            path,
            frame_rate,
            frames,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn get_frame(&self, index: usize) -> Result<&RgbImage> {
        self.frames.get(index).ok_or_else(|| {
            ViewerError::out_of_range("frame index", index as i64, 0, self.frames.len() as i64 - 1)
        })
    }

    pub fn timestamp(&self, index: usize) -> f64 {
        self.frame_rate.timestamp(index)
    }
}
