//! Merging per-chunk audio files into one output file.
//!
//! Two mergers exist: [`FfmpegMerger`] decodes every input with `ffmpeg` and
//! re-encodes through the `concat` filter, and [`WavMerger`] concatenates WAV
//! samples in process with `hound`. Both leave no output file behind on error.

use hound::{SampleFormat, WavReader, WavWriter};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::MergeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    /// Value of `response_format` in a speech request.
    pub fn response_format(self) -> &'static str {
        self.extension()
    }
}

pub trait AudioMerger: Send + Sync + 'static {
    /// Merge `inputs`, in the given order, into `output`.
    fn merge(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> impl Future<Output = Result<(), MergeError>> + Send;
}

async fn check_inputs(inputs: &[PathBuf]) -> Result<(), MergeError> {
    if inputs.is_empty() {
        return Err(MergeError::NoInputs);
    }
    for path in inputs {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(MergeError::MissingInput(path.clone())),
        }
    }
    Ok(())
}

async fn remove_partial_output(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial output {}: {}", output.display(), e),
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    program: PathBuf,
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegMerger {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for input in inputs {
            args.push("-i".into());
            args.push(input.display().to_string());
        }
        let mut filter: String = (0..inputs.len()).map(|i| format!("[{}:a]", i)).collect();
        filter.push_str(&format!("concat=n={}:v=0:a=1[out]", inputs.len()));
        args.extend([
            "-filter_complex".to_string(),
            filter,
            "-map".to_string(),
            "[out]".to_string(),
            output.display().to_string(),
        ]);
        args
    }

    async fn run(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        check_inputs(inputs).await?;
        let args = Self::args(inputs, output);
        debug!("{} {}", self.program.display(), args.join(" "));

        let out = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            error!("ffmpeg failed to concatenate audio: {}", stderr);
            return Err(MergeError::Tool {
                status: out.status.to_string(),
                stderr,
            });
        }
        Ok(())
    }
}

impl AudioMerger for FfmpegMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        info!("Merging {} audio files into {}", inputs.len(), output.display());
        let result = self.run(inputs, output).await;
        if result.is_err() {
            remove_partial_output(output).await;
        }
        result
    }
}

/// In-process WAV concatenation. All inputs must share one sample format.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavMerger;

impl AudioMerger for WavMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        info!("Merging {} WAV files into {}", inputs.len(), output.display());
        let result = match check_inputs(inputs).await {
            Ok(()) => {
                let inputs = inputs.to_vec();
                let target = output.to_path_buf();
                tokio::task::spawn_blocking(move || merge_wav_files(&inputs, &target))
                    .await
                    .unwrap_or_else(|e| Err(MergeError::Io(std::io::Error::other(e))))
            }
            Err(e) => Err(e),
        };
        if result.is_err() {
            remove_partial_output(output).await;
        }
        result
    }
}

pub fn merge_wav_files(inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
    let first = inputs.first().ok_or(MergeError::NoInputs)?;
    let spec = WavReader::open(first)?.spec();
    let mut writer = WavWriter::create(output, spec)?;

    for path in inputs {
        let mut reader = WavReader::open(path)?;
        if reader.spec() != spec {
            return Err(MergeError::FormatMismatch { path: path.clone() });
        }
        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                }
            }
        }
    }
    let frames = writer.duration();
    writer.finalize()?;
    debug!(
        "Merged {} WAV files, {:.2} seconds",
        inputs.len(),
        frames as f64 / spec.sample_rate as f64
    );
    Ok(())
}

/// One merger per output format: WAV is merged in process, everything else
/// goes through ffmpeg.
#[derive(Debug, Clone)]
pub enum FormatMerger {
    Ffmpeg(FfmpegMerger),
    Wav(WavMerger),
}

impl FormatMerger {
    pub fn for_format(format: AudioFormat) -> Self {
        match format {
            AudioFormat::Wav => FormatMerger::Wav(WavMerger),
            _ => FormatMerger::Ffmpeg(FfmpegMerger::default()),
        }
    }
}

impl AudioMerger for FormatMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        match self {
            FormatMerger::Ffmpeg(m) => m.merge(inputs, output).await,
            FormatMerger::Wav(m) => m.merge(inputs, output).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavSpec;
    use tempfile::TempDir;

    fn spec(sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_wav(dir: &TempDir, name: &str, spec: WavSpec, samples: &[i16]) -> PathBuf {
        let path = dir.path().join(name);
        let mut w = WavWriter::create(&path, spec).unwrap();
        for s in samples {
            w.write_sample(*s).unwrap();
        }
        w.finalize().unwrap();
        path
    }

    fn read_samples(path: &Path) -> Vec<i16> {
        WavReader::open(path)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn wav_merge_keeps_input_order() {
        let dir = TempDir::new().unwrap();
        let a = write_wav(&dir, "a.wav", spec(8000), &[1, 2, 3]);
        let b = write_wav(&dir, "b.wav", spec(8000), &[4, 5]);
        let c = write_wav(&dir, "c.wav", spec(8000), &[6]);
        let out = dir.path().join("out.wav");

        WavMerger.merge(&[a.clone(), b.clone(), c.clone()], &out).await.unwrap();
        assert_eq!(read_samples(&out), vec![1, 2, 3, 4, 5, 6]);

        WavMerger.merge(&[c, a, b], &out).await.unwrap();
        assert_eq!(read_samples(&out), vec![6, 1, 2, 3, 4, 5]);
        let merged = WavReader::open(&out).unwrap();
        assert_eq!(merged.duration(), 6);
        assert_eq!(merged.spec(), spec(8000));
    }

    #[tokio::test]
    async fn missing_input_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let a = write_wav(&dir, "a.wav", spec(8000), &[1]);
        let out = dir.path().join("out.wav");

        let err = WavMerger
            .merge(&[a, dir.path().join("gone.wav")], &out)
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::MissingInput(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn mismatched_formats_leave_no_output() {
        let dir = TempDir::new().unwrap();
        let a = write_wav(&dir, "a.wav", spec(8000), &[1, 2]);
        let b = write_wav(&dir, "b.wav", spec(16000), &[3, 4]);
        let out = dir.path().join("out.wav");

        let err = WavMerger.merge(&[a, b], &out).await.unwrap_err();
        assert!(matches!(err, MergeError::FormatMismatch { .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn corrupt_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.wav");
        std::fs::write(&bad, b"definitely not a wav file").unwrap();
        let out = dir.path().join("out.wav");

        let err = WavMerger.merge(&[bad], &out).await.unwrap_err();
        assert!(matches!(err, MergeError::Wav(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn empty_input_list_is_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.mp3");
        let err = FfmpegMerger::default().merge(&[], &out).await.unwrap_err();
        assert!(matches!(err, MergeError::NoInputs));
        assert!(!out.exists());
    }

    #[test]
    fn ffmpeg_args_concat_in_order() {
        let inputs = vec![PathBuf::from("t/0.mp3"), PathBuf::from("t/1.mp3")];
        let args = FfmpegMerger::args(&inputs, Path::new("out.mp3"));
        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "t/0.mp3",
                "-i",
                "t/1.mp3",
                "-filter_complex",
                "[0:a][1:a]concat=n=2:v=0:a=1[out]",
                "-map",
                "[out]",
                "out.mp3",
            ]
        );
    }

    #[tokio::test]
    async fn missing_ffmpeg_binary_is_an_error() {
        let dir = TempDir::new().unwrap();
        let a = write_wav(&dir, "a.wav", spec(8000), &[1]);
        let out = dir.path().join("out.mp3");
        let merger = FfmpegMerger::new(dir.path().join("no-such-ffmpeg"));
        let err = merger.merge(&[a], &out).await.unwrap_err();
        assert!(matches!(err, MergeError::Io(_)));
        assert!(!out.exists());
    }
}
