//! Bounded synthesis of all chunks of one run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::chunker::TextChunk;
use crate::error::PipelineError;
use crate::gate::PermitGate;
use crate::progress::ProgressReporter;
use crate::tts::SpeechSynthesizer;

/// Share of the progress bar taken by synthesis: 10% to 80%.
pub const SYNTHESIS_START_PERCENT: f64 = 10.0;
pub const SYNTHESIS_SPAN_PERCENT: f64 = 70.0;

/// Audio written for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub index: usize,
    pub artifact_path: PathBuf,
}

pub fn artifact_path(work_dir: &Path, index: usize, extension: &str) -> PathBuf {
    work_dir.join(format!("chunk_{:04}.{}", index, extension))
}

/// Synthesize every chunk into `work_dir`, never running more calls at once
/// than `gate` has permits.
///
/// Chunks are dispatched in index order and the results come back in index
/// order whatever order the calls finish in. The first failure stops further
/// dispatches, cancels the calls still running and is returned; files written
/// so far are left in `work_dir` for the caller to remove.
pub async fn synthesize_all<S: SpeechSynthesizer>(
    chunks: &[TextChunk],
    synthesizer: Arc<S>,
    gate: Arc<PermitGate>,
    work_dir: &Path,
    extension: &str,
    reporter: &ProgressReporter,
) -> Result<Vec<SynthesisResult>, PipelineError> {
    let total = chunks.len();
    let mut slots: Vec<Option<PathBuf>> = vec![None; total];
    let mut tasks: JoinSet<Result<SynthesisResult, PipelineError>> = JoinSet::new();

    info!(
        "Synthesizing {} chunks with up to {} concurrent requests",
        total,
        gate.permits()
    );

    for chunk in chunks {
        let permit = gate.acquire().await?;

        // a sibling may have failed while we waited for the permit
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = store_result(joined, &mut slots) {
                return abort(tasks, e).await;
            }
        }

        let index = chunk.index;
        reporter.report(
            format!("Generating chunk {}/{}", index + 1, total),
            SYNTHESIS_START_PERCENT + (index as f64 / total as f64) * SYNTHESIS_SPAN_PERCENT,
        );
        debug!("Dispatching chunk {} ({} chars)", index, chunk.content.chars().count());

        let synthesizer = Arc::clone(&synthesizer);
        let content = chunk.content.clone();
        let path = artifact_path(work_dir, index, extension);
        tasks.spawn(async move {
            let _permit = permit;
            let audio = synthesizer
                .synthesize(&content)
                .await
                .map_err(|source| PipelineError::ChunkSynthesis { index, source })?;
            tokio::fs::write(&path, &audio)
                .await
                .map_err(|source| PipelineError::ChunkWrite { index, source })?;
            info!("Chunk {} written to {} ({} bytes)", index, path.display(), audio.len());
            Ok(SynthesisResult {
                index,
                artifact_path: path,
            })
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = store_result(joined, &mut slots) {
            return abort(tasks, e).await;
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, path)| {
            path.map(|artifact_path| SynthesisResult {
                index,
                artifact_path,
            })
            .ok_or(PipelineError::MissingChunk(index))
        })
        .collect()
}

fn store_result(
    joined: Result<Result<SynthesisResult, PipelineError>, JoinError>,
    slots: &mut [Option<PathBuf>],
) -> Result<(), PipelineError> {
    let result = joined??;
    match slots.get_mut(result.index) {
        Some(slot) => {
            *slot = Some(result.artifact_path);
            Ok(())
        }
        None => Err(PipelineError::MissingChunk(result.index)),
    }
}

async fn abort(
    mut tasks: JoinSet<Result<SynthesisResult, PipelineError>>,
    err: PipelineError,
) -> Result<Vec<SynthesisResult>, PipelineError> {
    error!("Chunk synthesis failed, cancelling {} pending requests: {}", tasks.len(), err);
    tasks.shutdown().await;
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::split_fixed;
    use crate::error::SynthesisError;
    use crate::progress::PipelineEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Echoes the text back as "audio", tracking how many calls overlap.
    #[derive(Default)]
    struct EchoSynth {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl SpeechSynthesizer for EchoSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
            self.started.lock().unwrap().push(text.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            // earlier chunks take longer, so completions arrive out of order
            let delay = 5 * (4 - text.len().min(4)) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(text) {
                return Err(SynthesisError::EmptyAudio);
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn chunks_of(parts: &[&str]) -> Vec<TextChunk> {
        parts
            .iter()
            .enumerate()
            .map(|(index, p)| TextChunk {
                index,
                content: p.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn results_follow_chunk_order() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(EchoSynth::default());
        let chunks = chunks_of(&["a", "bb", "ccc", "dddd"]);

        let results = synthesize_all(
            &chunks,
            Arc::clone(&synth),
            Arc::new(PermitGate::new(4)),
            dir.path(),
            "mp3",
            &ProgressReporter::disabled(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 4);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.index, i);
            assert_eq!(r.artifact_path, artifact_path(dir.path(), i, "mp3"));
            assert_eq!(std::fs::read(&r.artifact_path).unwrap(), chunks[i].content.as_bytes());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_the_permit_count() {
        for limit in 1..=3 {
            let dir = TempDir::new().unwrap();
            let synth = Arc::new(EchoSynth::default());
            let text = "abcdefghij".repeat(3);
            let chunks = split_fixed(&text, 3);

            let results = synthesize_all(
                &chunks,
                Arc::clone(&synth),
                Arc::new(PermitGate::new(limit)),
                dir.path(),
                "mp3",
                &ProgressReporter::disabled(),
            )
            .await
            .unwrap();

            assert_eq!(results.len(), 10);
            assert!(synth.max_in_flight.load(Ordering::SeqCst) <= limit);
        }
    }

    #[tokio::test]
    async fn single_permit_runs_strictly_in_order() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(EchoSynth::default());
        let chunks = chunks_of(&["a", "bb", "ccc"]);

        synthesize_all(
            &chunks,
            Arc::clone(&synth),
            Arc::new(PermitGate::new(1)),
            dir.path(),
            "mp3",
            &ProgressReporter::disabled(),
        )
        .await
        .unwrap();

        assert_eq!(synth.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*synth.started.lock().unwrap(), vec!["a", "bb", "ccc"]);
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(EchoSynth {
            fail_on: Some("ccc".into()),
            ..Default::default()
        });
        let chunks = chunks_of(&["a", "bb", "ccc", "dddd", "eeeee"]);

        let err = synthesize_all(
            &chunks,
            synth,
            Arc::new(PermitGate::new(2)),
            dir.path(),
            "mp3",
            &ProgressReporter::disabled(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::ChunkSynthesis { index: 2, .. }));
    }

    #[tokio::test]
    async fn progress_tracks_dispatched_chunks() {
        let dir = TempDir::new().unwrap();
        let (reporter, mut rx) = ProgressReporter::channel();
        let chunks = chunks_of(&["a", "bb", "ccc", "dddd"]);

        synthesize_all(
            &chunks,
            Arc::new(EchoSynth::default()),
            Arc::new(PermitGate::new(1)),
            dir.path(),
            "mp3",
            &reporter,
        )
        .await
        .unwrap();

        let mut seen = Vec::new();
        while let Ok(PipelineEvent::Progress(p)) = rx.try_recv() {
            seen.push((p.status, p.percent));
        }
        assert_eq!(
            seen,
            vec![
                ("Generating chunk 1/4".to_string(), 10.0),
                ("Generating chunk 2/4".to_string(), 27.5),
                ("Generating chunk 3/4".to_string(), 45.0),
                ("Generating chunk 4/4".to_string(), 62.5),
            ]
        );
    }

    #[tokio::test]
    async fn no_chunks_no_calls() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(EchoSynth::default());
        let results = synthesize_all(
            &[],
            Arc::clone(&synth),
            Arc::new(PermitGate::new(1)),
            dir.path(),
            "mp3",
            &ProgressReporter::disabled(),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert!(synth.started.lock().unwrap().is_empty());
    }
}
