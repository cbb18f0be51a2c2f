//! Text in, one audio file out.
//!
//! A run chunks the text, asks for a title while the chunks are synthesized,
//! merges the chunk audio in order and records the result. Chunk audio lives in
//! a per-run directory under `work_dir`, which is removed whether the run
//! succeeds or fails.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audio::AudioMerger;
use crate::chunker::{TextChunk, chunk_text};
use crate::config::Config;
use crate::error::{ConfigError, PipelineError, StoreError};
use crate::executor::synthesize_all;
use crate::gate::PermitGate;
use crate::progress::ProgressReporter;
use crate::store::{ConversionRecord, ConversionStore};
use crate::title::TitleGenerator;
use crate::tts::SpeechSynthesizer;

/// Message sent to the caller when a run fails; details go to the log.
pub const FAILURE_MESSAGE: &str = "An error occurred during conversion";

pub struct Pipeline<S, T, M> {
    config: Config,
    synthesizer: Arc<S>,
    titles: T,
    merger: M,
    store: ConversionStore,
}

impl<S, T, M> Pipeline<S, T, M>
where
    S: SpeechSynthesizer,
    T: TitleGenerator,
    M: AudioMerger,
{
    /// Fails if `config` has a zero chunk size or concurrency.
    pub fn new(
        config: Config,
        synthesizer: S,
        titles: T,
        merger: M,
        store: ConversionStore,
    ) -> Result<Self, ConfigError> {
        config.validate_limits()?;
        Ok(Self {
            config,
            synthesizer: Arc::new(synthesizer),
            titles,
            merger,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ConversionStore {
        &self.store
    }

    /// Convert `text` into one audio file and register it.
    ///
    /// Progress and the final outcome are pushed to `reporter`. On error no
    /// audio file and no record are left behind.
    pub async fn convert(
        &self,
        text: &str,
        reporter: &ProgressReporter,
    ) -> Result<ConversionRecord, PipelineError> {
        if text.trim().is_empty() {
            warn!("Refusing to convert empty text");
            reporter.failed(FAILURE_MESSAGE);
            return Err(PipelineError::EmptyInput);
        }

        reporter.report("Generating title", 0.0);
        let chunks = chunk_text(text, self.config.max_chunk_chars, self.config.chunking);
        info!("Generating {} chunks", chunks.len());

        let run_id = Uuid::new_v4().simple().to_string();
        let work_dir = self.config.work_dir.join(format!("run_{}", run_id));
        let file_name = format!(
            "speech_{}_{}.{}",
            Utc::now().timestamp_millis(),
            &run_id[..8],
            self.config.format.extension()
        );
        let output_path = self.config.output_dir.join(&file_name);

        let title = match self.run(text, &chunks, &work_dir, &output_path, reporter).await {
            Ok(title) => title,
            Err(e) => {
                error!("Conversion failed: {}", e);
                remove_dir(&work_dir).await;
                remove_file(&output_path).await;
                reporter.failed(FAILURE_MESSAGE);
                return Err(e);
            }
        };

        reporter.report("Cleaning up temporary files", 90.0);
        remove_dir(&work_dir).await;

        let record = ConversionRecord {
            id: Uuid::new_v4().to_string(),
            title,
            file_name,
            output_path,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone());

        reporter.report("Conversion complete", 100.0);
        reporter.finished(&record.id, &record.title, &record.file_name);
        info!(
            "Conversion {} complete: \"{}\" -> {}",
            record.id,
            record.title,
            record.output_path.display()
        );
        Ok(record)
    }

    async fn run(
        &self,
        text: &str,
        chunks: &[TextChunk],
        work_dir: &Path,
        output_path: &Path,
        reporter: &ProgressReporter,
    ) -> Result<String, PipelineError> {
        tokio::fs::create_dir_all(work_dir).await?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let title = async {
            let title = self.titles.generate_title(text).await;
            reporter.report("Title generated", 10.0);
            title
        };
        let synthesis = synthesize_all(
            chunks,
            Arc::clone(&self.synthesizer),
            Arc::new(PermitGate::new(self.config.concurrency)),
            work_dir,
            self.config.format.extension(),
            reporter,
        );
        let (title, results) = tokio::join!(title, synthesis);
        let results = results?;

        reporter.report("Merging audio files", 80.0);
        let paths: Vec<PathBuf> = results.into_iter().map(|r| r.artifact_path).collect();
        self.merger.merge(&paths, output_path).await?;
        info!("Merging finished: {}", output_path.display());

        Ok(title)
    }

    /// Remove a finished conversion and its audio file.
    pub async fn delete_conversion(&self, id: &str) -> Result<ConversionRecord, StoreError> {
        self.store.delete(id).await
    }
}

async fn remove_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove temporary directory {}: {}", dir.display(), e),
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
