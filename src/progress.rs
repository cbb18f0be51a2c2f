use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: String,
    pub percent: f64,
}

/// Everything a caller can observe about one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Finished {
        id: String,
        title: String,
        file_name: String,
    },
    Failed {
        error: String,
    },
}

/// Push-only sink for pipeline events.
///
/// Percentages never go backwards: a value lower than the last one reported is
/// raised to it. Sending never blocks, and a caller that has hung up simply
/// stops receiving.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    last_percent: Mutex<f64>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self {
            tx: Some(tx),
            last_percent: Mutex::new(0.0),
        }
    }

    /// Reporter plus the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self {
            tx: None,
            last_percent: Mutex::new(0.0),
        }
    }

    pub fn report(&self, status: impl Into<String>, percent: f64) {
        let percent = {
            let mut last = self
                .last_percent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let clamped = percent.clamp(0.0, 100.0).max(*last);
            *last = clamped;
            clamped
        };
        let status = status.into();
        debug!("progress {:>5.1}% {}", percent, status);
        self.send(PipelineEvent::Progress(ProgressEvent { status, percent }));
    }

    pub fn finished(&self, id: &str, title: &str, file_name: &str) {
        self.send(PipelineEvent::Finished {
            id: id.to_string(),
            title: title.to_string(),
            file_name: file_name.to_string(),
        });
    }

    pub fn failed(&self, error: impl Into<String>) {
        self.send(PipelineEvent::Failed {
            error: error.into(),
        });
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("progress receiver closed; dropping event");
            }
        }
    }
}
