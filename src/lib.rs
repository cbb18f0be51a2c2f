//! Long text to a single speech file.
//!
//! The text is split into chunks, each chunk is synthesized by a speech
//! service with a bounded number of requests in flight, and the chunk audio is
//! merged back together in order. See [`pipeline::Pipeline`].

pub mod audio;
pub mod chunker;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod title;
pub mod tts;

pub use config::Config;
pub use error::{ConfigError, MergeError, PipelineError, StoreError, SynthesisError};
pub use pipeline::Pipeline;
pub use progress::{PipelineEvent, ProgressEvent, ProgressReporter};
pub use store::{ConversionRecord, ConversionStore};
