use clap::{Parser, Subcommand};
use speechcast::Config;
use speechcast::audio::AudioFormat;
use speechcast::chunker::{ChunkStrategy, MAX_CHUNK_SIZE};
use speechcast::config::DEFAULT_API_BASE;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about = "Turn long text into a single speech audio file")]
pub struct Args {
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    #[clap(long, env = "OPENAI_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    #[clap(long, default_value = "./public")]
    pub output_dir: PathBuf,

    #[clap(long, default_value = "./tmp")]
    pub work_dir: PathBuf,

    /// JSON file listing finished conversions
    #[clap(long, default_value = "./public/library.json")]
    pub library: PathBuf,

    #[clap(subcommand)]
    pub command: CommandArgs,
}

#[derive(Subcommand, Debug)]
pub enum CommandArgs {
    /// Convert a text file (or `-` for stdin) to speech
    Convert {
        input: PathBuf,

        #[clap(long, default_value_t = MAX_CHUNK_SIZE)]
        chunk_chars: usize,

        #[clap(long, default_value_t = 1)]
        concurrency: usize,

        #[clap(long, value_enum, default_value_t = ChunkStrategy::Fixed)]
        chunking: ChunkStrategy,

        #[clap(long, value_enum, default_value_t = AudioFormat::Mp3)]
        format: AudioFormat,

        #[clap(long, default_value = "tts-1")]
        tts_model: String,

        #[clap(long, default_value = "fable")]
        voice: String,

        #[clap(long, default_value = "gpt-3.5-turbo")]
        title_model: String,
    },
    /// List finished conversions
    List,
    /// Delete a conversion and its audio file
    Delete { id: String },
}

impl Args {
    /// Pipeline settings for `convert`; `None` for the other commands.
    pub fn config(&self) -> Option<Config> {
        let CommandArgs::Convert {
            chunk_chars,
            concurrency,
            chunking,
            format,
            tts_model,
            voice,
            title_model,
            ..
        } = &self.command
        else {
            return None;
        };
        Some(Config {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            output_dir: self.output_dir.clone(),
            work_dir: self.work_dir.clone(),
            max_chunk_chars: *chunk_chars,
            concurrency: *concurrency,
            chunking: *chunking,
            format: *format,
            tts_model: tts_model.clone(),
            voice: voice.clone(),
            title_model: title_model.clone(),
        })
    }
}
