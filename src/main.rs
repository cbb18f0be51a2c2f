mod args;

use anyhow::Context;
use args::{Args, CommandArgs};
use clap::Parser;
use speechcast::audio::FormatMerger;
use speechcast::title::OpenAiTitleGenerator;
use speechcast::tts::OpenAiSynthesizer;
use speechcast::{ConversionStore, Pipeline, PipelineEvent, ProgressReporter};
use std::io::Read;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let store = ConversionStore::load(&args.library)
        .with_context(|| format!("reading library {}", args.library.display()))?;

    match &args.command {
        CommandArgs::Convert { input, .. } => {
            let config = args.config().context("convert settings")?;
            config.validate()?;
            let text = read_input(input)?;
            info!("Read {} characters from {}", text.chars().count(), input.display());

            let client = reqwest::Client::new();
            let synthesizer = OpenAiSynthesizer::new(
                client.clone(),
                &config.api_base,
                &config.api_key,
                &config.tts_model,
                &config.voice,
                config.format,
            );
            let titles = OpenAiTitleGenerator::new(
                client,
                &config.api_base,
                &config.api_key,
                &config.title_model,
            );
            let merger = FormatMerger::for_format(config.format);
            let pipeline = Pipeline::new(config, synthesizer, titles, merger, store.clone())?;

            let (reporter, mut events) = ProgressReporter::channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match &event {
                        PipelineEvent::Progress(p) => info!("[{:>3.0}%] {}", p.percent, p.status),
                        PipelineEvent::Finished { .. } | PipelineEvent::Failed { .. } => {
                            println!("{}", serde_json::to_string(&event).unwrap_or_default());
                        }
                    }
                }
            });

            let result = pipeline.convert(&text, &reporter).await;
            drop(reporter);
            if let Err(e) = printer.await {
                warn!("Progress printer task failed: {}", e);
            }

            match result {
                Ok(record) => {
                    store.save(&args.library)?;
                    info!("Saved \"{}\" as {}", record.title, record.output_path.display());
                }
                Err(e) => {
                    error!("Conversion failed: {:#}", anyhow::Error::from(e));
                    std::process::exit(1);
                }
            }
        }
        CommandArgs::List => {
            for record in store.list() {
                println!(
                    "{}  {}  {}  {}",
                    record.id,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.file_name,
                    record.title
                );
            }
        }
        CommandArgs::Delete { id } => {
            let record = store.delete(id).await?;
            store.save(&args.library)?;
            info!("Deleted {} ({})", record.id, record.file_name);
        }
    }

    Ok(())
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))
}
