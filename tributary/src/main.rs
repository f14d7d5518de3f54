#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod logging;

use std::io::Write;
use std::process::ExitCode;

use args::Args;
use clap::Parser;
use futures_util::StreamExt;
use tributary_config::Config;
use tributary_llm::{Completion, Dispatcher, LlmError};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<LlmError>() {
                Some(llm) => eprintln!("{}: {}", llm.error_type(), llm.client_message()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };

    logging::init(&config.logging);

    tracing::debug!(
        config_path = %args.config.display(),
        provider = args.provider.as_deref().unwrap_or("fallback"),
        model = %args.model,
        "starting completion"
    );

    let dispatcher = Dispatcher::new(config);
    let completion = dispatcher.completion(args.provider.as_deref(), args.request()).await?;

    let mut stdout = std::io::stdout().lock();
    match completion {
        Completion::Response(response) => {
            if args.json {
                writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
            } else {
                writeln!(stdout, "{}", response.text().unwrap_or_default())?;
            }
        }
        Completion::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if args.json {
                    writeln!(stdout, "{}", serde_json::to_string(&chunk)?)?;
                    continue;
                }
                for choice in &chunk.choices {
                    if let Some(content) = &choice.delta.content {
                        write!(stdout, "{content}")?;
                    }
                }
                stdout.flush()?;
            }
            if !args.json {
                writeln!(stdout)?;
            }
        }
    }

    Ok(())
}
