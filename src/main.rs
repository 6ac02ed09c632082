use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    fictranslate::logging::init().context("init logging")?;

    let cli = fictranslate::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        fictranslate::cli::Command::WorkId(args) => {
            fictranslate::build::work_id(args).context("work-id")?;
        }
        fictranslate::cli::Command::Inspect(args) => {
            fictranslate::build::inspect(args).await.context("inspect")?;
        }
        fictranslate::cli::Command::Build(args) => {
            fictranslate::build::run(args).await.context("build")?;
        }
    }

    Ok(())
}
