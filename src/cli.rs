use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::model::DEFAULT_TARGET_LANGUAGE;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the work id of an archive URL.
    WorkId(WorkIdArgs),
    /// Fetch a work and print its metadata as JSON.
    Inspect(InspectArgs),
    /// Translate a work and write it as an EPUB.
    Build(BuildArgs),
}

#[derive(Debug, Args)]
pub struct WorkIdArgs {
    /// Work URL on archiveofourown.org.
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Work URL on archiveofourown.org.
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Work URL on archiveofourown.org.
    #[arg(long)]
    pub url: String,

    /// Target language code.
    #[arg(long, default_value = DEFAULT_TARGET_LANGUAGE)]
    pub to: String,

    /// Output EPUB path.
    #[arg(long)]
    pub out: PathBuf,

    /// Directory holding the job record and artifacts.
    #[arg(long, default_value = "workspace-cli")]
    pub data_dir: PathBuf,

    /// Blocks per translation batch. Overrides FICTRANSLATE_BATCH_SIZE.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Overwrite `--out` if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
