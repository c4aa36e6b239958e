//! notionsync CLI: mirror a Notion database into a static-site content tree.
//!
//! Every page becomes `<slug>/index.md` with TOML front-matter, its cover
//! image and a local copy of each embedded image.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
