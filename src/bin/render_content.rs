#![forbid(unsafe_code)]

//! Expands `[youtube_uploads]` tags in a content file and prints the result.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use uploads_grid::{
    config::{RuntimeOverrides, resolve_runtime_settings},
    logging::init_tracing,
    settings::SettingsStore,
    shortcode::expand_shortcodes,
    uploads::UploadsFetcher,
};

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
    /// Content file to expand, or `-` for stdin
    file: PathBuf,

    /// Channel used for tags without their own `channel=` (default: saved setting)
    #[arg(long)]
    channel: Option<String>,

    /// Directory holding saved settings and the file cache
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Alternate .env file
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            data_root: self.data_root.clone(),
            env_path: self.env_file.clone(),
            ..RuntimeOverrides::default()
        }
    }
}

fn main() -> Result<()> {
    init_tracing("uploads_grid=warn,render_content=warn");
    let args = Args::parse();

    let runtime = resolve_runtime_settings(args.overrides())?;
    let content = read_content(&args.file)?;
    let saved = match args.channel.as_deref().map(str::trim) {
        Some(channel) if !channel.is_empty() => channel.to_string(),
        _ => SettingsStore::load(&runtime.data_root, &runtime.default_channel)?.channel(),
    };
    debug!(channel = %saved, file = %args.file.display(), "expanding content");

    let fetcher = UploadsFetcher::from_runtime(&runtime);
    let html = expand_shortcodes(&content, &saved, &fetcher);

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(html.as_bytes())
        .context("writing rendered content")?;
    stdout.flush().context("flushing stdout")?;
    Ok(())
}

fn read_content(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("reading content from stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
