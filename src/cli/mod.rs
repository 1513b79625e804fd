//! Command-line front end.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, Settings};

#[derive(Parser, Debug)]
#[command(name = "imgharvest", version, about = "Search, harvest, and download images")]
pub struct Cli {
    /// Config file (TOML or JSON); auto-discovered when omitted
    #[arg(long, global = true, env = "IMGHARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for images and download the results
    Search(SearchArgs),

    /// Download a single image URL
    Download {
        url: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List filter names and their accepted values
    Filters,
}

/// Named filter flags. Each maps onto one filter key.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub color: Option<String>,
    #[arg(long)]
    pub color_type: Option<String>,
    #[arg(long)]
    pub usage_rights: Option<String>,
    #[arg(long)]
    pub size: Option<String>,
    /// Image type (face, photo, clipart, line-drawing, animated)
    #[arg(long = "type")]
    pub image_type: Option<String>,
    #[arg(long)]
    pub time: Option<String>,
    #[arg(long)]
    pub aspect_ratio: Option<String>,
    #[arg(long)]
    pub format: Option<String>,
    /// Exact dimensions as WIDTH,HEIGHT
    #[arg(long)]
    pub exact_size: Option<String>,
    /// Date range as MM/DD/YYYY,MM/DD/YYYY
    #[arg(long)]
    pub time_range: Option<String>,
    /// Language name (see `filters`) or its lang_xx code
    #[arg(long)]
    pub language: Option<String>,
    /// on or off
    #[arg(long)]
    pub safe_search: Option<String>,
    /// Restrict results to one site
    #[arg(long)]
    pub site: Option<String>,
    /// Extra filter as KEY=VALUE (repeatable)
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub extra: Vec<String>,
}

impl FilterArgs {
    /// Flag values in a fixed order, by filter name.
    pub fn named(&self) -> Vec<(&'static str, &str)> {
        [
            ("color", &self.color),
            ("color_type", &self.color_type),
            ("usage_rights", &self.usage_rights),
            ("size", &self.size),
            ("type", &self.image_type),
            ("time", &self.time),
            ("aspect_ratio", &self.aspect_ratio),
            ("format", &self.format),
            ("exact_size", &self.exact_size),
            ("time_range", &self.time_range),
            ("language", &self.language),
            ("safe_search", &self.safe_search),
            ("site", &self.site),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

/// Where and how files are written.
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Replace files that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Print per-item reports as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search keywords
    #[arg(required_unless_present = "similar_images")]
    pub keywords: Option<String>,

    /// Number of images to fetch
    #[arg(short, long, default_value_t = 100)]
    pub limit: usize,

    /// Search for images similar to this image URL
    #[arg(long)]
    pub similar_images: Option<String>,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Concurrent download workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Browser executable for extended harvesting
    #[arg(long, env = "IMGHARVEST_BROWSER")]
    pub browser: Option<PathBuf>,

    /// Never download a managed browser build
    #[arg(long)]
    pub no_managed_browser: bool,

    /// Only list the results, do not download them
    #[arg(long)]
    pub no_download: bool,
}

fn apply_output_args(settings: &mut Settings, output: &OutputArgs) {
    if let Some(dir) = &output.output_dir {
        settings.output_dir = dir.clone();
    }
    if output.overwrite {
        settings.overwrite = true;
    }
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let (mut settings, config) = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
    })
    .await;

    match cli.command {
        Commands::Search(args) => {
            apply_output_args(&mut settings, &args.output);
            if let Some(workers) = args.workers {
                settings.download_workers = workers.max(1);
            }
            if let Some(browser) = &args.browser {
                settings.browser_path = Some(browser.clone());
            }
            if args.no_managed_browser {
                settings.managed_browser = false;
            }
            commands::cmd_search(&settings, &config, &args).await
        }
        Commands::Download { url, output } => {
            apply_output_args(&mut settings, &output);
            commands::cmd_download(&settings, &url, output.json).await
        }
        Commands::Filters => commands::cmd_filters(),
    }
}
