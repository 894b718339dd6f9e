use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use castfeed::storage::DropboxClient;
use castfeed::{update_feed, Config, StepInput, UpdateSettings};

/// Get the default config file path (~/.config/castfeed/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("castfeed")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "castfeed",
    about = "Append items to a podcast RSS feed stored in Dropbox"
)]
struct Args {
    /// Step parameters as JSON ("-" reads stdin); flags below override it
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Dropbox path of the feed file
    #[arg(long)]
    file: Option<String>,

    /// Feed title (used when creating the feed or replacing a placeholder)
    #[arg(long)]
    feed_title: Option<String>,

    /// Feed description
    #[arg(long)]
    feed_description: Option<String>,

    /// Channel link
    #[arg(long)]
    site_url: Option<String>,

    /// Item title (repeat once per item)
    #[arg(long, value_name = "TITLE")]
    item_title: Vec<String>,

    /// Item description (repeat once per item)
    #[arg(long, value_name = "TEXT")]
    item_content: Vec<String>,

    /// Item media URL; one item is added per link
    #[arg(long, value_name = "URL")]
    item_link: Vec<String>,

    /// Item media size in bytes (repeat once per item)
    #[arg(long, value_name = "BYTES")]
    item_length: Vec<String>,

    /// Item MIME type (once for all items, or once per item)
    #[arg(long, value_name = "MIME")]
    item_type: Vec<String>,

    /// Config file (default: ~/.config/castfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    /// Loads the JSON input, if any, and applies flag overrides on top.
    fn step_input(&self) -> Result<StepInput> {
        let input = match &self.input {
            Some(path) => {
                let json = read_input(path)?;
                StepInput::from_json(&json)
                    .with_context(|| format!("Failed to parse step input: {}", path.display()))?
            }
            None => StepInput::default(),
        };
        Ok(self.apply_overrides(input))
    }

    /// Flags win over JSON values; a repeated flag replaces the whole list.
    fn apply_overrides(&self, mut input: StepInput) -> StepInput {
        override_scalar(&mut input.file, &self.file);
        override_scalar(&mut input.feed_title, &self.feed_title);
        override_scalar(&mut input.feed_description, &self.feed_description);
        override_scalar(&mut input.site_url, &self.site_url);
        override_list(&mut input.item_title, &self.item_title);
        override_list(&mut input.item_content, &self.item_content);
        override_list(&mut input.item_link, &self.item_link);
        override_list(&mut input.item_length, &self.item_length);
        override_list(&mut input.item_type, &self.item_type);
        input
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read step input from stdin");
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read step input: {}", path.display()))
}

fn override_scalar(target: &mut Option<String>, flag: &Option<String>) {
    if flag.is_some() {
        target.clone_from(flag);
    }
}

fn override_list(target: &mut Vec<String>, flag: &[String]) {
    if !flag.is_empty() {
        *target = flag.to_vec();
    }
}

fn result_line(url: &str) -> String {
    serde_json::json!({ "url": url }).to_string()
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("castfeed=debug")
    } else {
        EnvFilter::from_default_env()
    };
    // stdout carries the result; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    init_tracing(args.debug || config.debug);
    tracing::debug!(config = ?config, "Configuration resolved");

    let input = args.step_input()?;

    let token = config.access_token().with_context(|| {
        format!(
            "No Dropbox access token: set {} or access_token in {}",
            castfeed::config::ACCESS_TOKEN_ENV,
            config_path.display()
        )
    })?;

    let store = DropboxClient::with_endpoints(
        reqwest::Client::new(),
        token,
        config.endpoints(),
        config.request_timeout(),
    )
    .context("Invalid Dropbox endpoint configuration")?;

    let settings = UpdateSettings::from(&config);
    let outcome = update_feed(&store, &input, &settings)
        .await
        .context("Feed update failed")?;

    println!("{}", result_line(&outcome.url));
    Ok(())
}
