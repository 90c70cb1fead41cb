//! CLI parser
use clap::{Parser, Subcommand};
use std::num::NonZeroU16;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ImageBackendKind, PipelineConfig};
use crate::constants::{
    DEFAULT_TEXT_MODEL, MAX_POLLS, OPENAI_BASE_URL, POLLINATIONS_BASE_URL, REPLICATE_BASE_URL,
};
use crate::error::PipelineError;

#[derive(Parser, Debug)]
#[command(name = "daytrade-content")]
/// Generate short day-trading lessons (script + 3 images) on demand, on a schedule, or via webhook
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "DAYTRADE_DEBUG")]
    /// Enable debug logging. Env: DAYTRADE_DEBUG
    pub debug: bool,

    #[clap(flatten)]
    /// Pipeline settings shared by every subcommand
    pub pipeline: PipelineArgs,

    #[command(subcommand)]
    /// What to do
    pub command: Command,
}

/// Settings that become a [`PipelineConfig`].
#[derive(clap::Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Text generation API key, needed by every subcommand that runs the pipeline. Env: OPENAI_API_KEY
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Image API token, needed by the submit-poll backend. Env: REPLICATE_API_TOKEN
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub replicate_api_token: Option<String>,

    /// Image generation backend. Env: DAYTRADE_IMAGE_BACKEND
    #[arg(long, value_enum, default_value_t = ImageBackendKind::SyncUrl, env = "DAYTRADE_IMAGE_BACKEND")]
    pub image_backend: ImageBackendKind,

    /// Fail the run instead of using fixed fallback content when text generation fails
    #[arg(long)]
    pub no_fallback: bool,

    /// Chat model for script and prompt generation
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    pub text_model: String,

    /// Root URL of the OpenAI-compatible API
    #[arg(long, default_value = OPENAI_BASE_URL, env = "DAYTRADE_OPENAI_BASE_URL")]
    pub openai_base_url: String,

    /// Root URL of the Pollinations image API
    #[arg(long, default_value = POLLINATIONS_BASE_URL)]
    pub pollinations_base_url: String,

    /// Root URL of the Replicate API
    #[arg(long, default_value = REPLICATE_BASE_URL)]
    pub replicate_base_url: String,

    /// Where records and images are written. Env: DAYTRADE_OUTPUT_DIR
    #[arg(long, default_value = "./generated_content", env = "DAYTRADE_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Keep only the image URLs, don't download the bytes
    #[arg(long)]
    pub no_download: bool,

    /// Status checks before a submitted image job is abandoned
    #[arg(long, default_value_t = MAX_POLLS)]
    pub max_polls: u32,

    /// Seconds between status checks of a submitted image job
    #[arg(long, default_value_t = 2)]
    pub poll_interval_secs: u64,
}

impl PipelineArgs {
    /// Resolves the arguments into a pipeline configuration.
    ///
    /// Fails when no text generation API key was given.
    pub fn to_config(&self) -> Result<PipelineConfig, PipelineError> {
        let key = self
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                PipelineError::Config(
                    "a text generation API key is required (--openai-api-key or OPENAI_API_KEY)"
                        .to_string(),
                )
            })?;
        let mut config = PipelineConfig::new(key);
        config.image_gen_key = self.replicate_api_token.clone();
        config.image_backend = self.image_backend;
        config.fallback_enabled = !self.no_fallback;
        config.text_model = self.text_model.clone();
        config.openai_base_url = self.openai_base_url.clone();
        config.pollinations_base_url = self.pollinations_base_url.clone();
        config.replicate_base_url = self.replicate_base_url.clone();
        config.output_dir = self.output_dir.clone();
        config.download_images = !self.no_download;
        config.max_polls = self.max_polls;
        config.poll_interval = Duration::from_secs(self.poll_interval_secs);
        Ok(config)
    }
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline once and exit
    Run,
    /// Run on a fixed cadence, sweeping old files daily
    Schedule {
        /// Seconds between runs
        #[arg(long, default_value_t = 4 * 60 * 60)]
        interval_secs: u64,
        /// Seconds a single run may take
        #[arg(long, default_value_t = 300)]
        run_timeout_secs: u64,
        /// Days to keep generated files
        #[arg(long, default_value_t = 7)]
        max_age_days: u64,
    },
    /// Serve the webhook endpoints
    Serve {
        #[clap(long, short, default_value = "8000", env = "DAYTRADE_PORT")]
        /// http listener, defaults to `8000`.
        /// Env: DAYTRADE_PORT
        port: NonZeroU16,
        #[clap(long, short, default_value = "0.0.0.0", env = "DAYTRADE_LISTEN_ADDRESS")]
        /// Listen address, defaults to `0.0.0.0`.
        /// Env: DAYTRADE_LISTEN_ADDRESS
        listen_address: String,
        /// HMAC secret for `X-Hub-Signature-256`. Env: WEBHOOK_SECRET
        #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
        webhook_secret: Option<String>,
        /// Seconds a webhook-triggered run may take
        #[arg(long, default_value_t = 300)]
        run_timeout_secs: u64,
    },
    /// Delete generated files older than the retention window
    Sweep {
        /// Days to keep generated files
        #[arg(long, default_value_t = 7)]
        max_age_days: u64,
    },
}

/// Converts a day count into a duration.
pub fn days(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(24 * 60 * 60))
}
