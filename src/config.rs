//! Config handling

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::log::LevelFilter;

use crate::constants::{
    DEFAULT_TEXT_MODEL, DOWNLOAD_TIMEOUT, MAX_POLLS, OPENAI_BASE_URL, OUTPUT_DIR, POLL_INTERVAL,
    POLLINATIONS_BASE_URL, REPLICATE_BASE_URL, REPLICATE_MODEL_VERSION, REQUEST_TIMEOUT,
};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Which image-generation protocol the producer speaks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ImageBackendKind {
    /// Pollinations: the image is served directly from a URL built from the prompt
    #[default]
    SyncUrl,
    /// Replicate: submit a prediction, then poll until it finishes
    SubmitPoll,
}

impl ImageBackendKind {
    /// Human readable label stored in the content record.
    pub fn generator_label(self) -> &'static str {
        match self {
            Self::SyncUrl => "Pollinations AI (Free)",
            Self::SubmitPoll => "Replicate Stable Diffusion",
        }
    }
}

/// Everything a pipeline run needs, resolved up front.
///
/// Built once by the caller (usually from CLI flags and environment) and
/// handed to [`crate::pipeline::Pipeline::new`]; nothing inside the pipeline
/// reads the environment.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Bearer token for the text-generation API
    pub text_gen_key: String,
    /// Bearer token for the image API, required by [`ImageBackendKind::SubmitPoll`]
    pub image_gen_key: Option<String>,
    /// Image protocol to use
    pub image_backend: ImageBackendKind,
    /// Substitute fixed content when the text stages fail
    pub fallback_enabled: bool,
    /// Chat model name
    pub text_model: String,
    /// Root URL of the OpenAI-compatible API
    pub openai_base_url: String,
    /// Root URL of the Pollinations image API
    pub pollinations_base_url: String,
    /// Root URL of the Replicate API
    pub replicate_base_url: String,
    /// Replicate model version id
    pub replicate_version: String,
    /// Where records and downloaded images are written
    pub output_dir: PathBuf,
    /// Fetch image bytes to `output_dir` after a URL is obtained
    pub download_images: bool,
    /// Gap between status checks of a submitted job
    pub poll_interval: Duration,
    /// Status checks before giving up on a submitted job
    pub max_polls: u32,
    /// Per-request timeout for API calls
    pub request_timeout: Duration,
    /// Timeout for downloading image bytes
    pub download_timeout: Duration,
}

impl PipelineConfig {
    /// Config with production endpoints and defaults for the given key.
    pub fn new(text_gen_key: impl Into<String>) -> Self {
        Self {
            text_gen_key: text_gen_key.into(),
            image_gen_key: None,
            image_backend: ImageBackendKind::default(),
            fallback_enabled: true,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
            pollinations_base_url: POLLINATIONS_BASE_URL.to_string(),
            replicate_base_url: REPLICATE_BASE_URL.to_string(),
            replicate_version: REPLICATE_MODEL_VERSION.to_string(),
            output_dir: OUTPUT_DIR.clone(),
            download_images: true,
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            request_timeout: REQUEST_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
        }
    }

    /// Points every remote service at one root URL. Used by tests with a local mock.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        self.openai_base_url = base_url.clone();
        self.pollinations_base_url = base_url.clone();
        self.replicate_base_url = base_url;
        self
    }

    /// Checks settings that would make every run fail.
    pub fn validate(&self) -> Result<(), crate::error::PipelineError> {
        use crate::error::PipelineError;

        if self.image_backend == ImageBackendKind::SubmitPoll
            && self
                .image_gen_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            return Err(PipelineError::Config(
                "the submit-poll image backend needs an image API token".to_string(),
            ));
        }
        if self.max_polls == 0 {
            return Err(PipelineError::Config(
                "max_polls must be at least 1".to_string(),
            ));
        }
        for base in [
            &self.openai_base_url,
            &self.pollinations_base_url,
            &self.replicate_base_url,
        ] {
            url::Url::parse(base)?;
        }
        Ok(())
    }

    /// Host of the image API, stored in the record as `api_used`.
    pub fn image_api_host(&self) -> String {
        let base = match self.image_backend {
            ImageBackendKind::SyncUrl => &self.pollinations_base_url,
            ImageBackendKind::SubmitPoll => &self.replicate_base_url,
        };
        url::Url::parse(base)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| base.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_poll_requires_image_key() {
        let mut config = PipelineConfig::new("sk-test");
        config.image_backend = ImageBackendKind::SubmitPoll;
        assert!(config.validate().is_err());

        config.image_gen_key = Some("r8_token".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sync_backend_needs_no_image_key() {
        let config = PipelineConfig::new("sk-test");
        assert!(config.validate().is_ok());
        assert_eq!(config.image_api_host(), "image.pollinations.ai");
    }

    #[test]
    fn base_url_override_applies_to_all_services() {
        let config = PipelineConfig::new("k").with_base_url("http://127.0.0.1:4000/");
        assert_eq!(config.openai_base_url, "http://127.0.0.1:4000");
        assert_eq!(config.replicate_base_url, "http://127.0.0.1:4000");
        assert_eq!(config.image_api_host(), "127.0.0.1");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let mut config = PipelineConfig::new("k");
        config.openai_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
