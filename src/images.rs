//! Image production: prompt in, remote URL (and maybe a local copy) out.
//!
//! Two backends are supported. The synchronous one (Pollinations) serves the
//! image straight from a URL built out of the prompt, so obtaining the URL
//! cannot fail remotely; fetching it is what exercises the service. The
//! submit-and-poll one (Replicate) creates a prediction and checks its status
//! at a fixed interval, up to a bounded number of checks.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::config::{ImageBackendKind, PipelineConfig};
use crate::error::PipelineError;
use crate::prompts::ImagePromptSpec;

const SYNC_PROMPT_SUFFIX: &str =
    ", professional financial trading concept, clean modern design, corporate style, high quality, detailed";
const POLL_PROMPT_SUFFIX: &str =
    ", professional financial trading concept, clean modern design, corporate style, blue and green color scheme";

const IMAGE_SIZE: u32 = 1024;

/// Outcome of producing one image.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    /// The prompt as it came out of the prompt stage
    pub prompt: String,
    /// Where the image can be fetched, when one was produced
    pub remote_url: Option<String>,
    /// Local copy, when the download worked
    pub local_path: Option<PathBuf>,
    /// Label from the prompt spec
    pub label: String,
    /// True whenever `remote_url` is set
    pub succeeded: bool,
    /// What went wrong, for a failed image or a failed download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageResult {
    fn failed(spec: &ImagePromptSpec, err: &PipelineError) -> Self {
        Self {
            prompt: spec.prompt.clone(),
            remote_url: None,
            local_path: None,
            label: spec.label.clone(),
            succeeded: false,
            error: Some(err.to_string()),
        }
    }
}

/// Settings for the Replicate submit-and-poll protocol.
#[derive(Clone, Debug)]
pub struct PollBackend {
    base_url: String,
    token: String,
    version: String,
    poll_interval: Duration,
    max_polls: u32,
}

/// The image protocol in use.
#[derive(Clone, Debug)]
pub enum ImageBackend {
    /// Image served directly from a prompt-derived URL
    SyncUrl {
        /// API root, e.g. `https://image.pollinations.ai`
        base_url: String,
    },
    /// Submit a job, then poll for its result
    SubmitPoll(PollBackend),
}

impl ImageBackend {
    /// Picks the backend described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        match config.image_backend {
            ImageBackendKind::SyncUrl => Ok(Self::SyncUrl {
                base_url: config.pollinations_base_url.clone(),
            }),
            ImageBackendKind::SubmitPoll => {
                let token = config.image_gen_key.clone().ok_or_else(|| {
                    PipelineError::Config("missing image API token".to_string())
                })?;
                Ok(Self::SubmitPoll(PollBackend {
                    base_url: config.replicate_base_url.trim_end_matches('/').to_string(),
                    token,
                    version: config.replicate_version.clone(),
                    poll_interval: config.poll_interval,
                    max_polls: config.max_polls.max(1),
                }))
            }
        }
    }
}

/// Builds the Pollinations URL for `prompt`.
pub fn sync_image_url(base_url: &str, prompt: &str) -> Result<String, PipelineError> {
    let mut url = url::Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| PipelineError::Config(format!("{base_url} cannot be a base URL")))?
        .pop_if_empty()
        .push("prompt")
        .push(&format!("{prompt}{SYNC_PROMPT_SUFFIX}"));
    url.query_pairs_mut()
        .append_pair("width", &IMAGE_SIZE.to_string())
        .append_pair("height", &IMAGE_SIZE.to_string())
        .append_pair("model", "flux")
        .append_pair("enhance", "true");
    Ok(url.into())
}

#[derive(Deserialize, Debug)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn first_output(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|item| item.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

impl PollBackend {
    async fn submit(&self, http: &reqwest::Client, prompt: &str) -> Result<String, PipelineError> {
        let body = json!({
            "version": self.version,
            "input": {
                "prompt": format!("{prompt}{POLL_PROMPT_SUFFIX}"),
                "width": IMAGE_SIZE,
                "height": IMAGE_SIZE,
                "num_outputs": 1,
                "scheduler": "K_EULER",
                "num_inference_steps": 20,
                "guidance_scale": 7.5
            }
        });
        let resp = http
            .post(format!("{}/v1/predictions", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Status {
                endpoint: "prediction submit",
                status,
            });
        }
        let prediction: Prediction = resp
            .json()
            .await
            .map_err(|err| PipelineError::Parse(format!("prediction submit body: {err}")))?;
        prediction
            .id
            .ok_or_else(|| PipelineError::Parse("prediction submit returned no id".to_string()))
    }

    /// Polls until the job is terminal or `max_polls` checks have been made.
    async fn wait(&self, http: &reqwest::Client, id: &str) -> Result<String, PipelineError> {
        let started = Instant::now();
        let status_url = format!("{}/v1/predictions/{id}", self.base_url);
        for poll in 1..=self.max_polls {
            let resp = http
                .get(&status_url)
                .bearer_auth(&self.token)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(PipelineError::Status {
                    endpoint: "prediction status",
                    status,
                });
            }
            let prediction: Prediction = resp
                .json()
                .await
                .map_err(|err| PipelineError::Parse(format!("prediction status body: {err}")))?;

            match prediction.status.as_deref() {
                Some("succeeded") => {
                    return prediction.first_output().ok_or_else(|| {
                        PipelineError::Parse("prediction succeeded without output".to_string())
                    });
                }
                Some(terminal @ ("failed" | "canceled")) => {
                    let reason = prediction
                        .error
                        .map(|err| err.to_string())
                        .unwrap_or_default();
                    return Err(PipelineError::Parse(format!(
                        "prediction {id} {terminal} {reason}"
                    )));
                }
                other => {
                    debug!("prediction {id} is {other:?} (check {poll}/{})", self.max_polls);
                }
            }

            if poll < self.max_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(PipelineError::Timeout {
            polls: self.max_polls,
            waited: started.elapsed(),
        })
    }
}

/// Produces one image per prompt spec.
#[derive(Clone, Debug)]
pub struct ImageProducer {
    http: reqwest::Client,
    backend: ImageBackend,
    output_dir: PathBuf,
    download: bool,
    download_timeout: Duration,
}

impl ImageProducer {
    /// Creates a producer for `config`.
    pub fn new(http: reqwest::Client, config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            http,
            backend: ImageBackend::from_config(config)?,
            output_dir: config.output_dir.clone(),
            download: config.download_images,
            download_timeout: config.download_timeout,
        })
    }

    /// Produces image number `index` (1-based) for `spec`.
    ///
    /// A failure to obtain a remote URL gives `succeeded=false`. Once a URL
    /// exists the result is a success, and a failed download only leaves
    /// `local_path` empty.
    #[instrument(level = "debug", skip(self, spec), fields(label = %spec.label))]
    pub async fn produce(&self, index: usize, spec: &ImagePromptSpec, stamp: &str) -> ImageResult {
        let remote_url = match self.remote_url(&spec.prompt).await {
            Ok(url) => url,
            Err(err) => {
                warn!("Image {index} failed: {err}");
                return ImageResult::failed(spec, &err);
            }
        };

        let mut result = ImageResult {
            prompt: spec.prompt.clone(),
            remote_url: Some(remote_url.clone()),
            local_path: None,
            label: spec.label.clone(),
            succeeded: true,
            error: None,
        };

        if self.download {
            let target = self.output_dir.join(format!("image_{index}_{stamp}.jpg"));
            match self.download_to(&remote_url, &target).await {
                Ok(path) => {
                    info!("Image {index} saved to {}", path.display());
                    result.local_path = Some(path);
                }
                Err(err) => {
                    warn!("Image {index} available at its URL but download failed: {err}");
                    result.error = Some(format!("download failed: {err}"));
                }
            }
        }
        result
    }

    async fn remote_url(&self, prompt: &str) -> Result<String, PipelineError> {
        match &self.backend {
            ImageBackend::SyncUrl { base_url } => sync_image_url(base_url, prompt),
            ImageBackend::SubmitPoll(poll) => {
                let id = poll.submit(&self.http, prompt).await?;
                debug!("prediction {id} submitted");
                poll.wait(&self.http, &id).await
            }
        }
    }

    async fn download_to(&self, url: &str, target: &Path) -> Result<PathBuf, PipelineError> {
        let resp = self
            .http
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Status {
                endpoint: "image download",
                status,
            });
        }
        let bytes = resp.bytes().await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, &bytes).await?;
        Ok(target.to_path_buf())
    }
}
