//! Shared constants/defaults for things
//!

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// The default place we put records and downloaded images
pub static OUTPUT_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("./generated_content"));

/// OpenAI-compatible API root for text generation
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default chat model for both text stages
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";

/// Pollinations image API root (synchronous URL backend)
pub const POLLINATIONS_BASE_URL: &str = "https://image.pollinations.ai";

/// Replicate API root (submit-and-poll backend)
pub const REPLICATE_BASE_URL: &str = "https://api.replicate.com";

/// Stable Diffusion model version submitted to Replicate
pub const REPLICATE_MODEL_VERSION: &str =
    "db21e45d3f7023abc2a46ee38a23973f6dce16bb082a930b0c49861f96d1e5bf";

/// Gap between two status checks of a submitted image job.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status checks before a submitted image job counts as failed (3 minutes at the default interval).
pub const MAX_POLLS: u32 = 90;

/// Upper bound on any single text/image API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on fetching the generated image bytes.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a whole pipeline run when triggered by the scheduler or webhook.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the scheduler runs the pipeline.
pub const SCHEDULE_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Local hour at which the daily retention sweep fires.
pub const SWEEP_HOUR: u32 = 2;

/// Records older than this are removed by the retention sweep.
pub const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Number of images produced per run.
pub const IMAGES_PER_RUN: usize = 3;

/// Service name reported by the webhook health check
pub const SERVICE_NAME: &str = "day-trade-content-generator";

/// Header carrying the webhook HMAC signature
pub const X_HUB_SIGNATURE_256: &str = "x-hub-signature-256";
