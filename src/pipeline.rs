//! The run-once entry point: topic → script → prompts → images → record.
//!
//! Every stage reports a [`StageEvent`] instead of printing. Remote failures
//! in the text stages degrade to fixed content, image failures are recorded
//! per image, and nothing escapes [`Pipeline::run`] as an error.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::images::{ImageProducer, ImageResult};
use crate::persist::{ContentRecord, RecordStatus, run_timestamp, write_record};
use crate::prompts::{PromptGenerator, PromptSource};
use crate::script::{ScriptGenerator, ScriptSource};
use crate::textgen::TextGenClient;
use crate::topics::{RandomSelector, Selector, select_topic};

/// Pipeline stage names.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Topic selection
    Topic,
    /// Script generation
    Script,
    /// Image prompt generation
    Prompts,
    /// Production of image number n (1-based)
    Image(usize),
    /// Writing the content record
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic => write!(f, "topic"),
            Self::Script => write!(f, "script"),
            Self::Prompts => write!(f, "prompts"),
            Self::Image(n) => write!(f, "image {n}"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// How a stage ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Did what it was asked
    Success,
    /// Remote call failed, fixed content used instead
    Fallback,
    /// Produced nothing usable
    Failure,
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Progress report for one stage.
#[derive(Clone, Debug, Serialize)]
pub struct StageEvent {
    /// Which stage
    pub stage: Stage,
    /// How it ended
    pub outcome: StageOutcome,
    /// Wall time spent in the stage
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Extra context: the chosen topic, a failure reason, a record name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageEvent {
    fn new(stage: Stage, outcome: StageOutcome, started: Instant, detail: Option<String>) -> Self {
        Self {
            stage,
            outcome,
            elapsed: started.elapsed(),
            detail,
        }
    }
}

/// Result of one pipeline run.
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    /// True when a record was written and at least one image exists
    pub succeeded: bool,
    /// File name of the written record, if any
    pub record: Option<String>,
    /// Status written into the record, if any
    pub status: Option<RecordStatus>,
    /// Per-stage reports, in order
    pub events: Vec<StageEvent>,
}

impl RunOutcome {
    fn failed(events: Vec<StageEvent>) -> Self {
        Self {
            succeeded: false,
            record: None,
            status: None,
            events,
        }
    }

    /// Outcome for a run that never reported back (panicked or was aborted).
    pub fn aborted(reason: &str) -> Self {
        Self::failed(vec![StageEvent {
            stage: Stage::Persist,
            outcome: StageOutcome::Failure,
            elapsed: Duration::ZERO,
            detail: Some(reason.to_string()),
        }])
    }
}

/// A configured pipeline. Cheap to share; each run owns its own values.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    selector: Arc<dyn Selector>,
    script: ScriptGenerator,
    prompts: PromptGenerator,
    images: ImageProducer,
}

impl Pipeline {
    /// Builds a pipeline with random topic and fallback selection.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_selector(config, Arc::new(RandomSelector))
    }

    /// Builds a pipeline with an explicit selection strategy.
    pub fn with_selector(
        config: PipelineConfig,
        selector: Arc<dyn Selector>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let text = TextGenClient::new(
            http.clone(),
            &config.openai_base_url,
            &config.text_gen_key,
            &config.text_model,
        );
        Ok(Self {
            script: ScriptGenerator::new(text.clone(), selector.clone(), config.fallback_enabled),
            prompts: PromptGenerator::new(text, config.fallback_enabled),
            images: ImageProducer::new(http, &config)?,
            selector,
            config,
        })
    }

    /// The configuration this pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage once, in order.
    pub async fn run(&self) -> RunOutcome {
        let mut events = Vec::with_capacity(7);
        let timestamp = run_timestamp(chrono::Local::now());

        let started = Instant::now();
        let topic = select_topic(self.selector.as_ref());
        events.push(StageEvent::new(
            Stage::Topic,
            StageOutcome::Success,
            started,
            Some(topic.to_string()),
        ));

        let started = Instant::now();
        let script = match self.script.generate(topic).await {
            Ok(script) => script,
            Err(err) => {
                events.push(StageEvent::new(
                    Stage::Script,
                    StageOutcome::Failure,
                    started,
                    Some(err.to_string()),
                ));
                return RunOutcome::failed(events);
            }
        };
        let outcome = match script.source {
            ScriptSource::Generated => StageOutcome::Success,
            ScriptSource::Fallback => StageOutcome::Fallback,
        };
        events.push(StageEvent::new(
            Stage::Script,
            outcome,
            started,
            script.fallback_reason.clone(),
        ));

        let started = Instant::now();
        let prompts = match self.prompts.generate(&script.text).await {
            Ok(prompts) => prompts,
            Err(err) => {
                events.push(StageEvent::new(
                    Stage::Prompts,
                    StageOutcome::Failure,
                    started,
                    Some(err.to_string()),
                ));
                return RunOutcome::failed(events);
            }
        };
        let outcome = match prompts.source {
            PromptSource::Generated => StageOutcome::Success,
            PromptSource::Fallback => StageOutcome::Fallback,
        };
        events.push(StageEvent::new(
            Stage::Prompts,
            outcome,
            started,
            prompts.fallback_reason.clone(),
        ));

        let mut images: Vec<ImageResult> = Vec::with_capacity(prompts.specs.len());
        for (idx, spec) in prompts.specs.iter().enumerate() {
            let started = Instant::now();
            let result = self.images.produce(idx + 1, spec, &timestamp).await;
            let outcome = if result.succeeded {
                StageOutcome::Success
            } else {
                StageOutcome::Failure
            };
            events.push(StageEvent::new(
                Stage::Image(idx + 1),
                outcome,
                started,
                result.error.clone(),
            ));
            images.push(result);
        }

        let status = RecordStatus::for_images(&images);
        let record = ContentRecord {
            timestamp,
            topic: topic.to_string(),
            script,
            images,
            status,
            generator: self.config.image_backend.generator_label().to_string(),
            api_used: self.config.image_api_host(),
        };

        let started = Instant::now();
        match write_record(&self.config.output_dir, &record).await {
            Ok(name) => {
                let succeeded = status == RecordStatus::Generated;
                events.push(StageEvent::new(
                    Stage::Persist,
                    if succeeded {
                        StageOutcome::Success
                    } else {
                        StageOutcome::Failure
                    },
                    started,
                    Some(name.clone()),
                ));
                RunOutcome {
                    succeeded,
                    record: Some(name),
                    status: Some(status),
                    events,
                }
            }
            Err(err) => {
                events.push(StageEvent::new(
                    Stage::Persist,
                    StageOutcome::Failure,
                    started,
                    Some(err.to_string()),
                ));
                RunOutcome::failed(events)
            }
        }
    }

    /// Runs on a separate task so a panic inside a stage becomes a failed outcome.
    pub async fn run_guarded(self: Arc<Self>) -> RunOutcome {
        match tokio::spawn(async move { self.run().await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Pipeline run aborted: {err}");
                RunOutcome::aborted(&err.to_string())
            }
        }
    }

    /// Like [`Pipeline::run_guarded`], but aborts the run after `limit`.
    ///
    /// Returns `None` on timeout; the aborted run persists nothing.
    pub async fn run_within(self: Arc<Self>, limit: Duration) -> Option<RunOutcome> {
        let mut handle = tokio::spawn(async move { self.run().await });
        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => {
                error!("Pipeline run aborted: {err}");
                Some(RunOutcome::aborted(&err.to_string()))
            }
            Err(_) => {
                handle.abort();
                error!("Pipeline run exceeded {}s and was aborted", limit.as_secs());
                None
            }
        }
    }
}

/// Writes a run's stage events to the log.
pub fn log_events(outcome: &RunOutcome) {
    for event in &outcome.events {
        let detail = event.detail.as_deref().unwrap_or("");
        let ms = event.elapsed.as_millis();
        match event.outcome {
            StageOutcome::Success => info!("[{}] ok in {ms}ms {detail}", event.stage),
            StageOutcome::Fallback => warn!("[{}] fallback in {ms}ms: {detail}", event.stage),
            StageOutcome::Failure => warn!("[{}] failed in {ms}ms: {detail}", event.stage),
        }
    }
    match (&outcome.record, outcome.succeeded) {
        (Some(record), true) => info!("Run complete, record {record}"),
        (Some(record), false) => error!("Run failed: no image produced, script kept in {record}"),
        (None, _) => error!("Run failed, nothing persisted"),
    }
}
