//! Image prompt generation: three structured prompts per script.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::IMAGES_PER_RUN;
use crate::error::PipelineError;
use crate::textgen::{ChatRequest, TextGenClient};

const SYSTEM_ROLE: &str = "Você é um diretor de arte especializado em imagens financeiras.";

/// One image to produce.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImagePromptSpec {
    /// English prompt sent to the image service
    pub prompt: String,
    /// Short name for the image, e.g. `image_1`
    #[serde(rename = "image")]
    pub label: String,
}

/// Where a prompt set came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    /// Written by the text service for this run
    Generated,
    /// The fixed set from [`fallback_prompts`]
    Fallback,
}

/// Exactly three prompts, generated or fallback.
#[derive(Clone, Debug)]
pub struct PromptSet {
    /// The prompts, in production order
    pub specs: [ImagePromptSpec; IMAGES_PER_RUN],
    /// Generated or fallback
    pub source: PromptSource,
    /// Why the fallback was used, when it was
    pub fallback_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PromptPayload {
    image_prompts: Vec<ImagePromptSpec>,
}

/// The hand-written prompt set used when generation fails.
pub fn fallback_prompts() -> [ImagePromptSpec; IMAGES_PER_RUN] {
    [
        ImagePromptSpec {
            prompt: "Professional financial trading concept, modern stock market chart with candlesticks, blue and green color scheme, corporate style, clean design".to_string(),
            label: "image_1".to_string(),
        },
        ImagePromptSpec {
            prompt: "Trading indicators dashboard, MACD and RSI charts, professional financial interface, blue corporate colors, modern design".to_string(),
            label: "image_2".to_string(),
        },
        ImagePromptSpec {
            prompt: "Day trading workspace, multiple monitors with financial charts, professional trader setup, clean modern office, blue lighting".to_string(),
            label: "image_3".to_string(),
        },
    ]
}

fn user_prompt(script: &str) -> String {
    format!(
        r#"A partir do roteiro sobre day trade abaixo, crie 3 prompts em inglês para gerar imagens.

Roteiro: {script}

Requisitos:
- Cada prompt deve ter 1-2 sentenças
- Imagens limpas e modernas com tema corporativo
- Cores: azul, verde, dourado, preto e branco
- Sem texto nas imagens
- Representar conceitos de mercado financeiro
- Incluir elementos como gráficos, candlesticks, setas de tendência

Retorne apenas um JSON no formato:
{{"image_prompts": [{{"prompt": "prompt_1", "image": "image_1"}}, {{"prompt": "prompt_2", "image": "image_2"}}, {{"prompt": "prompt_3", "image": "image_3"}}]}}"#
    )
}

/// Removes a markdown code fence (```` ```json ... ``` ````) around a JSON payload.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. `json`) on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) if !rest[..newline].trim_start().starts_with('{') => &rest[newline + 1..],
        _ => rest.trim_start_matches(|ch: char| ch.is_ascii_alphabetic()),
    };
    rest.trim().trim_end_matches("```").trim()
}

/// Parses the model output into exactly three prompt specs.
pub fn parse_prompt_set(content: &str) -> Result<[ImagePromptSpec; IMAGES_PER_RUN], PipelineError> {
    let payload: PromptPayload = serde_json::from_str(strip_code_fence(content))
        .map_err(|err| PipelineError::Parse(format!("image prompt JSON: {err}")))?;
    let count = payload.image_prompts.len();
    let specs: [ImagePromptSpec; IMAGES_PER_RUN] =
        payload.image_prompts.try_into().map_err(|_| {
            PipelineError::Parse(format!(
                "expected {IMAGES_PER_RUN} image prompts, got {count}"
            ))
        })?;
    if let Some(empty) = specs.iter().position(|spec| spec.prompt.trim().is_empty()) {
        return Err(PipelineError::Parse(format!(
            "image prompt {} is empty",
            empty + 1
        )));
    }
    Ok(specs)
}

/// Turns a script into three image prompts, degrading to a fixed set on failure.
#[derive(Clone, Debug)]
pub struct PromptGenerator {
    client: TextGenClient,
    fallback_enabled: bool,
}

impl PromptGenerator {
    /// Creates a generator.
    pub fn new(client: TextGenClient, fallback_enabled: bool) -> Self {
        Self {
            client,
            fallback_enabled,
        }
    }

    /// Returns three prompts for `script`.
    ///
    /// Transport errors, malformed JSON and a prompt count other than three
    /// all fall back to [`fallback_prompts`] unless fallbacks are disabled.
    pub async fn generate(&self, script: &str) -> Result<PromptSet, PipelineError> {
        match self.request(script).await {
            Ok(specs) => {
                info!("{} image prompts generated", specs.len());
                Ok(PromptSet {
                    specs,
                    source: PromptSource::Generated,
                    fallback_reason: None,
                })
            }
            Err(err) if self.fallback_enabled => {
                warn!("Image prompt generation failed, using fallback set: {err}");
                Ok(PromptSet {
                    specs: fallback_prompts(),
                    source: PromptSource::Fallback,
                    fallback_reason: Some(err.to_string()),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn request(&self, script: &str) -> Result<[ImagePromptSpec; IMAGES_PER_RUN], PipelineError> {
        let user = user_prompt(script);
        let content = self
            .client
            .complete(ChatRequest {
                system: SYSTEM_ROLE,
                user: &user,
                max_tokens: 400,
                temperature: 0.7,
            })
            .await?;
        parse_prompt_set(&content)
    }
}
