//! Lesson script generation with fixed fallbacks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::sanitize::sanitize;
use crate::textgen::{ChatRequest, TextGenClient};
use crate::topics::Selector;

/// Pre-written scripts used when the text service is unavailable.
pub const FALLBACK_SCRIPTS: &[&str] = &[
    "O MACD é um dos indicadores mais poderosos do day trade. Quando as linhas se cruzam acima de zero, temos um sinal de compra. Quando cruzam abaixo, sinal de venda. Use sempre com stop loss!",
    "No scalping, velocidade é tudo! Opere apenas nos primeiros 30 minutos após a abertura. Use gráfico de 1 minuto e sempre defina seu stop antes de entrar. Lucros pequenos, mas consistentes!",
    "Stop Loss não é opcional no day trade! Defina sempre antes de entrar na operação. Uma boa regra: nunca arrisque mais de 1% do seu capital por trade. Preserve seu dinheiro para operar outro dia!",
];

const SYSTEM_ROLE: &str = "Você é um especialista em mercado financeiro e day trade.";

/// Where a script came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptSource {
    /// Written by the text service for this run
    Generated,
    /// One of [`FALLBACK_SCRIPTS`]
    Fallback,
}

/// The lesson text for one run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScriptResult {
    /// Sanitized, single-line script
    pub text: String,
    /// Generated or fallback
    pub source: ScriptSource,
    /// Why the fallback was used, when it was
    #[serde(skip)]
    pub fallback_reason: Option<String>,
}

fn user_prompt(topic: &str) -> String {
    format!(
        r#"Crie um roteiro educativo para um vídeo curto sobre: {topic}

Requisitos:
- Máximo 500 caracteres
- Linguagem acessível para iniciantes
- Conteúdo prático e direto
- Inclua uma dica específica
- Foque em conceitos visuais que podem ser ilustrados"#
    )
}

/// Asks the text service for a script, degrading to a fixed one on failure.
#[derive(Clone, Debug)]
pub struct ScriptGenerator {
    client: TextGenClient,
    selector: Arc<dyn Selector>,
    fallback_enabled: bool,
}

impl ScriptGenerator {
    /// Creates a generator; `selector` chooses among the fallback scripts.
    pub fn new(client: TextGenClient, selector: Arc<dyn Selector>, fallback_enabled: bool) -> Self {
        Self {
            client,
            selector,
            fallback_enabled,
        }
    }

    /// Returns a script for `topic`.
    ///
    /// A single remote attempt is made. Any failure yields a fallback script
    /// unless fallbacks are disabled, in which case the error is returned.
    pub async fn generate(&self, topic: &str) -> Result<ScriptResult, PipelineError> {
        match self.request(topic).await {
            Ok(text) => {
                info!("Script generated ({} chars)", text.chars().count());
                Ok(ScriptResult {
                    text,
                    source: ScriptSource::Generated,
                    fallback_reason: None,
                })
            }
            Err(err) if self.fallback_enabled => {
                warn!("Script generation failed, using fallback: {err}");
                Ok(self.fallback(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn request(&self, topic: &str) -> Result<String, PipelineError> {
        let user = user_prompt(topic);
        let raw = self
            .client
            .complete(ChatRequest {
                system: SYSTEM_ROLE,
                user: &user,
                max_tokens: 200,
                temperature: 0.7,
            })
            .await?;
        let text = sanitize(&raw);
        if text.is_empty() {
            return Err(PipelineError::Parse(
                "script was empty after cleaning".to_string(),
            ));
        }
        Ok(text)
    }

    fn fallback(&self, reason: String) -> ScriptResult {
        let idx = self
            .selector
            .pick(FALLBACK_SCRIPTS.len())
            .min(FALLBACK_SCRIPTS.len() - 1);
        ScriptResult {
            text: FALLBACK_SCRIPTS[idx].to_string(),
            source: ScriptSource::Fallback,
            fallback_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::RoundRobinSelector;

    fn unreachable_generator(fallback_enabled: bool) -> ScriptGenerator {
        // port 9 (discard) on loopback refuses connections
        let client = TextGenClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "k", "m");
        ScriptGenerator::new(
            client,
            Arc::new(RoundRobinSelector::starting_at(2)),
            fallback_enabled,
        )
    }

    #[test]
    fn fallback_scripts_are_already_clean() {
        for script in FALLBACK_SCRIPTS {
            assert_eq!(sanitize(script), *script);
            assert!(!script.is_empty());
        }
    }

    #[test]
    fn user_prompt_mentions_topic_and_limit() {
        let prompt = user_prompt("Fibonacci no day trade");
        assert!(prompt.contains("Fibonacci no day trade"));
        assert!(prompt.contains("500 caracteres"));
    }

    #[tokio::test]
    async fn transport_failure_yields_fallback() {
        let generator = unreachable_generator(true);
        let script = generator.generate("MACD").await.expect("fallback");
        assert_eq!(script.source, ScriptSource::Fallback);
        assert_eq!(script.text, FALLBACK_SCRIPTS[2]);
        assert!(script.fallback_reason.is_some());
    }

    #[tokio::test]
    async fn transport_failure_without_fallback_is_an_error() {
        let generator = unreachable_generator(false);
        assert!(generator.generate("MACD").await.is_err());
    }

    #[test]
    fn source_serializes_lowercase() {
        let script = ScriptResult {
            text: "x".to_string(),
            source: ScriptSource::Fallback,
            fallback_reason: Some("boom".to_string()),
        };
        let value = serde_json::to_value(&script).expect("serialize");
        assert_eq!(value, serde_json::json!({"text": "x", "source": "fallback"}));
    }
}
