// OpenAI chat-completions backed analyzer

use super::prompt::{aggregate_prompt, place_prompt, AGGREGATE_SYSTEM_PROMPT, PLACE_SYSTEM_PROMPT};
use super::sampling::SamplingPolicy;
use super::Analyzer;
use crate::config::OpenAiConfig;
use crate::error::{Result, ScopeError};
use crate::model::{AnalysisResult, Review};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse model output into an analysis, tolerating Markdown code fences
pub fn parse_analysis(content: &str, context: &str) -> Result<AnalysisResult> {
    let cleaned = content
        .trim()
        .replace("```json", "")
        .replace("```", "");

    serde_json::from_str(cleaned.trim()).map_err(|e| ScopeError::MalformedResponse {
        context: context.to_string(),
        message: e.to_string(),
    })
}

/// Analyzer calling the chat-completions endpoint
pub struct OpenAiAnalyzer {
    http_client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    aggregate_model: String,
    temperature: f32,
    max_tokens: u32,
    aggregate_max_tokens: u32,
}

impl OpenAiAnalyzer {
    pub fn new(config: &OpenAiConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScopeError::Http {
                source: e,
                context: "Failed to build OpenAI client".to_string(),
            })?;

        Ok(Self {
            http_client,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            aggregate_model: config.aggregate_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            aggregate_max_tokens: config.aggregate_max_tokens,
        })
    }

    /// Build an analyzer with the key read from the configured env var
    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ScopeError::MissingCredential {
                env_var: config.api_key_env.clone(),
            })?;
        Self::new(config, api_key)
    }

    async fn complete(&self, request: &ChatRequest<'_>, context: &str) -> Result<String> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ScopeError::Http {
                source: e,
                context: format!("Failed to call analysis service for {}", context),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScopeError::Api {
                status: status.as_u16(),
                context: context.to_string(),
                message,
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| ScopeError::Http {
            source: e,
            context: format!("Failed to read analysis response for {}", context),
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScopeError::MalformedResponse {
                context: context.to_string(),
                message: "response carried no message content".to_string(),
            })
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze_place(
        &self,
        place_name: &str,
        reviews: &[Review],
        sampling: &SamplingPolicy,
    ) -> Result<AnalysisResult> {
        // Neutral-only text reviews sample to nothing under sampling
        let mut sample = sampling.select(reviews);
        if sample.is_empty() {
            return Ok(AnalysisResult::insufficient_data());
        }
        sample.truncate(sampling.place_review_limit);

        debug!(place = place_name, reviews = sample.len(), "Analyzing place");
        let prompt = place_prompt(place_name, &sample);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: PLACE_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let content = self.complete(&request, place_name).await?;
        parse_analysis(&content, place_name)
    }

    async fn analyze_aggregate(
        &self,
        reviews: &[Review],
        brand: &str,
        total_places: usize,
        sampling: &SamplingPolicy,
    ) -> Result<AnalysisResult> {
        if !reviews.iter().any(|r| r.has_text()) {
            return Ok(AnalysisResult::insufficient_data());
        }

        let sample = sampling.select(reviews);
        info!(
            brand,
            reviews = reviews.len(),
            sampled = sample.len(),
            "Starting brand-level analysis"
        );
        let prompt = aggregate_prompt(brand, total_places, reviews, &sample, sampling.enabled);
        let request = ChatRequest {
            model: &self.aggregate_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: AGGREGATE_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.aggregate_max_tokens,
            response_format: None,
        };

        let content = self.complete(&request, "brand analysis").await?;
        parse_analysis(&content, "brand analysis")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_code_fences() {
        let content = "```json\n{\"strengths\": [\"Fast\"], \"priorities\": [\"a\", \"b\", \"c\"]}\n```";
        let analysis = parse_analysis(content, "test").unwrap();
        assert_eq!(analysis.strengths, vec!["Fast"]);
        assert_eq!(analysis.priorities.len(), 3);
    }

    #[test]
    fn test_parse_rejects_prose() {
        let result = parse_analysis("Sure! Here is the analysis.", "Cafe A");
        match result {
            Err(ScopeError::MalformedResponse { context, .. }) => assert_eq!(context, "Cafe A"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_text_reviews_skip_the_service() {
        let analyzer = OpenAiAnalyzer::new(
            &crate::config::Config::default().openai,
            "unused".to_string(),
        )
        .unwrap();
        let reviews = vec![Review {
            stars: 4,
            ..Default::default()
        }];

        let place = analyzer
            .analyze_place("Cafe A", &reviews, &SamplingPolicy::default())
            .await
            .unwrap();
        assert_eq!(place, AnalysisResult::insufficient_data());

        let aggregate = analyzer
            .analyze_aggregate(&reviews, "Brand", 1, &SamplingPolicy::default())
            .await
            .unwrap();
        assert_eq!(aggregate, AnalysisResult::insufficient_data());
    }
}
