//! Question answering: retrieval, prompt assembly and generation behind one call.

use crate::models::{AnswerRequest, AnswerResponse, RetrievalResult, SourceRef, Timings, TokenUsage};
use crate::retrieval::Retriever;
use crate::traits::{AnswerGenerator, Generation, VectorIndex};
use crate::AnswerError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const NO_CONTEXT_ANSWER: &str = "I couldn't find relevant information in the Nebari \
documentation to answer this question. Please try rephrasing or ask about a different topic.";

pub const PROMPT_TEMPLATE: &str = "You are a helpful assistant for Nebari, \
an open source data science platform. \
Answer the user's question using only the documentation excerpts below. \
Cite the file path of each source you rely on. \
If the excerpts do not contain the answer, say so instead of guessing.

Documentation excerpts:
{context}

Question: {question}

Answer:";

/// Renders retrieved chunks as `[Source: <file_path>]` blocks separated by blank lines.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|result| {
            format!(
                "[Source: {}]\n{}",
                result.metadata.document.file_path, result.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Unique sources in retrieval order.
pub fn collect_sources(results: &[RetrievalResult]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for source in results.iter().map(SourceRef::from_result) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl ModelPricing {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            model: model.into(),
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn parse_generation(body: &Value) -> Result<Generation, AnswerError> {
    let text = body
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| AnswerError::MalformedResponse("missing content[0].text".to_string()))?
        .to_string();
    let usage = |field: &str| {
        body.pointer(&format!("/usage/{field}"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    Ok(Generation {
        text,
        input_tokens: usage("input_tokens"),
        output_tokens: usage("output_tokens"),
    })
}

#[async_trait]
impl AnswerGenerator for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation, AnswerError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Provider {
                provider: "anthropic".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = response.json().await?;
        parse_generation(&parsed)
    }
}

pub struct DocsAssistant<V, G>
where
    V: VectorIndex,
    G: AnswerGenerator,
{
    retriever: Retriever<V>,
    generator: G,
    pricing: ModelPricing,
    max_tokens: u32,
}

impl<V, G> DocsAssistant<V, G>
where
    V: VectorIndex + Send + Sync,
    G: AnswerGenerator + Send + Sync,
{
    pub fn new(retriever: Retriever<V>, generator: G) -> Self {
        Self {
            retriever,
            generator,
            pricing: ModelPricing::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn retriever(&self) -> &Retriever<V> {
        &self.retriever
    }

    /// Answers one question. Collaborator failures come back as a response with `error` set.
    pub async fn answer(&self, request: &AnswerRequest) -> AnswerResponse {
        let started = Instant::now();

        let context = match self
            .retriever
            .retrieve_context(
                &request.query,
                request.top_k,
                request.category_filter.as_deref(),
                true,
            )
            .await
        {
            Ok(context) => context,
            Err(error) => {
                warn!(%error, "retrieval failed");
                return failure(request, AnswerError::from(error), started);
            }
        };
        let retrieval_secs = started.elapsed().as_secs_f64();

        if context.is_empty() {
            info!(query = %request.query, "no relevant context");
            return AnswerResponse {
                query: request.query.clone(),
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                model: None,
                tokens: None,
                cost: None,
                timings: Timings {
                    retrieval_secs,
                    generation_secs: 0.0,
                    total_secs: started.elapsed().as_secs_f64(),
                },
                error: None,
            };
        }

        let prompt = build_prompt(&build_context(&context), &request.query);
        debug!(chunks = context.len(), prompt_chars = prompt.len(), "generating answer");

        let generation_started = Instant::now();
        let generation = match self
            .generator
            .generate(&prompt, self.max_tokens, request.temperature)
            .await
        {
            Ok(generation) => generation,
            Err(error) => {
                warn!(%error, "generation failed");
                return failure(request, error, started);
            }
        };
        let generation_secs = generation_started.elapsed().as_secs_f64();

        let tokens = TokenUsage {
            input: generation.input_tokens,
            output: generation.output_tokens,
            total: generation.input_tokens + generation.output_tokens,
        };
        let cost = self.pricing.cost(tokens.input, tokens.output);
        info!(
            model = %self.generator.model(),
            input_tokens = tokens.input,
            output_tokens = tokens.output,
            cost,
            "answer generated"
        );

        AnswerResponse {
            query: request.query.clone(),
            answer: generation.text,
            sources: collect_sources(&context),
            model: Some(self.generator.model().to_string()),
            tokens: Some(tokens),
            cost: Some(cost),
            timings: Timings {
                retrieval_secs,
                generation_secs,
                total_secs: started.elapsed().as_secs_f64(),
            },
            error: None,
        }
    }
}

fn failure(request: &AnswerRequest, error: AnswerError, started: Instant) -> AnswerResponse {
    let reason = error.to_string();
    AnswerResponse {
        query: request.query.clone(),
        answer: format!("Error generating answer: {reason}"),
        sources: Vec::new(),
        model: None,
        tokens: None,
        cost: None,
        timings: Timings {
            total_secs: started.elapsed().as_secs_f64(),
            ..Timings::default()
        },
        error: Some(reason),
    }
}
