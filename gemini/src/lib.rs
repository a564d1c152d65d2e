//! Gemini client for constraint synthesis and floorplan validation.
//!
//! All circuit reasoning is delegated to the generative model; this crate
//! only renders prompts, transports them, and parses the structured replies.
//! The [`TextModel`] trait is the single seam for substituting a fixed
//! fixture in tests.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tera::Tera;
use thiserror::Error;

pub mod synth;
pub mod validate;

pub use synth::{Synthesis, Synthesizer};
pub use validate::{InstanceContext, Validator};

pub const TEMPLATES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        match Tera::new(&format!("{TEMPLATES_PATH}/*")) {
            Ok(t) => t,
            Err(e) => {
                panic!("Encountered errors while parsing Tera templates: {e}");
            }
        }
    };
}

/// The result type returned by gemini library functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible generative-model errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport error talking to the model endpoint.
    #[error("error calling model endpoint")]
    Http(#[from] reqwest::Error),
    /// Prompt template rendering error.
    #[error("template error")]
    Template(#[from] tera::Error),
    /// The model returned no candidates or no text.
    #[error("empty model response")]
    EmptyResponse,
    /// The model's synthesis output could not be parsed.
    #[error("malformed synthesis output: {0}")]
    Synthesis(String),
    /// The model's validation output could not be parsed.
    #[error("malformed validation output: {0}")]
    Validation(String),
}

/// A synchronous text-generation capability.
///
/// The one method the pipeline needs from a generative model. Tests
/// substitute an implementation that returns canned text.
pub trait TextModel {
    /// Generates a completion for the given prompt.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// The default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// A blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    /// Creates a client with the default model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    /// Creates a client for the given model.
    pub fn with_model(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

impl TextModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{API_BASE}/{}:generateContent?key={}", self.model, self.api_key);
        tracing::debug!(model = %self.model, "sending generateContent request");
        let response: GenerateResponse = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
            })
            .send()?
            .error_for_status()?
            .json()?;
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(Error::EmptyResponse)?;
        if text.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(text)
    }
}

/// Strips a surrounding Markdown code fence, if present.
///
/// Models frequently wrap structured output in ` ```json ... ``` ` despite
/// instructions not to.
pub(crate) fn strip_code_fence(s: &str) -> &str {
    let s = s.trim();
    let s = match s.strip_prefix("```") {
        Some(rest) => match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest,
        },
        None => s,
    };
    s.trim_end_matches('`').trim()
}
