//! LLM-based Subject-Predicate-Object extraction from free text.
//!
//! The model is asked for a strict JSON array; real model output is anything
//! but strict, so parsing runs a cascade: direct JSON, fence-stripped JSON,
//! outermost-bracket slice, then a line-wise key-value fallback. Parse
//! failures are never fatal; the extractor degrades to an empty result.

use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::facts::{ExtractionMethod, Provenance, Triplet};
use crate::generator::{Capability, GenerationParams, GeneratorRouter, Quality};

const EXTRACTION_PROMPT: &str = "Task: Extract facts from text as JSON triplets.

Text to analyze:
{text}

Instructions:
1. Extract key facts as Subject-Predicate-Object triplets
2. Subject = main entity, Predicate = relationship, Object = value
3. Assign confidence 0.0-1.0 for each fact
4. Return ONLY valid JSON array, no other text

Format (strict JSON array):
[{\"subject\": \"entity\", \"predicate\": \"relation\", \"object\": \"value\", \"confidence\": 0.8}]

Example:
Input: \"Solar panels reduce CO2 emissions by up to 95%.\"
Output: [{\"subject\": \"solar panels\", \"predicate\": \"reduce\", \"object\": \"CO2 emissions\", \"confidence\": 0.9}, {\"subject\": \"CO2 reduction\", \"predicate\": \"percentage\", \"object\": \"95%\", \"confidence\": 0.85}]

Now extract from the text above. Return ONLY the JSON array:";

/// Origin information recorded in each extracted triplet's provenance.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    /// Origin source id, typically the tree node the text answers
    pub source_id: String,
    /// Model that produced the source text, if known
    pub model_used: Option<String>,
}

impl ExtractionContext {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            model_used: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }
}

/// Extractor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Inputs shorter than this yield an empty result
    pub min_input_len: usize,
    /// Candidates below this confidence are dropped
    pub min_confidence: f64,
    /// Result cap per extraction
    pub max_triplets: usize,
    /// Input truncation before prompting
    pub max_input_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_input_len: 10,
            min_confidence: 0.5,
            max_triplets: 20,
            max_input_chars: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Extracts Bronze-tier triplets from natural-language text via the
/// extraction capability of the generator.
pub struct FactExtractor {
    router: Arc<GeneratorRouter>,
    config: ExtractorConfig,
}

impl FactExtractor {
    pub fn new(router: Arc<GeneratorRouter>) -> Self {
        Self {
            router,
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Extract triplets from text. Model and parse failures degrade to an
    /// empty list with a logged warning.
    pub async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
        quality: Quality,
    ) -> Vec<Triplet> {
        if text.trim().len() < self.config.min_input_len {
            return Vec::new();
        }

        let truncated: String = text.chars().take(self.config.max_input_chars).collect();
        let prompt = EXTRACTION_PROMPT.replace("{text}", &truncated);

        let response = match self
            .router
            .generate(
                &prompt,
                Capability::Extraction,
                quality,
                &GenerationParams::new(),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "extraction generation failed");
                return Vec::new();
            }
        };

        let candidates = parse_candidates(&response.content);
        debug!(
            candidates = candidates.len(),
            source = %context.source_id,
            "parsed extraction candidates"
        );

        let model_used = context
            .model_used
            .clone()
            .unwrap_or_else(|| response.model_id.clone());

        let mut triplets = Vec::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            if triplets.len() >= self.config.max_triplets {
                break;
            }

            let confidence = candidate.confidence.unwrap_or(0.5);
            if confidence < self.config.min_confidence {
                continue;
            }

            let provenance = Provenance::new(&context.source_id, ExtractionMethod::LlmStructured)
                .with_model(model_used.clone());

            let triplet = Triplet::new(
                candidate.subject,
                candidate.predicate,
                candidate.object,
                confidence.clamp(0.0, 1.0),
                provenance,
            )
            .with_metadata("original_text_length", Value::from(text.len()))
            .with_metadata("extraction_index", Value::from(index));

            if let Err(e) = triplet.validate() {
                debug!(error = %e, "dropping malformed candidate");
                continue;
            }

            triplets.push(triplet);
        }

        triplets
    }

    /// Extract from several texts concurrently, preserving input order and
    /// recording each batch index in metadata.
    pub async fn extract_batch(
        &self,
        texts: &[String],
        context: &ExtractionContext,
        quality: Quality,
    ) -> Vec<Triplet> {
        let results = join_all(
            texts
                .iter()
                .map(|text| self.extract(text, context, quality)),
        )
        .await;

        let mut all = Vec::new();
        for (batch_index, mut triplets) in results.into_iter().enumerate() {
            for triplet in &mut triplets {
                triplet
                    .metadata
                    .insert("batch_index".to_string(), Value::from(batch_index));
            }
            all.extend(triplets);
        }
        all
    }
}

/// Run the parse cascade over raw model output.
fn parse_candidates(response: &str) -> Vec<RawCandidate> {
    let trimmed = response.trim();

    // 1. Direct JSON parse
    if let Some(candidates) = parse_json_candidates(trimmed) {
        return candidates;
    }

    // 2. Strip code-fence markers and retry
    let fence = Regex::new(r"```[\w]*\n?").expect("static regex");
    let stripped = fence.replace_all(trimmed, "");
    let stripped = stripped.trim();
    if let Some(candidates) = parse_json_candidates(stripped) {
        return candidates;
    }

    // 3. Outermost bracketed slice
    if let (Some(start), Some(end)) = (stripped.find('['), stripped.rfind(']')) {
        if end > start {
            if let Some(candidates) = parse_json_candidates(&stripped[start..=end]) {
                return candidates;
            }
        }
    }

    // 4. Line-wise key-value fallback
    parse_text_fallback(stripped)
}

fn parse_json_candidates(text: &str) -> Option<Vec<RawCandidate>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let array = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("triplets") {
            Some(Value::Array(items)) => items,
            _ => return Some(Vec::new()),
        },
        _ => return Some(Vec::new()),
    };

    Some(
        array
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    )
}

/// Accumulate `Subject:`/`Predicate:`/`Object:`/`Confidence:` fields across
/// lines; a block is emitted once the three S/P/O fields are present.
fn parse_text_fallback(text: &str) -> Vec<RawCandidate> {
    let mut candidates = Vec::new();
    let mut subject = None;
    let mut predicate = None;
    let mut object = None;
    let mut confidence = None;

    for line in text.lines() {
        for segment in line.split(',') {
            let Some((key, value)) = segment.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim().trim_matches(&['"', ','][..]).to_string();
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "subject" => subject = Some(value),
                "predicate" => predicate = Some(value),
                "object" => object = Some(value),
                "confidence" => confidence = value.parse::<f64>().ok(),
                _ => {}
            }
        }

        if let (Some(s), Some(p), Some(o)) = (&subject, &predicate, &object) {
            candidates.push(RawCandidate {
                subject: s.clone(),
                predicate: p.clone(),
                object: o.clone(),
                confidence,
            });
            subject = None;
            predicate = None;
            object = None;
            confidence = None;
        }
    }

    candidates
}
