use crate::error::IngestError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps chunk text to a fixed-size vector. Remote backends can fail per call.
pub trait Embedder {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError>;

    fn embed_all(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IngestError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Hashed character-trigram vectors computed offline.
///
/// Not a semantic model: it gives deterministic vectors for exercising the
/// pipeline and the row format without a network service.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        if self.dimensions == 0 {
            return Err(IngestError::Embedding(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingEndpointConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
}

impl EmbeddingEndpointConfig {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: &str,
        dimensions: usize,
    ) -> Result<Self, IngestError> {
        if dimensions == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        Ok(Self {
            endpoint: Url::parse(endpoint.trim())?,
            api_key: api_key
                .map(|value| value.trim().to_string())
                .filter(|key| !key.is_empty()),
            model: model.trim().to_string(),
            dimensions,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `POST /embeddings` endpoint.
///
/// One request per document batch. Any transport or shape error is returned
/// as [`IngestError::Embedding`] so only that document is skipped.
#[derive(Debug, Clone)]
pub struct RemoteEmbedder {
    config: EmbeddingEndpointConfig,
}

impl RemoteEmbedder {
    pub fn new(config: EmbeddingEndpointConfig) -> Self {
        Self { config }
    }

    fn embed_blocking(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IngestError> {
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut request = Client::new()
            .post(self.config.endpoint.clone())
            .header("content-type", "application/json")
            .json(&body);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .map_err(|error| IngestError::Embedding(error.to_string()))?;

        if !response.status().is_success() {
            return Err(IngestError::Embedding(format!(
                "embedding request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .map_err(|error| IngestError::Embedding(error.to_string()))?;
        response_to_vectors(payload, texts.len())
    }
}

impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        self.embed_all(&[text])?
            .pop()
            .ok_or_else(|| IngestError::Embedding("empty embedding response".to_string()))
    }

    fn embed_all(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // The blocking client owns a runtime and must live off any async worker.
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.embed_blocking(texts))
                .join()
                .unwrap_or_else(|_| {
                    Err(IngestError::Embedding(format!(
                        "embedding worker panicked calling {}",
                        self.config.endpoint
                    )))
                })
        })
    }
}

fn response_to_vectors(
    payload: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, IngestError> {
    if payload.data.len() != expected {
        return Err(IngestError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            payload.data.len()
        )));
    }

    let mut data = payload.data;
    data.sort_by_key(|datum| datum.index.unwrap_or(usize::MAX));
    Ok(data.into_iter().map(|datum| datum.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Leaders and followers").expect("embed");
        let second = embedder.embed("Leaders and followers").expect("embed");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vectors = embedder.embed_all(&["abc", ""]).expect("embed");
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|vector| vector.len() == 32));
        assert!(vectors[1].iter().all(|value| *value == 0.0));
    }

    #[test]
    fn zero_dimensions_is_an_error() {
        let embedder = CharacterNgramEmbedder { dimensions: 0 };
        assert!(embedder.embed("abc").is_err());
    }

    #[test]
    fn embedding_response_is_reordered_by_index() {
        let payload: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .expect("json");

        let vectors = response_to_vectors(payload, 2).expect("vectors");
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_embedding_response_is_an_error() {
        let payload: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[1.0]}]}"#).expect("json");
        assert!(matches!(
            response_to_vectors(payload, 3),
            Err(IngestError::Embedding(_))
        ));
    }

    #[test]
    fn embedding_endpoint_config_validates_input() {
        let config = EmbeddingEndpointConfig::new(
            "http://localhost:11434/v1/embeddings",
            Some(" ".to_string()),
            " nomic-embed-text ",
            768,
        )
        .expect("valid config");
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, "nomic-embed-text");
        assert_eq!(RemoteEmbedder::new(config).dimensions(), 768);

        assert!(EmbeddingEndpointConfig::new("http://localhost/", None, "m", 0).is_err());
        assert!(EmbeddingEndpointConfig::new("nope", None, "m", 8).is_err());
    }

    #[test]
    fn remote_embedder_skips_request_for_empty_batch() {
        let config = EmbeddingEndpointConfig::new("http://127.0.0.1:9/embeddings", None, "m", 4)
            .expect("valid config");
        let vectors = RemoteEmbedder::new(config).embed_all(&[]).expect("no request");
        assert!(vectors.is_empty());
    }
}
