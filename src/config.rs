//! Environment-driven configuration, loaded via an optional `.env` file and
//! overridable by explicit CLI flags, following the way the workspace's
//! `RuntimeConfig` resolves settings (`dotenvy::dotenv().ok()` then
//! `std::env::var` with a default).

use crate::chunking::DEFAULT_CHUNK_SIZE_TOKENS;
use crate::embeddings::DEFAULT_BATCH_SIZE as DEFAULT_EMBED_BATCH_SIZE;
use crate::rerank::DEFAULT_BATCH_SIZE as DEFAULT_RERANK_BATCH_SIZE;

const DEFAULT_COLLECTION_NAME: &str = "rag_chunks";
const DEFAULT_EMBED_MODEL_NAME: &str = "local-hash-encoder";
const DEFAULT_EMBED_MODEL_VERSION: &str = "1";
const DEFAULT_CROSS_ENCODER_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";
const DEFAULT_VECTORSTORE_HOST: &str = "http://localhost:8080";

/// Resolved runtime configuration. CLI flags win over environment
/// variables; environment variables win over these defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub embed_backend_url: Option<String>,
    pub embed_api_key: Option<String>,
    pub embed_model_name: String,
    pub embed_model_version: String,
    pub embed_batch_size: usize,
    pub vectorstore_host: String,
    pub cross_encoder_model: String,
    pub rerank_batch_size: usize,
    pub collection_name: String,
    pub chunk_size_tokens: usize,
}

/// Validates that an endpoint read from the environment is a well-formed
/// absolute URL, logging and falling back to `fallback` otherwise rather
/// than letting a typo surface later as an opaque connection error.
fn env_url_or(var: &str, fallback: &str) -> String {
    match std::env::var(var) {
        Ok(raw) => match url::Url::parse(&raw) {
            Ok(_) => raw,
            Err(e) => {
                tracing::warn!(%var, %raw, error = %e, "not a valid URL, using the default");
                fallback.to_string()
            }
        },
        Err(_) => fallback.to_string(),
    }
}

impl Default for Config {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        Self {
            embed_backend_url: std::env::var("EMBED_BACKEND_URL")
                .ok()
                .filter(|raw| url::Url::parse(raw).is_ok()),
            embed_api_key: std::env::var("EMBED_API_KEY").ok(),
            embed_model_name: std::env::var("EMBED_MODEL_NAME")
                .unwrap_or_else(|_| DEFAULT_EMBED_MODEL_NAME.to_string()),
            embed_model_version: std::env::var("EMBED_MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_EMBED_MODEL_VERSION.to_string()),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            vectorstore_host: env_url_or("VECTORSTORE_HOST", DEFAULT_VECTORSTORE_HOST),
            cross_encoder_model: std::env::var("CROSS_ENCODER_MODEL")
                .unwrap_or_else(|_| DEFAULT_CROSS_ENCODER_MODEL.to_string()),
            rerank_batch_size: DEFAULT_RERANK_BATCH_SIZE,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            chunk_size_tokens: DEFAULT_CHUNK_SIZE_TOKENS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_any_environment() {
        let config = Config {
            embed_backend_url: None,
            embed_api_key: None,
            ..Config::default()
        };
        assert_eq!(config.collection_name, DEFAULT_COLLECTION_NAME);
        assert_eq!(config.chunk_size_tokens, DEFAULT_CHUNK_SIZE_TOKENS);
    }

    #[test]
    fn malformed_vectorstore_host_falls_back_to_default() {
        assert_eq!(env_url_or("THIS_VAR_IS_NEVER_SET", DEFAULT_VECTORSTORE_HOST), DEFAULT_VECTORSTORE_HOST);
    }
}
