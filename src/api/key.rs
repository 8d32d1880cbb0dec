use super::{GeminiClient, GeminiConfig, GenerationRequest, TextModel};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Every Google AI Studio key starts with this.
pub const KEY_PREFIX: &str = "AIza";

const PROBE_TEXT: &str = "ping";

pub fn has_known_prefix(api_key: &str) -> bool {
    api_key.trim().starts_with(KEY_PREFIX)
}

/// Confirms a credential is usable with one cheap call.
///
/// The probe is not retried; a rate-limited key simply reports unusable.
#[derive(Debug, Clone)]
pub struct KeyValidator {
    timeout: Duration,
}

impl Default for KeyValidator {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }
}

impl KeyValidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Checks `api_key` against the Gemini API.
    #[instrument(skip_all)]
    pub async fn validate(&self, api_key: &str) -> bool {
        if !has_known_prefix(api_key) {
            warn!("API key does not have the {} prefix", KEY_PREFIX);
            return false;
        }
        let mut config = GeminiConfig::new(api_key);
        config.request_timeout = self.timeout;
        match GeminiClient::new(config) {
            Ok(client) => self.probe(&client).await,
            Err(e) => {
                warn!("Could not build probe client: {}", e);
                false
            }
        }
    }

    /// Same as [`validate`](Self::validate) but probes through `model`,
    /// which is expected to be configured with `api_key`.
    pub async fn validate_with<M>(&self, api_key: &str, model: &M) -> bool
    where
        M: TextModel + ?Sized,
    {
        has_known_prefix(api_key) && self.probe(model).await
    }

    /// Sends the probe and waits at most the configured timeout.
    pub async fn probe<M>(&self, model: &M) -> bool
    where
        M: TextModel + ?Sized,
    {
        let request = GenerationRequest::text(PROBE_TEXT);
        match tokio::time::timeout(self.timeout, model.generate(&request)).await {
            Ok(Ok(Some(_))) => {
                info!("API key probe succeeded");
                true
            }
            Ok(Ok(None)) => {
                warn!("API key probe returned no text");
                false
            }
            Ok(Err(e)) => {
                warn!("API key probe failed: {}", e);
                false
            }
            Err(_) => {
                warn!("API key probe timed out after {:?}", self.timeout);
                false
            }
        }
    }
}
