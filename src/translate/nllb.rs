use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::translate::markup;
use crate::translate::provider::{ProviderError, RetryPolicy, TranslationProvider};

pub const DEFAULT_NLLB_BASE_URL: &str = "https://api-inference.huggingface.co";
const NAME: &str = "NLLB-200";
const MODEL_PATH: &str = "models/facebook/nllb-200-distilled-1.3B";

/// NLLB-200 through the Hugging Face inference API.
///
/// The model has no tag handling, so fragments are reduced to plain text and
/// the result is put back into the fragment's outer element. Inline markup
/// (emphasis, links) does not survive this provider.
#[derive(Debug, Clone)]
pub struct NllbProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl NllbProvider {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            retry,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{MODEL_PATH}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    src_lang: &'static str,
    tgt_lang: &'static str,
}

#[derive(Debug, Deserialize)]
struct InferenceOutput {
    translation_text: Option<String>,
}

#[async_trait]
impl TranslationProvider for NllbProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::InvalidResponse {
                provider: NAME.to_owned(),
                message: "HUGGINGFACE_API_KEY is not set".to_owned(),
            });
        };

        let plain = markup::strip_markup(text);
        let body = InferenceRequest {
            inputs: &plain,
            parameters: InferenceParameters {
                src_lang: map_lang(from),
                tgt_lang: map_lang(to),
            },
        };

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|source| ProviderError::Request {
                    provider: NAME.to_owned(),
                    source,
                })?;

            if response.status() != StatusCode::SERVICE_UNAVAILABLE {
                break response;
            }
            if attempt >= self.retry.max_attempts {
                return Err(ProviderError::NotReady {
                    provider: NAME.to_owned(),
                    attempts: attempt,
                });
            }
            tracing::info!(
                provider = NAME,
                attempt,
                delay_ms = self.retry.delay.as_millis() as u64,
                "model is loading; retrying"
            );
            tokio::time::sleep(self.retry.delay).await;
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: NAME.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        let outputs: Vec<InferenceOutput> =
            response.json().await.map_err(|err| ProviderError::InvalidResponse {
                provider: NAME.to_owned(),
                message: err.to_string(),
            })?;
        let translated = outputs
            .into_iter()
            .next()
            .and_then(|o| o.translation_text)
            .unwrap_or(plain);

        Ok(markup::rewrap(text, &translated))
    }
}

pub fn map_lang(lang: &str) -> &'static str {
    match lang.trim().to_ascii_lowercase().as_str() {
        "en" => "eng_Latn",
        "pt" => "por_Latn",
        "es" => "spa_Latn",
        "fr" => "fra_Latn",
        "de" => "deu_Latn",
        "it" => "ita_Latn",
        "ja" => "jpn_Jpan",
        "ko" => "kor_Hang",
        "zh" => "zho_Hans",
        "ru" => "rus_Cyrl",
        _ => "eng_Latn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_map_to_flores_tags() {
        assert_eq!(map_lang("pt"), "por_Latn");
        assert_eq!(map_lang("JA"), "jpn_Jpan");
        assert_eq!(map_lang("xx"), "eng_Latn");
    }

    #[test]
    fn endpoint_points_at_model() {
        let provider = NllbProvider::new(
            Some("hf".to_owned()),
            "http://localhost:1/",
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            provider.endpoint(),
            "http://localhost:1/models/facebook/nllb-200-distilled-1.3B"
        );
    }
}
