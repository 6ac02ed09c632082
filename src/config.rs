use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::source::DEFAULT_SOURCE_BASE_URL;
use crate::translate::batch::DEFAULT_BATCH_SIZE;
use crate::translate::deepl::{DEFAULT_DEEPL_BASE_URL, DeeplProvider};
use crate::translate::nllb::{DEFAULT_NLLB_BASE_URL, NllbProvider};
use crate::translate::{RetryPolicy, TranslationProvider, Translator};

pub const ENV_DEEPL_API_KEY: &str = "DEEPL_API_KEY";
pub const ENV_DEEPL_API_URL: &str = "DEEPL_API_URL";
pub const ENV_HUGGINGFACE_API_KEY: &str = "HUGGINGFACE_API_KEY";
pub const ENV_NLLB_API_URL: &str = "NLLB_API_URL";
pub const ENV_NLLB_MAX_ATTEMPTS: &str = "FICTRANSLATE_NLLB_MAX_ATTEMPTS";
pub const ENV_NLLB_RETRY_DELAY_SECS: &str = "FICTRANSLATE_NLLB_RETRY_DELAY_SECS";
pub const ENV_BATCH_SIZE: &str = "FICTRANSLATE_BATCH_SIZE";
pub const ENV_SOURCE_BASE_URL: &str = "FICTRANSLATE_SOURCE_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConfig {
    pub deepl_api_key: Option<String>,
    pub deepl_base_url: String,
    pub huggingface_api_key: Option<String>,
    pub nllb_base_url: String,
    pub nllb_retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub source_base_url: String,
    pub batch_size: usize,
    pub translator: TranslatorConfig,
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let max_attempts = parse_var(var(ENV_NLLB_MAX_ATTEMPTS), ENV_NLLB_MAX_ATTEMPTS)?
            .unwrap_or(RetryPolicy::default().max_attempts);
        let delay = parse_var::<u64>(var(ENV_NLLB_RETRY_DELAY_SECS), ENV_NLLB_RETRY_DELAY_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(RetryPolicy::default().delay);
        let batch_size =
            parse_var(var(ENV_BATCH_SIZE), ENV_BATCH_SIZE)?.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            anyhow::bail!("{ENV_BATCH_SIZE} must be at least 1");
        }

        Ok(Self {
            source_base_url: var(ENV_SOURCE_BASE_URL)
                .unwrap_or_else(|| DEFAULT_SOURCE_BASE_URL.to_owned()),
            batch_size,
            translator: TranslatorConfig {
                deepl_api_key: var(ENV_DEEPL_API_KEY),
                deepl_base_url: var(ENV_DEEPL_API_URL)
                    .unwrap_or_else(|| DEFAULT_DEEPL_BASE_URL.to_owned()),
                huggingface_api_key: var(ENV_HUGGINGFACE_API_KEY),
                nllb_base_url: var(ENV_NLLB_API_URL)
                    .unwrap_or_else(|| DEFAULT_NLLB_BASE_URL.to_owned()),
                nllb_retry: RetryPolicy::fixed(max_attempts, delay),
            },
        })
    }
}

impl TranslatorConfig {
    /// DeepL first, NLLB as fallback. Providers without a key are kept in the
    /// chain and report themselves unavailable.
    pub fn build_translator(&self) -> anyhow::Result<Translator> {
        let deepl = DeeplProvider::new(self.deepl_api_key.clone(), self.deepl_base_url.clone())
            .context("build DeepL client")?;
        let nllb = NllbProvider::new(
            self.huggingface_api_key.clone(),
            self.nllb_base_url.clone(),
            self.nllb_retry,
        )
        .context("build NLLB client")?;

        let providers: Vec<Arc<dyn TranslationProvider>> = vec![Arc::new(deepl), Arc::new(nllb)];
        let translator = Translator::new(providers);
        if !self.has_any_key() {
            tracing::warn!("no translation API key configured; jobs will fail at translation");
        }
        Ok(translator)
    }

    pub fn has_any_key(&self) -> bool {
        self.deepl_api_key.is_some() || self.huggingface_api_key.is_some()
    }
}

fn parse_var<T>(value: Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.parse::<T>().with_context(|| format!("parse {name}={v}")))
        .transpose()
}
