use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod batch;
pub mod deepl;
pub mod markup;
pub mod nllb;
pub mod provider;

pub use batch::{BatchCoordinator, BatchProgress, progress_percent};
pub use provider::{ProviderError, RetryPolicy, TranslationProvider};

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(
        "no translation provider available: all providers are unconfigured or out of quota (set DEEPL_API_KEY or HUGGINGFACE_API_KEY)"
    )]
    NoProviderAvailable,

    #[error("nothing to translate: the work has no content blocks")]
    NothingToTranslate,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Per-provider quota flags, indexed like the engine's provider list.
///
/// Once set, a flag stays set for the lifetime of the ledger unless `reset`.
#[derive(Debug)]
pub struct QuotaLedger {
    exhausted: Vec<AtomicBool>,
}

impl QuotaLedger {
    pub fn new(len: usize) -> Self {
        Self {
            exhausted: (0..len).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn is_exhausted(&self, idx: usize) -> bool {
        self.exhausted
            .get(idx)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn mark_exhausted(&self, idx: usize) {
        if let Some(flag) = self.exhausted.get(idx) {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn reset(&self) {
        for flag in &self.exhausted {
            flag.store(false, Ordering::Release);
        }
    }
}

/// Ordered provider chain with quota fallback.
pub struct Translator {
    providers: Vec<Arc<dyn TranslationProvider>>,
    quota: QuotaLedger,
}

impl Translator {
    pub fn new(providers: Vec<Arc<dyn TranslationProvider>>) -> Self {
        let quota = QuotaLedger::new(providers.len());
        Self { providers, quota }
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_exhausted(&self, name: &str) -> bool {
        self.providers
            .iter()
            .position(|p| p.name() == name)
            .is_some_and(|idx| self.quota.is_exhausted(idx))
    }

    pub async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<String, TranslateError> {
        for (idx, provider) in self.providers.iter().enumerate() {
            if !provider.is_available() || self.quota.is_exhausted(idx) {
                continue;
            }

            match provider.translate(text, from, to).await {
                Ok(translated) => return Ok(translated),
                Err(ProviderError::QuotaExceeded { .. }) => {
                    tracing::warn!(
                        provider = provider.name(),
                        "translation quota exceeded; falling back to next provider"
                    );
                    self.quota.mark_exhausted(idx);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(TranslateError::NoProviderAvailable)
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("providers", &self.provider_names())
            .field("quota", &self.quota)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;

    struct Scripted {
        name: &'static str,
        available: bool,
        quota_exceeded: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, available: bool, quota_exceeded: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                available,
                quota_exceeded,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn translate(
            &self,
            text: &str,
            _from: &str,
            to: &str,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.quota_exceeded {
                return Err(ProviderError::QuotaExceeded {
                    provider: self.name.to_owned(),
                });
            }
            Ok(format!("[{}:{to}] {text}", self.name))
        }
    }

    #[tokio::test]
    async fn quota_exhausted_provider_falls_back_and_is_not_retried() {
        let a = Scripted::new("A", true, true);
        let b = Scripted::new("B", true, false);
        let translator = Translator::new(vec![a.clone(), b.clone()]);

        let first = translator.translate("hello", "en", "pt").await.unwrap();
        assert_eq!(first, "[B:pt] hello");
        assert!(translator.is_exhausted("A"));
        assert!(!translator.is_exhausted("B"));

        let second = translator.translate("again", "en", "pt").await.unwrap();
        assert_eq!(second, "[B:pt] again");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_providers_are_skipped() {
        let a = Scripted::new("A", false, false);
        let b = Scripted::new("B", true, false);
        let translator = Translator::new(vec![a.clone(), b]);

        let out = translator.translate("x", "en", "fr").await.unwrap();
        assert_eq!(out, "[B:fr] x");
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn all_exhausted_is_no_provider_available() {
        let translator = Translator::new(vec![
            Scripted::new("A", true, true),
            Scripted::new("B", true, true),
        ]);
        let err = translator.translate("x", "en", "pt").await.unwrap_err();
        assert!(matches!(err, TranslateError::NoProviderAvailable));

        translator.quota().reset();
        assert!(!translator.is_exhausted("A"));
    }

    #[tokio::test]
    async fn empty_chain_is_no_provider_available() {
        let translator = Translator::new(Vec::new());
        let err = translator.translate("x", "en", "pt").await.unwrap_err();
        assert!(err.to_string().contains("no translation provider available"));
    }

    #[tokio::test]
    async fn non_quota_errors_propagate_without_fallback() {
        struct Broken;

        #[async_trait]
        impl TranslationProvider for Broken {
            fn name(&self) -> &str {
                "Broken"
            }

            fn is_available(&self) -> bool {
                true
            }

            async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, ProviderError> {
                Err(ProviderError::Http {
                    provider: "Broken".to_owned(),
                    status: 500,
                    body: "boom".to_owned(),
                })
            }
        }

        let fallback = Scripted::new("B", true, false);
        let translator = Translator::new(vec![Arc::new(Broken), fallback.clone()]);
        let err = translator.translate("x", "en", "pt").await.unwrap_err();
        assert!(matches!(
            err,
            TranslateError::Provider(ProviderError::Http { status: 500, .. })
        ));
        assert_eq!(fallback.calls(), 0);
    }
}
