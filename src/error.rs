use serde::Serialize;

use crate::app::model::InvalidTransition;
use crate::scrape::ScrapeError;
use crate::source::ValidationError;
use crate::translate::{ProviderError, TranslateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AccessRestricted,
    Http,
    Structure,
    EmptyContent,
    NoProvider,
    Transport,
    Storage,
    InvalidState,
}

/// Everything that can end a job in the `error` state.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("{context}: {source:#}")]
    Storage {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("assemble epub: {0:#}")]
    Assemble(anyhow::Error),
}

impl PipelineError {
    pub fn storage(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Storage { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Scrape(ScrapeError::AccessRestricted) => ErrorKind::AccessRestricted,
            Self::Scrape(ScrapeError::Http { .. }) => ErrorKind::Http,
            Self::Scrape(ScrapeError::Structure(_)) => ErrorKind::Structure,
            Self::Scrape(ScrapeError::EmptyContent) => ErrorKind::EmptyContent,
            Self::Scrape(ScrapeError::Request(_)) => ErrorKind::Transport,
            Self::Translate(TranslateError::NoProviderAvailable) => ErrorKind::NoProvider,
            Self::Translate(TranslateError::NothingToTranslate) => ErrorKind::EmptyContent,
            Self::Translate(TranslateError::Provider(ProviderError::Http { .. })) => {
                ErrorKind::Http
            }
            Self::Translate(TranslateError::Provider(_)) => ErrorKind::Transport,
            Self::Transition(_) => ErrorKind::InvalidState,
            Self::Storage { .. } | Self::Assemble(_) => ErrorKind::Storage,
        }
    }

    /// Whether resubmitting the same work could succeed. Jobs themselves are
    /// never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Http)
    }
}
