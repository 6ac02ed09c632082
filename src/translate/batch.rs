use crate::translate::{TranslateError, Translator};

pub const DEFAULT_BATCH_SIZE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub translated: usize,
    pub total: usize,
    pub percent: u32,
}

/// `round(100 * done / total)` with halves rounded up; `None` for an empty total.
pub fn progress_percent(done: usize, total: usize) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let done = done.min(total) as u64;
    let total = total as u64;
    Some(((200 * done + total) / (2 * total)) as u32)
}

/// Walks an ordered block list in fixed-size batches.
///
/// Blocks inside a batch are translated one after another; results keep the
/// input order. The batch size paces provider calls and has no relation to
/// the content's structure.
#[derive(Debug)]
pub struct BatchCoordinator {
    blocks: Vec<String>,
    batch_size: usize,
    translated: Vec<String>,
}

impl BatchCoordinator {
    pub fn new(blocks: Vec<String>, batch_size: usize) -> Result<Self, TranslateError> {
        if blocks.is_empty() {
            return Err(TranslateError::NothingToTranslate);
        }
        let translated = Vec::with_capacity(blocks.len());
        Ok(Self {
            blocks,
            batch_size: batch_size.max(1),
            translated,
        })
    }

    pub fn total(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_done(&self) -> bool {
        self.translated.len() >= self.blocks.len()
    }

    /// Translates the next batch. Returns `None` once every block is done.
    pub async fn next_batch(
        &mut self,
        translator: &Translator,
        from: &str,
        to: &str,
    ) -> Result<Option<BatchProgress>, TranslateError> {
        if self.is_done() {
            return Ok(None);
        }

        let start = self.translated.len();
        let end = (start + self.batch_size).min(self.blocks.len());
        for block in &self.blocks[start..end] {
            let translated = translator.translate(block, from, to).await?;
            self.translated.push(translated);
        }

        let total = self.blocks.len();
        let translated = self.translated.len();
        let percent = progress_percent(translated, total).unwrap_or(100);
        tracing::debug!(translated, total, percent, "batch translated");

        Ok(Some(BatchProgress {
            translated,
            total,
            percent,
        }))
    }

    pub fn into_translated(self) -> Vec<String> {
        self.translated
    }
}
