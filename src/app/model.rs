use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OWNER: &str = "local";
pub const DEFAULT_TARGET_LANGUAGE: &str = "pt";
pub const MAX_PAGE_SIZE: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 20;

const MAX_FILENAME_CHARS: usize = 100;
const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scraping,
    Translating,
    Completed,
    Error,
}

impl JobStatus {
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Scraping)
                | (Scraping, Translating)
                | (Translating, Completed)
                | (Scraping, Error)
                | (Translating, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Scraping => "scraping",
            JobStatus::Translating => "translating",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub job_id: String,
    pub owner: String,
    pub work_id: String,
    pub url: String,

    pub title_original: Option<String>,
    pub title_translated: Option<String>,
    pub author: Option<String>,
    pub language_from: Option<String>,
    pub language_to: String,

    pub status: JobStatus,
    pub progress: u32,
    pub total_paragraphs: usize,
    pub translated_paragraphs: usize,
    pub word_count: u64,
    pub error_message: Option<String>,

    pub epub_path: Option<String>,
    pub content_path: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new_pending(
        owner: impl Into<String>,
        work_id: impl Into<String>,
        url: impl Into<String>,
        language_to: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            work_id: work_id.into(),
            url: url.into(),
            title_original: None,
            title_translated: None,
            author: None,
            language_from: None,
            language_to: language_to.into(),
            status: JobStatus::Pending,
            progress: 0,
            total_paragraphs: 0,
            translated_paragraphs: 0,
            word_count: 0,
            error_message: None,
            epub_path: None,
            content_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn epub_key(&self) -> String {
        format!("{}/{}.epub", self.owner, self.job_id)
    }

    pub fn content_key(&self) -> String {
        format!("{}/{}_content.json", self.owner, self.job_id)
    }

    pub fn snapshot_key(&self) -> String {
        format!("{}/{}_paragraphs.json", self.owner, self.job_id)
    }

    /// `"{title} - {author}.epub"` once both are known, else `"{work_id}.epub"`.
    pub fn download_filename(&self) -> String {
        match (self.title_translated.as_deref(), self.author.as_deref()) {
            (Some(title), Some(author)) => {
                let name = sanitize_filename(&format!("{title} - {author}"));
                if name.is_empty() {
                    format!("{}.epub", self.work_id)
                } else {
                    format!("{name}.epub")
                }
            }
            _ => format!("{}.epub", self.work_id),
        }
    }

    fn matches_search(&self, needle: &str) -> bool {
        [&self.title_original, &self.title_translated, &self.author]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Drops characters that are unsafe in file names and caps the length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = name
        .chars()
        .filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect::<String>();
    cleaned
        .trim()
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect::<String>()
        .trim_end()
        .to_owned()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    CreatedAt,
    UpdatedAt,
    TitleTranslated,
    Author,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Pending,
    Scraping,
    Translating,
    Completed,
    Error,
}

impl StatusFilter {
    fn matches(self, status: JobStatus) -> bool {
        match self {
            StatusFilter::Active => status.is_active(),
            StatusFilter::Pending => status == JobStatus::Pending,
            StatusFilter::Scraping => status == JobStatus::Scraping,
            StatusFilter::Translating => status == JobStatus::Translating,
            StatusFilter::Completed => status == JobStatus::Completed,
            StatusFilter::Error => status == JobStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JobQuery {
    pub owner: Option<String>,
    pub work_id: Option<String>,
    pub status: Option<StatusFilter>,
    pub search: Option<String>,
    pub sort_by: SortColumn,
    pub sort_order: SortOrder,
    /// 1-based.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl JobQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(owner) = self.owner.as_deref()
            && job.owner != owner
        {
            return false;
        }
        if let Some(work_id) = self.work_id.as_deref()
            && job.work_id != work_id
        {
            return false;
        }
        if let Some(status) = self.status
            && !status.matches(job.status)
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => job.matches_search(&needle.to_lowercase()),
            _ => true,
        }
    }

    /// Filters, sorts, and slices `jobs` into one page.
    pub fn apply(&self, jobs: Vec<Job>) -> JobPage {
        let mut matched = jobs
            .into_iter()
            .filter(|job| self.matches(job))
            .collect::<Vec<_>>();
        matched.sort_by(|a, b| {
            let ord = compare_by(self.sort_by, a, b).then_with(|| a.job_id.cmp(&b.job_id));
            match self.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let page = self.page();
        let page_size = self.page_size();
        let total = matched.len();
        let total_pages = total.div_ceil(page_size);
        let jobs = matched
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        JobPage {
            jobs,
            page,
            page_size,
            total,
            total_pages,
        }
    }
}

fn compare_by(column: SortColumn, a: &Job, b: &Job) -> Ordering {
    match column {
        SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
        SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortColumn::TitleTranslated => a.title_translated.cmp(&b.title_translated),
        SortColumn::Author => a.author.cmp(&b.author),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStats {
    pub total_jobs: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub errors: usize,
    pub total_paragraphs: usize,
    pub translated_paragraphs: usize,
    pub total_word_count: u64,
}

impl JobStats {
    pub fn collect<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        jobs.into_iter().fold(Self::default(), |mut stats, job| {
            stats.total_jobs += 1;
            match job.status {
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Error => stats.errors += 1,
                _ => stats.in_progress += 1,
            }
            stats.total_paragraphs += job.total_paragraphs;
            stats.translated_paragraphs += job.translated_paragraphs;
            stats.total_word_count += job.word_count;
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn job(work_id: &str, status: JobStatus) -> Job {
        let mut job = Job::new_pending("local", work_id, format!("https://x/works/{work_id}"), "pt");
        job.status = status;
        job
    }

    #[test]
    fn state_machine_allows_only_forward_edges() {
        use JobStatus::*;
        let all = [Pending, Scraping, Translating, Completed, Error];
        let allowed = [
            (Pending, Scraping),
            (Scraping, Translating),
            (Translating, Completed),
            (Scraping, Error),
            (Translating, Error),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
        assert!(Completed.is_terminal());
        assert!(Error.is_terminal());
        assert!(!Translating.is_terminal());
    }

    #[test]
    fn transition_rejects_pending_to_error() {
        let mut job = job("1", JobStatus::Pending);
        let err = job.transition(JobStatus::Error).unwrap_err();
        assert_eq!(err.to_string(), "invalid job transition: pending -> error");
        assert_eq!(job.status, JobStatus::Pending);

        job.transition(JobStatus::Scraping).unwrap();
        assert_eq!(job.status, JobStatus::Scraping);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Translating).unwrap(),
            "\"translating\""
        );
    }

    #[test]
    fn sanitize_filename_strips_reserved_characters() {
        assert_eq!(
            sanitize_filename("  A/B: \"C\" <d>? | *e*\\ "),
            "AB C d  e"
        );
        let long = "x".repeat(150);
        assert_eq!(sanitize_filename(&long).chars().count(), 100);
    }

    #[test]
    fn download_filename_falls_back_to_work_id() {
        let mut job = job("42", JobStatus::Completed);
        assert_eq!(job.download_filename(), "42.epub");

        job.title_translated = Some("O Caminho: Parte 1".to_owned());
        job.author = Some("anon".to_owned());
        assert_eq!(job.download_filename(), "O Caminho Parte 1 - anon.epub");

        job.title_translated = Some("???".to_owned());
        job.author = Some("//".to_owned());
        assert_eq!(job.download_filename(), "-.epub");
    }

    #[test]
    fn blob_keys_are_scoped_by_owner() {
        let job = job("7", JobStatus::Pending);
        assert_eq!(job.epub_key(), format!("local/{}.epub", job.job_id));
        assert_eq!(
            job.snapshot_key(),
            format!("local/{}_paragraphs.json", job.job_id)
        );
        assert_eq!(
            job.content_key(),
            format!("local/{}_content.json", job.job_id)
        );
    }

    #[test]
    fn query_filters_sorts_and_paginates() {
        let base = Utc::now();
        let mut jobs = Vec::new();
        for i in 0..7 {
            let status = if i % 2 == 0 {
                JobStatus::Completed
            } else {
                JobStatus::Translating
            };
            let mut j = job(&i.to_string(), status);
            j.created_at = base + Duration::seconds(i);
            j.author = Some(format!("author{i}"));
            jobs.push(j);
        }

        let query = JobQuery {
            status: Some(StatusFilter::Completed),
            page_size: Some(3),
            ..JobQuery::default()
        };
        let page = query.apply(jobs.clone());
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        let ids = page.jobs.iter().map(|j| j.work_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["6", "4", "2"]);

        let query = JobQuery {
            status: Some(StatusFilter::Active),
            sort_order: SortOrder::Asc,
            ..JobQuery::default()
        };
        let page = query.apply(jobs.clone());
        let ids = page.jobs.iter().map(|j| j.work_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "3", "5"]);

        let query = JobQuery {
            search: Some("AUTHOR5".to_owned()),
            ..JobQuery::default()
        };
        assert_eq!(query.apply(jobs).total, 1);
    }

    #[test]
    fn page_size_is_clamped() {
        let query = JobQuery {
            page: Some(0),
            page_size: Some(500),
            ..JobQuery::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), MAX_PAGE_SIZE);

        let query = JobQuery {
            page_size: Some(0),
            ..JobQuery::default()
        };
        assert_eq!(query.page_size(), 1);
    }

    #[test]
    fn stats_aggregate_counters() {
        let mut done = job("1", JobStatus::Completed);
        done.total_paragraphs = 10;
        done.translated_paragraphs = 10;
        done.word_count = 500;
        let mut running = job("2", JobStatus::Translating);
        running.total_paragraphs = 8;
        running.translated_paragraphs = 3;
        let failed = job("3", JobStatus::Error);

        let stats = JobStats::collect([&done, &running, &failed]);
        assert_eq!(
            stats,
            JobStats {
                total_jobs: 3,
                completed: 1,
                in_progress: 1,
                errors: 1,
                total_paragraphs: 18,
                translated_paragraphs: 13,
                total_word_count: 500,
            }
        );
    }
}
