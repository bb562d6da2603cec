use std::path::Path;

use anyhow::{Context, Result};
use quarry_config::{
    AnalysisConfig, DEFAULT_COMMIT_EMBEDDING_WINDOW, DEFAULT_EMBEDDING_CONCURRENCY, QuarryConfig,
};
use quarry_core::{ParsedFile, SourceFile, SubjectStats, SubjectStatus, extract_history, now_millis};
use quarry_infer::InferenceServices;
use quarry_parse::SymbolParser;
use quarry_store::Store;
use thiserror::Error;

use crate::indexer::{generate_embeddings, plan_embeddings};
use crate::resolver::build_edges;
use crate::walker::{WalkOptions, walk_tree};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("subject {0} not found")]
    SubjectNotFound(i64),
    #[error("analysis already in progress for subject {subject_id} (status: {})", status.as_str())]
    AnalysisInProgress {
        subject_id: i64,
        status: SubjectStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub max_commits: usize,
    pub walk: WalkOptions,
    pub commit_embedding_window: usize,
    pub embedding_concurrency: usize,
    /// Proceed even when the stored status says another run is in flight.
    pub force: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_commits: quarry_config::DEFAULT_MAX_COMMITS,
            walk: WalkOptions::default(),
            commit_embedding_window: DEFAULT_COMMIT_EMBEDDING_WINDOW,
            embedding_concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
            force: false,
        }
    }
}

impl From<&QuarryConfig> for AnalysisOptions {
    fn from(config: &QuarryConfig) -> Self {
        let analysis: &AnalysisConfig = &config.analysis;
        Self {
            max_commits: analysis.max_commits,
            walk: WalkOptions::from(analysis),
            commit_embedding_window: analysis.commit_embedding_window,
            embedding_concurrency: config.embeddings.concurrency,
            force: false,
        }
    }
}

/// Tracks the reported progress so a failure can keep the last value.
struct Progress<'a, S: Store + ?Sized> {
    store: &'a S,
    subject_id: i64,
    percent: u8,
}

impl<S: Store + ?Sized> Progress<'_, S> {
    fn report(&mut self, percent: u8, message: &str) -> Result<()> {
        self.percent = self.percent.max(percent);
        self.store
            .update_subject_status(
                self.subject_id,
                SubjectStatus::Analyzing,
                Some(self.percent),
                Some(message),
            )
            .with_context(|| format!("failed to record progress for subject {}", self.subject_id))?;
        tracing::info!(subject_id = self.subject_id, progress = self.percent, "{message}");
        Ok(())
    }
}

/// Runs every analysis stage for one subject and leaves it `ready`. Any stage
/// failure leaves the subject in `error` with the last reported progress.
/// A busy subject is rejected unless `options.force` is set, which is how a
/// run interrupted by a crash is recovered.
pub async fn run_analysis<S: Store + ?Sized>(
    store: &S,
    services: &InferenceServices,
    subject_id: i64,
    options: &AnalysisOptions,
) -> Result<SubjectStats> {
    let subject = store
        .get_subject(subject_id)
        .context("failed to load subject")?
        .ok_or(PipelineError::SubjectNotFound(subject_id))?;
    if subject.status.is_busy() {
        if options.force {
            tracing::warn!(
                subject_id,
                status = subject.status.as_str(),
                progress = subject.progress,
                "taking over subject left busy by an earlier run"
            );
        } else {
            return Err(PipelineError::AnalysisInProgress {
                subject_id,
                status: subject.status,
            }
            .into());
        }
    }

    let mut progress = Progress {
        store,
        subject_id,
        percent: 0,
    };
    let root = Path::new(&subject.root_path);
    match run_stages(&mut progress, services, root, subject.last_analyzed_at, options).await {
        Ok(stats) => Ok(stats),
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(subject_id, error = %message, "analysis failed");
            if let Err(status_err) =
                store.update_subject_status(subject_id, SubjectStatus::Error, None, Some(&message))
            {
                tracing::warn!(subject_id, error = %status_err, "failed to record analysis error");
            }
            Err(err)
        }
    }
}

async fn run_stages<S: Store + ?Sized>(
    progress: &mut Progress<'_, S>,
    services: &InferenceServices,
    root: &Path,
    last_analyzed_at: Option<i64>,
    options: &AnalysisOptions,
) -> Result<SubjectStats> {
    let store = progress.store;
    let subject_id = progress.subject_id;
    progress.report(0, "Starting analysis...")?;

    progress.report(5, "Parsing git history...")?;
    let commits = extract_history(root, options.max_commits);
    let mut saved_commits = 0usize;
    for commit in &commits {
        match store.upsert_commit(subject_id, commit) {
            Ok(_) => saved_commits += 1,
            Err(e) => tracing::warn!(
                subject_id,
                commit = %commit.short_hash,
                error = %e,
                "skipping commit that could not be saved"
            ),
        }
    }
    progress.report(20, &format!("Parsed {saved_commits} commits"))?;

    progress.report(25, "Extracting files...")?;
    // Must differ from the previous run's marker or stale rows would survive.
    let seen_at = now_millis().max(last_analyzed_at.unwrap_or(0) + 1);
    let mut parser = SymbolParser::new().context("failed to initialize symbol parser")?;
    let sources = walk_tree(root, &options.walk)?;
    let mut parsed_files: Vec<(i64, SourceFile, ParsedFile)> = Vec::with_capacity(sources.len());
    for source in sources {
        let parsed = parser.parse_file(&source);
        match store.upsert_file(subject_id, &source, &parsed, seen_at) {
            Ok(file_id) => parsed_files.push((file_id, source, parsed)),
            Err(e) => tracing::warn!(
                subject_id,
                path = %source.path,
                error = %e,
                "skipping file that could not be saved"
            ),
        }
    }
    let removed = store
        .mark_unseen_files_deleted(subject_id, seen_at)
        .context("failed to mark removed files")?;
    if removed > 0 {
        tracing::debug!(subject_id, removed, "marked files missing from the walk as deleted");
    }
    progress.report(40, &format!("Extracted {} files", parsed_files.len()))?;

    progress.report(45, "Extracting functions...")?;
    let mut function_count = 0usize;
    for (file_id, source, parsed) in &parsed_files {
        for symbol in &parsed.symbols {
            match store.upsert_symbol(subject_id, *file_id, symbol, seen_at) {
                Ok(_) => function_count += 1,
                Err(e) => tracing::warn!(
                    subject_id,
                    path = %source.path,
                    symbol = %symbol.name,
                    error = %e,
                    "skipping symbol that could not be saved"
                ),
            }
        }
    }
    store
        .prune_symbols(subject_id, seen_at)
        .context("failed to prune stale symbols")?;
    progress.report(60, &format!("Extracted {function_count} functions"))?;

    progress.report(65, "Building dependency graph...")?;
    let files = store.list_files(subject_id).context("failed to list files")?;
    let symbols = store.list_symbols(subject_id).context("failed to list symbols")?;
    let edges = build_edges(&files, &symbols);
    store
        .replace_edges(subject_id, &edges)
        .context("failed to save dependency edges")?;
    progress.report(75, &format!("Dependency graph built with {} edges", edges.len()))?;

    progress.report(80, "Generating embeddings...")?;
    let recent_commits = store
        .list_commits(subject_id, options.commit_embedding_window)
        .context("failed to list recent commits")?;
    let jobs = plan_embeddings(&files, &symbols, &recent_commits);
    let embeddings = generate_embeddings(services, jobs, options.embedding_concurrency).await;
    let stored = store
        .replace_embeddings(subject_id, &embeddings)
        .context("failed to save embeddings")?;
    progress.report(
        95,
        &format!("Generated {stored} embeddings with {}", services.embedding_provider_name()),
    )?;

    let stats = store
        .calculate_stats(subject_id)
        .context("failed to calculate statistics")?;
    store
        .save_subject_stats(subject_id, &stats, now_millis())
        .context("failed to save statistics")?;
    store
        .update_subject_status(
            subject_id,
            SubjectStatus::Ready,
            Some(100),
            Some("Analysis complete"),
        )
        .context("failed to mark subject ready")?;
    tracing::info!(
        subject_id,
        commits = stats.total_commits,
        files = stats.total_files,
        functions = stats.total_functions,
        dependencies = stats.total_dependencies,
        "analysis complete"
    );
    Ok(stats)
}
