use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quarry_config::{QuarryConfig, ensure_config, validate_config};
use quarry_core::{SubjectStats, normalize_path};
use quarry_infer::{InferenceOverrides, InferenceServices};
use quarry_rag::{AskOutcome, RetrievalEngine};
use quarry_store::{HistoryEntry, SqliteStore, Store, SubjectRecord};
use serde::Serialize;

use crate::pipeline::{AnalysisOptions, run_analysis};

pub const DEFAULT_ASKER: &str = "local";

/// Store, config and providers shared by one CLI invocation.
pub struct Session {
    pub config: QuarryConfig,
    pub store: SqliteStore,
    pub services: InferenceServices,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeReport {
    pub subject: SubjectRecord,
    pub stats: SubjectStats,
}

impl Session {
    pub fn open(home: &Path, overrides: &InferenceOverrides) -> Result<Self> {
        let config = ensure_config(home).with_context(|| {
            format!(
                "failed to load or create config at {}",
                quarry_config::config_path(home).display()
            )
        })?;
        for warning in validate_config(&config) {
            tracing::warn!(code = warning.code, "{}", warning.message);
        }

        let services = InferenceServices::from_config(&config, overrides)
            .context("failed to configure inference providers")?;
        Self::with_services(home, config, services)
    }

    pub fn with_services(
        home: &Path,
        config: QuarryConfig,
        services: InferenceServices,
    ) -> Result<Self> {
        let store = SqliteStore::open(home)
            .with_context(|| format!("failed to open store in {}", home.display()))?;
        tracing::debug!(
            home = %home.display(),
            embeddings = services.embedding_provider_name(),
            completion = services.completion_provider_name(),
            "session opened"
        );
        Ok(Self {
            config,
            store,
            services,
        })
    }

    /// Finds the subject for `root`, registering it on first use.
    pub fn resolve_subject(&self, root: &Path, name: Option<&str>) -> Result<SubjectRecord> {
        let root = canonical_root(root)?;
        let root_path = normalize_path(&root.to_string_lossy());
        if let Some(subject) = self
            .store
            .find_subject_by_root(&root_path)
            .context("failed to look up subject")?
        {
            return Ok(subject);
        }

        let name = name
            .map(str::to_owned)
            .or_else(|| root.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| root_path.clone());
        let subject = self
            .store
            .register_subject(&name, &root_path)
            .with_context(|| format!("failed to register subject {root_path}"))?;
        tracing::info!(subject_id = subject.id, root = %root_path, "registered subject");
        Ok(subject)
    }

    /// `force` takes over a subject whose stored status is still busy.
    pub async fn analyze(
        &self,
        root: &Path,
        name: Option<&str>,
        force: bool,
    ) -> Result<AnalyzeReport> {
        let subject = self.resolve_subject(root, name)?;
        let options = AnalysisOptions {
            force,
            ..AnalysisOptions::from(&self.config)
        };
        let stats = run_analysis(&self.store, &self.services, subject.id, &options).await?;
        let subject = self
            .store
            .get_subject(subject.id)
            .context("failed to reload subject")?
            .unwrap_or(subject);
        Ok(AnalyzeReport { subject, stats })
    }

    pub async fn ask(&self, root: &Path, question: &str, asker: &str) -> Result<AskOutcome> {
        let subject = self.resolve_subject(root, None)?;
        let engine = RetrievalEngine::new(&self.store, &self.services);
        let outcome = engine.ask(subject.id, question, asker).await?;
        Ok(outcome)
    }

    pub fn history(&self, root: &Path, asker: &str) -> Result<Vec<HistoryEntry>> {
        let subject = self.resolve_subject(root, None)?;
        let engine = RetrievalEngine::new(&self.store, &self.services);
        Ok(engine.history(subject.id, asker)?)
    }

    pub fn status(&self, root: &Path) -> Result<SubjectRecord> {
        self.resolve_subject(root, None)
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize()
        .with_context(|| format!("failed to resolve working tree {}", root.display()))
}
