use futures::StreamExt;
use futures::stream;
use quarry_core::{ContentKind, EntityKind, truncate_chars};
use quarry_infer::InferenceServices;
use quarry_store::{CommitRecord, FileRecord, NewEmbedding, SymbolRecord};
use serde_json::{Value, json};

/// Files must have more than this many characters to be embedded.
pub const FILE_MIN_CHARS: usize = 50;
pub const FILE_EXCERPT_CHARS: usize = 2000;
pub const SYMBOL_MIN_CHARS: usize = 20;
pub const SYMBOL_EXCERPT_CHARS: usize = 1000;
pub const COMMIT_EXCERPT_CHARS: usize = 500;

/// One text waiting for a vector. `text` is embedded in full; `content` is
/// the stored excerpt.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingJob {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub entity_name: String,
    pub text: String,
    pub content: String,
    pub content_kind: ContentKind,
    pub metadata: Value,
}

/// Builds the texts to embed. `commits` is expected newest first and already
/// cut to the commit window.
pub fn plan_embeddings(
    files: &[FileRecord],
    symbols: &[SymbolRecord],
    commits: &[CommitRecord],
) -> Vec<EmbeddingJob> {
    let mut jobs = Vec::new();

    for file in files {
        if file.content.chars().count() <= FILE_MIN_CHARS {
            continue;
        }
        jobs.push(EmbeddingJob {
            entity_kind: EntityKind::File,
            entity_id: file.id.to_string(),
            entity_name: file.path.clone(),
            text: file.content.clone(),
            content: truncate_chars(&file.content, FILE_EXCERPT_CHARS).to_owned(),
            content_kind: ContentKind::Code,
            metadata: json!({
                "path": file.path,
                "language": file.language.as_str(),
                "line_count": file.line_count,
            }),
        });
    }

    for symbol in symbols {
        let parsed = &symbol.symbol;
        if parsed.code.chars().count() <= SYMBOL_MIN_CHARS {
            continue;
        }
        let text = format!("Function {}: {}", parsed.name, parsed.code);
        jobs.push(EmbeddingJob {
            entity_kind: EntityKind::Function,
            entity_id: symbol.id.to_string(),
            entity_name: parsed.name.clone(),
            content: truncate_chars(&text, SYMBOL_EXCERPT_CHARS).to_owned(),
            text,
            content_kind: ContentKind::Code,
            metadata: json!({
                "file_path": symbol.file_path,
                "kind": parsed.kind.as_str(),
                "start_line": parsed.start_line,
                "end_line": parsed.end_line,
            }),
        });
    }

    for record in commits {
        let commit = &record.commit;
        let changed = if commit.files_changed.is_empty() {
            "none".to_owned()
        } else {
            commit
                .files_changed
                .iter()
                .map(|change| change.filename.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let text = format!("Commit: {}. Changed files: {}", commit.message, changed);
        jobs.push(EmbeddingJob {
            entity_kind: EntityKind::Commit,
            entity_id: commit.hash.clone(),
            entity_name: commit.short_hash.clone(),
            content: truncate_chars(&text, COMMIT_EXCERPT_CHARS).to_owned(),
            text,
            content_kind: ContentKind::CommitMessage,
            metadata: json!({
                "hash": commit.hash,
                "message": commit.message.lines().next().unwrap_or_default(),
                "timestamp": commit.timestamp,
            }),
        });
    }

    jobs
}

/// Embeds every job with at most `concurrency` requests in flight. Output keeps
/// job order; a failing provider call yields the offline vector for that job.
pub async fn generate_embeddings(
    services: &InferenceServices,
    jobs: Vec<EmbeddingJob>,
    concurrency: usize,
) -> Vec<NewEmbedding> {
    stream::iter(jobs)
        .map(|job| async move {
            let vector = services.embed(&job.text).await;
            NewEmbedding {
                entity_kind: job.entity_kind,
                entity_id: job.entity_id,
                entity_name: job.entity_name,
                content: job.content,
                content_kind: job.content_kind,
                vector,
                metadata: job.metadata,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use quarry_core::{ChangeKind, CommitInfo, FileChange, Language, ParsedSymbol, SymbolKind};
    use quarry_infer::fallback_embedding;

    use super::*;

    fn file(id: i64, path: &str, content: &str) -> FileRecord {
        FileRecord {
            id,
            subject_id: 1,
            path: path.to_owned(),
            filename: path.to_owned(),
            extension: "js".to_owned(),
            language: Language::JavaScript,
            content: content.to_owned(),
            size: content.len() as u64,
            line_count: 1,
            imports: Vec::new(),
            exports: Vec::new(),
            content_hash: String::new(),
            is_deleted: false,
        }
    }

    fn symbol(id: i64, name: &str, code: &str) -> SymbolRecord {
        SymbolRecord {
            id,
            subject_id: 1,
            file_id: 1,
            file_path: "src/a.js".to_owned(),
            symbol: ParsedSymbol {
                name: name.to_owned(),
                kind: SymbolKind::Function,
                start_line: 3,
                end_line: 5,
                parameters: Vec::new(),
                return_type: "unknown".to_owned(),
                is_exported: false,
                is_async: false,
                complexity: 1,
                calls: Vec::new(),
                code: code.to_owned(),
            },
        }
    }

    fn commit(files: &[&str]) -> CommitRecord {
        CommitRecord {
            id: 1,
            subject_id: 1,
            commit: CommitInfo {
                hash: "0123456789abcdef".to_owned(),
                short_hash: "0123456".to_owned(),
                author_name: "dev".to_owned(),
                author_email: "dev@example.com".to_owned(),
                timestamp: 1_700_000_000_000,
                message: "Add login flow\n\nLonger body".to_owned(),
                files_changed: files
                    .iter()
                    .map(|name| FileChange {
                        filename: (*name).to_owned(),
                        additions: 1,
                        deletions: 0,
                        kind: ChangeKind::Added,
                    })
                    .collect(),
                total_additions: files.len() as u32,
                total_deletions: 0,
                files_changed_count: files.len() as u32,
                parent_hashes: Vec::new(),
            },
        }
    }

    #[test]
    fn short_files_and_symbols_are_not_planned() {
        let files = vec![file(1, "tiny.js", "let a = 1;"), file(2, "big.js", &"x".repeat(2500))];
        let symbols = vec![
            symbol(7, "f", "function f() {}"),
            symbol(8, "handleLogin", "function handleLogin(user) { return user; }"),
        ];

        let jobs = plan_embeddings(&files, &symbols, &[]);
        assert_eq!(jobs.len(), 2);

        assert_eq!(jobs[0].entity_id, "2");
        assert_eq!(jobs[0].content.chars().count(), FILE_EXCERPT_CHARS);
        assert_eq!(jobs[0].text.chars().count(), 2500);
        assert_eq!(jobs[0].metadata["path"], "big.js");

        assert_eq!(jobs[1].entity_kind, EntityKind::Function);
        assert_eq!(jobs[1].entity_name, "handleLogin");
        assert!(jobs[1].content.starts_with("Function handleLogin: function handleLogin"));
        assert_eq!(jobs[1].metadata["file_path"], "src/a.js");
        assert_eq!(jobs[1].metadata["start_line"], 3);
    }

    #[test]
    fn commit_text_lists_changed_files_or_none() {
        let jobs = plan_embeddings(&[], &[], &[commit(&["a.js", "b.js"]), commit(&[])]);
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].content.ends_with("Changed files: a.js, b.js"));
        assert!(jobs[1].content.ends_with("Changed files: none"));
        assert_eq!(jobs[0].entity_id, "0123456789abcdef");
        assert_eq!(jobs[0].entity_name, "0123456");
        assert_eq!(jobs[0].content_kind, ContentKind::CommitMessage);
        assert_eq!(jobs[0].metadata["message"], "Add login flow");
    }

    #[tokio::test]
    async fn generated_embeddings_keep_job_order_and_dimension() {
        let services = InferenceServices::offline(16);
        let files: Vec<FileRecord> = (1..=5)
            .map(|id| file(id, &format!("f{id}.js"), &format!("{id} {}", "y".repeat(80))))
            .collect();
        let jobs = plan_embeddings(&files, &[], &[]);

        let embeddings = generate_embeddings(&services, jobs, 2).await;
        let ids: Vec<&str> = embeddings
            .iter()
            .map(|embedding| embedding.entity_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        assert!(embeddings.iter().all(|embedding| embedding.vector.len() == 16));
        assert_ne!(embeddings[0].vector, embeddings[1].vector);
    }

    #[tokio::test]
    async fn vectors_come_from_full_text_while_content_is_the_excerpt() {
        let services = InferenceServices::offline(32);
        let full: String = (0..3000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let jobs = plan_embeddings(&[file(1, "long.js", &full)], &[], &[]);

        let embeddings = generate_embeddings(&services, jobs, 1).await;
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].content.chars().count(), FILE_EXCERPT_CHARS);
        assert_eq!(embeddings[0].vector, fallback_embedding(&full, 32));
        assert_ne!(
            embeddings[0].vector,
            fallback_embedding(truncate_chars(&full, FILE_EXCERPT_CHARS), 32)
        );
    }
}
