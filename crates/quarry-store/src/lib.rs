use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use quarry_core::{
    AnswerSources, CommitInfo, ContextChunk, ContentKind, EdgeKind, EntityKind,
    FileChange, Language, NodeKind, Parameter, ParsedFile, ParsedSymbol, QuestionStatus,
    SourceFile, SubjectStats, SubjectStatus, SymbolKind, content_hash, now_millis,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod graph_sqlite;
mod questions;
mod vector;

pub use vector::{blob_to_vec, vec_to_blob};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRecord {
    pub id: i64,
    pub name: String,
    pub root_path: String,
    pub status: SubjectStatus,
    pub progress: u8,
    pub status_message: Option<String>,
    pub stats: SubjectStats,
    pub last_analyzed_at: Option<i64>,
    pub is_deleted: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRecord {
    pub id: i64,
    pub subject_id: i64,
    #[serde(flatten)]
    pub commit: CommitInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub subject_id: i64,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub language: Language,
    pub content: String,
    pub size: u64,
    pub line_count: usize,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub content_hash: String,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub subject_id: i64,
    pub file_id: i64,
    pub file_path: String,
    #[serde(flatten)]
    pub symbol: ParsedSymbol,
}

/// One dependency edge before persistence. `target_id` is `None` for external targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEdge {
    pub source_kind: NodeKind,
    pub source_id: i64,
    pub target_kind: NodeKind,
    pub target_id: Option<i64>,
    pub target_name: String,
    pub kind: EdgeKind,
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeRecord {
    pub id: i64,
    pub subject_id: i64,
    #[serde(flatten)]
    pub edge: NewEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEmbedding {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub entity_name: String,
    pub content: String,
    pub content_kind: ContentKind,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub subject_id: i64,
    pub embedding: NewEmbedding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionRecord {
    pub id: i64,
    pub subject_id: i64,
    pub asker: String,
    pub text: String,
    pub status: QuestionStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAnswer {
    pub answer: String,
    pub explanation: String,
    pub sources: AnswerSources,
    pub context: Vec<ContextChunk>,
    pub total_tokens_used: u32,
    pub confidence: f32,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRecord {
    pub id: i64,
    pub question_id: i64,
    #[serde(flatten)]
    pub answer: NewAnswer,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub question: QuestionRecord,
    pub answer: Option<AnswerRecord>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("question {0} already has an answer")]
    AlreadyAnswered(i64),
}

pub trait Store {
    fn register_subject(&self, name: &str, root_path: &str) -> Result<SubjectRecord, StoreError>;
    fn get_subject(&self, subject_id: i64) -> Result<Option<SubjectRecord>, StoreError>;
    fn find_subject_by_root(&self, root_path: &str) -> Result<Option<SubjectRecord>, StoreError>;
    /// `None` leaves the stored progress or message untouched.
    fn update_subject_status(
        &self,
        subject_id: i64,
        status: SubjectStatus,
        progress: Option<u8>,
        message: Option<&str>,
    ) -> Result<(), StoreError>;
    fn save_subject_stats(
        &self,
        subject_id: i64,
        stats: &SubjectStats,
        analyzed_at: i64,
    ) -> Result<(), StoreError>;
    fn calculate_stats(&self, subject_id: i64) -> Result<SubjectStats, StoreError>;

    fn upsert_commit(&self, subject_id: i64, commit: &CommitInfo) -> Result<i64, StoreError>;
    fn list_commits(&self, subject_id: i64, limit: usize) -> Result<Vec<CommitRecord>, StoreError>;
    fn search_commits(
        &self,
        subject_id: i64,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<CommitRecord>, StoreError>;

    fn upsert_file(
        &self,
        subject_id: i64,
        file: &SourceFile,
        parsed: &ParsedFile,
        seen_at: i64,
    ) -> Result<i64, StoreError>;
    fn mark_unseen_files_deleted(&self, subject_id: i64, seen_at: i64)
    -> Result<usize, StoreError>;
    fn list_files(&self, subject_id: i64) -> Result<Vec<FileRecord>, StoreError>;
    fn search_files(
        &self,
        subject_id: i64,
        path_terms: &[String],
        content_terms: &[String],
        limit: usize,
    ) -> Result<Vec<FileRecord>, StoreError>;

    fn upsert_symbol(
        &self,
        subject_id: i64,
        file_id: i64,
        symbol: &ParsedSymbol,
        seen_at: i64,
    ) -> Result<i64, StoreError>;
    fn prune_symbols(&self, subject_id: i64, seen_at: i64) -> Result<usize, StoreError>;
    /// Ordered by file path, then start line.
    fn list_symbols(&self, subject_id: i64) -> Result<Vec<SymbolRecord>, StoreError>;
    fn search_symbols(
        &self,
        subject_id: i64,
        name_terms: &[String],
        code_terms: &[String],
        limit: usize,
    ) -> Result<Vec<SymbolRecord>, StoreError>;

    fn replace_edges(&self, subject_id: i64, edges: &[NewEdge]) -> Result<usize, StoreError>;
    fn list_edges(&self, subject_id: i64) -> Result<Vec<EdgeRecord>, StoreError>;
    fn neighborhood_edges(
        &self,
        subject_id: i64,
        file_ids: &[i64],
        symbol_ids: &[i64],
        limit: usize,
    ) -> Result<Vec<EdgeRecord>, StoreError>;

    fn replace_embeddings(
        &self,
        subject_id: i64,
        embeddings: &[NewEmbedding],
    ) -> Result<usize, StoreError>;
    fn list_embeddings(&self, subject_id: i64) -> Result<Vec<EmbeddingRecord>, StoreError>;

    fn create_question(
        &self,
        subject_id: i64,
        asker: &str,
        text: &str,
    ) -> Result<QuestionRecord, StoreError>;
    fn update_question_status(
        &self,
        question_id: i64,
        status: QuestionStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;
    fn save_answer(&self, question_id: i64, answer: &NewAnswer)
    -> Result<AnswerRecord, StoreError>;
    /// Newest question first.
    fn list_history(&self, subject_id: i64, asker: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
    home: PathBuf,
}

impl SqliteStore {
    pub fn open(home: impl AsRef<Path>) -> Result<Self, StoreError> {
        let home = home.as_ref().to_path_buf();
        fs::create_dir_all(&home)?;

        let conn = Connection::open(quarry_config::store_path(&home))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self { conn, home })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

const SUBJECT_COLUMNS: &str = "id, name, root_path, status, progress, status_message, \
    total_commits, total_files, total_functions, total_dependencies, languages, \
    last_analyzed_at, is_deleted, created_at";

const COMMIT_COLUMNS: &str = "id, subject_id, hash, short_hash, author_name, author_email, \
    timestamp, message, files_changed, total_additions, total_deletions, files_changed_count, \
    parent_hashes";

const FILE_COLUMNS: &str = "f.id, f.subject_id, f.path, f.filename, f.extension, f.language, \
    f.content, f.size, f.line_count, f.imports, f.exports, f.content_hash, f.is_deleted";

const SYMBOL_COLUMNS: &str = "s.id, s.subject_id, s.file_id, f.path, s.name, s.kind, \
    s.start_line, s.end_line, s.parameters, s.return_type, s.is_exported, s.is_async, \
    s.complexity, s.calls, s.code";

impl Store for SqliteStore {
    fn register_subject(&self, name: &str, root_path: &str) -> Result<SubjectRecord, StoreError> {
        let now = now_millis();
        let id: i64 = self.conn.query_row(
            r#"
            INSERT INTO subjects (name, root_path, status, progress, created_at, updated_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?3)
            ON CONFLICT(root_path) DO UPDATE SET
                name = excluded.name,
                is_deleted = 0,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
            params![name, root_path, now],
            |row| row.get(0),
        )?;

        self.get_subject(id)?.ok_or(StoreError::NotFound {
            entity: "subject",
            id,
        })
    }

    fn get_subject(&self, subject_id: i64) -> Result<Option<SubjectRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
                params![subject_id],
                subject_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn find_subject_by_root(&self, root_path: &str) -> Result<Option<SubjectRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE root_path = ?1 AND is_deleted = 0"
                ),
                params![root_path],
                subject_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn update_subject_status(
        &self,
        subject_id: i64,
        status: SubjectStatus,
        progress: Option<u8>,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            r#"
            UPDATE subjects SET
                status = ?2,
                progress = COALESCE(?3, progress),
                status_message = COALESCE(?4, status_message),
                updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                subject_id,
                status.as_str(),
                progress.map(i64::from),
                message,
                now_millis()
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "subject",
                id: subject_id,
            });
        }
        Ok(())
    }

    fn save_subject_stats(
        &self,
        subject_id: i64,
        stats: &SubjectStats,
        analyzed_at: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            UPDATE subjects SET
                total_commits = ?2,
                total_files = ?3,
                total_functions = ?4,
                total_dependencies = ?5,
                languages = ?6,
                last_analyzed_at = ?7,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                subject_id,
                stats.total_commits as i64,
                stats.total_files as i64,
                stats.total_functions as i64,
                stats.total_dependencies as i64,
                serde_json::to_string(&stats.languages)?,
                analyzed_at,
            ],
        )?;
        Ok(())
    }

    fn calculate_stats(&self, subject_id: i64) -> Result<SubjectStats, StoreError> {
        let count = |sql: &str| -> Result<u64, StoreError> {
            let value: i64 = self
                .conn
                .query_row(sql, params![subject_id], |row| row.get(0))?;
            Ok(value.max(0) as u64)
        };

        let total_commits = count("SELECT COUNT(*) FROM commits WHERE subject_id = ?1")?;
        let total_files =
            count("SELECT COUNT(*) FROM files WHERE subject_id = ?1 AND is_deleted = 0")?;
        let total_functions = count("SELECT COUNT(*) FROM symbols WHERE subject_id = ?1")?;
        let total_dependencies =
            count("SELECT COUNT(*) FROM dependency_edges WHERE subject_id = ?1")?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT language
            FROM files
            WHERE subject_id = ?1 AND is_deleted = 0 AND language <> 'unknown'
            ORDER BY language ASC
            "#,
        )?;
        let languages = stmt
            .query_map(params![subject_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SubjectStats {
            total_commits,
            total_files,
            total_functions,
            total_dependencies,
            languages,
        })
    }

    fn upsert_commit(&self, subject_id: i64, commit: &CommitInfo) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO commits (
                subject_id, hash, short_hash, author_name, author_email, timestamp, message,
                files_changed, total_additions, total_deletions, files_changed_count, parent_hashes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(subject_id, hash) DO UPDATE SET
                short_hash = excluded.short_hash,
                author_name = excluded.author_name,
                author_email = excluded.author_email,
                timestamp = excluded.timestamp,
                message = excluded.message,
                files_changed = excluded.files_changed,
                total_additions = excluded.total_additions,
                total_deletions = excluded.total_deletions,
                files_changed_count = excluded.files_changed_count,
                parent_hashes = excluded.parent_hashes
            RETURNING id
            "#,
            params![
                subject_id,
                commit.hash,
                commit.short_hash,
                commit.author_name,
                commit.author_email,
                commit.timestamp,
                commit.message,
                serde_json::to_string(&commit.files_changed)?,
                commit.total_additions,
                commit.total_deletions,
                commit.files_changed_count,
                serde_json::to_string(&commit.parent_hashes)?,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn list_commits(&self, subject_id: i64, limit: usize) -> Result<Vec<CommitRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {COMMIT_COLUMNS}
            FROM commits
            WHERE subject_id = ?1
            ORDER BY timestamp DESC, id ASC
            LIMIT ?2
            "#
        ))?;
        let rows = stmt.query_map(params![subject_id, limit as i64], commit_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search_commits(
        &self,
        subject_id: i64,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<CommitRecord>, StoreError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {COMMIT_COLUMNS}
            FROM commits
            WHERE subject_id = ?1
              AND EXISTS (
                  SELECT 1 FROM json_each(?2) AS term
                  WHERE instr(LOWER(message), LOWER(term.value)) > 0
              )
            ORDER BY timestamp DESC, id ASC
            LIMIT ?3
            "#
        ))?;
        let rows = stmt.query_map(
            params![subject_id, serde_json::to_string(terms)?, limit as i64],
            commit_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn upsert_file(
        &self,
        subject_id: i64,
        file: &SourceFile,
        parsed: &ParsedFile,
        seen_at: i64,
    ) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO files (
                subject_id, path, filename, extension, language, content, size, line_count,
                imports, exports, content_hash, is_deleted, last_seen_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12)
            ON CONFLICT(subject_id, path) DO UPDATE SET
                filename = excluded.filename,
                extension = excluded.extension,
                language = excluded.language,
                content = excluded.content,
                size = excluded.size,
                line_count = excluded.line_count,
                imports = excluded.imports,
                exports = excluded.exports,
                content_hash = excluded.content_hash,
                is_deleted = 0,
                last_seen_at = excluded.last_seen_at
            RETURNING id
            "#,
            params![
                subject_id,
                file.path,
                file.filename,
                file.extension,
                file.language.as_str(),
                file.content,
                file.size as i64,
                file.line_count as i64,
                serde_json::to_string(&parsed.imports)?,
                serde_json::to_string(&parsed.exports)?,
                content_hash(&file.content),
                seen_at,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn mark_unseen_files_deleted(
        &self,
        subject_id: i64,
        seen_at: i64,
    ) -> Result<usize, StoreError> {
        let changed = self.conn.execute(
            r#"
            UPDATE files SET is_deleted = 1
            WHERE subject_id = ?1 AND is_deleted = 0 AND last_seen_at <> ?2
            "#,
            params![subject_id, seen_at],
        )?;
        Ok(changed)
    }

    fn list_files(&self, subject_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files f
            WHERE f.subject_id = ?1 AND f.is_deleted = 0
            ORDER BY f.path ASC
            "#
        ))?;
        let rows = stmt.query_map(params![subject_id], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search_files(
        &self,
        subject_id: i64,
        path_terms: &[String],
        content_terms: &[String],
        limit: usize,
    ) -> Result<Vec<FileRecord>, StoreError> {
        if path_terms.is_empty() && content_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files f
            WHERE f.subject_id = ?1 AND f.is_deleted = 0
              AND (
                  EXISTS (
                      SELECT 1 FROM json_each(?2) AS term
                      WHERE instr(LOWER(f.path), LOWER(term.value)) > 0
                  )
                  OR EXISTS (
                      SELECT 1 FROM json_each(?3) AS term
                      WHERE instr(LOWER(f.content), LOWER(term.value)) > 0
                  )
              )
            ORDER BY f.path ASC
            LIMIT ?4
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                subject_id,
                serde_json::to_string(path_terms)?,
                serde_json::to_string(content_terms)?,
                limit as i64
            ],
            file_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn upsert_symbol(
        &self,
        subject_id: i64,
        file_id: i64,
        symbol: &ParsedSymbol,
        seen_at: i64,
    ) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO symbols (
                subject_id, file_id, name, kind, start_line, end_line, parameters, return_type,
                is_exported, is_async, complexity, calls, code, last_seen_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(file_id, name, start_line) DO UPDATE SET
                kind = excluded.kind,
                end_line = excluded.end_line,
                parameters = excluded.parameters,
                return_type = excluded.return_type,
                is_exported = excluded.is_exported,
                is_async = excluded.is_async,
                complexity = excluded.complexity,
                calls = excluded.calls,
                code = excluded.code,
                last_seen_at = excluded.last_seen_at
            RETURNING id
            "#,
            params![
                subject_id,
                file_id,
                symbol.name,
                symbol.kind.as_str(),
                symbol.start_line as i64,
                symbol.end_line as i64,
                serde_json::to_string(&symbol.parameters)?,
                symbol.return_type,
                symbol.is_exported,
                symbol.is_async,
                symbol.complexity,
                serde_json::to_string(&symbol.calls)?,
                symbol.code,
                seen_at,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn prune_symbols(&self, subject_id: i64, seen_at: i64) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM symbols WHERE subject_id = ?1 AND last_seen_at <> ?2",
            params![subject_id, seen_at],
        )?;
        Ok(removed)
    }

    fn list_symbols(&self, subject_id: i64) -> Result<Vec<SymbolRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {SYMBOL_COLUMNS}
            FROM symbols s
            JOIN files f ON f.id = s.file_id
            WHERE s.subject_id = ?1
            ORDER BY f.path ASC, s.start_line ASC, s.id ASC
            "#
        ))?;
        let rows = stmt.query_map(params![subject_id], symbol_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search_symbols(
        &self,
        subject_id: i64,
        name_terms: &[String],
        code_terms: &[String],
        limit: usize,
    ) -> Result<Vec<SymbolRecord>, StoreError> {
        if name_terms.is_empty() && code_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {SYMBOL_COLUMNS}
            FROM symbols s
            JOIN files f ON f.id = s.file_id
            WHERE s.subject_id = ?1
              AND (
                  EXISTS (
                      SELECT 1 FROM json_each(?2) AS term
                      WHERE instr(LOWER(s.name), LOWER(term.value)) > 0
                  )
                  OR EXISTS (
                      SELECT 1 FROM json_each(?3) AS term
                      WHERE instr(LOWER(s.code), LOWER(term.value)) > 0
                  )
              )
            ORDER BY f.path ASC, s.start_line ASC, s.id ASC
            LIMIT ?4
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                subject_id,
                serde_json::to_string(name_terms)?,
                serde_json::to_string(code_terms)?,
                limit as i64
            ],
            symbol_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn replace_edges(&self, subject_id: i64, edges: &[NewEdge]) -> Result<usize, StoreError> {
        graph_sqlite::replace_edges(&self.conn, subject_id, edges)
    }

    fn list_edges(&self, subject_id: i64) -> Result<Vec<EdgeRecord>, StoreError> {
        graph_sqlite::list_edges(&self.conn, subject_id)
    }

    fn neighborhood_edges(
        &self,
        subject_id: i64,
        file_ids: &[i64],
        symbol_ids: &[i64],
        limit: usize,
    ) -> Result<Vec<EdgeRecord>, StoreError> {
        graph_sqlite::neighborhood_edges(&self.conn, subject_id, file_ids, symbol_ids, limit)
    }

    fn replace_embeddings(
        &self,
        subject_id: i64,
        embeddings: &[NewEmbedding],
    ) -> Result<usize, StoreError> {
        vector::replace_embeddings(&self.conn, subject_id, embeddings)
    }

    fn list_embeddings(&self, subject_id: i64) -> Result<Vec<EmbeddingRecord>, StoreError> {
        vector::list_embeddings(&self.conn, subject_id)
    }

    fn create_question(
        &self,
        subject_id: i64,
        asker: &str,
        text: &str,
    ) -> Result<QuestionRecord, StoreError> {
        questions::create_question(&self.conn, subject_id, asker, text)
    }

    fn update_question_status(
        &self,
        question_id: i64,
        status: QuestionStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        questions::update_question_status(&self.conn, question_id, status, error_message)
    }

    fn save_answer(
        &self,
        question_id: i64,
        answer: &NewAnswer,
    ) -> Result<AnswerRecord, StoreError> {
        questions::save_answer(&self.conn, question_id, answer)
    }

    fn list_history(&self, subject_id: i64, asker: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        questions::list_history(&self.conn, subject_id, asker)
    }
}

pub(crate) fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            root_path TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending',
            progress INTEGER NOT NULL DEFAULT 0,
            status_message TEXT,
            total_commits INTEGER NOT NULL DEFAULT 0,
            total_files INTEGER NOT NULL DEFAULT 0,
            total_functions INTEGER NOT NULL DEFAULT 0,
            total_dependencies INTEGER NOT NULL DEFAULT 0,
            languages TEXT NOT NULL DEFAULT '[]',
            last_analyzed_at INTEGER,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS commits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            hash TEXT NOT NULL,
            short_hash TEXT NOT NULL,
            author_name TEXT NOT NULL,
            author_email TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            message TEXT NOT NULL,
            files_changed TEXT NOT NULL,
            total_additions INTEGER NOT NULL,
            total_deletions INTEGER NOT NULL,
            files_changed_count INTEGER NOT NULL,
            parent_hashes TEXT NOT NULL,
            UNIQUE(subject_id, hash)
        );
        CREATE INDEX IF NOT EXISTS idx_commits_subject_time ON commits(subject_id, timestamp);

        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            filename TEXT NOT NULL,
            extension TEXT NOT NULL,
            language TEXT NOT NULL,
            content TEXT NOT NULL,
            size INTEGER NOT NULL,
            line_count INTEGER NOT NULL,
            imports TEXT NOT NULL,
            exports TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            last_seen_at INTEGER NOT NULL,
            UNIQUE(subject_id, path)
        );

        CREATE TABLE IF NOT EXISTS symbols (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            parameters TEXT NOT NULL,
            return_type TEXT NOT NULL,
            is_exported INTEGER NOT NULL,
            is_async INTEGER NOT NULL,
            complexity INTEGER NOT NULL,
            calls TEXT NOT NULL,
            code TEXT NOT NULL,
            last_seen_at INTEGER NOT NULL,
            UNIQUE(file_id, name, start_line)
        );
        CREATE INDEX IF NOT EXISTS idx_symbols_subject_name ON symbols(subject_id, name);

        CREATE TABLE IF NOT EXISTS dependency_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            source_kind TEXT NOT NULL,
            source_id INTEGER NOT NULL,
            target_kind TEXT NOT NULL,
            target_id INTEGER,
            target_name TEXT NOT NULL,
            edge_kind TEXT NOT NULL,
            is_external INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_edges_subject ON dependency_edges(subject_id);

        CREATE TABLE IF NOT EXISTS embeddings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            entity_name TEXT NOT NULL,
            content TEXT NOT NULL,
            content_kind TEXT NOT NULL,
            dimension INTEGER NOT NULL,
            vector BLOB NOT NULL,
            metadata TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_embeddings_subject ON embeddings(subject_id);

        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            asker TEXT NOT NULL,
            text TEXT NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS answers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL UNIQUE REFERENCES questions(id) ON DELETE CASCADE,
            answer TEXT NOT NULL,
            explanation TEXT NOT NULL,
            sources TEXT NOT NULL,
            context TEXT NOT NULL,
            total_tokens_used INTEGER NOT NULL,
            confidence REAL NOT NULL,
            processing_time_ms INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

pub(crate) fn parse_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.into()))
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<SubjectRecord> {
    let progress: i64 = row.get(4)?;
    let count = |index: usize| -> rusqlite::Result<u64> {
        Ok(row.get::<_, i64>(index)?.max(0) as u64)
    };

    Ok(SubjectRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
        status: parse_column(row, 3)?,
        progress: progress.clamp(0, 100) as u8,
        status_message: row.get(5)?,
        stats: SubjectStats {
            total_commits: count(6)?,
            total_files: count(7)?,
            total_functions: count(8)?,
            total_dependencies: count(9)?,
            languages: json_column(row, 10)?,
        },
        last_analyzed_at: row.get(11)?,
        is_deleted: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<CommitRecord> {
    let files_changed: Vec<FileChange> = json_column(row, 8)?;
    Ok(CommitRecord {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        commit: CommitInfo {
            hash: row.get(2)?,
            short_hash: row.get(3)?,
            author_name: row.get(4)?,
            author_email: row.get(5)?,
            timestamp: row.get(6)?,
            message: row.get(7)?,
            files_changed,
            total_additions: row.get(9)?,
            total_deletions: row.get(10)?,
            files_changed_count: row.get(11)?,
            parent_hashes: json_column(row, 12)?,
        },
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let language: String = row.get(5)?;
    let size: i64 = row.get(7)?;
    let line_count: i64 = row.get(8)?;

    Ok(FileRecord {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        path: row.get(2)?,
        filename: row.get(3)?,
        extension: row.get(4)?,
        language: language.parse().unwrap_or(Language::Unknown),
        content: row.get(6)?,
        size: size.max(0) as u64,
        line_count: line_count.max(0) as usize,
        imports: json_column(row, 9)?,
        exports: json_column(row, 10)?,
        content_hash: row.get(11)?,
        is_deleted: row.get(12)?,
    })
}

fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<SymbolRecord> {
    let kind: SymbolKind = parse_column(row, 5)?;
    let start_line: i64 = row.get(6)?;
    let end_line: i64 = row.get(7)?;
    let parameters: Vec<Parameter> = json_column(row, 8)?;

    Ok(SymbolRecord {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        file_id: row.get(2)?,
        file_path: row.get(3)?,
        symbol: ParsedSymbol {
            name: row.get(4)?,
            kind,
            start_line: start_line.max(0) as usize,
            end_line: end_line.max(0) as usize,
            parameters,
            return_type: row.get(9)?,
            is_exported: row.get(10)?,
            is_async: row.get(11)?,
            complexity: row.get(12)?,
            calls: json_column(row, 13)?,
            code: row.get(14)?,
        },
    })
}
