use quarry_core::{QuestionStatus, now_millis};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    AnswerRecord, HistoryEntry, NewAnswer, QuestionRecord, StoreError, json_column, parse_column,
};

pub(crate) fn create_question(
    conn: &Connection,
    subject_id: i64,
    asker: &str,
    text: &str,
) -> Result<QuestionRecord, StoreError> {
    let now = now_millis();
    let id: i64 = conn.query_row(
        r#"
        INSERT INTO questions (subject_id, asker, text, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        RETURNING id
        "#,
        params![subject_id, asker, text, QuestionStatus::Pending.as_str(), now],
        |row| row.get(0),
    )?;

    Ok(QuestionRecord {
        id,
        subject_id,
        asker: asker.to_owned(),
        text: text.to_owned(),
        status: QuestionStatus::Pending,
        error_message: None,
        created_at: now,
    })
}

pub(crate) fn update_question_status(
    conn: &Connection,
    question_id: i64,
    status: QuestionStatus,
    error_message: Option<&str>,
) -> Result<(), StoreError> {
    let updated = conn.execute(
        r#"
        UPDATE questions SET
            status = ?2,
            error_message = COALESCE(?3, error_message),
            updated_at = ?4
        WHERE id = ?1
        "#,
        params![question_id, status.as_str(), error_message, now_millis()],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound {
            entity: "question",
            id: question_id,
        });
    }
    Ok(())
}

/// Answers are write-once; a second save for the same question is refused.
pub(crate) fn save_answer(
    conn: &Connection,
    question_id: i64,
    answer: &NewAnswer,
) -> Result<AnswerRecord, StoreError> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM answers WHERE question_id = ?1",
            params![question_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(StoreError::AlreadyAnswered(question_id));
    }

    let created_at = now_millis();
    let id: i64 = conn.query_row(
        r#"
        INSERT INTO answers (
            question_id, answer, explanation, sources, context, total_tokens_used,
            confidence, processing_time_ms, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
        params![
            question_id,
            answer.answer,
            answer.explanation,
            serde_json::to_string(&answer.sources)?,
            serde_json::to_string(&answer.context)?,
            answer.total_tokens_used,
            f64::from(answer.confidence),
            answer.processing_time_ms as i64,
            created_at,
        ],
        |row| row.get(0),
    )?;

    Ok(AnswerRecord {
        id,
        question_id,
        answer: answer.clone(),
        created_at,
    })
}

pub(crate) fn list_history(
    conn: &Connection,
    subject_id: i64,
    asker: &str,
) -> Result<Vec<HistoryEntry>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, subject_id, asker, text, status, error_message, created_at
        FROM questions
        WHERE subject_id = ?1 AND asker = ?2
        ORDER BY created_at DESC, id DESC
        "#,
    )?;
    let questions = stmt
        .query_map(params![subject_id, asker], question_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut answer_stmt = conn.prepare(
        r#"
        SELECT id, question_id, answer, explanation, sources, context, total_tokens_used,
               confidence, processing_time_ms, created_at
        FROM answers
        WHERE question_id = ?1
        "#,
    )?;

    let mut history = Vec::with_capacity(questions.len());
    for question in questions {
        let answer = answer_stmt
            .query_row(params![question.id], answer_from_row)
            .optional()?;
        history.push(HistoryEntry { question, answer });
    }
    Ok(history)
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<QuestionRecord> {
    Ok(QuestionRecord {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        asker: row.get(2)?,
        text: row.get(3)?,
        status: parse_column(row, 4)?,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<AnswerRecord> {
    let confidence: f64 = row.get(7)?;
    let processing_time_ms: i64 = row.get(8)?;
    Ok(AnswerRecord {
        id: row.get(0)?,
        question_id: row.get(1)?,
        answer: NewAnswer {
            answer: row.get(2)?,
            explanation: row.get(3)?,
            sources: json_column(row, 4)?,
            context: json_column(row, 5)?,
            total_tokens_used: row.get(6)?,
            confidence: confidence as f32,
            processing_time_ms: processing_time_ms.max(0) as u64,
        },
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use quarry_core::{AnswerSources, ContextChunk, FileSource};
    use tempfile::tempdir;

    use crate::{SqliteStore, Store};

    use super::*;

    fn answer(text: &str) -> NewAnswer {
        NewAnswer {
            answer: text.to_owned(),
            explanation: "Based on src/a.js".to_owned(),
            sources: AnswerSources {
                files: vec![FileSource {
                    path: "src/a.js".to_owned(),
                    relevance: 0.5,
                }],
                ..AnswerSources::default()
            },
            context: vec![ContextChunk {
                content: "export function foo() {}".to_owned(),
                source: "file: src/a.js".to_owned(),
                score: 0.5,
            }],
            total_tokens_used: 42,
            confidence: 0.8,
            processing_time_ms: 12,
        }
    }

    #[test]
    fn question_lifecycle_is_persisted() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");

        let question = store
            .create_question(subject.id, "alice", "What does foo do?")
            .expect("create question");
        assert_eq!(question.status, QuestionStatus::Pending);

        store
            .update_question_status(question.id, QuestionStatus::Processing, None)
            .expect("processing");
        store.save_answer(question.id, &answer("It greets.")).expect("answer");
        store
            .update_question_status(question.id, QuestionStatus::Completed, None)
            .expect("answered");

        let history = store.list_history(subject.id, "alice").expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question.status, QuestionStatus::Completed);
        let saved = history[0].answer.as_ref().expect("answer saved");
        assert_eq!(saved.answer.answer, "It greets.");
        assert_eq!(saved.answer.sources.files[0].path, "src/a.js");
        assert!((saved.answer.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn history_is_per_asker_and_newest_first() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");

        let first = store.create_question(subject.id, "alice", "first").expect("first");
        let second = store.create_question(subject.id, "alice", "second").expect("second");
        store.create_question(subject.id, "bob", "other").expect("bob");
        store
            .update_question_status(second.id, QuestionStatus::Error, Some("completion failed"))
            .expect("error");

        let history = store.list_history(subject.id, "alice").expect("history");
        let texts: Vec<&str> = history.iter().map(|h| h.question.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(history[0].question.error_message.as_deref(), Some("completion failed"));
        assert!(history.iter().all(|h| h.answer.is_none()));
        assert_eq!(history[1].question.id, first.id);
    }

    #[test]
    fn second_answer_is_refused_and_first_is_kept() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteStore::open(temp.path()).expect("open store");
        let subject = store.register_subject("demo", "/demo").expect("register");
        let question = store
            .create_question(subject.id, "alice", "What does foo do?")
            .expect("create question");

        let first = store.save_answer(question.id, &answer("It greets.")).expect("first");
        let second = store.save_answer(question.id, &answer("It waves."));
        assert!(matches!(second, Err(StoreError::AlreadyAnswered(id)) if id == question.id));

        let history = store.list_history(subject.id, "alice").expect("history");
        let kept = history[0].answer.as_ref().expect("answer kept");
        assert_eq!(kept.id, first.id);
        assert_eq!(kept.answer.answer, "It greets.");
        assert_eq!(kept.created_at, first.created_at);
    }
}
