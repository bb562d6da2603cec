use std::time::Instant;

use quarry_core::{ContextChunk, QuestionStatus, SubjectStatus, truncate_chars};
use quarry_infer::InferenceServices;
use quarry_store::{AnswerRecord, HistoryEntry, NewAnswer, QuestionRecord, Store, StoreError};
use serde::Serialize;
use thiserror::Error;

mod keywords;
mod prompt;
mod ranking;
mod search;

pub use keywords::extract_keywords;
pub use prompt::{ParsedReply, build_prompt, parse_reply};
pub use ranking::{
    LEXICAL_FILE_SCORE, LEXICAL_FUNCTION_SCORE, MAX_CHUNKS, RetrievedChunk, build_sources,
    merge_chunks,
};
pub use search::{RetrievedContext, VectorHit, rank_embeddings, retrieve_context};

pub const LIVE_CONFIDENCE: f32 = 0.8;
pub const UNCONFIGURED_CONFIDENCE: f32 = 0.5;
pub const FAILED_COMPLETION_CONFIDENCE: f32 = 0.3;
/// Stored context excerpts are cut to this many characters.
pub const CONTEXT_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("subject {0} not found")]
    SubjectNotFound(i64),
    #[error("subject {subject_id} is not ready (status: {})", status.as_str())]
    SubjectNotReady {
        subject_id: i64,
        status: SubjectStatus,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskOutcome {
    pub question: QuestionRecord,
    pub answer: AnswerRecord,
}

pub struct RetrievalEngine<'a, S: Store + ?Sized> {
    store: &'a S,
    services: &'a InferenceServices,
}

impl<'a, S: Store + ?Sized> RetrievalEngine<'a, S> {
    pub fn new(store: &'a S, services: &'a InferenceServices) -> Self {
        Self { store, services }
    }

    /// Answers a question about a `ready` subject and persists the question
    /// with its answer. Completion failures degrade to a fallback answer; store
    /// failures mark the question `error` and propagate.
    pub async fn ask(
        &self,
        subject_id: i64,
        question: &str,
        asker: &str,
    ) -> Result<AskOutcome, RetrievalError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "question must not be empty".to_owned(),
            ));
        }

        let subject = self
            .store
            .get_subject(subject_id)?
            .ok_or(RetrievalError::SubjectNotFound(subject_id))?;
        if subject.status != SubjectStatus::Ready {
            return Err(RetrievalError::SubjectNotReady {
                subject_id,
                status: subject.status,
            });
        }

        let mut record = self.store.create_question(subject_id, asker, question)?;
        self.store
            .update_question_status(record.id, QuestionStatus::Processing, None)?;

        match self.answer_question(subject_id, question).await {
            Ok(answer) => {
                let saved = self.store.save_answer(record.id, &answer)?;
                self.store
                    .update_question_status(record.id, QuestionStatus::Completed, None)?;
                record.status = QuestionStatus::Completed;
                tracing::info!(
                    subject_id,
                    question_id = record.id,
                    confidence = saved.answer.confidence,
                    "answered question"
                );
                Ok(AskOutcome {
                    question: record,
                    answer: saved,
                })
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(status_err) = self.store.update_question_status(
                    record.id,
                    QuestionStatus::Error,
                    Some(&message),
                ) {
                    tracing::warn!(
                        question_id = record.id,
                        error = %status_err,
                        "failed to record question error"
                    );
                }
                Err(err)
            }
        }
    }

    pub fn history(
        &self,
        subject_id: i64,
        asker: &str,
    ) -> Result<Vec<HistoryEntry>, RetrievalError> {
        Ok(self.store.list_history(subject_id, asker)?)
    }

    async fn answer_question(
        &self,
        subject_id: i64,
        question: &str,
    ) -> Result<NewAnswer, RetrievalError> {
        let started = Instant::now();
        let context = retrieve_context(self.store, self.services, subject_id, question).await?;
        let chunks = merge_chunks(&context);
        let sources = build_sources(&context);
        let prompt = build_prompt(question, &chunks, &sources.graph_nodes);

        let (answer, explanation, total_tokens_used, confidence) =
            match self.services.complete(&prompt).await {
                Ok(Some(completion)) => {
                    let reply = parse_reply(&completion.text);
                    (reply.answer, reply.explanation, completion.total_tokens, LIVE_CONFIDENCE)
                }
                Ok(None) => (
                    prompt::FALLBACK_ANSWER.to_owned(),
                    prompt::FALLBACK_EXPLANATION.to_owned(),
                    0,
                    UNCONFIGURED_CONFIDENCE,
                ),
                Err(err) => {
                    tracing::warn!(
                        subject_id,
                        provider = %self.services.completion_provider_name(),
                        error = %err,
                        "completion failed, using fallback answer"
                    );
                    (
                        prompt::FAILED_COMPLETION_ANSWER.to_owned(),
                        format!("Completion error: {err}"),
                        0,
                        FAILED_COMPLETION_CONFIDENCE,
                    )
                }
            };

        let context = chunks
            .iter()
            .map(|chunk| ContextChunk {
                content: truncate_chars(&chunk.content, CONTEXT_EXCERPT_CHARS).to_owned(),
                source: chunk.source.clone(),
                score: chunk.score,
            })
            .collect();

        Ok(NewAnswer {
            answer,
            explanation,
            sources,
            context,
            total_tokens_used,
            confidence,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
