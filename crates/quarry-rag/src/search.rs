use std::cmp::Ordering;

use quarry_infer::{InferenceServices, cosine_similarity};
use quarry_store::{
    CommitRecord, EdgeRecord, EmbeddingRecord, FileRecord, Store, StoreError, SymbolRecord,
};

use crate::keywords::extract_keywords;

pub const VECTOR_TOP_K: usize = 10;
pub const FILE_LIMIT: usize = 5;
pub const SYMBOL_LIMIT: usize = 10;
pub const COMMIT_LIMIT: usize = 5;
pub const EDGE_LIMIT: usize = 50;

// Content and code matching only use the leading keywords; names and paths use all.
const CONTENT_KEYWORDS: usize = 3;
const COMMIT_KEYWORDS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub record: EmbeddingRecord,
    pub score: f32,
}

/// Everything the engine pulled for one question before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub keywords: Vec<String>,
    pub vector_hits: Vec<VectorHit>,
    pub files: Vec<FileRecord>,
    pub symbols: Vec<SymbolRecord>,
    pub commits: Vec<CommitRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// Highest cosine similarity first. Equal scores keep storage order.
pub fn rank_embeddings(
    query: &[f32],
    records: Vec<EmbeddingRecord>,
    top_k: usize,
) -> Vec<VectorHit> {
    let mut hits: Vec<VectorHit> = records
        .into_iter()
        .map(|record| VectorHit {
            score: cosine_similarity(query, &record.embedding.vector),
            record,
        })
        .collect();
    hits.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
    });
    hits.truncate(top_k);
    hits
}

pub async fn retrieve_context<S: Store + ?Sized>(
    store: &S,
    services: &InferenceServices,
    subject_id: i64,
    question: &str,
) -> Result<RetrievedContext, StoreError> {
    let query_vector = services.embed(question).await;
    let embeddings = store.list_embeddings(subject_id)?;
    let candidate_count = embeddings.len();
    let vector_hits = rank_embeddings(&query_vector, embeddings, VECTOR_TOP_K);

    let keywords = extract_keywords(question);
    let content_terms = leading(&keywords, CONTENT_KEYWORDS);
    let commit_terms = leading(&keywords, COMMIT_KEYWORDS);

    let files = store.search_files(subject_id, &keywords, content_terms, FILE_LIMIT)?;
    let symbols = store.search_symbols(subject_id, &keywords, content_terms, SYMBOL_LIMIT)?;
    let commits = store.search_commits(subject_id, commit_terms, COMMIT_LIMIT)?;

    let file_ids: Vec<i64> = files.iter().map(|file| file.id).collect();
    let symbol_ids: Vec<i64> = symbols.iter().map(|symbol| symbol.id).collect();
    let edges = store.neighborhood_edges(subject_id, &file_ids, &symbol_ids, EDGE_LIMIT)?;

    tracing::debug!(
        subject_id,
        candidates = candidate_count,
        vector_hits = vector_hits.len(),
        keywords = keywords.len(),
        files = files.len(),
        symbols = symbols.len(),
        commits = commits.len(),
        edges = edges.len(),
        "retrieved question context"
    );

    Ok(RetrievedContext {
        keywords,
        vector_hits,
        files,
        symbols,
        commits,
        edges,
    })
}

fn leading(keywords: &[String], count: usize) -> &[String] {
    &keywords[..keywords.len().min(count)]
}
