use std::collections::HashMap;

use quarry_core::{
    AnswerSources, CommitSource, EntityKind, FileSource, FunctionSource, GraphNodeSource, NodeKind,
    truncate_chars,
};
use serde_json::Value;

use crate::search::{RetrievedContext, VectorHit};

pub const MAX_CHUNKS: usize = 15;
pub const LEXICAL_FILE_SCORE: f32 = 0.5;
pub const LEXICAL_FUNCTION_SCORE: f32 = 0.6;
pub const LEXICAL_COMMIT_SCORE: f32 = 0.5;
pub const GRAPH_NODE_LIMIT: usize = 10;
const LEXICAL_FILE_EXCERPT_CHARS: usize = 1500;

/// One labeled excerpt in prompt order.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub kind: EntityKind,
    pub name: String,
    pub source: String,
    pub content: String,
    pub score: f32,
}

/// Vector hits first, then lexical files not already present by path, then
/// lexical functions not already present by name and file.
pub fn merge_chunks(context: &RetrievedContext) -> Vec<RetrievedChunk> {
    let mut chunks: Vec<RetrievedChunk> = context
        .vector_hits
        .iter()
        .map(|hit| RetrievedChunk {
            kind: hit.record.embedding.entity_kind,
            name: hit.record.embedding.entity_name.clone(),
            source: format!(
                "{}: {}",
                hit.record.embedding.entity_kind.as_str(),
                hit.record.embedding.entity_name
            ),
            content: hit.record.embedding.content.clone(),
            score: hit.score,
        })
        .collect();

    for file in &context.files {
        if chunks.iter().any(|chunk| chunk.source.contains(&file.path)) {
            continue;
        }
        chunks.push(RetrievedChunk {
            kind: EntityKind::File,
            name: file.path.clone(),
            source: format!("file: {}", file.path),
            content: truncate_chars(&file.content, LEXICAL_FILE_EXCERPT_CHARS).to_owned(),
            score: LEXICAL_FILE_SCORE,
        });
    }

    for symbol in &context.symbols {
        let source = format!("function: {} ({})", symbol.symbol.name, symbol.file_path);
        let present = chunks.iter().any(|chunk| {
            chunk.source == source
                || (chunk.kind == EntityKind::Function && chunk.name == symbol.symbol.name)
        });
        if present {
            continue;
        }
        chunks.push(RetrievedChunk {
            kind: EntityKind::Function,
            name: symbol.symbol.name.clone(),
            source,
            content: symbol.symbol.code.clone(),
            score: LEXICAL_FUNCTION_SCORE,
        });
    }

    chunks.truncate(MAX_CHUNKS);
    chunks
}

/// Sources come from what retrieval found, independent of the model's reply.
pub fn build_sources(context: &RetrievedContext) -> AnswerSources {
    let mut sources = AnswerSources::default();

    for hit in &context.vector_hits {
        let embedding = &hit.record.embedding;
        match embedding.entity_kind {
            EntityKind::File => push_file(
                &mut sources.files,
                metadata_str(&embedding.metadata, "path").unwrap_or(&embedding.entity_name),
                hit.score,
            ),
            EntityKind::Function => push_function(&mut sources.functions, function_from_hit(hit)),
            EntityKind::Commit => push_commit(
                &mut sources.commits,
                CommitSource {
                    hash: metadata_str(&embedding.metadata, "hash")
                        .unwrap_or(&embedding.entity_id)
                        .to_owned(),
                    message: metadata_str(&embedding.metadata, "message")
                        .unwrap_or(&embedding.content)
                        .to_owned(),
                    relevance: hit.score,
                },
            ),
            EntityKind::CodeChunk => {}
        }
    }

    for file in &context.files {
        push_file(&mut sources.files, &file.path, LEXICAL_FILE_SCORE);
    }
    for symbol in &context.symbols {
        push_function(
            &mut sources.functions,
            FunctionSource {
                name: symbol.symbol.name.clone(),
                file_path: symbol.file_path.clone(),
                start_line: symbol.symbol.start_line,
                end_line: symbol.symbol.end_line,
                relevance: LEXICAL_FUNCTION_SCORE,
            },
        );
    }
    for commit in &context.commits {
        push_commit(
            &mut sources.commits,
            CommitSource {
                hash: commit.commit.hash.clone(),
                message: first_line(&commit.commit.message).to_owned(),
                relevance: LEXICAL_COMMIT_SCORE,
            },
        );
    }

    sources.graph_nodes = graph_nodes(context);
    sources
}

/// Nodes touched by the expanded edge set, most connected first. External
/// targets have no identity and are left out.
pub fn graph_nodes(context: &RetrievedContext) -> Vec<GraphNodeSource> {
    let mut names: HashMap<(NodeKind, i64), String> = HashMap::new();
    for file in &context.files {
        names.insert((NodeKind::File, file.id), file.path.clone());
    }
    for symbol in &context.symbols {
        names.insert((NodeKind::Function, symbol.id), symbol.symbol.name.clone());
    }

    let mut counts: HashMap<(NodeKind, i64), usize> = HashMap::new();
    for record in &context.edges {
        let edge = &record.edge;
        *counts.entry((edge.source_kind, edge.source_id)).or_default() += 1;
        if let Some(target_id) = edge.target_id
            && edge.target_kind != NodeKind::External
        {
            let key = (edge.target_kind, target_id);
            *counts.entry(key).or_default() += 1;
            names
                .entry(key)
                .or_insert_with(|| edge.target_name.clone());
        }
    }

    let mut nodes: Vec<GraphNodeSource> = counts
        .into_iter()
        .map(|((kind, id), connections)| GraphNodeSource {
            id,
            kind,
            name: names
                .get(&(kind, id))
                .cloned()
                .unwrap_or_else(|| format!("{}#{id}", kind.as_str())),
            connections,
        })
        .collect();
    nodes.sort_by(|left, right| {
        right
            .connections
            .cmp(&left.connections)
            .then(left.kind.cmp(&right.kind))
            .then(left.id.cmp(&right.id))
    });
    nodes.truncate(GRAPH_NODE_LIMIT);
    nodes
}

fn function_from_hit(hit: &VectorHit) -> FunctionSource {
    let embedding = &hit.record.embedding;
    FunctionSource {
        name: embedding.entity_name.clone(),
        file_path: metadata_str(&embedding.metadata, "file_path")
            .unwrap_or_default()
            .to_owned(),
        start_line: metadata_usize(&embedding.metadata, "start_line"),
        end_line: metadata_usize(&embedding.metadata, "end_line"),
        relevance: hit.score,
    }
}

fn push_file(files: &mut Vec<FileSource>, path: &str, relevance: f32) {
    if files.iter().any(|file| file.path == path) {
        return;
    }
    files.push(FileSource {
        path: path.to_owned(),
        relevance,
    });
}

fn push_function(functions: &mut Vec<FunctionSource>, candidate: FunctionSource) {
    let duplicate = functions.iter().any(|function| {
        function.name == candidate.name
            && function.file_path == candidate.file_path
            && function.start_line == candidate.start_line
    });
    if !duplicate {
        functions.push(candidate);
    }
}

fn push_commit(commits: &mut Vec<CommitSource>, candidate: CommitSource) {
    if !commits.iter().any(|commit| commit.hash == candidate.hash) {
        commits.push(candidate);
    }
}

fn metadata_str<'a>(metadata: &'a Value, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

fn metadata_usize(metadata: &Value, key: &str) -> usize {
    metadata
        .get(key)
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .unwrap_or_default()
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
