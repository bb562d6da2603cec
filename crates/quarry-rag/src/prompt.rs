use std::fmt::Write as _;

use quarry_core::{GraphNodeSource, NodeKind};

use crate::ranking::RetrievedChunk;

const ANSWER_HEADER: &str = "answer:";
const EXPLANATION_HEADER: &str = "explanation:";
const SOURCES_HEADER: &str = "sources used:";

pub const FALLBACK_ANSWER: &str = "Detailed AI analysis requires a configured completion \
    service. The most relevant files, functions and commits found for this question are \
    listed in the sources.";
pub const FALLBACK_EXPLANATION: &str = "No completion provider is configured. Set \
    [inference] provider in .quarry/config.toml (or export OPENAI_API_KEY) to get generated \
    answers.";
pub const FAILED_COMPLETION_ANSWER: &str = "The completion service could not produce an \
    answer. The retrieved structural matches are listed in the sources.";

/// Sections of a completion reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub answer: String,
    pub explanation: String,
    pub sources_used: String,
}

pub fn build_prompt(
    question: &str,
    chunks: &[RetrievedChunk],
    nodes: &[GraphNodeSource],
) -> String {
    let mut prompt = String::from(
        "You are analyzing a source repository. Answer the question using the context below.\n\n",
    );

    prompt.push_str("CONTEXT:\n");
    if chunks.is_empty() {
        prompt.push_str("(no matching context was found)\n");
    }
    for (index, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "[{}] {} (relevance {:.2})\n{}\n",
            index + 1,
            chunk.source,
            chunk.score,
            chunk.content.trim_end()
        );
    }

    let files = node_names(nodes, NodeKind::File);
    let functions = node_names(nodes, NodeKind::Function);
    if !files.is_empty() || !functions.is_empty() {
        prompt.push_str("\nRELATED CODE STRUCTURE:\n");
        if !files.is_empty() {
            let _ = writeln!(prompt, "Related files: {}", files.join(", "));
        }
        if !functions.is_empty() {
            let _ = writeln!(prompt, "Related functions: {}", functions.join(", "));
        }
    }

    let _ = write!(
        prompt,
        "\nQUESTION: {question}\n\n\
         INSTRUCTIONS:\n\
         - Answer only from the context above and cite the files, functions or commits you rely on.\n\
         - If the context is insufficient to answer, say so explicitly.\n\
         - Reply in exactly this format:\n\
         ANSWER: <direct answer>\n\
         EXPLANATION: <supporting detail>\n\
         SOURCES USED: <sources you cited>\n"
    );
    prompt
}

/// Headers are matched case-insensitively. Without an answer header the whole
/// reply is the answer.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let lowered = reply.to_ascii_lowercase();
    let answer_at = lowered.find(ANSWER_HEADER);
    let explanation_at = lowered.find(EXPLANATION_HEADER);
    let sources_at = lowered.find(SOURCES_HEADER);

    let Some(answer_at) = answer_at else {
        return ParsedReply {
            answer: reply.trim().to_owned(),
            explanation: String::new(),
            sources_used: String::new(),
        };
    };

    let section = |start: usize, header: &str| -> String {
        let body_start = start + header.len();
        let end = [
            answer_at,
            explanation_at.unwrap_or(usize::MAX),
            sources_at.unwrap_or(usize::MAX),
        ]
        .into_iter()
            .filter(|boundary| *boundary > start)
            .min()
            .unwrap_or(reply.len())
            .min(reply.len());
        reply[body_start..end].trim().to_owned()
    };

    ParsedReply {
        answer: section(answer_at, ANSWER_HEADER),
        explanation: explanation_at
            .map(|at| section(at, EXPLANATION_HEADER))
            .unwrap_or_default(),
        sources_used: sources_at
            .map(|at| section(at, SOURCES_HEADER))
            .unwrap_or_default(),
    }
}

fn node_names(nodes: &[GraphNodeSource], kind: NodeKind) -> Vec<&str> {
    nodes
        .iter()
        .filter(|node| node.kind == kind)
        .map(|node| node.name.as_str())
        .collect()
}
