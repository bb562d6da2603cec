use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

mod git;

pub use git::{DEFAULT_MAX_COMMITS, GitContext, extract_history, parse_diff_summary};

pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    Ruby,
    Php,
    C,
    Cpp,
    CSharp,
    Rust,
    Swift,
    Kotlin,
    Scala,
    Vue,
    Html,
    Css,
    Scss,
    Json,
    Yaml,
    Xml,
    Markdown,
    Sql,
    Shell,
    Unknown,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Go => "go",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Rust => "rust",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::Vue => "vue",
            Self::Html => "html",
            Self::Css => "css",
            Self::Scss => "scss",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Xml => "xml",
            Self::Markdown => "markdown",
            Self::Sql => "sql",
            Self::Shell => "shell",
            Self::Unknown => "unknown",
        }
    }

    /// Static extension table; anything not listed is `Unknown`.
    pub fn from_extension(extension: &str) -> Self {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "py" | "pyi" => Self::Python,
            "java" => Self::Java,
            "go" => Self::Go,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "rs" => Self::Rust,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "scala" => Self::Scala,
            "vue" => Self::Vue,
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "scss" | "sass" => Self::Scss,
            "json" => Self::Json,
            "yml" | "yaml" => Self::Yaml,
            "xml" => Self::Xml,
            "md" | "markdown" => Self::Markdown,
            "sql" => Self::Sql,
            "sh" | "bash" | "zsh" => Self::Shell,
            _ => Self::Unknown,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let language = match value.trim() {
            "javascript" => Self::JavaScript,
            "typescript" => Self::TypeScript,
            "python" => Self::Python,
            "java" => Self::Java,
            "go" => Self::Go,
            "ruby" => Self::Ruby,
            "php" => Self::Php,
            "c" => Self::C,
            "cpp" => Self::Cpp,
            "csharp" => Self::CSharp,
            "rust" => Self::Rust,
            "swift" => Self::Swift,
            "kotlin" => Self::Kotlin,
            "scala" => Self::Scala,
            "vue" => Self::Vue,
            "html" => Self::Html,
            "css" => Self::Css,
            "scss" => Self::Scss,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "xml" => Self::Xml,
            "markdown" => Self::Markdown,
            "sql" => Self::Sql,
            "shell" => Self::Shell,
            "unknown" => Self::Unknown,
            other => return Err(format!("unknown language '{other}'")),
        };
        Ok(language)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Arrow,
    Async,
    Generator,
    Constructor,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Arrow => "arrow",
            Self::Async => "async",
            Self::Generator => "generator",
            Self::Constructor => "constructor",
        }
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "class" => Ok(Self::Class),
            "arrow" => Ok(Self::Arrow),
            "async" => Ok(Self::Async),
            "generator" => Ok(Self::Generator),
            "constructor" => Ok(Self::Constructor),
            other => Err(format!("unknown symbol kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Function,
    Module,
    External,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Function => "function",
            Self::Module => "module",
            Self::External => "external",
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "file" => Ok(Self::File),
            "function" => Ok(Self::Function),
            "module" => Ok(Self::Module),
            "external" => Ok(Self::External),
            other => Err(format!("unknown node kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Import,
    Call,
    Extends,
    Implements,
    Uses,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Call => "call",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::Uses => "uses",
        }
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "import" => Ok(Self::Import),
            "call" => Ok(Self::Call),
            "extends" => Ok(Self::Extends),
            "implements" => Ok(Self::Implements),
            "uses" => Ok(Self::Uses),
            other => Err(format!("unknown edge kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Function,
    Commit,
    CodeChunk,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Function => "function",
            Self::Commit => "commit",
            Self::CodeChunk => "code_chunk",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "file" => Ok(Self::File),
            "function" => Ok(Self::Function),
            "commit" => Ok(Self::Commit),
            "code_chunk" => Ok(Self::CodeChunk),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Code,
    Description,
    CommitMessage,
    Docstring,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Description => "description",
            Self::CommitMessage => "commit_message",
            Self::Docstring => "docstring",
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "code" => Ok(Self::Code),
            "description" => Ok(Self::Description),
            "commit_message" => Ok(Self::CommitMessage),
            "docstring" => Ok(Self::Docstring),
            other => Err(format!("unknown content kind '{other}'")),
        }
    }
}

/// Lifecycle of a tracked working tree. `Ready` and `Error` are terminal for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    #[default]
    Pending,
    Cloning,
    Analyzing,
    Ready,
    Error,
}

impl SubjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Analyzing => "analyzing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, Self::Cloning | Self::Analyzing)
    }
}

impl std::str::FromStr for SubjectStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "cloning" => Ok(Self::Cloning),
            "analyzing" => Ok(Self::Analyzing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown subject status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for QuestionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown question status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    #[default]
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Unknown,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
            Self::TypeChanged => "type_changed",
            Self::Unknown => "unknown",
        }
    }

    /// Maps the status letter of a raw diff line (`M`, `A`, `R100`, ...).
    pub fn from_status(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => Self::Added,
            Some('M') => Self::Modified,
            Some('D') => Self::Deleted,
            Some('R') => Self::Renamed,
            Some('C') => Self::Copied,
            Some('T') => Self::TypeChanged,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub additions: u32,
    pub deletions: u32,
    pub kind: ChangeKind,
}

/// One normalized commit-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub message: String,
    pub files_changed: Vec<FileChange>,
    pub total_additions: u32,
    pub total_deletions: u32,
    pub files_changed_count: u32,
    pub parent_hashes: Vec<String>,
}

/// A text file surviving the tree walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub language: Language,
    pub content: String,
    pub size: u64,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub default_value: Option<String>,
}

impl Parameter {
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: "any".to_owned(),
            default_value: None,
        }
    }
}

/// A function, method, class or constructor unit as produced by a parser strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: usize,
    pub end_line: usize,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    pub is_exported: bool,
    pub is_async: bool,
    pub complexity: u32,
    pub calls: Vec<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedFile {
    pub symbols: Vec<ParsedSymbol>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

impl ParsedFile {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.imports.is_empty() && self.exports.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubjectStats {
    pub total_commits: u64,
    pub total_files: u64,
    pub total_functions: u64,
    pub total_dependencies: u64,
    pub languages: Vec<String>,
}

/// A retrieved excerpt handed to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub content: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSource {
    pub path: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSource {
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSource {
    pub hash: String,
    pub message: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNodeSource {
    pub id: i64,
    pub kind: NodeKind,
    pub name: String,
    pub connections: usize,
}

/// Entities actually retrieved for an answer, not what the model chose to cite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnswerSources {
    pub files: Vec<FileSource>,
    pub functions: Vec<FunctionSource>,
    pub commits: Vec<CommitSource>,
    pub graph_nodes: Vec<GraphNodeSource>,
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Newline-delimited line count; a trailing newline opens one more (empty) line.
pub fn line_count(content: &str) -> usize {
    content.split('\n').count()
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_table_falls_back_to_unknown() {
        assert_eq!(Language::from_extension("js"), Language::JavaScript);
        assert_eq!(Language::from_extension(".TSX"), Language::TypeScript);
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("weird"), Language::Unknown);
        assert_eq!(Language::from_extension(""), Language::Unknown);
    }

    #[test]
    fn enum_strings_round_trip_through_from_str() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Arrow,
            SymbolKind::Async,
            SymbolKind::Generator,
            SymbolKind::Constructor,
        ] {
            assert_eq!(kind.as_str().parse::<SymbolKind>(), Ok(kind));
        }
        assert_eq!("csharp".parse::<Language>(), Ok(Language::CSharp));
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn change_kind_reads_status_letters() {
        assert_eq!(ChangeKind::from_status("M"), ChangeKind::Modified);
        assert_eq!(ChangeKind::from_status("R087"), ChangeKind::Renamed);
        assert_eq!(ChangeKind::from_status("A"), ChangeKind::Added);
        assert_eq!(ChangeKind::from_status(""), ChangeKind::Unknown);
    }

    #[test]
    fn line_count_matches_newline_split() {
        assert_eq!(line_count(""), 1);
        assert_eq!(line_count("a"), 1);
        assert_eq!(line_count("a\nb"), 2);
        assert_eq!(line_count("a\nb\n"), 3);
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn subject_status_busy_states() {
        assert!(SubjectStatus::Analyzing.is_busy());
        assert!(SubjectStatus::Cloning.is_busy());
        assert!(!SubjectStatus::Ready.is_busy());
        assert!(!SubjectStatus::Error.is_busy());
    }
}
