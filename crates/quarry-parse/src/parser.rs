use std::path::Path;

use quarry_core::{Language, ParsedFile, SourceFile, normalize_path};
use thiserror::Error;
use tree_sitter::Parser;

use crate::languages::{generic::GenericPatterns, python, typescript};

/// Longest code excerpt stored on a symbol.
pub const EXCERPT_MAX_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load {0} tree-sitter grammar")]
    Grammar(&'static str),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("tree-sitter produced no syntax tree for {0}")]
    NoTree(String),
}

/// How a file is turned into symbols. Chosen once per language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStrategy {
    Syntax,
    LineHeuristic,
    Generic,
}

impl ParserStrategy {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::JavaScript | Language::TypeScript => Self::Syntax,
            Language::Python => Self::LineHeuristic,
            _ => Self::Generic,
        }
    }
}

pub struct SymbolParser {
    typescript: Parser,
    tsx: Parser,
    generic: GenericPatterns,
}

impl SymbolParser {
    pub fn new() -> Result<Self, ParseError> {
        let mut typescript = Parser::new();
        typescript
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|_| ParseError::Grammar("typescript"))?;

        let mut tsx = Parser::new();
        tsx.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
            .map_err(|_| ParseError::Grammar("tsx"))?;

        Ok(Self {
            typescript,
            tsx,
            generic: GenericPatterns::new()?,
        })
    }

    /// Never fails past the file boundary: any error yields an empty result.
    pub fn parse_file(&mut self, file: &SourceFile) -> ParsedFile {
        match self.parse_source(file.language, &file.path, &file.content) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(file_path = %file.path, error = %err, "failed to parse file");
                ParsedFile::default()
            }
        }
    }

    pub fn parse_source(
        &mut self,
        language: Language,
        file_path: &str,
        source: &str,
    ) -> Result<ParsedFile, ParseError> {
        let file_path = normalize_path(file_path);
        match ParserStrategy::for_language(language) {
            ParserStrategy::Syntax => {
                let parser = if uses_plain_typescript_grammar(&file_path) {
                    &mut self.typescript
                } else {
                    &mut self.tsx
                };
                let tree = parser
                    .parse(source, None)
                    .ok_or_else(|| ParseError::NoTree(file_path.clone()))?;
                Ok(typescript::extract(tree.root_node(), source.as_bytes()))
            }
            ParserStrategy::LineHeuristic => Ok(python::extract(source)),
            ParserStrategy::Generic => Ok(self.generic.extract(source)),
        }
    }
}

// `.ts` sources may hold `<T>expr` casts that the TSX grammar rejects.
fn uses_plain_typescript_grammar(file_path: &str) -> bool {
    let extension = Path::new(file_path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    matches!(extension.as_str(), "ts" | "mts" | "cts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_follows_language() {
        assert_eq!(
            ParserStrategy::for_language(Language::JavaScript),
            ParserStrategy::Syntax
        );
        assert_eq!(
            ParserStrategy::for_language(Language::TypeScript),
            ParserStrategy::Syntax
        );
        assert_eq!(
            ParserStrategy::for_language(Language::Python),
            ParserStrategy::LineHeuristic
        );
        assert_eq!(
            ParserStrategy::for_language(Language::Go),
            ParserStrategy::Generic
        );
        assert_eq!(
            ParserStrategy::for_language(Language::Unknown),
            ParserStrategy::Generic
        );
    }

    #[test]
    fn grammar_choice_by_extension() {
        assert!(uses_plain_typescript_grammar("src/a.ts"));
        assert!(!uses_plain_typescript_grammar("src/a.tsx"));
        assert!(!uses_plain_typescript_grammar("src/a.js"));
    }

    #[test]
    fn parse_file_swallows_nothing_for_plain_text() {
        let mut parser = SymbolParser::new().expect("parser");
        let file = SourceFile {
            path: "README.md".to_owned(),
            filename: "README.md".to_owned(),
            extension: "md".to_owned(),
            language: Language::Markdown,
            content: "# Title\n\nSome prose.\n".to_owned(),
            size: 22,
            line_count: 4,
        };
        assert!(parser.parse_file(&file).is_empty());
    }
}
