use quarry_core::{ParsedFile, ParsedSymbol, SymbolKind, UNKNOWN_TYPE};
use regex::Regex;

use super::{excerpt, push_unique};

/// Tried in order; the first pattern that matches a line wins.
const FUNCTION_PATTERNS: &[&str] = &[
    // rust
    r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#,
    // go, swift
    r"^\s*(?:(?:public|private|fileprivate|internal|open|static|override)\s+)*func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)",
    // kotlin
    r"^\s*(?:(?:public|private|internal|protected|override|suspend|inline|open)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w<>, ?]+\.)?([A-Za-z_]\w*)",
    // ruby, python-like
    r"^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!]?)",
    // php, javascript-like
    r"^\s*(?:(?:public|private|protected|static|export|async)\s+)*function\s*&?\s*([A-Za-z_$][\w$]*)",
    // java, c#, scala-like methods with modifiers
    r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|override|virtual|async|synchronized|sealed)\s+)+[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*\(",
    // c, c++
    r"^\s*(?:(?:static|inline|extern|virtual|const|unsigned|signed)\s+)*[A-Za-z_][\w:<>]*[\s*&]+([A-Za-z_][\w:]*)\s*\([^;]*$",
];

const IMPORT_PATTERNS: &[&str] = &[
    r#"^\s*import\s+["']([^"']+)["']"#,
    r#"^\s*import\s+.*?\s+from\s+["']([^"']+)["']"#,
    r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#,
    r"^\s*using\s+(?:static\s+)?([\w.]+)\s*;",
    r"^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;?\s*$",
    r"^\s*use\s+([\w:\\]+)",
    r#"\brequire(?:_once|_relative)?\s*\(?\s*["']([^"']+)["']"#,
];

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "else", "catch", "sizeof", "new", "delete", "case",
];

pub(crate) struct GenericPatterns {
    functions: Vec<Regex>,
    imports: Vec<Regex>,
}

impl GenericPatterns {
    pub(crate) fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            functions: compile(FUNCTION_PATTERNS)?,
            imports: compile(IMPORT_PATTERNS)?,
        })
    }

    /// Single-line symbols only: no calls, exports or end-line tracking.
    pub(crate) fn extract(&self, source: &str) -> ParsedFile {
        let mut parsed = ParsedFile::default();

        for (index, line) in source.split('\n').enumerate() {
            if let Some(name) = first_capture(&self.functions, line)
                .filter(|name| !CONTROL_KEYWORDS.contains(&name.as_str()))
            {
                parsed.symbols.push(ParsedSymbol {
                    name,
                    kind: SymbolKind::Function,
                    start_line: index + 1,
                    end_line: index + 1,
                    parameters: Vec::new(),
                    return_type: UNKNOWN_TYPE.to_owned(),
                    is_exported: false,
                    is_async: false,
                    complexity: 1,
                    calls: Vec::new(),
                    code: excerpt(line.trim()),
                });
            }

            if let Some(import) = first_capture(&self.imports, line) {
                push_unique(&mut parsed.imports, import);
            }
        }

        parsed
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|pattern| Regex::new(pattern)).collect()
}

fn first_capture(patterns: &[Regex], line: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> GenericPatterns {
        GenericPatterns::new().expect("patterns compile")
    }

    #[test]
    fn recognizes_declarations_across_language_families() {
        let source = "\
pub async fn load_config(path: &Path) -> Result<()> {
func (s *Server) Serve(addr string) error {
    public static void main(String[] args) {
def greet(name)
fun <T> List<T>.second(): T = this[1]
function render() {
static int add(int a, int b) {
";
        let parsed = patterns().extract(source);
        let names: Vec<&str> = parsed.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["load_config", "Serve", "main", "greet", "second", "render", "add"]
        );
        assert!(parsed.symbols.iter().all(|s| s.start_line == s.end_line));
        assert!(parsed.symbols.iter().all(|s| s.calls.is_empty()));
        assert!(parsed.exports.is_empty());
    }

    #[test]
    fn control_flow_lines_are_not_functions() {
        let parsed = patterns().extract("    if (ready) {\n    while (x) {\n");
        assert!(parsed.symbols.is_empty());
    }

    #[test]
    fn recognizes_import_idioms() {
        let source = "\
#include <stdio.h>
using System.Text;
import java.util.List;
use std::collections::HashMap;
require 'json'
import \"fmt\"
";
        let parsed = patterns().extract(source);
        assert_eq!(
            parsed.imports,
            vec![
                "stdio.h",
                "System.Text",
                "java.util.List",
                "std::collections::HashMap",
                "json",
                "fmt"
            ]
        );
    }
}
