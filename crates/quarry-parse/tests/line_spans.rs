use quarry_core::{Language, ParsedFile, line_count};
use quarry_parse::{ParserStrategy, SymbolParser};

fn parse(language: Language, path: &str, source: &str) -> ParsedFile {
    let mut parser = SymbolParser::new().expect("parser");
    parser
        .parse_source(language, path, source)
        .expect("extraction")
}

/// Every symbol must sit inside the file: `1 <= start <= end <= line_count`.
fn assert_spans_fit(language: Language, path: &str, source: &str) -> ParsedFile {
    let parsed = parse(language, path, source);
    let lines = line_count(source);
    for symbol in &parsed.symbols {
        assert!(
            1 <= symbol.start_line
                && symbol.start_line <= symbol.end_line
                && symbol.end_line <= lines,
            "{path}: {} spans {}..={} in {lines} lines",
            symbol.name,
            symbol.start_line,
            symbol.end_line,
        );
    }
    parsed
}

#[test]
fn syntax_strategy_spans_stay_inside_the_file() {
    assert_eq!(ParserStrategy::for_language(Language::TypeScript), ParserStrategy::Syntax);

    assert!(assert_spans_fit(Language::TypeScript, "empty.ts", "").symbols.is_empty());

    let last_line = assert_spans_fit(
        Language::JavaScript,
        "last.js",
        "const a = 1;\nfunction last() { return a; }",
    );
    assert_eq!(last_line.symbols.len(), 1);
    assert_eq!(last_line.symbols[0].start_line, 2);
    assert_eq!(last_line.symbols[0].end_line, 2);

    let multi = assert_spans_fit(
        Language::TypeScript,
        "multi.ts",
        "export function outer(x: number) {\n  const inner = () => x;\n  return inner();\n}",
    );
    let outer = multi
        .symbols
        .iter()
        .find(|s| s.name == "outer")
        .expect("outer");
    assert_eq!((outer.start_line, outer.end_line), (1, 4));

    assert_spans_fit(Language::JavaScript, "trailing.js", "function a() {}\n\n\n");
}

#[test]
fn line_heuristic_spans_stay_inside_the_file() {
    assert_eq!(ParserStrategy::for_language(Language::Python), ParserStrategy::LineHeuristic);

    assert!(assert_spans_fit(Language::Python, "empty.py", "").symbols.is_empty());

    let last_line = assert_spans_fit(Language::Python, "last.py", "x = 1\ndef last(): return x");
    assert_eq!(last_line.symbols.len(), 1);
    assert_eq!(last_line.symbols[0].start_line, 2);
    assert_eq!(last_line.symbols[0].end_line, 2);

    let trailing_blank = assert_spans_fit(Language::Python, "blank.py", "def f():\n    pass\n\n\n");
    assert_eq!(trailing_blank.symbols[0].end_line, 2);

    let nested = assert_spans_fit(
        Language::Python,
        "nested.py",
        "class A:\n    def m(self):\n        return 1\n    def n(self):\n        return 2",
    );
    let spans: Vec<(&str, usize, usize)> = nested
        .symbols
        .iter()
        .map(|s| (s.name.as_str(), s.start_line, s.end_line))
        .collect();
    assert_eq!(spans, vec![("A", 1, 5), ("m", 2, 3), ("n", 4, 5)]);
}

#[test]
fn generic_spans_stay_inside_the_file() {
    assert_eq!(ParserStrategy::for_language(Language::Rust), ParserStrategy::Generic);

    assert!(assert_spans_fit(Language::Rust, "empty.rs", "").symbols.is_empty());

    let last_line = assert_spans_fit(
        Language::Rust,
        "last.rs",
        "use std::fmt;\n\npub fn last() -> u8 { 1 }",
    );
    assert_eq!(last_line.symbols.len(), 1);
    assert_eq!(last_line.symbols[0].start_line, 3);
    assert_eq!(last_line.symbols[0].end_line, 3);

    assert_spans_fit(
        Language::Go,
        "server.go",
        "package main\n\nfunc (s *Server) Serve(addr string) error {\n\treturn nil\n}\n",
    );
}
