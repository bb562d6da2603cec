use std::sync::LazyLock;

use quarry_core::{Parameter, ParsedFile, ParsedSymbol, SymbolKind, UNKNOWN_TYPE};
use regex::Regex;

use super::{excerpt, push_unique};

static CLASS_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)").ok());
static DEF_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(async\s+)?def\s+([A-Za-z_]\w*)\s*\(([^)]*)\)?(?:\s*->\s*([^:]+))?").ok()
});
static CALL_SITE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_]\w*)\s*\(").ok());

const NOT_CALLS: &[&str] = &[
    "if", "elif", "while", "for", "return", "and", "or", "not", "in", "is", "def", "class",
    "lambda", "with", "assert", "yield", "await", "except", "print",
];

struct OpenFunction {
    index: usize,
    indent: usize,
}

struct OpenClass {
    name: String,
    indent: usize,
    index: usize,
}

/// Indentation-tracking scan. A function stays open until a non-blank line
/// returns to column zero without starting a new definition. Comments and
/// decorators count as such lines.
pub(crate) fn extract(source: &str) -> ParsedFile {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut parsed = ParsedFile::default();
    let mut open_function: Option<OpenFunction> = None;
    let mut open_class: Option<OpenClass> = None;
    let mut last_content_line = 0usize;

    for (index, line) in lines.iter().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indent = line.len() - trimmed.len();

        record_imports(trimmed, &mut parsed.imports);

        let class_header = CLASS_HEADER.as_ref().and_then(|re| re.captures(line));
        let def_header = DEF_HEADER.as_ref().and_then(|re| re.captures(line));

        if let Some(captures) = def_header {
            if let Some(open) = open_function.take() {
                close_symbol(&mut parsed, open.index, last_content_line, &lines);
            }
            if indent == 0
                && let Some(class) = open_class.take()
            {
                close_symbol(&mut parsed, class.index, last_content_line, &lines);
            }

            let name = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
            let is_async = captures.get(2).is_some();
            let raw_params = captures.get(4).map(|m| m.as_str()).unwrap_or_default();
            let return_type = captures
                .get(5)
                .map(|m| m.as_str().trim().to_owned())
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| UNKNOWN_TYPE.to_owned());

            let in_class = open_class
                .as_ref()
                .is_some_and(|class| indent > class.indent);
            let kind = match (in_class, name, is_async) {
                (true, "__init__", _) => SymbolKind::Constructor,
                (true, _, _) => SymbolKind::Method,
                (false, _, true) => SymbolKind::Async,
                (false, _, false) => SymbolKind::Function,
            };
            if indent == 0 && !name.starts_with('_') {
                push_unique(&mut parsed.exports, name.to_owned());
            }

            parsed.symbols.push(ParsedSymbol {
                name: name.to_owned(),
                kind,
                start_line: line_number,
                end_line: line_number,
                parameters: parse_parameters(raw_params, in_class),
                return_type,
                is_exported: !name.starts_with('_'),
                is_async,
                complexity: 1,
                calls: Vec::new(),
                code: String::new(),
            });
            open_function = Some(OpenFunction {
                index: parsed.symbols.len() - 1,
                indent,
            });
        } else if let Some(captures) = class_header {
            if let Some(open) = open_function.take() {
                close_symbol(&mut parsed, open.index, last_content_line, &lines);
            }
            if let Some(class) = open_class.take() {
                close_symbol(&mut parsed, class.index, last_content_line, &lines);
            }

            let name = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            if indent == 0 && !name.starts_with('_') {
                push_unique(&mut parsed.exports, name.to_owned());
            }
            parsed.symbols.push(ParsedSymbol {
                name: name.to_owned(),
                kind: SymbolKind::Class,
                start_line: line_number,
                end_line: line_number,
                parameters: Vec::new(),
                return_type: UNKNOWN_TYPE.to_owned(),
                is_exported: !name.starts_with('_'),
                is_async: false,
                complexity: 1,
                calls: Vec::new(),
                code: String::new(),
            });
            open_class = Some(OpenClass {
                name: name.to_owned(),
                indent,
                index: parsed.symbols.len() - 1,
            });
        } else if indent == 0 {
            if let Some(open) = open_function.take() {
                close_symbol(&mut parsed, open.index, last_content_line, &lines);
            }
            if let Some(class) = open_class.take() {
                close_symbol(&mut parsed, class.index, last_content_line, &lines);
            }
        } else if let Some(open) = open_function.as_ref()
            && indent <= open.indent
            && open_class
                .as_ref()
                .is_some_and(|class| class.indent < indent)
        {
            // A dedent back to class-body level ends a method.
            let index = open.index;
            open_function = None;
            close_symbol(&mut parsed, index, last_content_line, &lines);
        }

        last_content_line = line_number;
    }

    if let Some(open) = open_function.take() {
        close_symbol(&mut parsed, open.index, last_content_line, &lines);
    }
    if let Some(class) = open_class.take() {
        tracing::trace!(class = %class.name, "closing class at end of file");
        close_symbol(&mut parsed, class.index, last_content_line, &lines);
    }

    parsed
}

fn close_symbol(parsed: &mut ParsedFile, index: usize, end_line: usize, lines: &[&str]) {
    let Some(symbol) = parsed.symbols.get_mut(index) else {
        return;
    };
    symbol.end_line = end_line.max(symbol.start_line);

    let body = &lines[symbol.start_line - 1..symbol.end_line.min(lines.len())];
    symbol.code = excerpt(&body.join("\n"));
    if symbol.kind != SymbolKind::Class {
        symbol.calls = collect_calls(&body[1..]);
    }
}

fn record_imports(trimmed: &str, imports: &mut Vec<String>) {
    if let Some(rest) = trimmed.strip_prefix("import ") {
        for part in rest.split(',') {
            let module = part.split(" as ").next().unwrap_or_default().trim();
            push_unique(imports, module.to_owned());
        }
    } else if let Some(rest) = trimmed.strip_prefix("from ")
        && let Some((module, _)) = rest.split_once(" import")
    {
        push_unique(imports, module.trim().to_owned());
    }
}

fn parse_parameters(raw: &str, in_class: bool) -> Vec<Parameter> {
    let mut params: Vec<Parameter> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "*" && *part != "/")
        .map(|part| {
            let (head, default_value) = match part.split_once('=') {
                Some((head, value)) => (head.trim(), Some(value.trim().to_owned())),
                None => (part, None),
            };
            let (name, type_name) = match head.split_once(':') {
                Some((name, annotation)) => (name.trim(), annotation.trim()),
                None => (head, "any"),
            };
            Parameter {
                name: name.to_owned(),
                type_name: type_name.to_owned(),
                default_value,
            }
        })
        .collect();

    if in_class
        && params
            .first()
            .is_some_and(|first| first.name == "self" || first.name == "cls")
    {
        params.remove(0);
    }
    params
}

fn collect_calls(body: &[&str]) -> Vec<String> {
    let mut calls = Vec::new();
    let Some(call_site) = CALL_SITE.as_ref() else {
        return calls;
    };
    for line in body {
        let code = line.split('#').next().unwrap_or_default();
        for captures in call_site.captures_iter(code) {
            if let Some(name) = captures.get(1).map(|m| m.as_str())
                && !NOT_CALLS.contains(&name)
            {
                push_unique(&mut calls, name.to_owned());
            }
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_strip_self_and_keep_annotations() {
        let params = parse_parameters("self, name: str, retries: int = 3, *args", true);
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "retries", "*args"]);
        assert_eq!(params[0].type_name, "str");
        assert_eq!(params[1].default_value.as_deref(), Some("3"));
        assert_eq!(params[2].type_name, "any");
    }

    #[test]
    fn self_is_kept_outside_classes() {
        let params = parse_parameters("self", false);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn import_forms_are_recorded() {
        let mut imports = Vec::new();
        record_imports("import os, sys as system", &mut imports);
        record_imports("from .models import User", &mut imports);
        assert_eq!(imports, vec!["os", "sys", ".models"]);
    }
}
