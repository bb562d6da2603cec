use std::collections::HashMap;

use quarry_core::{EdgeKind, NodeKind, normalize_path};
use quarry_store::{FileRecord, NewEdge, SymbolRecord};

/// Tried in order after the bare specifier; first existing path wins.
pub const IMPORT_SUFFIXES: &[&str] = &["", ".js", ".ts", ".jsx", ".tsx", "/index.js", "/index.ts"];

/// Resolves an import specifier to a file id. Relative specifiers are joined
/// with the importer's directory and tried only there; bare specifiers are
/// tried from the root.
pub fn resolve_import(
    specifier: &str,
    importer_path: &str,
    paths: &HashMap<&str, i64>,
) -> Option<i64> {
    let specifier = normalize_path(specifier.trim());
    if specifier.is_empty() {
        return None;
    }

    if specifier.starts_with('.') {
        let directory = importer_path
            .rsplit_once('/')
            .map(|(directory, _)| directory)
            .unwrap_or("");
        return join_relative(directory, &specifier).and_then(|joined| lookup(&joined, paths));
    }

    lookup(&specifier, paths)
}

/// Rebuilds the full edge set: one `import` edge per recorded import string
/// and one `call` edge per recorded call name.
pub fn build_edges(files: &[FileRecord], symbols: &[SymbolRecord]) -> Vec<NewEdge> {
    let paths: HashMap<&str, i64> = files
        .iter()
        .map(|file| (file.path.as_str(), file.id))
        .collect();

    let mut edges = Vec::new();
    for file in files {
        for import in &file.imports {
            let target_id = resolve_import(import, &file.path, &paths);
            edges.push(NewEdge {
                source_kind: NodeKind::File,
                source_id: file.id,
                target_kind: if target_id.is_some() {
                    NodeKind::File
                } else {
                    NodeKind::External
                },
                target_id,
                target_name: import.clone(),
                kind: EdgeKind::Import,
                is_external: target_id.is_none(),
            });
        }
    }

    // First symbol wins for duplicate names; `symbols` is ordered by path, then line.
    let mut names: HashMap<&str, i64> = HashMap::new();
    for symbol in symbols {
        names.entry(symbol.symbol.name.as_str()).or_insert(symbol.id);
    }

    for symbol in symbols {
        for call in &symbol.symbol.calls {
            let target_id = names.get(call.as_str()).copied();
            edges.push(NewEdge {
                source_kind: NodeKind::Function,
                source_id: symbol.id,
                target_kind: if target_id.is_some() {
                    NodeKind::Function
                } else {
                    NodeKind::External
                },
                target_id,
                target_name: call.clone(),
                kind: EdgeKind::Call,
                is_external: target_id.is_none(),
            });
        }
    }

    edges
}

fn lookup(base: &str, paths: &HashMap<&str, i64>) -> Option<i64> {
    IMPORT_SUFFIXES
        .iter()
        .find_map(|suffix| paths.get(format!("{base}{suffix}").as_str()).copied())
}

/// `None` when the specifier climbs above the working-tree root.
fn join_relative(directory: &str, specifier: &str) -> Option<String> {
    let mut segments: Vec<&str> = directory
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use quarry_core::{Language, ParsedSymbol, SymbolKind};

    use super::*;

    fn file(id: i64, path: &str, imports: &[&str]) -> FileRecord {
        FileRecord {
            id,
            subject_id: 1,
            path: path.to_owned(),
            filename: path.rsplit('/').next().unwrap_or(path).to_owned(),
            extension: "js".to_owned(),
            language: Language::JavaScript,
            content: String::new(),
            size: 0,
            line_count: 1,
            imports: imports.iter().map(|import| (*import).to_owned()).collect(),
            exports: Vec::new(),
            content_hash: String::new(),
            is_deleted: false,
        }
    }

    fn symbol(id: i64, path: &str, name: &str, calls: &[&str]) -> SymbolRecord {
        SymbolRecord {
            id,
            subject_id: 1,
            file_id: 1,
            file_path: path.to_owned(),
            symbol: ParsedSymbol {
                name: name.to_owned(),
                kind: SymbolKind::Function,
                start_line: 1,
                end_line: 2,
                parameters: Vec::new(),
                return_type: "unknown".to_owned(),
                is_exported: false,
                is_async: false,
                complexity: 1,
                calls: calls.iter().map(|call| (*call).to_owned()).collect(),
                code: String::new(),
            },
        }
    }

    fn path_set() -> HashMap<&'static str, i64> {
        HashMap::from([
            ("src/app.js", 1),
            ("src/utils.js", 2),
            ("src/lib/index.ts", 3),
            ("shared/config.ts", 4),
        ])
    }

    #[test]
    fn relative_imports_try_extensions_and_index_files() {
        let paths = path_set();
        assert_eq!(resolve_import("./utils", "src/app.js", &paths), Some(2));
        assert_eq!(resolve_import("./utils.js", "src/app.js", &paths), Some(2));
        assert_eq!(resolve_import("./lib", "src/app.js", &paths), Some(3));
        assert_eq!(resolve_import("../shared/config", "src/app.js", &paths), Some(4));
        assert_eq!(resolve_import("../../escape", "src/app.js", &paths), None);
    }

    #[test]
    fn relative_import_does_not_fall_back_to_root() {
        let paths = HashMap::from([("src/app.js", 1), ("utils.js", 9)]);
        assert_eq!(resolve_import("./utils", "src/app.js", &paths), None);
        assert_eq!(resolve_import("../utils", "src/app.js", &paths), Some(9));
        assert_eq!(resolve_import("utils", "src/app.js", &paths), Some(9));
    }

    #[test]
    fn bare_specifiers_resolve_from_the_root_or_stay_external() {
        let paths = path_set();
        assert_eq!(resolve_import("shared/config", "src/app.js", &paths), Some(4));
        assert_eq!(resolve_import("react", "src/app.js", &paths), None);
        assert_eq!(resolve_import("  ", "src/app.js", &paths), None);
    }

    #[test]
    fn import_edges_mark_unresolved_targets_external() {
        let files = vec![
            file(1, "src/app.js", &["./utils", "react"]),
            file(2, "src/utils.js", &[]),
        ];
        let edges = build_edges(&files, &[]);

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].target_kind, NodeKind::File);
        assert_eq!(edges[0].target_id, Some(2));
        assert!(!edges[0].is_external);
        assert_eq!(edges[1].target_kind, NodeKind::External);
        assert_eq!(edges[1].target_id, None);
        assert_eq!(edges[1].target_name, "react");
        assert!(edges[1].is_external);
        assert!(edges.iter().all(|edge| edge.kind == EdgeKind::Import));
    }

    #[test]
    fn call_edges_join_on_first_symbol_with_the_name() {
        let symbols = vec![
            symbol(10, "a.js", "main", &["helper", "console.log"]),
            symbol(11, "a.js", "helper", &[]),
            symbol(12, "b.js", "helper", &[]),
        ];
        let edges = build_edges(&[], &symbols);

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].source_id, 10);
        assert_eq!(edges[0].target_id, Some(11));
        assert_eq!(edges[0].target_kind, NodeKind::Function);
        assert_eq!(edges[1].target_id, None);
        assert_eq!(edges[1].target_name, "console.log");
        assert!(edges.iter().all(|edge| edge.kind == EdgeKind::Call));
    }
}
