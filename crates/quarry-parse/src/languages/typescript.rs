use quarry_core::{Parameter, ParsedFile, ParsedSymbol, SymbolKind, UNKNOWN_TYPE};
use tree_sitter::Node;

use super::{excerpt, push_unique};

struct Candidate<'tree> {
    /// Span and excerpt source.
    node: Node<'tree>,
    /// Carries parameters, body and the `async` keyword.
    function: Node<'tree>,
    name: String,
    kind: SymbolKind,
}

pub(crate) fn extract(root: Node<'_>, source: &[u8]) -> ParsedFile {
    let mut imports = Vec::new();
    let mut exports = Vec::new();
    let mut candidates = Vec::new();

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => {
                if let Some(specifier) = node
                    .child_by_field_name("source")
                    .map(|source_node| string_value(source_node, source))
                {
                    push_unique(&mut imports, specifier);
                }
            }
            "call_expression" => {
                if let Some(specifier) = dynamic_import_source(node, source) {
                    push_unique(&mut imports, specifier);
                }
            }
            "export_statement" => collect_export_names(node, source, &mut exports),
            "assignment_expression" => {
                if let Some(name) = commonjs_export_name(node, source) {
                    push_unique(&mut exports, name);
                }
            }
            _ => {}
        }

        if let Some(candidate) = function_candidate(node, source) {
            candidates.push(candidate);
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    let symbols = candidates
        .into_iter()
        .map(|candidate| build_symbol(candidate, source, &exports))
        .collect();

    ParsedFile {
        symbols,
        imports,
        exports,
    }
}

fn build_symbol(candidate: Candidate<'_>, source: &[u8], exports: &[String]) -> ParsedSymbol {
    let Candidate {
        node,
        function,
        name,
        kind,
    } = candidate;

    let is_exported = exports.contains(&name) || has_export_ancestor(node);

    ParsedSymbol {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        parameters: parameters(function, source),
        return_type: return_type(function, source),
        is_exported,
        is_async: has_async_keyword(function),
        complexity: 1,
        calls: collect_calls(function, source),
        code: excerpt(&node_text(node, source)),
        name,
        kind,
    }
}

fn function_candidate<'tree>(node: Node<'tree>, source: &[u8]) -> Option<Candidate<'tree>> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            let name = field_text(node, "name", source)?;
            Some(Candidate {
                node,
                function: node,
                name,
                kind: function_kind(node),
            })
        }
        "function_expression" | "function" | "generator_function" => {
            // Values of declarators, pairs and assignments are named by their holder.
            let held = node.parent().is_some_and(|parent| {
                matches!(
                    parent.kind(),
                    "variable_declarator" | "pair" | "assignment_expression"
                )
            });
            if held {
                return None;
            }
            let name = field_text(node, "name", source)?;
            Some(Candidate {
                node,
                function: node,
                name,
                kind: function_kind(node),
            })
        }
        "class_declaration" | "abstract_class_declaration" => {
            let name = field_text(node, "name", source)?;
            Some(Candidate {
                node,
                function: node,
                name,
                kind: SymbolKind::Class,
            })
        }
        "method_definition" => {
            let name = field_text(node, "name", source)?;
            let kind = if name == "constructor" {
                SymbolKind::Constructor
            } else {
                SymbolKind::Method
            };
            Some(Candidate {
                node,
                function: node,
                name,
                kind,
            })
        }
        "variable_declarator" => {
            let name_node = node.child_by_field_name("name")?;
            if name_node.kind() != "identifier" {
                return None;
            }
            let value = node
                .child_by_field_name("value")
                .filter(|value| is_function_value(*value))?;
            Some(Candidate {
                node,
                function: value,
                name: node_text(name_node, source),
                kind: function_kind(value),
            })
        }
        "pair" => {
            let value = node
                .child_by_field_name("value")
                .filter(|value| is_function_value(*value))?;
            let key = node.child_by_field_name("key")?;
            let name = string_value(key, source);
            if name.is_empty() {
                return None;
            }
            Some(Candidate {
                node,
                function: value,
                name,
                kind: SymbolKind::Method,
            })
        }
        "assignment_expression" => {
            let value = node
                .child_by_field_name("right")
                .filter(|value| is_function_value(*value))?;
            let left = node.child_by_field_name("left")?;
            let name = match left.kind() {
                "identifier" => node_text(left, source),
                "member_expression" => field_text(left, "property", source)?,
                _ => return None,
            };
            if name == "exports" {
                return None;
            }
            Some(Candidate {
                node,
                function: value,
                name,
                kind: function_kind(value),
            })
        }
        _ => None,
    }
}

fn is_function_value(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn function_kind(function: Node<'_>) -> SymbolKind {
    match function.kind() {
        "generator_function" | "generator_function_declaration" => SymbolKind::Generator,
        _ if has_async_keyword(function) => SymbolKind::Async,
        "arrow_function" => SymbolKind::Arrow,
        _ => SymbolKind::Function,
    }
}

fn has_async_keyword(function: Node<'_>) -> bool {
    let mut cursor = function.walk();
    let found = function
        .children(&mut cursor)
        .any(|child| child.kind() == "async");
    found
}

fn parameters(function: Node<'_>, source: &[u8]) -> Vec<Parameter> {
    if let Some(single) = function.child_by_field_name("parameter") {
        return vec![Parameter::untyped(node_text(single, source))];
    }
    let Some(list) = function.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut cursor = list.walk();
    let params = list
        .named_children(&mut cursor)
        .filter_map(|param| parameter(param, source))
        .collect();
    params
}

fn parameter(node: Node<'_>, source: &[u8]) -> Option<Parameter> {
    match node.kind() {
        "required_parameter" | "optional_parameter" => {
            let name = field_text(node, "pattern", source)?;
            let type_name = node
                .child_by_field_name("type")
                .map(|annotation| type_annotation_text(annotation, source))
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| "any".to_owned());
            Some(Parameter {
                name,
                type_name,
                default_value: field_text(node, "value", source),
            })
        }
        "assignment_pattern" => {
            let name = field_text(node, "left", source)?;
            Some(Parameter {
                default_value: field_text(node, "right", source),
                ..Parameter::untyped(name)
            })
        }
        "comment" => None,
        _ => Some(Parameter::untyped(node_text(node, source))),
    }
}

fn return_type(function: Node<'_>, source: &[u8]) -> String {
    function
        .child_by_field_name("return_type")
        .map(|annotation| type_annotation_text(annotation, source))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN_TYPE.to_owned())
}

fn type_annotation_text(annotation: Node<'_>, source: &[u8]) -> String {
    node_text(annotation, source)
        .trim_start_matches(':')
        .trim()
        .to_owned()
}

fn collect_calls(function: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut calls = Vec::new();
    let mut stack = vec![function];
    while let Some(node) = stack.pop() {
        if node.kind() == "call_expression"
            && let Some(callee) = node.child_by_field_name("function")
        {
            let name = match callee.kind() {
                "identifier" => Some(node_text(callee, source)),
                "member_expression" => field_text(callee, "property", source),
                _ => None,
            };
            if let Some(name) = name {
                push_unique(&mut calls, name);
            }
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    calls
}

fn dynamic_import_source(call: Node<'_>, source: &[u8]) -> Option<String> {
    let callee = call.child_by_field_name("function")?;
    let is_loader = match callee.kind() {
        "import" => true,
        "identifier" => node_text(callee, source) == "require",
        _ => false,
    };
    if !is_loader {
        return None;
    }

    let arguments = call.child_by_field_name("arguments")?;
    let first = arguments.named_child(0)?;
    if first.kind() != "string" {
        return None;
    }
    let specifier = string_value(first, source);
    (!specifier.is_empty()).then_some(specifier)
}

fn collect_export_names(node: Node<'_>, source: &[u8], exports: &mut Vec<String>) {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();

    if children.iter().any(|child| child.kind() == "default") {
        push_unique(exports, "default".to_owned());
        return;
    }

    if let Some(declaration) = node.child_by_field_name("declaration") {
        match declaration.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut inner = declaration.walk();
                for declarator in declaration.named_children(&mut inner) {
                    if declarator.kind() == "variable_declarator"
                        && let Some(name) = field_text(declarator, "name", source)
                    {
                        push_unique(exports, name);
                    }
                }
            }
            _ => {
                if let Some(name) = field_text(declaration, "name", source) {
                    push_unique(exports, name);
                }
            }
        }
    }

    for clause in children
        .iter()
        .filter(|child| child.kind() == "export_clause")
    {
        let mut inner = clause.walk();
        for specifier in clause.named_children(&mut inner) {
            if specifier.kind() != "export_specifier" {
                continue;
            }
            let exported = field_text(specifier, "alias", source)
                .or_else(|| field_text(specifier, "name", source));
            if let Some(name) = exported {
                push_unique(exports, name);
            }
        }
    }
}

/// `module.exports = ..` exports `default`; `exports.x = ..` and
/// `module.exports.x = ..` export `x`.
fn commonjs_export_name(assignment: Node<'_>, source: &[u8]) -> Option<String> {
    let left = assignment.child_by_field_name("left")?;
    if left.kind() != "member_expression" {
        return None;
    }
    let object = node_text(left.child_by_field_name("object")?, source);
    let property = field_text(left, "property", source)?;

    match (object.as_str(), property.as_str()) {
        ("module", "exports") => Some("default".to_owned()),
        ("exports", _) | ("module.exports", _) => Some(property),
        _ => None,
    }
}

fn has_export_ancestor(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "export_statement" {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn field_text(node: Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    let text = node_text(node.child_by_field_name(field)?, source);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn string_value(node: Node<'_>, source: &[u8]) -> String {
    node_text(node, source)
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_owned()
}

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= end || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).into_owned()
}
