//! AST segmentation using tree-sitter.
//!
//! Extracts typed definitions (functions, methods, classes, traits, impl
//! blocks, ...) from source files as [`CodeUnit`]s. Collectors are
//! per-language; anything between definitions (imports, statements) is not
//! indexed.

use tree_sitter::{Node, Parser};

use quarry_core::{CodeUnit, QuarryError, Result, UnitKind};

use crate::language::Language;

/// Extract code units from a single source file.
///
/// Languages without a grammar (markdown, SQL, Dockerfile, PowerShell) yield
/// an empty sequence, as does a file the parser cannot produce a tree for.
/// Units appear in source order.
///
/// # Errors
///
/// Returns [`QuarryError::Parse`] if the grammar cannot be loaded into the
/// parser.
///
/// # Examples
///
/// ```
/// use quarry_segment::{segment_file, Language};
/// use quarry_core::UnitKind;
///
/// let units = segment_file(
///     "src/lib.rs",
///     "pub fn hello() { println!(\"hi\"); }",
///     Language::Rust,
/// ).unwrap();
/// assert_eq!(units.len(), 1);
/// assert_eq!(units[0].name, "hello");
/// assert_eq!(units[0].kind, UnitKind::Function);
/// ```
pub fn segment_file(
    relative_path: &str,
    content: &str,
    language: Language,
) -> Result<Vec<CodeUnit>> {
    let Some(grammar) = language.grammar() else {
        return Ok(Vec::new());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| QuarryError::Parse(format!("failed to set language: {e}")))?;

    let Some(tree) = parser.parse(content, None) else {
        return Ok(Vec::new());
    };

    let source = content.as_bytes();
    let mut units = Vec::new();
    let tag = language.tag();
    let root = tree.root_node();

    match language {
        Language::Rust => collect_rust(root, source, relative_path, tag, None, &mut units),
        Language::Python => collect_python(root, source, relative_path, tag, None, &mut units),
        Language::JavaScript | Language::TypeScript => {
            collect_js_ts(root, source, relative_path, tag, None, &mut units)
        }
        Language::Go => collect_go(root, source, relative_path, tag, &mut units),
        Language::Java => collect_java(root, source, relative_path, tag, None, &mut units),
        Language::Kotlin | Language::Android => {
            collect_kotlin(root, source, relative_path, tag, None, &mut units)
        }
        Language::Dart => collect_dart(root, source, relative_path, tag, None, &mut units),
        Language::C | Language::Cpp => {
            collect_c_cpp(root, source, relative_path, tag, None, &mut units)
        }
        Language::CSharp => collect_csharp(root, source, relative_path, tag, None, &mut units),
        Language::Swift => collect_swift(root, source, relative_path, tag, None, &mut units),
        Language::Php => collect_php(root, source, relative_path, tag, None, &mut units),
        Language::Ruby => collect_ruby(root, source, relative_path, tag, None, &mut units),
        Language::Bash => collect_bash(root, source, relative_path, tag, &mut units),
        Language::Markdown | Language::Sql | Language::Dockerfile | Language::PowerShell => {}
    }

    Ok(units)
}

/// Cap `code` for embedding at `max_chunk_size * 4` characters.
///
/// When the window contains a line break, the cut lands on the last one so
/// the truncated text ends with a complete line. Stored units are never
/// truncated; this applies only to the text sent to the embedding backend.
///
/// # Examples
///
/// ```
/// use quarry_segment::truncate_code;
///
/// let code = "line one\nline two\nline three";
/// assert_eq!(truncate_code(code, 1024), code);
/// assert_eq!(truncate_code(code, 3), "line one");
/// ```
pub fn truncate_code(code: &str, max_chunk_size: usize) -> String {
    let max_chars = max_chunk_size * 4;
    if code.chars().count() <= max_chars {
        return code.to_string();
    }
    let window: String = code.chars().take(max_chars).collect();
    match window.rfind('\n') {
        Some(pos) if pos > 0 => window[..pos].to_string(),
        _ => window,
    }
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(&child, source))
        .filter(|text| !text.is_empty())
}

fn find_child_text(node: &Node, kind: &str, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            let text = node_text(&child, source);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn has_child_kind(node: &Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            return true;
        }
    }
    false
}

fn make_unit(
    relative_path: &str,
    node: &Node,
    source: &[u8],
    name: &str,
    kind: UnitKind,
    language: &str,
) -> CodeUnit {
    make_unit_span(relative_path, node, node, source, name, kind, language)
}

/// Build a unit spanning from `start` through `end` (used when a definition's
/// header and body are sibling nodes, as with decorators or Dart bodies).
fn make_unit_span(
    relative_path: &str,
    start: &Node,
    end: &Node,
    source: &[u8],
    name: &str,
    kind: UnitKind,
    language: &str,
) -> CodeUnit {
    let lo = start.start_byte().min(source.len());
    let hi = end.end_byte().min(source.len());
    let code = String::from_utf8_lossy(&source[lo..hi]).to_string();
    CodeUnit::new(
        relative_path,
        language,
        kind,
        name,
        &code,
        start.start_position().row as u32 + 1,
        end.end_position().row as u32 + 1,
    )
}

fn collect_rust(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    impl_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_item" => {
            if let Some(name) = field_text(&node, "name", source) {
                let kind = if impl_name.is_some() {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                let mut unit = make_unit(relative_path, &node, source, &name, kind, language);
                if has_child_kind(&node, "visibility_modifier") {
                    unit = unit.with_metadata("is_pub", "true");
                }
                if let Some(scope) = impl_name {
                    unit = unit.with_metadata("impl", scope);
                }
                units.push(unit);
            }
        }
        "struct_item" => push_named(&node, source, relative_path, language, UnitKind::Struct, units),
        "enum_item" => push_named(&node, source, relative_path, language, UnitKind::Enum, units),
        "trait_item" => push_named(&node, source, relative_path, language, UnitKind::Trait, units),
        "type_item" => {
            push_named(&node, source, relative_path, language, UnitKind::TypeAlias, units)
        }
        "mod_item" => {
            if let Some(name) = field_text(&node, "name", source) {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Module,
                    language,
                ));
            }
            // Fall through: definitions inside the module are collected too.
        }
        "impl_item" => {
            let type_name = field_text(&node, "type", source).unwrap_or_default();
            let name = match field_text(&node, "trait", source) {
                Some(trait_name) => format!("{trait_name} for {type_name}"),
                None => type_name,
            };
            if !name.is_empty() {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Impl,
                    language,
                ));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_rust(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_rust(child, source, relative_path, language, impl_name, units);
    }
}

/// Common case: a definition whose name sits in the `name` field.
fn push_named(
    node: &Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    kind: UnitKind,
    units: &mut Vec<CodeUnit>,
) {
    if let Some(name) = field_text(node, "name", source) {
        units.push(make_unit(relative_path, node, source, &name, kind, language));
    }
}

fn collect_python(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "decorated_definition" => {
            let mut decorators = Vec::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "decorator" {
                    decorators.push(node_text(&child, source));
                }
            }
            let decorators = decorators.join(", ");
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "function_definition" => {
                        if let Some(mut unit) =
                            python_function(&node, &child, source, relative_path, language, class_name)
                        {
                            if !decorators.is_empty() {
                                unit = unit.with_metadata("decorators", decorators.clone());
                            }
                            units.push(unit);
                        }
                    }
                    "class_definition" => {
                        if let Some(name) = field_text(&child, "name", source) {
                            let mut unit = python_class(&node, &child, source, relative_path, language, &name);
                            if !decorators.is_empty() {
                                unit = unit.with_metadata("decorators", decorators.clone());
                            }
                            units.push(unit);
                            let mut inner = child.walk();
                            for grandchild in child.children(&mut inner) {
                                collect_python(
                                    grandchild,
                                    source,
                                    relative_path,
                                    language,
                                    Some(&name),
                                    units,
                                );
                            }
                        }
                    }
                    _ => {}
                }
            }
            return;
        }
        "function_definition" => {
            if let Some(unit) =
                python_function(&node, &node, source, relative_path, language, class_name)
            {
                units.push(unit);
            }
        }
        "class_definition" => {
            if let Some(name) = field_text(&node, "name", source) {
                units.push(python_class(&node, &node, source, relative_path, language, &name));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_python(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_python(child, source, relative_path, language, class_name, units);
    }
}

fn python_function(
    span: &Node,
    def: &Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
) -> Option<CodeUnit> {
    let name = field_text(def, "name", source)?;
    let kind = if class_name.is_some() {
        UnitKind::Method
    } else {
        UnitKind::Function
    };
    let mut unit = make_unit_span(relative_path, span, span, source, &name, kind, language);
    if let Some(args) = field_text(def, "parameters", source) {
        unit = unit.with_metadata("args", args);
    }
    if node_text(def, source).starts_with("async ") {
        unit = unit.with_metadata("is_async", "true");
    }
    if let Some(class) = class_name {
        unit = unit.with_metadata("class", class);
    }
    Some(unit)
}

fn python_class(
    span: &Node,
    def: &Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    name: &str,
) -> CodeUnit {
    let mut unit = make_unit_span(relative_path, span, span, source, name, UnitKind::Class, language);
    if let Some(bases) = field_text(def, "superclasses", source) {
        unit = unit.with_metadata("bases", bases);
    }
    unit
}

fn collect_js_ts(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            push_named(&node, source, relative_path, language, UnitKind::Function, units)
        }
        "class_declaration" => {
            let name = field_text(&node, "name", source);
            if let Some(name) = name {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Class,
                    language,
                ));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_js_ts(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        "method_definition" => {
            if let Some(name) = field_text(&node, "name", source) {
                let mut unit =
                    make_unit(relative_path, &node, source, &name, UnitKind::Method, language);
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "variable_declarator" && has_child_kind(&child, "arrow_function")
                {
                    if let Some(name) = field_text(&child, "name", source) {
                        units.push(make_unit(
                            relative_path,
                            &node,
                            source,
                            &name,
                            UnitKind::ArrowFunction,
                            language,
                        ));
                    }
                }
            }
        }
        "interface_declaration" => {
            push_named(&node, source, relative_path, language, UnitKind::Interface, units)
        }
        "type_alias_declaration" => {
            push_named(&node, source, relative_path, language, UnitKind::TypeAlias, units)
        }
        "enum_declaration" => {
            push_named(&node, source, relative_path, language, UnitKind::Enum, units)
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_js_ts(child, source, relative_path, language, class_name, units);
    }
}

fn collect_go(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_declaration" => {
            push_named(&node, source, relative_path, language, UnitKind::Function, units)
        }
        "method_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let mut unit =
                    make_unit(relative_path, &node, source, &name, UnitKind::Method, language);
                if let Some(receiver) = field_text(&node, "receiver", source) {
                    unit = unit.with_metadata("receiver", receiver);
                }
                units.push(unit);
            }
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                // `type T struct{...}` parses as type_spec, `type T = U` as
                // type_alias.
                let kind = match child.kind() {
                    "type_spec" => {
                        if has_child_kind(&child, "struct_type") {
                            UnitKind::Struct
                        } else if has_child_kind(&child, "interface_type") {
                            UnitKind::Interface
                        } else {
                            UnitKind::TypeAlias
                        }
                    }
                    "type_alias" => UnitKind::TypeAlias,
                    _ => continue,
                };
                if let Some(name) = field_text(&child, "name", source) {
                    units.push(make_unit(relative_path, &child, source, &name, kind, language));
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_go(child, source, relative_path, language, units);
    }
}

fn collect_java(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "class_declaration" | "interface_declaration" | "enum_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let kind = match node.kind() {
                    "interface_declaration" => UnitKind::Interface,
                    "enum_declaration" => UnitKind::Enum,
                    _ => UnitKind::Class,
                };
                units.push(make_unit(relative_path, &node, source, &name, kind, language));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_java(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        "method_declaration" | "constructor_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let mut unit =
                    make_unit(relative_path, &node, source, &name, UnitKind::Method, language);
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        "field_declaration" => {
            if class_name.is_some() {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "variable_declarator" {
                        if let Some(name) = field_text(&child, "name", source) {
                            let mut unit = make_unit(
                                relative_path,
                                &node,
                                source,
                                &name,
                                UnitKind::Field,
                                language,
                            );
                            if let Some(field_type) = field_text(&node, "type", source) {
                                unit = unit.with_metadata("field_type", field_type);
                            }
                            if let Some(class) = class_name {
                                unit = unit.with_metadata("class", class);
                            }
                            units.push(unit);
                        }
                    }
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_java(child, source, relative_path, language, class_name, units);
    }
}

fn collect_kotlin(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                let kind = if class_name.is_some() {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                let mut unit = make_unit(relative_path, &node, source, &name, kind, language);
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        "class_declaration" | "object_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                let header = declaration_header(&node, source);
                let kind = if header.contains("interface ") {
                    UnitKind::Interface
                } else if header.contains("data class ") {
                    UnitKind::DataClass
                } else if header.contains("enum class ") {
                    UnitKind::Enum
                } else {
                    UnitKind::Class
                };
                units.push(make_unit(relative_path, &node, source, &name, kind, language));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_kotlin(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_kotlin(child, source, relative_path, language, class_name, units);
    }
}

/// Kotlin and Swift grammars differ on where the declared name lives, so try
/// the common spots in order.
fn kotlin_name(node: &Node, source: &[u8]) -> Option<String> {
    field_text(node, "name", source)
        .or_else(|| find_child_text(node, "type_identifier", source))
        .or_else(|| find_child_text(node, "simple_identifier", source))
        .or_else(|| find_child_text(node, "identifier", source))
}

/// The declaration text up to the first body brace, whitespace collapsed.
fn declaration_header(node: &Node, source: &[u8]) -> String {
    let text = node_text(node, source);
    let head = match text.find('{') {
        Some(pos) => &text[..pos],
        None => text.as_str(),
    };
    let mut header = head.split_whitespace().collect::<Vec<_>>().join(" ");
    header.push(' ');
    header
}

fn collect_dart(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "class_definition" => {
            if let Some(name) = kotlin_name(&node, source) {
                let superclass = find_child_text(&node, "superclass", source);
                let is_widget = superclass
                    .as_deref()
                    .is_some_and(|s| s.contains("Widget") || s.contains("State<"));
                let kind = if is_widget {
                    UnitKind::Widget
                } else {
                    UnitKind::Class
                };
                let mut unit = make_unit(relative_path, &node, source, &name, kind, language);
                if let Some(superclass) = superclass {
                    unit = unit.with_metadata("extends", superclass);
                }
                units.push(unit);
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_dart(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        "mixin_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Mixin,
                    language,
                ));
            }
        }
        "extension_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Extension,
                    language,
                ));
            }
        }
        "enum_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Enum,
                    language,
                ));
            }
        }
        "function_signature" | "method_signature" => {
            if let Some(name) = kotlin_name(&node, source) {
                let kind = if class_name.is_some() || node.kind() == "method_signature" {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                // Dart bodies are siblings of the signature node.
                let end = node
                    .next_sibling()
                    .filter(|sibling| sibling.kind() == "function_body");
                let mut unit = match end {
                    Some(body) => {
                        make_unit_span(relative_path, &node, &body, source, &name, kind, language)
                    }
                    None => make_unit(relative_path, &node, source, &name, kind, language),
                };
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_dart(child, source, relative_path, language, class_name, units);
    }
}

fn collect_c_cpp(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_definition" => {
            if let Some(name) = c_function_name(&node, source) {
                let kind = if class_name.is_some() {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                let mut unit = make_unit(relative_path, &node, source, &name, kind, language);
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        "struct_specifier" | "class_specifier" | "enum_specifier" => {
            // Forward declarations have no body and are skipped.
            if node.child_by_field_name("body").is_some() {
                if let Some(name) = field_text(&node, "name", source) {
                    let kind = match node.kind() {
                        "class_specifier" => UnitKind::Class,
                        "enum_specifier" => UnitKind::Enum,
                        _ => UnitKind::Struct,
                    };
                    units.push(make_unit(relative_path, &node, source, &name, kind, language));
                    if kind == UnitKind::Class || kind == UnitKind::Struct {
                        let mut cursor = node.walk();
                        for child in node.children(&mut cursor) {
                            collect_c_cpp(child, source, relative_path, language, Some(&name), units);
                        }
                        return;
                    }
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_c_cpp(child, source, relative_path, language, class_name, units);
    }
}

/// Dig the identifier out of a C/C++ declarator chain (pointers, qualified
/// names, parameter lists all wrap it).
fn c_function_name(node: &Node, source: &[u8]) -> Option<String> {
    let mut declarator = node.child_by_field_name("declarator")?;
    loop {
        match declarator.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
            | "operator_name" => {
                let text = node_text(&declarator, source);
                return if text.is_empty() { None } else { Some(text) };
            }
            _ => {
                declarator = declarator
                    .child_by_field_name("declarator")
                    .or_else(|| declarator.named_child(0))?;
            }
        }
    }
}

fn collect_csharp(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "class_declaration" | "interface_declaration" | "struct_declaration"
        | "enum_declaration" | "record_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let kind = match node.kind() {
                    "interface_declaration" => UnitKind::Interface,
                    "struct_declaration" => UnitKind::Struct,
                    "enum_declaration" => UnitKind::Enum,
                    _ => UnitKind::Class,
                };
                units.push(make_unit(relative_path, &node, source, &name, kind, language));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_csharp(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        "method_declaration" | "constructor_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let mut unit =
                    make_unit(relative_path, &node, source, &name, UnitKind::Method, language);
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_csharp(child, source, relative_path, language, class_name, units);
    }
}

fn collect_swift(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    type_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                let kind = if type_name.is_some() {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                let mut unit = make_unit(relative_path, &node, source, &name, kind, language);
                if let Some(scope) = type_name {
                    unit = unit.with_metadata("class", scope);
                }
                units.push(unit);
            }
        }
        "class_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                let header = declaration_header(&node, source);
                let kind = if header.contains("struct ") {
                    UnitKind::Struct
                } else if header.contains("enum ") {
                    UnitKind::Enum
                } else if header.contains("extension ") {
                    UnitKind::Extension
                } else {
                    UnitKind::Class
                };
                units.push(make_unit(relative_path, &node, source, &name, kind, language));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_swift(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        "protocol_declaration" => {
            if let Some(name) = kotlin_name(&node, source) {
                units.push(make_unit(
                    relative_path,
                    &node,
                    source,
                    &name,
                    UnitKind::Interface,
                    language,
                ));
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_swift(child, source, relative_path, language, type_name, units);
    }
}

fn collect_php(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    class_name: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "function_definition" => {
            push_named(&node, source, relative_path, language, UnitKind::Function, units)
        }
        "class_declaration" | "interface_declaration" | "trait_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let kind = match node.kind() {
                    "interface_declaration" => UnitKind::Interface,
                    "trait_declaration" => UnitKind::Trait,
                    _ => UnitKind::Class,
                };
                units.push(make_unit(relative_path, &node, source, &name, kind, language));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_php(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        "method_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let mut unit =
                    make_unit(relative_path, &node, source, &name, UnitKind::Method, language);
                if let Some(class) = class_name {
                    unit = unit.with_metadata("class", class);
                }
                units.push(unit);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_php(child, source, relative_path, language, class_name, units);
    }
}

fn collect_ruby(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    scope: Option<&str>,
    units: &mut Vec<CodeUnit>,
) {
    match node.kind() {
        "method" | "singleton_method" => {
            if let Some(name) = field_text(&node, "name", source) {
                let kind = if scope.is_some() {
                    UnitKind::Method
                } else {
                    UnitKind::Function
                };
                let mut unit = make_unit(relative_path, &node, source, &name, kind, language);
                if let Some(parent) = scope {
                    unit = unit.with_metadata("class", parent);
                }
                units.push(unit);
            }
        }
        "class" | "module" => {
            if let Some(name) = field_text(&node, "name", source) {
                let kind = if node.kind() == "module" {
                    UnitKind::Module
                } else {
                    UnitKind::Class
                };
                units.push(make_unit(relative_path, &node, source, &name, kind, language));
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_ruby(child, source, relative_path, language, Some(&name), units);
                }
                return;
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_ruby(child, source, relative_path, language, scope, units);
    }
}

fn collect_bash(
    node: Node,
    source: &[u8],
    relative_path: &str,
    language: &str,
    units: &mut Vec<CodeUnit>,
) {
    if node.kind() == "function_definition" {
        if let Some(name) = find_child_text(&node, "word", source) {
            units.push(make_unit(
                relative_path,
                &node,
                source,
                &name,
                UnitKind::Function,
                language,
            ));
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_bash(child, source, relative_path, language, units);
    }
}
