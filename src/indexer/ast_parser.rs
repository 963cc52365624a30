use crate::types::SemanticRole;
use crate::error::ChunkingError;
use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::{Language, Node, Parser};

static ASYNC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\basync\b").unwrap());
static STATIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bstatic\b|@staticmethod|@classmethod|\bdef self\.").unwrap());
static PY_ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@\w+(\.\w+)*\.(route|get|post|put|patch|delete)\(\s*["']/"#).unwrap()
});

const ROUTE_METHODS: &[&str] = &[
    "get", "post", "put", "patch", "delete", "del", "options", "head", "all", "use", "route",
];

/// A semantic unit found in the syntax tree
#[derive(Debug, Clone)]
pub struct AstUnit {
    pub kind: String,
    pub role: SemanticRole,
    pub name: String,
    /// Enclosing class or interface, when there is one
    pub parent_name: Option<String>,
    /// 1-based, inclusive; extended upward over attached doc comments and attributes
    pub start_line: usize,
    pub end_line: usize,
    pub is_async: bool,
    pub is_static: bool,
    /// Units nested inside a class, impl, module or namespace
    pub members: Vec<AstUnit>,
}

/// Node kinds that matter for one grammar
struct NodeKinds {
    functions: &'static [&'static str],
    containers: &'static [(&'static str, SemanticRole)],
    types: &'static [&'static str],
    /// Nodes that wrap a single definition (decorators, templates, exports)
    wrappers: &'static [&'static str],
}

const NO_KINDS: NodeKinds = NodeKinds {
    functions: &[],
    containers: &[],
    types: &[],
    wrappers: &[],
};

fn node_kinds(language: &str) -> NodeKinds {
    use SemanticRole::*;
    match language {
        "Rust" => NodeKinds {
            functions: &["function_item", "macro_definition"],
            containers: &[
                ("impl_item", Class),
                ("trait_item", Interface),
                ("mod_item", Module),
            ],
            types: &["struct_item", "enum_item", "union_item", "type_item"],
            wrappers: &[],
        },
        "Python" => NodeKinds {
            functions: &["function_definition"],
            containers: &[("class_definition", Class)],
            types: &[],
            wrappers: &["decorated_definition"],
        },
        "JavaScript" | "TypeScript" => NodeKinds {
            functions: &[
                "function_declaration",
                "generator_function_declaration",
                "method_definition",
            ],
            containers: &[
                ("class_declaration", Class),
                ("abstract_class_declaration", Class),
            ],
            types: &[
                "interface_declaration",
                "type_alias_declaration",
                "enum_declaration",
            ],
            wrappers: &["export_statement"],
        },
        "Go" => NodeKinds {
            functions: &["function_declaration", "method_declaration"],
            containers: &[],
            types: &["type_declaration"],
            wrappers: &[],
        },
        "Java" => NodeKinds {
            functions: &["method_declaration", "constructor_declaration"],
            containers: &[
                ("class_declaration", Class),
                ("interface_declaration", Interface),
                ("enum_declaration", Class),
                ("record_declaration", Class),
            ],
            types: &[],
            wrappers: &[],
        },
        "Swift" => NodeKinds {
            functions: &[
                "function_declaration",
                "init_declaration",
                "deinit_declaration",
                "subscript_declaration",
            ],
            containers: &[
                ("class_declaration", Class),
                ("protocol_declaration", Interface),
            ],
            types: &[],
            wrappers: &[],
        },
        "C" => NodeKinds {
            functions: &["function_definition"],
            containers: &[],
            types: &[
                "struct_specifier",
                "enum_specifier",
                "union_specifier",
                "type_definition",
            ],
            wrappers: &[],
        },
        "C++" => NodeKinds {
            functions: &["function_definition"],
            containers: &[
                ("class_specifier", Class),
                ("struct_specifier", Class),
                ("namespace_definition", Module),
            ],
            types: &["enum_specifier", "union_specifier"],
            wrappers: &["template_declaration"],
        },
        "C#" => NodeKinds {
            functions: &["method_declaration", "constructor_declaration"],
            containers: &[
                ("class_declaration", Class),
                ("struct_declaration", Class),
                ("record_declaration", Class),
                ("interface_declaration", Interface),
                ("namespace_declaration", Module),
            ],
            types: &["enum_declaration"],
            wrappers: &[],
        },
        "Ruby" => NodeKinds {
            functions: &["method", "singleton_method"],
            containers: &[
                ("class", Class),
                ("singleton_class", Class),
                ("module", Module),
            ],
            types: &[],
            wrappers: &[],
        },
        "PHP" => NodeKinds {
            functions: &["function_definition", "method_declaration"],
            containers: &[
                ("class_declaration", Class),
                ("interface_declaration", Interface),
                ("trait_declaration", Interface),
                ("namespace_definition", Module),
            ],
            types: &["enum_declaration"],
            wrappers: &[],
        },
        _ => NO_KINDS,
    }
}

/// How a node takes part in unit extraction
enum Classified<'t> {
    Leaf(SemanticRole, Node<'t>),
    Container(SemanticRole, Node<'t>),
    Route(String),
}

/// AST parser for extracting semantic code units
pub struct AstParser {
    parser: Parser,
    language_name: &'static str,
    kinds: NodeKinds,
}

impl AstParser {
    /// Create a new AST parser for the given extension
    pub fn new(extension: &str) -> Result<Self, ChunkingError> {
        let (language, language_name): (Language, &'static str) =
            match extension.to_lowercase().as_str() {
                "rs" => (tree_sitter_rust::LANGUAGE.into(), "Rust"),
                "py" => (tree_sitter_python::LANGUAGE.into(), "Python"),
                "js" | "mjs" | "cjs" | "jsx" => {
                    (tree_sitter_javascript::LANGUAGE.into(), "JavaScript")
                }
                "ts" => (
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                    "TypeScript",
                ),
                "tsx" => (tree_sitter_typescript::LANGUAGE_TSX.into(), "TypeScript"),
                "go" => (tree_sitter_go::LANGUAGE.into(), "Go"),
                "java" => (tree_sitter_java::LANGUAGE.into(), "Java"),
                "swift" => (tree_sitter_swift::LANGUAGE.into(), "Swift"),
                "c" | "h" => (tree_sitter_c::LANGUAGE.into(), "C"),
                "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => {
                    (tree_sitter_cpp::LANGUAGE.into(), "C++")
                }
                "cs" => (tree_sitter_c_sharp::LANGUAGE.into(), "C#"),
                "rb" => (tree_sitter_ruby::LANGUAGE.into(), "Ruby"),
                "php" => (tree_sitter_php::LANGUAGE_PHP.into(), "PHP"),
                _ => return Err(ChunkingError::UnsupportedLanguage(extension.to_string())),
            };

        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ChunkingError::AstParsingFailed(format!("{}: {}", language_name, e)))?;

        Ok(Self {
            parser,
            language_name,
            kinds: node_kinds(language_name),
        })
    }

    /// Parse source code and extract top-level semantic units with their members
    ///
    /// Fails when the grammar produces no tree or when syntax errors swallow
    /// the whole file.
    pub fn parse(&mut self, source_code: &str) -> Result<Vec<AstUnit>, ChunkingError> {
        let tree = self.parser.parse(source_code, None).ok_or_else(|| {
            ChunkingError::AstParsingFailed(format!("no {} syntax tree", self.language_name))
        })?;

        let root = tree.root_node();
        if root.is_error() || (root.has_error() && all_children_are_errors(root)) {
            return Err(ChunkingError::SyntaxErrors(self.language_name.to_string()));
        }

        let mut units = Vec::new();
        self.collect(root, source_code, None, &mut units);
        Ok(units)
    }

    pub fn language_name(&self) -> &str {
        self.language_name
    }

    fn collect(
        &self,
        node: Node,
        source: &str,
        parent: Option<(&str, SemanticRole)>,
        out: &mut Vec<AstUnit>,
    ) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match self.classify(child, source) {
                Some(classified) => out.push(self.build_unit(child, classified, source, parent)),
                None => self.collect(child, source, parent, out),
            }
        }
    }

    fn classify<'t>(&self, node: Node<'t>, source: &str) -> Option<Classified<'t>> {
        let kind = node.kind();

        if self.kinds.wrappers.contains(&kind) {
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .find_map(|child| self.classify(child, source))?;
            if self.language_name == "Python"
                && PY_ROUTE_RE.is_match(node_text(node, source))
                && let Classified::Leaf(_, def) = &inner
            {
                return Some(Classified::Leaf(SemanticRole::Route, *def));
            }
            return Some(inner);
        }

        if self.kinds.functions.contains(&kind) {
            return Some(Classified::Leaf(SemanticRole::Function, node));
        }
        if self.kinds.types.contains(&kind) {
            return Some(Classified::Leaf(SemanticRole::Type, node));
        }
        if let Some((_, role)) = self.kinds.containers.iter().find(|(k, _)| *k == kind) {
            return Some(Classified::Container(*role, node));
        }

        match self.language_name {
            "JavaScript" | "TypeScript" => self.classify_js(node, source),
            _ => None,
        }
    }

    /// Function-valued variable declarations and route registrations
    fn classify_js<'t>(&self, node: Node<'t>, source: &str) -> Option<Classified<'t>> {
        match node.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                let declarator = node
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "variable_declarator")?;
                let value = declarator.child_by_field_name("value")?;
                matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                )
                .then_some(Classified::Leaf(SemanticRole::Function, node))
            }
            "expression_statement" => {
                let mut cursor = node.walk();
                let call = node.named_children(&mut cursor).next()?;
                if call.kind() != "call_expression" {
                    return None;
                }
                let callee = call.child_by_field_name("function")?;
                if callee.kind() != "member_expression" {
                    return None;
                }
                let method = node_text(callee.child_by_field_name("property")?, source);
                if !ROUTE_METHODS.contains(&method) {
                    return None;
                }
                let args = call.child_by_field_name("arguments")?;
                let mut args_cursor = args.walk();
                let first = args.named_children(&mut args_cursor).next()?;
                if !matches!(first.kind(), "string" | "template_string") || args.named_child_count() < 2 {
                    return None;
                }
                let path = node_text(first, source).trim_matches(|c| c == '"' || c == '\'' || c == '`');
                if !path.starts_with('/') && !path.starts_with('*') {
                    return None;
                }
                Some(Classified::Route(format!("{} {}", method.to_uppercase(), path)))
            }
            _ => None,
        }
    }

    fn build_unit(
        &self,
        node: Node,
        classified: Classified,
        source: &str,
        parent: Option<(&str, SemanticRole)>,
    ) -> AstUnit {
        let start_line = attached_start_row(node, source) + 1;
        let end_line = node.end_position().row + 1;
        let def_node = match &classified {
            Classified::Leaf(_, def) | Classified::Container(_, def) => *def,
            Classified::Route(_) => node,
        };
        let header = first_line(node_text(def_node, source));
        // modifiers and decorators up to the parameter list
        let signature = node_text(node, source).split('(').next().unwrap_or("");
        let parent_name = parent
            .filter(|(_, role)| matches!(role, SemanticRole::Class | SemanticRole::Interface))
            .map(|(name, _)| name.to_string());

        let mut unit = AstUnit {
            kind: node.kind().to_string(),
            role: SemanticRole::Function,
            name: String::new(),
            parent_name,
            start_line,
            end_line,
            is_async: ASYNC_RE.is_match(header),
            is_static: false,
            members: Vec::new(),
        };

        match classified {
            Classified::Route(name) => {
                unit.role = SemanticRole::Route;
                unit.name = name;
            }
            Classified::Leaf(role, def) => {
                unit.name = unit_name(def, source);
                unit.kind = def.kind().to_string();
                unit.role = match role {
                    SemanticRole::Function if unit.parent_name.is_some() => SemanticRole::Method,
                    SemanticRole::Function if def.kind() == "method_declaration" => {
                        if self.language_name == "Go" {
                            unit.parent_name = go_receiver(def, source);
                        }
                        SemanticRole::Method
                    }
                    other => other,
                };
                unit.is_static = def.kind() == "singleton_method" || STATIC_RE.is_match(signature);
            }
            Classified::Container(role, def) => {
                unit.name = unit_name(def, source);
                unit.kind = def.kind().to_string();
                unit.role = role;
                let mut members = Vec::new();
                self.collect(def, source, Some((unit.name.as_str(), role)), &mut members);
                unit.members = members;
            }
        }

        unit
    }
}

fn all_children_are_errors(root: Node) -> bool {
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .all(|c| c.is_error() || c.is_missing())
}

fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Row where a unit starts once preceding doc comments and attributes are included
fn attached_start_row(node: Node, source: &str) -> usize {
    let mut start = node.start_position().row;
    let mut prev = node.prev_named_sibling();
    while let Some(sibling) = prev {
        let kind = sibling.kind();
        let attachable = kind.contains("comment") || kind == "attribute_item" || kind == "decorator";
        if !attachable || sibling.end_position().row + 1 < start || !starts_line(sibling, source) {
            break;
        }
        start = sibling.start_position().row;
        prev = sibling.prev_named_sibling();
    }
    start
}

/// Whether only whitespace precedes the node on its first line
fn starts_line(node: Node, source: &str) -> bool {
    let start = node.start_byte();
    let line_start = source[..start].rfind('\n').map(|p| p + 1).unwrap_or(0);
    source[line_start..start].trim().is_empty()
}

fn unit_name(node: Node, source: &str) -> String {
    let name = find_name(node, source, 0).unwrap_or_else(|| "anonymous".to_string());
    let name = first_line(&name).trim();
    name.chars().take(100).collect()
}

fn find_name(node: Node, source: &str, depth: usize) -> Option<String> {
    if depth > 4 {
        return None;
    }
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(name, source).to_string());
    }
    if node.kind() == "impl_item" {
        let ty = node_text(node.child_by_field_name("type")?, source);
        return Some(match node.child_by_field_name("trait") {
            Some(t) => format!("{} for {}", node_text(t, source), ty),
            None => ty.to_string(),
        });
    }
    if let Some(declarator) = node.child_by_field_name("declarator") {
        if declarator.kind().ends_with("identifier") {
            return Some(node_text(declarator, source).to_string());
        }
        return find_name(declarator, source, depth + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        let kind = child.kind();
        if kind.ends_with("identifier") || kind == "constant" {
            return Some(node_text(child, source).to_string());
        }
        if (kind.ends_with("_spec") || kind == "variable_declarator")
            && let Some(name) = find_name(child, source, depth + 1)
        {
            return Some(name);
        }
    }
    None
}

/// Receiver type of a Go method, e.g. `Server` for `func (s *Server) Run()`
fn go_receiver(node: Node, source: &str) -> Option<String> {
    let receiver = node_text(node.child_by_field_name("receiver")?, source);
    let ty = receiver
        .trim_matches(|c| c == '(' || c == ')')
        .split_whitespace()
        .last()?
        .trim_start_matches('*');
    let ty = ty.split('[').next().unwrap_or(ty);
    (!ty.is_empty()).then(|| ty.to_string())
}
