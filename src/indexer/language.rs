//! Language detection from file extensions

/// Extensions the AST path has a tree-sitter grammar for
pub const AST_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "mjs", "cjs", "jsx", "ts", "tsx", "go", "java", "swift", "c", "h", "cpp",
    "cc", "cxx", "hpp", "hxx", "hh", "cs", "rb", "php",
];

/// Detect programming language from file extension
pub fn detect_language(extension: &str) -> Option<&'static str> {
    let lang = match extension.to_lowercase().as_str() {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "java" => "Java",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "C++",
        "c" | "h" => "C",
        "cs" => "C#",
        "go" => "Go",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "kt" | "kts" => "Kotlin",
        "scala" => "Scala",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",

        "html" | "htm" => "HTML",
        "css" => "CSS",
        "scss" | "sass" => "SCSS",

        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "xml" => "XML",
        "ini" | "cfg" | "conf" => "Config",
        "properties" => "Properties",

        "md" | "markdown" => "Markdown",
        "rst" => "reStructuredText",
        "adoc" | "asciidoc" => "AsciiDoc",
        "txt" => "Text",

        _ => return None,
    };

    Some(lang)
}

/// File type label for a repository path: the language name, the bare
/// extension when the language is unknown, or `text` without an extension.
pub fn file_type_for_path(path: &str) -> String {
    match extension_of(path) {
        Some(ext) => detect_language(ext)
            .map(str::to_string)
            .unwrap_or_else(|| ext.to_lowercase()),
        None => "text".to_string(),
    }
}

/// Extension of the last path component, ignoring dotfiles
pub fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

pub fn has_grammar(extension: &str) -> bool {
    AST_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Prose and data formats. Their chunks get a `#` file header and no
/// identifier-based neighbor context.
pub fn is_markup(language: &str) -> bool {
    matches!(
        language,
        "Markdown"
            | "reStructuredText"
            | "AsciiDoc"
            | "Text"
            | "text"
            | "YAML"
            | "TOML"
            | "Config"
            | "Properties"
            | "JSON"
    )
}

/// Line comment prefixes used when scoring comment density
pub fn comment_prefixes(language: &str) -> &'static [&'static str] {
    match language {
        "Python" | "Ruby" | "Shell" | "YAML" | "TOML" | "Config" | "Properties" => &["#"],
        "PHP" => &["//", "#", "/*", "*"],
        "SQL" => &["--"],
        "HTML" | "XML" | "Markdown" => &["<!--"],
        _ => &["//", "/*", "*"],
    }
}
