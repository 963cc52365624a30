//! Semantic chunking of loaded documents
//!
//! Code with a tree-sitter grammar is split along AST units (functions,
//! methods, classes, routes) into token-bounded, bracket-balanced chunks.
//! Everything else, and any code the parser cannot make sense of, is cut
//! into fixed line windows.

mod ast_parser;
pub mod balance;
mod chunker;
mod language;
mod semantic;
pub mod tokens;

pub use ast_parser::{AstParser, AstUnit};
pub use chunker::LineChunker;
pub use language::{
    AST_EXTENSIONS, comment_prefixes, detect_language, extension_of, file_type_for_path,
    has_grammar, is_markup,
};
pub use semantic::SemanticChunker;
pub use tokens::estimate_tokens;
