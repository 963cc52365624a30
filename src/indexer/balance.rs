//! Literal-aware bracket balancing
//!
//! String, char, template and regex literals and comments are blanked out
//! before brackets are counted, so `"{"` or `// }` never skew the result.
//! Newlines are preserved so per-line depths line up with the source.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleQuote {
    /// `'...'` is a string literal (Python, JavaScript, Ruby, PHP)
    String,
    /// `'x'` is a char literal; a lone `'` is a lifetime or label (Rust, C, Java, Go)
    Char,
    /// `'` has no literal meaning
    Plain,
}

/// Lexical rules needed to find literals and comments
#[derive(Debug, Clone, Copy)]
pub struct LiteralSyntax {
    pub single_quote: SingleQuote,
    pub backtick_strings: bool,
    pub slash_comments: bool,
    pub hash_comments: bool,
    pub triple_quotes: bool,
    pub regex_literals: bool,
    pub raw_strings: bool,
    pub multiline_strings: bool,
}

impl LiteralSyntax {
    const C_LIKE: LiteralSyntax = LiteralSyntax {
        single_quote: SingleQuote::Char,
        backtick_strings: false,
        slash_comments: true,
        hash_comments: false,
        triple_quotes: false,
        regex_literals: false,
        raw_strings: false,
        multiline_strings: false,
    };

    pub fn for_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "rs" => Self {
                raw_strings: true,
                multiline_strings: true,
                ..Self::C_LIKE
            },
            "py" => Self {
                single_quote: SingleQuote::String,
                slash_comments: false,
                hash_comments: true,
                triple_quotes: true,
                ..Self::C_LIKE
            },
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => Self {
                single_quote: SingleQuote::String,
                backtick_strings: true,
                regex_literals: true,
                ..Self::C_LIKE
            },
            "go" => Self {
                backtick_strings: true,
                ..Self::C_LIKE
            },
            "rb" => Self {
                single_quote: SingleQuote::String,
                slash_comments: false,
                hash_comments: true,
                multiline_strings: true,
                ..Self::C_LIKE
            },
            "php" => Self {
                single_quote: SingleQuote::String,
                hash_comments: true,
                multiline_strings: true,
                ..Self::C_LIKE
            },
            "swift" => Self {
                single_quote: SingleQuote::Plain,
                triple_quotes: true,
                ..Self::C_LIKE
            },
            "sh" | "bash" | "yaml" | "yml" | "toml" => Self {
                single_quote: SingleQuote::String,
                slash_comments: false,
                hash_comments: true,
                multiline_strings: true,
                ..Self::C_LIKE
            },
            _ => Self::C_LIKE,
        }
    }
}

/// Replace every literal and comment character with a space, keeping newlines
pub fn strip_literals(source: &str, syntax: &LiteralSyntax) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let literal_end = match c {
            '/' if syntax.slash_comments && next == Some('/') => Some(line_end(&chars, i)),
            '/' if syntax.slash_comments && next == Some('*') => Some(block_comment_end(&chars, i)),
            '#' if syntax.hash_comments && !(syntax.slash_comments && next == Some('[')) => {
                Some(line_end(&chars, i))
            }
            '"' | '\'' if syntax.triple_quotes && starts_triple(&chars, i) => {
                Some(triple_end(&chars, i))
            }
            '"' => Some(string_end(&chars, i, '"', syntax.multiline_strings)),
            '\'' => match syntax.single_quote {
                SingleQuote::String => Some(string_end(&chars, i, '\'', syntax.multiline_strings)),
                SingleQuote::Char => char_literal_end(&chars, i),
                SingleQuote::Plain => None,
            },
            '`' if syntax.backtick_strings => Some(string_end(&chars, i, '`', true)),
            'r' if syntax.raw_strings => raw_string_end(&chars, i),
            '/' if syntax.regex_literals && regex_allowed(&out) => regex_end(&chars, i),
            _ => None,
        };

        match literal_end {
            Some(end) => {
                for &ch in &chars[i..end] {
                    out.push(if ch == '\n' { '\n' } else { ' ' });
                }
                i = end;
            }
            None => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Exclusive index of the end of the line starting at `i` (newline not included)
fn line_end(chars: &[char], i: usize) -> usize {
    chars[i..]
        .iter()
        .position(|&c| c == '\n')
        .map(|p| i + p)
        .unwrap_or(chars.len())
}

fn block_comment_end(chars: &[char], i: usize) -> usize {
    let mut j = i + 2;
    while j + 1 < chars.len() {
        if chars[j] == '*' && chars[j + 1] == '/' {
            return j + 2;
        }
        j += 1;
    }
    chars.len()
}

fn starts_triple(chars: &[char], i: usize) -> bool {
    let q = chars[i];
    chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q)
}

fn triple_end(chars: &[char], i: usize) -> usize {
    let q = chars[i];
    let mut j = i + 3;
    while j + 2 < chars.len() {
        if chars[j] == '\\' {
            j += 2;
            continue;
        }
        if chars[j] == q && chars[j + 1] == q && chars[j + 2] == q {
            return j + 3;
        }
        j += 1;
    }
    chars.len()
}

fn string_end(chars: &[char], i: usize, quote: char, multiline: bool) -> usize {
    let mut j = i + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '\n' if !multiline => return j,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

/// `'x'`, `'\n'` or `'\u{1F600}'`; anything else is a lifetime or label
fn char_literal_end(chars: &[char], i: usize) -> Option<usize> {
    match chars.get(i + 1) {
        Some('\\') => {
            let limit = (i + 12).min(chars.len());
            (i + 3..limit).find(|&j| chars[j] == '\'').map(|j| j + 1)
        }
        Some(c) if *c != '\'' && *c != '\n' => {
            (chars.get(i + 2) == Some(&'\'')).then_some(i + 3)
        }
        _ => None,
    }
}

/// `r"..."`, `r#"..."#`, `br"..."` when `r` starts a token
fn raw_string_end(chars: &[char], i: usize) -> Option<usize> {
    if i > 0 {
        let prev = chars[i - 1];
        let prefixed_byte = prev == 'b' && (i < 2 || !is_ident_char(chars[i - 2]));
        if is_ident_char(prev) && !prefixed_byte {
            return None;
        }
    }
    let mut j = i + 1;
    let mut hashes = 0;
    while chars.get(j) == Some(&'#') {
        hashes += 1;
        j += 1;
    }
    if chars.get(j) != Some(&'"') {
        return None;
    }
    j += 1;
    while j < chars.len() {
        if chars[j] == '"' && (1..=hashes).all(|k| chars.get(j + k) == Some(&'#')) {
            return Some(j + 1 + hashes);
        }
        j += 1;
    }
    Some(chars.len())
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A `/` starts a regex when the previous significant character cannot end an operand
fn regex_allowed(emitted: &str) -> bool {
    match emitted.chars().rev().find(|c| !c.is_whitespace()) {
        None => true,
        Some(c) => "(,=:[!&|?{};+-*%<>~^".contains(c),
    }
}

fn regex_end(chars: &[char], i: usize) -> Option<usize> {
    if matches!(chars.get(i + 1), Some('/') | Some('*') | None) {
        return None;
    }
    let mut j = i + 1;
    let mut in_class = false;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '\n' => return None,
            '[' => {
                in_class = true;
                j += 1;
            }
            ']' => {
                in_class = false;
                j += 1;
            }
            '/' if !in_class => {
                j += 1;
                while j < chars.len() && chars[j].is_ascii_alphabetic() {
                    j += 1;
                }
                return Some(j);
            }
            _ => j += 1,
        }
    }
    None
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Brackets `stripped` leaves open, innermost last, or `None` when a closer
/// has no matching opener
pub fn unclosed(stripped: &str) -> Option<Vec<char>> {
    let mut stack = Vec::new();
    for c in stripped.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                if stack.pop().map(closer_for) != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(stack)
}

/// Whether every `(`, `[` and `{` is closed by its matching bracket, in order
pub fn is_balanced(stripped: &str) -> bool {
    unclosed(stripped).is_some_and(|open| open.is_empty())
}

/// Strip literals and check balance in one step
pub fn check_balance(text: &str, syntax: &LiteralSyntax) -> bool {
    is_balanced(&strip_literals(text, syntax))
}

/// Closing brackets for `open`, innermost first
pub fn closers(open: &[char]) -> String {
    open.iter().rev().map(|&c| closer_for(c)).collect()
}

/// Open brackets before each line of already-stripped text, each paired with
/// the index of the line that opened it. One entry per line plus the state
/// after the last line.
pub fn open_brackets(stripped: &str) -> Vec<Vec<(char, usize)>> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut states = Vec::new();
    for (i, line) in stripped.split('\n').enumerate() {
        states.push(stack.clone());
        for c in line.chars() {
            match c {
                '(' | '[' | '{' => stack.push((c, i)),
                ')' | ']' | '}' => {
                    stack.pop();
                }
                _ => {}
            }
        }
    }
    states.push(stack);
    states
}

/// Length in chars of the prefix of a stripped line that ends with its last
/// closer for a bracket opened on an earlier line (`} else {` -> 1)
pub fn reclosing_prefix_len(stripped_line: &str) -> usize {
    let mut depth = 0usize;
    let mut len = 0;
    for (i, c) in stripped_line.chars().enumerate() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth == 0 => len = i + 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    len
}
