use super::ast_parser::{AstParser, AstUnit};
use super::balance::{
    LiteralSyntax, check_balance, closers, open_brackets, reclosing_prefix_len, strip_literals,
    unclosed,
};
use super::chunker::LineChunker;
use super::language::has_grammar;
use super::tokens::{chars_for_tokens, estimate_tokens, tokens_for_chars};
use crate::config::ChunkingConfig;
use crate::types::{Chunk, Document, SemanticRole, SplittingMethod};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Scope id of the file itself; expanded containers get ids from 1 upward
const FILE_SCOPE: usize = 0;

/// A piece of source the packer moves around as a whole: an AST unit, the
/// outline of an expanded class, or a run of module-level code.
#[derive(Debug, Clone)]
struct PackUnit {
    /// (1-based line number, line text); not necessarily contiguous for class outlines
    lines: Vec<(usize, String)>,
    role: SemanticRole,
    name: String,
    parent_name: Option<String>,
    scope: usize,
    is_async: bool,
    is_static: bool,
}

impl PackUnit {
    fn chars(&self) -> usize {
        let text: usize = self.lines.iter().map(|(_, l)| l.chars().count()).sum();
        text + self.lines.len().saturating_sub(1)
    }

    fn tokens(&self) -> usize {
        tokens_for_chars(self.chars())
    }
}

/// Units packed together into one chunk
#[derive(Debug)]
struct Group {
    units: Vec<PackUnit>,
    scope: usize,
    oversized: bool,
}

impl Group {
    fn new(unit: PackUnit, oversized: bool) -> Self {
        Self {
            scope: unit.scope,
            units: vec![unit],
            oversized,
        }
    }

    fn chars(&self) -> usize {
        let text: usize = self.units.iter().map(PackUnit::chars).sum();
        text + self.units.len().saturating_sub(1)
    }

    fn tokens(&self) -> usize {
        tokens_for_chars(self.chars())
    }

    /// Same scope and within `max_tokens`. The unit cap holds unless
    /// `past_cap` lets an undersized group keep absorbing neighbors.
    fn can_merge(&self, other: &Group, config: &ChunkingConfig, past_cap: bool) -> bool {
        !self.oversized
            && !other.oversized
            && self.scope == other.scope
            && (past_cap || self.units.len() + other.units.len() <= config.max_units_per_chunk)
            && tokens_for_chars(self.chars() + 1 + other.chars()) <= config.max_tokens
    }
}

/// Chunk content and identity before numbering
#[derive(Debug)]
struct Draft {
    content: String,
    start_line: usize,
    end_line: usize,
    role: SemanticRole,
    name: String,
    parent_name: Option<String>,
    is_async: bool,
    is_static: bool,
}

impl Draft {
    fn from_units(units: &[PackUnit]) -> Self {
        let lines: Vec<&(usize, String)> = units.iter().flat_map(|u| u.lines.iter()).collect();
        let named: Vec<&PackUnit> = {
            let code: Vec<&PackUnit> = units
                .iter()
                .filter(|u| u.role != SemanticRole::ModuleLevel)
                .collect();
            if code.is_empty() { units.iter().collect() } else { code }
        };

        let mut names: Vec<&str> = Vec::new();
        for unit in &named {
            if !names.contains(&unit.name.as_str()) {
                names.push(&unit.name);
            }
        }

        Self {
            content: lines.iter().map(|(_, l)| l.as_str()).collect::<Vec<_>>().join("\n"),
            start_line: lines.iter().map(|(n, _)| *n).min().unwrap_or(1),
            end_line: lines.iter().map(|(n, _)| *n).max().unwrap_or(1),
            role: named[0].role,
            name: names.join(", "),
            parent_name: named.iter().find_map(|u| u.parent_name.clone()),
            is_async: named.iter().any(|u| u.is_async),
            is_static: named.iter().any(|u| u.is_static),
        }
    }

    fn slice_of(unit: &PackUnit, content: String, start_line: usize, end_line: usize) -> Self {
        Self {
            content,
            start_line,
            end_line,
            role: unit.role,
            name: unit.name.clone(),
            parent_name: unit.parent_name.clone(),
            is_async: unit.is_async,
            is_static: unit.is_static,
        }
    }
}

/// Chunking states for one document
enum ChunkState {
    Parse,
    UnitExtraction(Vec<AstUnit>),
    TokenPacking(Vec<PackUnit>),
    Emit(Vec<Draft>),
    Fallback(String),
}

/// AST-aware, token-bounded chunker with a line-window fallback
pub struct SemanticChunker {
    config: ChunkingConfig,
}

impl SemanticChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split one document into chunks ordered by source line
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let extension = document.extension().unwrap_or("").to_lowercase();
        let syntax = LiteralSyntax::for_extension(&extension);
        let lines: Vec<&str> = document.content.lines().collect();

        let mut state = ChunkState::Parse;
        loop {
            state = match state {
                ChunkState::Parse => self.parse(document, &extension),
                ChunkState::UnitExtraction(units) => self.extract(units, &lines, &syntax),
                ChunkState::TokenPacking(units) => ChunkState::Emit(self.pack(units, &syntax)),
                ChunkState::Emit(drafts) => return emit(document, drafts),
                ChunkState::Fallback(reason) => {
                    debug!(
                        "Line-based chunking for {}: {}",
                        document.source_path, reason
                    );
                    return LineChunker::new(self.config.fallback_lines).split(document);
                }
            };
        }
    }

    /// Split many documents in parallel; output keeps document order
    pub fn split_all(&self, documents: &[Document]) -> Vec<Vec<Chunk>> {
        documents.par_iter().map(|doc| self.split(doc)).collect()
    }

    fn parse(&self, document: &Document, extension: &str) -> ChunkState {
        if !has_grammar(extension) {
            return ChunkState::Fallback(format!("no grammar for '{}'", extension));
        }

        let mut parser = match AstParser::new(extension) {
            Ok(parser) => parser,
            Err(e) => return ChunkState::Fallback(e.to_string()),
        };

        match parser.parse(&document.content) {
            Ok(units) if units.is_empty() => ChunkState::Fallback("no semantic units".to_string()),
            Ok(units) => ChunkState::UnitExtraction(units),
            Err(e) => ChunkState::Fallback(e.to_string()),
        }
    }

    fn extract(&self, units: Vec<AstUnit>, lines: &[&str], syntax: &LiteralSyntax) -> ChunkState {
        let units = normalize(units, 1, lines.len());

        let mut accepted = Vec::with_capacity(units.len());
        for unit in units {
            if check_balance(&line_text(lines, unit.start_line, unit.end_line), syntax) {
                accepted.push(unit);
            } else {
                debug!(
                    "Dropping unbalanced unit '{}' at lines {}-{}",
                    unit.name, unit.start_line, unit.end_line
                );
            }
        }

        let covered: BTreeSet<usize> = accepted
            .iter()
            .flat_map(|u| u.start_line..=u.end_line)
            .collect();

        let mut gaps = Vec::new();
        for (start, end) in uncovered_runs(lines, 1, lines.len(), &covered) {
            if !check_balance(&line_text(lines, start, end), syntax) {
                return ChunkState::Fallback(format!(
                    "unbalanced module-level code at lines {}-{}",
                    start, end
                ));
            }
            gaps.push(PackUnit {
                lines: numbered(lines, start, end),
                role: SemanticRole::ModuleLevel,
                name: "module_level".to_string(),
                parent_name: None,
                scope: FILE_SCOPE,
                is_async: false,
                is_static: false,
            });
        }

        let mut pack = Vec::new();
        let mut next_scope = FILE_SCOPE + 1;
        let mut gaps = gaps.into_iter().peekable();
        for unit in accepted {
            while let Some(gap) = gaps.next_if(|g| g.lines[0].0 < unit.start_line) {
                pack.push(gap);
            }
            self.flatten(unit, lines, syntax, FILE_SCOPE, &mut next_scope, &mut pack);
        }
        pack.extend(gaps);

        ChunkState::TokenPacking(pack)
    }

    /// Turn a unit into pack units, expanding oversized containers into their
    /// members plus an outline of whatever the members do not cover.
    fn flatten(
        &self,
        unit: AstUnit,
        lines: &[&str],
        syntax: &LiteralSyntax,
        scope: usize,
        next_scope: &mut usize,
        out: &mut Vec<PackUnit>,
    ) {
        let whole = PackUnit {
            lines: numbered(lines, unit.start_line, unit.end_line),
            role: unit.role,
            name: unit.name.clone(),
            parent_name: unit.parent_name.clone(),
            scope,
            is_async: unit.is_async,
            is_static: unit.is_static,
        };

        if unit.members.is_empty() || whole.tokens() <= self.config.max_tokens {
            out.push(whole);
            return;
        }

        let members: Vec<AstUnit> = normalize(unit.members, unit.start_line, unit.end_line)
            .into_iter()
            .filter(|m| check_balance(&line_text(lines, m.start_line, m.end_line), syntax))
            .collect();
        if members.is_empty() {
            out.push(whole);
            return;
        }

        let covered: BTreeSet<usize> = members
            .iter()
            .flat_map(|m| m.start_line..=m.end_line)
            .collect();
        let outline: Vec<(usize, String)> = (unit.start_line..=unit.end_line)
            .filter(|n| !covered.contains(n) && !lines[n - 1].trim().is_empty())
            .map(|n| (n, lines[n - 1].to_string()))
            .collect();

        let outline_text = outline
            .iter()
            .map(|(_, l)| l.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !check_balance(&outline_text, syntax) {
            out.push(whole);
            return;
        }

        let inner_scope = *next_scope;
        *next_scope += 1;

        if !outline.is_empty() {
            out.push(PackUnit {
                lines: outline,
                ..whole
            });
        }
        for member in members {
            self.flatten(member, lines, syntax, inner_scope, next_scope, out);
        }
    }

    fn pack(&self, units: Vec<PackUnit>, syntax: &LiteralSyntax) -> Vec<Draft> {
        let config = &self.config;
        let mut groups: Vec<Group> = Vec::new();

        for unit in units {
            let tokens = unit.tokens();
            if tokens > config.max_tokens {
                groups.push(Group::new(unit, true));
                continue;
            }
            let candidate = Group::new(unit, false);
            if let Some(last) = groups.last_mut()
                && (last.tokens() < config.min_tokens || tokens < config.min_tokens)
                && last.can_merge(&candidate, config, last.tokens() < config.min_tokens)
            {
                last.units.extend(candidate.units);
                continue;
            }
            groups.push(candidate);
        }

        // Undersized groups fold into the nearest sibling of the same scope,
        // preferring the following one, regardless of the unit cap.
        let mut i = 0;
        while i < groups.len() {
            if groups[i].oversized || groups[i].tokens() >= config.min_tokens {
                i += 1;
                continue;
            }

            let scope = groups[i].scope;
            let next = (i + 1..groups.len()).find(|&j| groups[j].scope == scope);
            if let Some(j) = next
                && groups[i].can_merge(&groups[j], config, true)
            {
                let small = groups.remove(i);
                let target = &mut groups[j - 1];
                let mut units = small.units;
                units.append(&mut target.units);
                target.units = units;
                continue;
            }

            let prev = (0..i).rev().find(|&j| groups[j].scope == scope);
            if let Some(j) = prev
                && groups[j].can_merge(&groups[i], config, true)
            {
                let small = groups.remove(i);
                groups[j].units.extend(small.units);
                continue;
            }

            i += 1;
        }

        groups
            .into_iter()
            .flat_map(|group| {
                if group.oversized {
                    group
                        .units
                        .iter()
                        .flat_map(|u| self.slice(u, syntax))
                        .collect::<Vec<_>>()
                } else {
                    vec![Draft::from_units(&group.units)]
                }
            })
            .collect()
    }

    /// Cut an oversized unit into line windows of at most `max_tokens`.
    ///
    /// Every slice is bracket-balanced on its own: a window that starts inside
    /// open brackets is preceded by the lines that opened them (its head), and
    /// one that ends inside open brackets is followed by a line of matching
    /// closers. Windows prefer to end where the bracket depth is back at their
    /// starting level. The trailing `overlap_tokens` of each window are
    /// repeated at the start of the next. Slice line ranges cover the window
    /// only, not the head.
    fn slice(&self, unit: &PackUnit, syntax: &LiteralSyntax) -> Vec<Draft> {
        let config = &self.config;
        let texts: Vec<&str> = unit.lines.iter().map(|(_, l)| l.as_str()).collect();
        let numbers: Vec<usize> = unit.lines.iter().map(|(n, _)| *n).collect();
        let n = texts.len();

        let stripped = strip_literals(&texts.join("\n"), syntax);
        let stripped_lines: Vec<&str> = stripped.split('\n').collect();
        let states = open_brackets(&stripped);

        let max_chars = chars_for_tokens(config.max_tokens);
        let overlap_chars = chars_for_tokens(config.overlap_tokens);

        let heads: Vec<Option<String>> = (0..n)
            .map(|a| {
                head_for(a, &states, &texts, &stripped_lines, syntax)
                    .filter(|h| h.chars().count() <= max_chars / 2)
            })
            .collect();
        let closing: Vec<String> = states
            .iter()
            .map(|open| closers(&open.iter().map(|(c, _)| *c).collect::<Vec<_>>()))
            .collect();

        let mut prefix = vec![0usize; n + 1];
        for (i, text) in texts.iter().enumerate() {
            prefix[i + 1] = prefix[i] + text.chars().count();
        }
        let span = |s: usize, e: usize| prefix[e + 1] - prefix[s] + (e - s);

        let head_cost = |a: usize| match heads[a].as_deref() {
            Some(h) if !h.is_empty() => h.chars().count() + 1,
            _ => 0,
        };
        let cost = |a: usize, c: usize| {
            let close = &closing[c + 1];
            head_cost(a) + span(a, c) + if close.is_empty() { 0 } else { close.len() + 1 }
        };
        let content = |a: usize, c: usize| {
            let mut parts: Vec<String> = Vec::with_capacity(3);
            if let Some(head) = heads[a].as_deref().filter(|h| !h.is_empty()) {
                parts.push(head.to_string());
            }
            parts.push(texts[a..=c].join("\n"));
            if !closing[c + 1].is_empty() {
                parts.push(closing[c + 1].clone());
            }
            parts.join("\n")
        };
        let reopenable = |c: usize| c + 1 == n || heads[c + 1].is_some();
        let level = |i: usize| states[i].len();

        let mut drafts = Vec::new();
        let mut start = 0;
        let mut fresh = 0;
        while start < n {
            let bracketless = !stripped_lines[start].contains(['(', ')', '[', ']', '{', '}']);
            if span(start, start) > max_chars && bracketless {
                // a single line over budget is split by characters
                let chars: Vec<char> = texts[start].chars().collect();
                for piece in chars.chunks(max_chars) {
                    drafts.push(Draft::slice_of(
                        unit,
                        piece.iter().collect(),
                        numbers[start],
                        numbers[start],
                    ));
                }
                start += 1;
                fresh = start;
                continue;
            }

            let first = fresh.max(start);
            let candidates: Vec<usize> = (first..n)
                .take_while(|&c| head_cost(start) + span(start, c) <= max_chars)
                .filter(|&c| cost(start, c) <= max_chars)
                .collect();

            if candidates.last() == Some(&(n - 1)) {
                drafts.push(Draft::slice_of(unit, content(start, n - 1), numbers[start], numbers[n - 1]));
                break;
            }

            let pick = |same_level: bool, full_size: bool| {
                candidates.iter().rev().copied().find(|&c| {
                    reopenable(c)
                        && (!same_level || level(c + 1) == level(start))
                        && (!full_size || tokens_for_chars(cost(start, c)) >= config.min_tokens)
                        && check_balance(&content(start, c), syntax)
                })
            };
            // with no balanced cut inside the budget, the window grows past it
            let beyond = candidates.last().map(|c| c + 1).unwrap_or(first);
            let cut = pick(true, true)
                .or_else(|| pick(false, true))
                .or_else(|| pick(true, false))
                .or_else(|| pick(false, false))
                .or_else(|| {
                    (beyond..n).find(|&c| {
                        reopenable(c) && check_balance(&content(start, c), syntax)
                    })
                })
                .unwrap_or(n - 1);

            drafts.push(Draft::slice_of(unit, content(start, cut), numbers[start], numbers[cut]));
            if cut + 1 == n {
                break;
            }

            let mut next = cut + 1;
            let mut overlap = 1;
            while overlap <= cut - start && span(cut + 1 - overlap, cut) <= overlap_chars {
                if heads[cut + 1 - overlap].is_some() {
                    next = cut + 1 - overlap;
                }
                overlap += 1;
            }
            fresh = cut + 1;
            start = next;
        }

        drafts
    }
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// Lines a reopening head may pull in above a line that closes earlier brackets
const HEAD_LOOKBACK: usize = 8;

/// Source lines that reopen the brackets open before line `a`, so that the
/// head's unclosed brackets match the real ones exactly. Opening lines are
/// used as written when that works. Otherwise an opening line that first
/// closes an earlier bracket pulls in the lines above it (a multi-line
/// signature), or has those leading closers cut off (`} else {` becomes
/// `else {`) when that would reach too far up.
fn head_for(
    a: usize,
    states: &[Vec<(char, usize)>],
    texts: &[&str],
    stripped_lines: &[&str],
    syntax: &LiteralSyntax,
) -> Option<String> {
    let open = &states[a];
    if open.is_empty() {
        return Some(String::new());
    }
    let want: Vec<char> = open.iter().map(|(c, _)| *c).collect();
    let mut chain: Vec<usize> = open.iter().map(|(_, line)| *line).collect();
    chain.dedup();

    let reopens = |text: &str| unclosed(&strip_literals(text, syntax)).as_ref() == Some(&want);
    let plain = join_lines(chain.iter().map(|&l| texts[l].to_string()));
    if reopens(&plain) {
        return Some(plain);
    }

    let mut pieces: BTreeMap<usize, String> = BTreeMap::new();
    for &line in &chain {
        let mut from = line;
        while from > 0
            && line - from < HEAD_LOOKBACK
            && unclosed(&stripped_lines[from..=line].join("\n")).is_none()
        {
            from -= 1;
        }
        if unclosed(&stripped_lines[from..=line].join("\n")).is_some() {
            for l in from..=line {
                pieces.entry(l).or_insert_with(|| texts[l].to_string());
            }
        } else {
            let skip = reclosing_prefix_len(stripped_lines[line]);
            let rest: String = texts[line].chars().skip(skip).collect();
            pieces.insert(line, rest.trim_start().to_string());
        }
    }
    let repaired = join_lines(pieces.into_values());
    reopens(&repaired).then_some(repaired)
}

fn join_lines(lines: impl Iterator<Item = String>) -> String {
    lines.collect::<Vec<_>>().join("\n")
}

fn emit(document: &Document, mut drafts: Vec<Draft>) -> Vec<Chunk> {
    drafts.sort_by_key(|d| (d.start_line, d.end_line));
    drafts
        .into_iter()
        .enumerate()
        .map(|(chunk_index, draft)| Chunk {
            token_count: estimate_tokens(&draft.content),
            content: draft.content,
            start_line: draft.start_line,
            end_line: draft.end_line,
            semantic_role: draft.role,
            unit_name: draft.name,
            parent_class_name: draft.parent_name,
            splitting_method: SplittingMethod::AstBased,
            source_path: document.source_path.clone(),
            chunk_index,
            language: document.file_type.clone(),
            is_async: draft.is_async,
            is_static: draft.is_static,
        })
        .collect()
}

/// Sort units, clamp them into `lo..=hi` and remove line overlaps between siblings
fn normalize(mut units: Vec<AstUnit>, lo: usize, hi: usize) -> Vec<AstUnit> {
    units.sort_by_key(|u| u.start_line);
    let mut out: Vec<AstUnit> = Vec::with_capacity(units.len());
    for mut unit in units {
        let floor = out.last().map(|u| u.end_line + 1).unwrap_or(lo).max(lo);
        unit.start_line = unit.start_line.max(floor);
        unit.end_line = unit.end_line.min(hi);
        if unit.start_line <= unit.end_line {
            out.push(unit);
        }
    }
    out
}

/// Maximal runs of uncovered lines in `lo..=hi`, trimmed of blank edges
fn uncovered_runs(
    lines: &[&str],
    lo: usize,
    hi: usize,
    covered: &BTreeSet<usize>,
) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run: Option<(usize, usize)> = None;

    for n in lo..=hi {
        let blank = lines[n - 1].trim().is_empty();
        if covered.contains(&n) {
            runs.extend(run.take());
        } else if !blank {
            run = Some(match run {
                Some((s, _)) => (s, n),
                None => (n, n),
            });
        }
    }
    runs.extend(run);
    runs
}

fn line_text(lines: &[&str], start: usize, end: usize) -> String {
    lines[start - 1..end].join("\n")
}

fn numbered(lines: &[&str], start: usize, end: usize) -> Vec<(usize, String)> {
    (start..=end).map(|n| (n, lines[n - 1].to_string())).collect()
}
