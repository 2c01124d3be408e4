//! Fragment extraction.
//!
//! Turns a source file into an ordered sequence of fragments, one per
//! semantic unit (function, class, method, top-level variable, interface).
//! Construct starts are located with per-language regex patterns; parsing
//! proceeds through syntax errors and only fails on invalid UTF-8 or an
//! unrecognized language. Units that exceed the target token size are
//! subdivided along line boundaries with a configurable overlap.

mod imports;
mod language;

pub use language::Language;

use crate::core::{Fragment, FragmentKind, FragmentMetadata, HeuristicEstimator, TokenEstimator};
use crate::error::{ParseError, Result};
use imports::FileImports;
use language::ConstructRole;

/// Default target tokens per fragment.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Default token overlap between adjacent pieces of a subdivided unit.
pub const DEFAULT_OVERLAP: usize = 128;

/// Extracts fragments from source files.
///
/// # Examples
///
/// ```
/// use promptpack::extract::{ChunkExtractor, Language};
///
/// let extractor = ChunkExtractor::new();
/// let src = b"export function greet(name: string) {\n  return `hi ${name}`;\n}\n";
/// let fragments = extractor.extract("/repo/src/greet.ts", src, Language::TypeScript).unwrap();
/// assert_eq!(fragments.len(), 1);
/// assert_eq!(fragments[0].name, "greet");
/// ```
#[derive(Debug, Clone)]
pub struct ChunkExtractor {
    /// Target tokens per fragment.
    chunk_size: usize,
    /// Token overlap between adjacent pieces of an oversized unit.
    overlap: usize,
}

impl Default for ChunkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// A construct located in the source, before region resolution.
struct Construct {
    /// 0-based line of the construct start.
    line: usize,
    /// Indentation width of the start line.
    indent: usize,
    role: ConstructRole,
    name: String,
    /// Whether this construct can parent methods.
    method_parent: bool,
    exported: bool,
}

impl ChunkExtractor {
    /// Creates an extractor with default chunk sizing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }

    /// Creates an extractor with custom chunk size and overlap (tokens).
    #[must_use]
    pub const fn with_sizes(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Extracts fragments from a file, detecting the language by extension.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnsupportedLanguage`] when the extension maps to
    /// no known language, or [`ParseError::InvalidUtf8`] for non-UTF-8 bytes.
    pub fn extract_path(&self, path: &str, bytes: &[u8]) -> Result<Vec<Fragment>> {
        let language = Language::from_path(path).ok_or_else(|| ParseError::UnsupportedLanguage {
            path: path.to_string(),
        })?;
        self.extract(path, bytes, language)
    }

    /// Extracts fragments from a file with a known language.
    ///
    /// Returns an empty vector when the file contains no recognizable
    /// constructs; never fails on syntax errors.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUtf8`] for non-UTF-8 bytes.
    pub fn extract(&self, path: &str, bytes: &[u8], language: Language) -> Result<Vec<Fragment>> {
        let content = std::str::from_utf8(bytes).map_err(|e| ParseError::InvalidUtf8 {
            path: path.to_string(),
            offset: e.valid_up_to(),
        })?;

        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let constructs = scan_constructs(content, language);
        let file_imports = imports::parse_imports(content, language);

        let mut fragments = Vec::new();
        for (idx, construct) in constructs.iter().enumerate() {
            let ConstructRole::Emit(kind) = construct.role else {
                continue;
            };
            let end = region_end(&constructs, idx, lines.len());
            let (kind, name) = resolve_method(&constructs, idx, kind);
            self.emit_unit(
                path,
                language,
                &lines,
                construct,
                kind,
                &name,
                end,
                &file_imports,
                &mut fragments,
            );
        }

        fragments.sort_by_key(|f| (f.start_line, f.end_line));
        Ok(fragments)
    }

    /// Emits one semantic unit, subdividing it when it exceeds the target
    /// token size.
    #[allow(clippy::too_many_arguments)]
    fn emit_unit(
        &self,
        path: &str,
        language: Language,
        lines: &[&str],
        construct: &Construct,
        kind: FragmentKind,
        name: &str,
        end: usize,
        file_imports: &FileImports,
        out: &mut Vec<Fragment>,
    ) {
        // Trim trailing blank lines off the region.
        let mut end = end;
        while end > construct.line + 1 && lines[end - 1].trim().is_empty() {
            end -= 1;
        }

        let signature = lines[construct.line].trim().to_string();
        let pieces = subdivide(lines, construct.line, end, self.chunk_size, self.overlap);

        for (piece_idx, (start, stop)) in pieces.iter().enumerate() {
            let text = lines[*start..*stop].join("\n");
            if text.trim().is_empty() {
                continue;
            }

            let first_piece = piece_idx == 0;
            let metadata = FragmentMetadata {
                exports: if first_piece && construct.exported {
                    vec![name.to_string()]
                } else {
                    Vec::new()
                },
                imports: referenced_imports(&text, file_imports),
                dependencies: referenced_modules(&text, file_imports),
                ..Default::default()
            };

            #[allow(clippy::cast_possible_truncation)]
            let mut fragment = Fragment::new(
                path,
                name,
                kind,
                (*start + 1) as u32,
                *stop as u32,
                &text,
                language.as_str(),
            )
            .with_metadata(metadata);

            if first_piece && matches!(kind, FragmentKind::Function | FragmentKind::Method) {
                fragment = fragment.with_signature(&signature);
            }

            out.push(fragment);
        }
    }
}

/// Control-flow keywords that the looser method patterns would otherwise
/// misread as construct names.
const NAME_BLOCKLIST: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "do", "try", "new", "await",
    "typeof", "throw", "yield",
];

/// Locates every construct start, deduplicated by line with pattern
/// precedence (earlier patterns win).
fn scan_constructs(content: &str, language: Language) -> Vec<Construct> {
    let line_starts = line_start_offsets(content);
    let mut constructs: Vec<Construct> = Vec::new();

    for pattern in language.construct_patterns() {
        for cap in pattern.regex.captures_iter(content) {
            let Some(whole) = cap.get(0) else { continue };
            let Some(name) = cap.name("name") else {
                continue;
            };
            if NAME_BLOCKLIST.contains(&name.as_str()) {
                continue;
            }
            let line = offset_to_line(&line_starts, whole.start());
            // Patterns run in precedence order; the first claim on a line wins.
            if constructs.iter().any(|c| c.line == line) {
                continue;
            }

            let indent = cap.name("indent").map_or(0, |m| m.as_str().len());
            let line_text = content[line_starts[line]..]
                .lines()
                .next()
                .unwrap_or_default();

            constructs.push(Construct {
                line,
                indent,
                role: pattern.role,
                name: name.as_str().to_string(),
                method_parent: pattern.method_parent,
                exported: is_exported(line_text, name.as_str(), indent, language),
            });
        }
    }

    constructs.sort_by_key(|c| c.line);
    constructs
}

/// Whether the construct is visible outside the file, by language rule.
fn is_exported(line_text: &str, name: &str, indent: usize, language: Language) -> bool {
    match language {
        Language::TypeScript | Language::JavaScript => line_text.trim_start().starts_with("export"),
        Language::Python => indent == 0 && !name.starts_with('_'),
        Language::Rust => line_text.trim_start().starts_with("pub"),
        Language::Go => name.chars().next().is_some_and(char::is_uppercase),
        Language::Java => line_text.contains("public"),
    }
}

/// End line (exclusive) of the construct at `idx`: the next construct at the
/// same or shallower indentation, else end of file.
fn region_end(constructs: &[Construct], idx: usize, total_lines: usize) -> usize {
    let indent = constructs[idx].indent;
    constructs[idx + 1..]
        .iter()
        .find(|c| c.indent <= indent)
        .map_or(total_lines, |c| c.line)
}

/// Reclassifies an indented function as a method of the nearest enclosing
/// class/trait/impl and qualifies its name (`Parent.name`).
fn resolve_method(
    constructs: &[Construct],
    idx: usize,
    kind: FragmentKind,
) -> (FragmentKind, String) {
    let construct = &constructs[idx];
    let name = construct.name.clone();

    if !matches!(kind, FragmentKind::Function | FragmentKind::Method) || construct.indent == 0 {
        return (kind, name);
    }

    // Nearest preceding construct at shallower indentation decides the
    // context; anything non-parenting (e.g. an outer function) breaks it.
    let parent = constructs[..idx]
        .iter()
        .rev()
        .find(|c| c.indent < construct.indent);

    match parent {
        Some(p) if p.method_parent => {
            let parent_name = p.name.rsplit("::").next().unwrap_or(&p.name);
            (FragmentKind::Method, format!("{parent_name}.{name}"))
        }
        _ => (kind, name),
    }
}

/// Splits a region into pieces of at most `chunk_size` estimated tokens,
/// breaking at line boundaries with `overlap` tokens of context carried into
/// each following piece. Returns `(start, stop)` line ranges (stop exclusive).
fn subdivide(
    lines: &[&str],
    start: usize,
    end: usize,
    chunk_size: usize,
    overlap: usize,
) -> Vec<(usize, usize)> {
    let estimator = HeuristicEstimator;
    let total: usize = lines[start..end].iter().map(|l| estimator.estimate(l)).sum();
    if total <= chunk_size || chunk_size == 0 {
        return vec![(start, end)];
    }

    let mut pieces = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let mut spent = 0;
        let mut stop = cursor;
        while stop < end {
            let cost = estimator.estimate(lines[stop]);
            if spent + cost > chunk_size && stop > cursor {
                break;
            }
            spent += cost;
            stop += 1;
        }
        pieces.push((cursor, stop));
        if stop >= end {
            break;
        }

        // Walk back far enough to carry ~overlap tokens into the next piece.
        let mut back = stop;
        let mut carried = 0;
        while back > cursor + 1 && carried < overlap {
            back -= 1;
            carried += estimator.estimate(lines[back]);
        }
        cursor = if back > cursor { back } else { stop };
    }

    pieces
}

/// Names from the file's imports that the fragment text references.
fn referenced_imports(text: &str, file_imports: &FileImports) -> Vec<String> {
    file_imports
        .bindings
        .iter()
        .filter(|b| contains_identifier(text, &b.name))
        .map(|b| b.name.clone())
        .collect()
}

/// Modules backing the referenced imports, deduplicated in first-use order.
fn referenced_modules(text: &str, file_imports: &FileImports) -> Vec<String> {
    let mut modules = Vec::new();
    for binding in &file_imports.bindings {
        if contains_identifier(text, &binding.name) && !modules.contains(&binding.module) {
            modules.push(binding.module.clone());
        }
    }
    modules
}

/// Whole-identifier containment: `name` occurs in `text` not surrounded by
/// identifier characters.
fn contains_identifier(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(pos) = text[search_from..].find(name) {
        let abs = search_from + pos;
        let before_ok = abs == 0 || !is_ident_byte(bytes[abs - 1]);
        let after = abs + name.len();
        let after_ok = after >= bytes.len() || !is_ident_byte(bytes[after]);
        if before_ok && after_ok {
            return true;
        }
        search_from = abs + 1;
    }
    false
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte offsets of each line start.
fn line_start_offsets(content: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' && i + 1 < content.len() {
            starts.push(i + 1);
        }
    }
    starts
}

/// Binary-searches the line containing a byte offset.
fn offset_to_line(line_starts: &[usize], offset: usize) -> usize {
    match line_starts.binary_search(&offset) {
        Ok(line) => line,
        Err(insertion) => insertion.saturating_sub(1),
    }
}
