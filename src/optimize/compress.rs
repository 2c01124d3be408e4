//! Adaptive fragment compression.
//!
//! Three cumulative levels: `light` strips comments, `medium` additionally
//! collapses intra-line whitespace and blank lines, `aggressive` reduces
//! the body to its first and last few lines around the signature. Every
//! output carries a metadata header (path, line range, kind, name, token
//! counts) that is counted in `compressed_tokens`.
//!
//! A quality gate protects meaning: the signature line must survive
//! unchanged and every exported name must still occur in the output. A
//! level that fails the gate falls back one level; `light` always passes.

use crate::core::{Fragment, HeuristicEstimator, TokenEstimator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Compression level, cumulative from light to aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Strip comments, preserving string literals.
    Light,
    /// Light plus whitespace collapsing.
    Medium,
    /// Medium plus body elision around the signature.
    Aggressive,
}

impl CompressionLevel {
    /// The next weaker level, if any.
    #[must_use]
    pub const fn weaker(self) -> Option<Self> {
        match self {
            Self::Aggressive => Some(Self::Medium),
            Self::Medium => Some(Self::Light),
            Self::Light => None,
        }
    }
}

/// A fragment after compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedFragment {
    /// The source fragment.
    pub original: Fragment,
    /// Compressed text, header included.
    pub content: String,
    /// Token estimate of the fragment as it would be emitted uncompressed
    /// (header included).
    pub original_tokens: usize,
    /// Token estimate of `content`.
    pub compressed_tokens: usize,
    /// Level that actually produced the output (after gate fallback).
    pub level: CompressionLevel,
}

impl CompressedFragment {
    /// Compression ratio in `(0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        self.compressed_tokens as f64 / self.original_tokens as f64
    }
}

/// Signature-preserving compressor.
///
/// # Examples
///
/// ```
/// use promptpack::core::{Fragment, FragmentKind};
/// use promptpack::optimize::{CompressionLevel, Compressor};
///
/// let frag = Fragment::new(
///     "/r/a.ts",
///     "greet",
///     FragmentKind::Function,
///     1,
///     4,
///     "function greet() {\n  // say hi\n  return 'hi';\n}",
///     "typescript",
/// );
/// let compressed = Compressor::new().compress(&frag, CompressionLevel::Light);
/// assert!(!compressed.content.contains("say hi"));
/// assert!(compressed.compressed_tokens <= compressed.original_tokens);
/// ```
pub struct Compressor {
    estimator: Arc<dyn TokenEstimator>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    /// Creates a compressor with the default token estimator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            estimator: Arc::new(HeuristicEstimator),
        }
    }

    /// Injects a tokenizer consistent with the rest of the request.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Compresses a fragment at the requested level, falling back one level
    /// at a time when the quality gate rejects the output.
    #[must_use]
    pub fn compress(&self, fragment: &Fragment, level: CompressionLevel) -> CompressedFragment {
        let mut attempt = level;
        loop {
            let body = apply_level(&fragment.content, &fragment.language, attempt);
            if passes_gate(fragment, &body) || attempt.weaker().is_none() {
                return self.finish(fragment, body, attempt);
            }
            // Gate failed; retry one level lower. Light always terminates
            // the loop above.
            attempt = attempt.weaker().unwrap_or(attempt);
        }
    }

    fn finish(
        &self,
        fragment: &Fragment,
        body: String,
        level: CompressionLevel,
    ) -> CompressedFragment {
        // Provisional counts for the header text; the stored counts are
        // computed over the final output below.
        let body_tokens = self.estimator.estimate(&body);
        let raw_tokens = self.estimator.estimate(&fragment.content);
        let header = header_for(fragment, body_tokens, raw_tokens);

        let content = format!("{header}\n{body}");
        let compressed_tokens = self.estimator.estimate(&content);
        let original_tokens = self
            .estimator
            .estimate(&format!("{header}\n{}", fragment.content))
            .max(compressed_tokens);

        CompressedFragment {
            original: fragment.clone(),
            content,
            original_tokens,
            compressed_tokens,
            level,
        }
    }
}

/// Metadata header: source location, construct, and token accounting.
fn header_for(fragment: &Fragment, compressed_tokens: usize, original_tokens: usize) -> String {
    let reduction = if original_tokens > 0 && compressed_tokens <= original_tokens {
        100 - (compressed_tokens * 100 / original_tokens.max(1))
    } else {
        0
    };
    format!(
        "// {}:{}-{} {} {}\n// {} of {} tokens ({reduction}% reduction)",
        fragment.file_path,
        fragment.start_line,
        fragment.end_line,
        fragment.kind.as_str(),
        fragment.name,
        compressed_tokens,
        original_tokens,
    )
}

/// Signature preservation plus export survival.
fn passes_gate(fragment: &Fragment, body: &str) -> bool {
    let original_signature = fragment.content.lines().find(|l| !l.trim().is_empty());
    let body_signature = body.lines().find(|l| !l.trim().is_empty());
    match (original_signature, body_signature) {
        (Some(original), Some(kept)) => {
            if original.trim_end() != kept.trim_end() {
                return false;
            }
        }
        (Some(_), None) => return false,
        (None, _) => {}
    }

    fragment
        .metadata
        .exports
        .iter()
        .all(|name| body.contains(name.as_str()))
}

fn apply_level(content: &str, language: &str, level: CompressionLevel) -> String {
    let light = strip_comments(content, language);
    if level == CompressionLevel::Light {
        return light;
    }

    let medium = collapse_whitespace(&light);
    if level == CompressionLevel::Medium {
        return medium;
    }

    elide_body(&medium, language)
}

/// Removes line and block comments while preserving string literals.
fn strip_comments(content: &str, language: &str) -> String {
    let hash_comments = language == "python";
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;

    let mut in_string: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];

        if let Some(delim) = in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == delim {
                in_string = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                in_string = Some(c);
                out.push(c);
                i += 1;
            }
            '#' if hash_comments => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if !hash_comments && i + 1 < chars.len() && chars[i + 1] == '/' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if !hash_comments && i + 1 < chars.len() && chars[i + 1] == '*' => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    // Comment-only lines disappear entirely; surviving lines keep their
    // shape apart from trailing whitespace.
    out.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Collapses runs of spaces and tabs to single spaces outside string
/// literals, keeping line structure.
fn collapse_whitespace(content: &str) -> String {
    content
        .lines()
        .map(collapse_line)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<String>>()
        .join("\n")
}

fn collapse_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_string: Option<char> = None;
    let mut pending_space = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(delim) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            if c == delim {
                in_string = None;
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                in_string = Some(c);
                out.push(c);
            }
            ' ' | '\t' => pending_space = true,
            _ => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }

    out
}

/// Keeps the signature plus the first and last `n` body lines, where
/// `n = min(3, body_lines / 2)`. Falls back to the full text when elision
/// would not shorten it (short bodies plus the marker line).
fn elide_body(content: &str, language: &str) -> String {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some((signature, body)) = lines.split_first() else {
        return String::new();
    };

    let full = lines.join("\n");
    let n = (body.len() / 2).min(3);
    if body.len() <= n * 2 {
        return full;
    }

    let marker = if language == "python" { "# …" } else { "// …" };
    let mut kept: Vec<&str> = vec![signature];
    kept.extend(&body[..n]);
    kept.push(marker);
    kept.extend(&body[body.len() - n..]);
    let elided = kept.join("\n");

    if elided.len() < full.len() { elided } else { full }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FragmentKind, FragmentMetadata};
    use proptest::prelude::*;

    fn ts_fragment(content: &str) -> Fragment {
        Fragment::new(
            "/repo/src/svc.ts",
            "handler",
            FragmentKind::Function,
            10,
            30,
            content,
            "typescript",
        )
    }

    const SAMPLE: &str = r#"function handler(req) {
  // validate the request
  const token = req.headers['x-token'];
  /* legacy block
     comment */
  if (!token) {
    return null;
  }
  const url = "https://example.com/api"; // keep string
  return fetch(url, { token });
}"#;

    #[test]
    fn test_light_strips_comments_preserves_strings() {
        let out = apply_level(SAMPLE, "typescript", CompressionLevel::Light);
        assert!(!out.contains("validate the request"));
        assert!(!out.contains("legacy block"));
        assert!(!out.contains("keep string"));
        assert!(out.contains("https://example.com/api"));
        assert!(out.contains("function handler(req) {"));
    }

    #[test]
    fn test_python_hash_comments() {
        let src = "def run():\n    # setup\n    x = '# not a comment'\n    return x\n";
        let out = apply_level(src, "python", CompressionLevel::Light);
        assert!(!out.contains("setup"));
        assert!(out.contains("'# not a comment'"));
    }

    #[test]
    fn test_medium_collapses_whitespace() {
        let src = "function f() {\n    const a    =     1;\n\n    return a;\n}";
        let out = apply_level(src, "typescript", CompressionLevel::Medium);
        assert!(out.contains("const a = 1;"));
        assert!(!out.contains("\n\n"));
        // Line structure survives.
        assert!(out.lines().count() >= 3);
    }

    #[test]
    fn test_medium_preserves_string_spacing() {
        let src = "const msg = 'two  spaces';";
        let out = collapse_line(src);
        assert!(out.contains("'two  spaces'"));
    }

    #[test]
    fn test_aggressive_keeps_signature_and_edges() {
        let mut src = String::from("function long() {\n");
        for i in 0..20 {
            src.push_str(&format!("  const v{i} = {i};\n"));
        }
        src.push('}');

        let out = apply_level(&src, "typescript", CompressionLevel::Aggressive);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "function long() {");
        assert!(lines.contains(&"// …"));
        // signature + 3 head + marker + 3 tail
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_aggressive_small_body_unchanged() {
        let src = "function tiny() {\n  return 1;\n}";
        let out = apply_level(src, "typescript", CompressionLevel::Aggressive);
        assert_eq!(out.lines().count(), 3);
        assert!(!out.contains('…'));
    }

    #[test]
    fn test_compress_monotonic_levels() {
        let frag = ts_fragment(SAMPLE);
        let compressor = Compressor::new();

        let light = compressor.compress(&frag, CompressionLevel::Light);
        let medium = compressor.compress(&frag, CompressionLevel::Medium);
        let aggressive = compressor.compress(&frag, CompressionLevel::Aggressive);

        assert!(light.compressed_tokens >= medium.compressed_tokens);
        assert!(medium.compressed_tokens >= aggressive.compressed_tokens);
        for c in [&light, &medium, &aggressive] {
            assert!(c.compressed_tokens > 0);
            assert!(c.compressed_tokens <= c.original_tokens);
            assert!(c.ratio() > 0.0 && c.ratio() <= 1.0);
        }
    }

    #[test]
    fn test_header_present_and_counted() {
        let frag = ts_fragment(SAMPLE);
        let compressed = Compressor::new().compress(&frag, CompressionLevel::Medium);

        let mut lines = compressed.content.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with("// /repo/src/svc.ts:10-30 function handler"));
        let second = lines.next().unwrap();
        assert!(second.contains("tokens"));
        assert!(second.contains("% reduction"));
    }

    #[test]
    fn test_first_non_header_line_is_signature() {
        let frag = ts_fragment(SAMPLE);
        let compressed = Compressor::new().compress(&frag, CompressionLevel::Aggressive);

        let body_first = compressed
            .content
            .lines()
            .skip(2)
            .find(|l| !l.trim().is_empty())
            .unwrap();
        let original_first = frag.content.lines().find(|l| !l.trim().is_empty()).unwrap();
        assert_eq!(body_first.trim_end(), original_first.trim_end());
    }

    #[test]
    fn test_gate_falls_back_when_exports_lost() {
        // The export only occurs in the middle of a long body, where
        // aggressive elision would drop it.
        let mut src = String::from("function outer() {\n");
        for i in 0..10 {
            src.push_str(&format!("  const pad{i} = {i};\n"));
        }
        src.push_str("  const SpecialExport = 1;\n");
        for i in 10..20 {
            src.push_str(&format!("  const pad{i} = {i};\n"));
        }
        src.push('}');

        let frag = ts_fragment(&src).with_metadata(FragmentMetadata {
            exports: vec!["SpecialExport".to_string()],
            ..Default::default()
        });

        let compressed = Compressor::new().compress(&frag, CompressionLevel::Aggressive);
        assert!(compressed.level < CompressionLevel::Aggressive);
        assert!(compressed.content.contains("SpecialExport"));
    }

    #[test]
    fn test_empty_fragment_compresses_without_panic() {
        let frag = ts_fragment("");
        let compressed = Compressor::new().compress(&frag, CompressionLevel::Aggressive);
        assert!(compressed.compressed_tokens > 0);
        assert!(compressed.compressed_tokens <= compressed.original_tokens);
    }

    proptest! {
        #[test]
        fn prop_compression_invariants(
            body_lines in proptest::collection::vec("[a-z =+0-9(){};]{0,60}", 1..40),
            level in prop_oneof![
                Just(CompressionLevel::Light),
                Just(CompressionLevel::Medium),
                Just(CompressionLevel::Aggressive),
            ],
        ) {
            let content = format!("function gen() {{\n{}\n}}", body_lines.join("\n"));
            let frag = ts_fragment(&content);
            let compressed = Compressor::new().compress(&frag, level);

            prop_assert!(compressed.compressed_tokens > 0);
            prop_assert!(compressed.compressed_tokens <= compressed.original_tokens);
            let ratio = compressed.ratio();
            prop_assert!(ratio > 0.0 && ratio <= 1.0);
        }
    }
}
