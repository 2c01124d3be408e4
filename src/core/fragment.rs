//! Fragment representation.
//!
//! A fragment is one semantically meaningful code region: a function, class,
//! method, top-level variable, or interface. Fragments are created by the
//! extractor, carry an optional embedding once the embedder has run, and are
//! superseded (never mutated in place) when their source file changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of construct a fragment captures.
///
/// This is a closed enumeration: the persistent store encodes it by name,
/// so adding a variant is a breaking change to stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// Free function.
    Function,
    /// Class declaration (body included).
    Class,
    /// Method inside a class or impl block.
    Method,
    /// Top-level variable or constant.
    Variable,
    /// Interface or trait declaration.
    Interface,
}

impl FragmentKind {
    /// Returns the lowercase name used in stored data and prompt headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Interface => "interface",
        }
    }

    /// Parses a stored kind name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "method" => Some(Self::Method),
            "variable" => Some(Self::Variable),
            "interface" => Some(Self::Interface),
            _ => None,
        }
    }
}

/// Structural metadata extracted alongside a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    /// Names the fragment introduces that are visible outside it.
    pub exports: Vec<String>,

    /// Names the fragment references from outside itself.
    pub imports: Vec<String>,

    /// File paths or module identifiers the fragment has an external
    /// reference to.
    pub dependencies: Vec<String>,

    /// Open extension map for extractor-specific annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

/// A semantically meaningful code region.
///
/// # Examples
///
/// ```
/// use promptpack::core::{Fragment, FragmentKind};
///
/// let frag = Fragment::new(
///     "/repo/src/auth.ts",
///     "validateToken",
///     FragmentKind::Function,
///     10,
///     24,
///     "function validateToken(t: string) {\n  return t.length > 0;\n}",
///     "typescript",
/// );
/// assert_eq!(frag.line_count(), 15);
/// assert!(!frag.id.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable deterministic digest of `(file_path, content, line range)`.
    pub id: String,

    /// Absolute path of the source file.
    pub file_path: String,

    /// Human-readable identifier (e.g. `"UserService.fetchUser"`); falls
    /// back to `"lines-<start>-<end>"` for anonymous regions.
    pub name: String,

    /// Construct kind.
    pub kind: FragmentKind,

    /// Inclusive 1-indexed first line.
    pub start_line: u32,

    /// Inclusive 1-indexed last line.
    pub end_line: u32,

    /// Raw source text of the region.
    pub content: String,

    /// Type signature for functions and methods, when available.
    pub signature: Option<String>,

    /// Language identifier (e.g. `"typescript"`, `"python"`).
    pub language: String,

    /// Embedding vector; absent until the embedder has run.
    pub embedding: Option<Vec<f32>>,

    /// Source file modification time in milliseconds since the epoch,
    /// observed when the fragment was indexed.
    pub last_modified: Option<u64>,

    /// Structural metadata.
    pub metadata: FragmentMetadata,
}

impl Fragment {
    /// Creates a fragment, computing its deterministic id.
    ///
    /// Line numbers are clamped so that `start_line >= 1` and
    /// `end_line >= start_line` always hold.
    #[must_use]
    pub fn new(
        file_path: &str,
        name: &str,
        kind: FragmentKind,
        start_line: u32,
        end_line: u32,
        content: &str,
        language: &str,
    ) -> Self {
        let start_line = start_line.max(1);
        let end_line = end_line.max(start_line);
        Self {
            id: fragment_id(file_path, content, start_line, end_line),
            file_path: file_path.to_string(),
            name: name.to_string(),
            kind,
            start_line,
            end_line,
            content: content.to_string(),
            signature: None,
            language: language.to_string(),
            embedding: None,
            last_modified: None,
            metadata: FragmentMetadata::default(),
        }
    }

    /// Creates an anonymous fragment named by its line range.
    #[must_use]
    pub fn anonymous(
        file_path: &str,
        kind: FragmentKind,
        start_line: u32,
        end_line: u32,
        content: &str,
        language: &str,
    ) -> Self {
        let name = format!("lines-{start_line}-{end_line}");
        Self::new(
            file_path, &name, kind, start_line, end_line, content, language,
        )
    }

    /// Sets the type signature.
    #[must_use]
    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Sets the structural metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: FragmentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the source-file modification time (ms since epoch).
    #[must_use]
    pub const fn with_last_modified(mut self, mtime_ms: u64) -> Self {
        self.last_modified = Some(mtime_ms);
        self
    }

    /// Number of lines the fragment spans.
    #[must_use]
    pub const fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }

    /// Whether an embedding has been attached.
    #[must_use]
    pub const fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Attaches an embedding vector.
    pub fn set_embedding(&mut self, vector: Vec<f32>) {
        self.embedding = Some(vector);
    }
}

/// Computes the stable fragment id.
///
/// The id is a pure function of its inputs: the same path, content, and line
/// range always produce the same id, across processes and releases. xxh3 is
/// used for its stable specification (the std hasher is not guaranteed
/// stable across Rust versions).
#[must_use]
pub fn fragment_id(file_path: &str, content: &str, start_line: u32, end_line: u32) -> String {
    let mut buf = Vec::with_capacity(file_path.len() + content.len() + 10);
    buf.extend_from_slice(file_path.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&start_line.to_le_bytes());
    buf.extend_from_slice(&end_line.to_le_bytes());
    buf.push(0);
    buf.extend_from_slice(content.as_bytes());
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(&buf))
}
