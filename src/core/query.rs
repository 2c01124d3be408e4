//! Query-side types: embedded queries, extracted entities, and the scoring
//! context for a single optimization request.

use serde::{Deserialize, Serialize};

/// Sliding-window cap on usage history. Frequency scoring reads at most this
/// many trailing entries, bounding the reinforcement feedback loop.
pub const MAX_USAGE_HISTORY: usize = 10_000;

/// The kind of entity extracted from a query.
///
/// Closed enumeration; see [`crate::core::FragmentKind`] for the same
/// breaking-change contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Code identifier (camelCase, PascalCase, snake_case).
    Symbol,
    /// File path.
    File,
    /// Type name (capitalized, optional generic parameters).
    Type,
    /// Language keyword.
    Keyword,
}

/// An entity extracted from query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind.
    pub kind: EntityKind,
    /// The extracted text.
    pub value: String,
    /// Byte position in the query, when known.
    pub position: Option<usize>,
}

impl Entity {
    /// Creates an entity without position information.
    #[must_use]
    pub fn new(kind: EntityKind, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            position: None,
        }
    }

    /// Creates an entity at a byte position in the query.
    #[must_use]
    pub fn at(kind: EntityKind, value: &str, position: usize) -> Self {
        Self {
            kind,
            value: value.to_string(),
            position: Some(position),
        }
    }
}

/// A query together with its embedding and extracted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEmbedding {
    /// Raw query text.
    pub text: String,
    /// Embedding of the query.
    pub vector: Vec<f32>,
    /// Entities extracted from the text.
    pub entities: Vec<Entity>,
}

impl QueryEmbedding {
    /// Creates a query embedding.
    #[must_use]
    pub fn new(text: &str, vector: Vec<f32>, entities: Vec<Entity>) -> Self {
        Self {
            text: text.to_string(),
            vector,
            entities,
        }
    }
}

/// One recorded use of a fragment in an assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Fragment that was used.
    pub fragment_id: String,
    /// When it was used (ms since epoch).
    pub timestamp: u64,
    /// Whether the caller judged it helpful.
    pub helpful: bool,
}

/// Per-request environmental context consumed by the relevance scorer.
///
/// # Examples
///
/// ```
/// use promptpack::core::ScoringContext;
///
/// let mut ctx = ScoringContext::new(1_700_000_000_000)
///     .with_current_file("/repo/src/auth.ts");
/// ctx.record_usage("abc123", 1_700_000_000_000, true);
/// assert_eq!(ctx.usage_history.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringContext {
    /// File the user is working in, when known.
    pub current_file: Option<String>,

    /// Working directory, used as a proximity fallback.
    pub cwd: Option<String>,

    /// Current timestamp (ms since epoch).
    pub now: u64,

    /// Append-only usage history, capped to [`MAX_USAGE_HISTORY`] entries.
    pub usage_history: Vec<UsageEvent>,
}

impl ScoringContext {
    /// Creates a context at the given timestamp.
    #[must_use]
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: now_ms,
            ..Default::default()
        }
    }

    /// Sets the file the user is working in.
    #[must_use]
    pub fn with_current_file(mut self, path: &str) -> Self {
        self.current_file = Some(path.to_string());
        self
    }

    /// Sets the working-directory fallback.
    #[must_use]
    pub fn with_cwd(mut self, path: &str) -> Self {
        self.cwd = Some(path.to_string());
        self
    }

    /// Appends a usage event, evicting the oldest entries beyond the
    /// sliding-window cap.
    pub fn record_usage(&mut self, fragment_id: &str, timestamp: u64, helpful: bool) {
        self.usage_history.push(UsageEvent {
            fragment_id: fragment_id.to_string(),
            timestamp,
            helpful,
        });
        if self.usage_history.len() > MAX_USAGE_HISTORY {
            let excess = self.usage_history.len() - MAX_USAGE_HISTORY;
            self.usage_history.drain(..excess);
        }
    }

    /// The proximity anchor: `current_file` when set, else `cwd`.
    #[must_use]
    pub fn proximity_anchor(&self) -> Option<&str> {
        self.current_file.as_deref().or(self.cwd.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_constructors() {
        let e = Entity::new(EntityKind::Symbol, "fetchUser");
        assert_eq!(e.kind, EntityKind::Symbol);
        assert!(e.position.is_none());

        let e = Entity::at(EntityKind::File, "src/auth.ts", 12);
        assert_eq!(e.position, Some(12));
    }

    #[test]
    fn test_scoring_context_builder() {
        let ctx = ScoringContext::new(42)
            .with_current_file("/a/b.ts")
            .with_cwd("/a");
        assert_eq!(ctx.now, 42);
        assert_eq!(ctx.proximity_anchor(), Some("/a/b.ts"));
    }

    #[test]
    fn test_proximity_anchor_falls_back_to_cwd() {
        let ctx = ScoringContext::new(0).with_cwd("/work");
        assert_eq!(ctx.proximity_anchor(), Some("/work"));

        let ctx = ScoringContext::new(0);
        assert_eq!(ctx.proximity_anchor(), None);
    }

    #[test]
    fn test_usage_history_sliding_window() {
        let mut ctx = ScoringContext::new(0);
        for i in 0..(MAX_USAGE_HISTORY + 50) {
            ctx.record_usage("frag", i as u64, i % 2 == 0);
        }
        assert_eq!(ctx.usage_history.len(), MAX_USAGE_HISTORY);
        // Oldest entries were evicted, newest kept.
        assert_eq!(
            ctx.usage_history.last().map(|e| e.timestamp),
            Some((MAX_USAGE_HISTORY + 49) as u64)
        );
    }

    #[test]
    fn test_query_embedding_serialization() {
        let q = QueryEmbedding::new(
            "fix the auth bug",
            vec![0.5, -0.5],
            vec![Entity::new(EntityKind::Keyword, "auth")],
        );
        let json = serde_json::to_string(&q).unwrap();
        let back: QueryEmbedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
