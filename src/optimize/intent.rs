//! Query intent analysis.
//!
//! Classifies a natural-language query into an intent kind, extracts code
//! entities (file paths, symbols, types, keywords), determines scope, and
//! estimates complexity. All of it is regex/keyword driven; no model call.

use crate::core::{Entity, EntityKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// What the user is trying to accomplish.
///
/// Closed enumeration; unmatched queries default to [`IntentKind::Explain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Fix broken behavior.
    BugFix,
    /// Add new functionality.
    FeatureAdd,
    /// Understand existing code.
    Explain,
    /// Restructure without changing behavior.
    Refactor,
    /// Write or repair tests.
    Test,
    /// Investigate runtime behavior.
    Debug,
}

/// How much of the repository the query concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "path")]
pub enum QueryScope {
    /// The query names exactly one file.
    SingleFile(String),
    /// The query spans several files.
    MultiFile,
    /// The query concerns the repository as a whole.
    RepoWide,
}

/// Analyzed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Intent classification.
    pub kind: IntentKind,
    /// Entities extracted from the query text.
    pub entities: Vec<Entity>,
    /// Scope determination.
    pub scope: QueryScope,
    /// Complexity estimate in `[0, 1]`.
    pub complexity: f32,
    /// Whether the query references earlier conversation turns.
    pub requires_history: bool,
}

/// Language keywords recognized as entities.
const LANGUAGE_KEYWORDS: &[&str] = &[
    "async", "await", "class", "const", "def", "enum", "export", "fn", "func", "function", "impl",
    "import", "interface", "let", "match", "return", "static", "struct", "trait", "type", "var",
];

/// Capitalized words that start sentences far more often than they name
/// types.
const TYPE_STOPWORDS: &[&str] = &[
    "A", "An", "The", "This", "That", "What", "Why", "How", "When", "Where", "Which", "Is", "Are",
    "Can", "Could", "Should", "Would", "Do", "Does", "Fix", "Add", "Explain", "Refactor", "Test",
    "Debug", "Make", "Please", "I", "It", "If",
];

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {{
        static $name: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::expect_used)]
        $name.get_or_init(|| Regex::new($pattern).expect("valid regex"))
    }};
}

/// Regex-driven query analyzer.
///
/// # Examples
///
/// ```
/// use promptpack::optimize::{IntentAnalyzer, IntentKind, QueryScope};
///
/// let analyzer = IntentAnalyzer::new();
/// let intent = analyzer.analyze("fix the crash in auth.ts", &[]);
/// assert_eq!(intent.kind, IntentKind::BugFix);
/// assert_eq!(intent.scope, QueryScope::SingleFile("auth.ts".to_string()));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentAnalyzer;

impl IntentAnalyzer {
    /// Creates an analyzer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Analyzes a query, with optional conversation history (used only for
    /// the complexity estimate).
    #[must_use]
    pub fn analyze(&self, query: &str, history: &[String]) -> QueryIntent {
        let kind = classify(query);
        let entities = extract_entities(query);
        let scope = determine_scope(kind, &entities);
        let complexity = estimate_complexity(query, kind, history);
        let requires_history = references_history(query);

        QueryIntent {
            kind,
            entities,
            scope,
            complexity,
            requires_history,
        }
    }
}

/// Keyword classification, first match wins; default is `Explain`.
fn classify(query: &str) -> IntentKind {
    let checks: [(&Regex, IntentKind); 6] = [
        (
            static_regex!(RE_BUG, r"(?i)\b(fix|bug|broken|crash(es|ed|ing)?|error|fail(s|ed|ing)?|issue)\b"),
            IntentKind::BugFix,
        ),
        (
            static_regex!(RE_DEBUG, r"(?i)\b(debug|trace|investigate|diagnose|reproduce)\b"),
            IntentKind::Debug,
        ),
        (
            static_regex!(RE_TEST, r"(?i)\b(tests?|testing|coverage|spec)\b"),
            IntentKind::Test,
        ),
        (
            static_regex!(RE_REFACTOR, r"(?i)\b(refactor|restructure|simplify|clean\s*up|rename|extract|reorganize)\b"),
            IntentKind::Refactor,
        ),
        (
            static_regex!(RE_FEATURE, r"(?i)\b(add|implement|create|build|support|introduce|feature)\b"),
            IntentKind::FeatureAdd,
        ),
        (
            static_regex!(RE_EXPLAIN, r"(?i)\b(explain|what|how|why|describe|understand|overview|document)\b"),
            IntentKind::Explain,
        ),
    ];

    for (regex, kind) in checks {
        if regex.is_match(query) {
            return kind;
        }
    }
    IntentKind::Explain
}

/// Extracts file, symbol, type, and keyword entities, deduplicated.
fn extract_entities(query: &str) -> Vec<Entity> {
    let file_re = static_regex!(RE_FILE, r"[\w/.-]*[\w-]+\.(?:tsx?|jsx?|py|rs|go|java)\b");
    let camel_re = static_regex!(RE_CAMEL, r"\b[a-z][a-z0-9]*[A-Z]\w*\b");
    let snake_re = static_regex!(RE_SNAKE, r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b");
    let type_re = static_regex!(RE_TYPE, r"\b[A-Z][A-Za-z0-9]*(?:<[^<>]+>)?");

    let mut entities: Vec<Entity> = Vec::new();
    let mut file_spans: Vec<(usize, usize)> = Vec::new();

    for m in file_re.find_iter(query) {
        file_spans.push((m.start(), m.end()));
        push_unique(
            &mut entities,
            Entity::at(EntityKind::File, m.as_str(), m.start()),
        );
    }

    let inside_file = |start: usize, end: usize| {
        file_spans.iter().any(|&(s, e)| start >= s && end <= e)
    };

    for m in camel_re.find_iter(query).chain(snake_re.find_iter(query)) {
        if inside_file(m.start(), m.end()) {
            continue;
        }
        push_unique(
            &mut entities,
            Entity::at(EntityKind::Symbol, m.as_str(), m.start()),
        );
    }

    for m in type_re.find_iter(query) {
        if inside_file(m.start(), m.end()) {
            continue;
        }
        let bare = m.as_str().split('<').next().unwrap_or(m.as_str());
        if bare.len() < 2 || TYPE_STOPWORDS.contains(&bare) {
            continue;
        }
        push_unique(
            &mut entities,
            Entity::at(EntityKind::Type, m.as_str(), m.start()),
        );
    }

    let mut offset = 0;
    for word in query.unicode_words() {
        // unicode_words loses offsets; recover the next occurrence.
        let position = query[offset..].find(word).map(|p| offset + p);
        if let Some(p) = position {
            offset = p + word.len();
        }
        let lower = word.to_lowercase();
        if LANGUAGE_KEYWORDS.contains(&lower.as_str()) {
            push_unique(
                &mut entities,
                Entity {
                    kind: EntityKind::Keyword,
                    value: lower,
                    position,
                },
            );
        }
    }

    entities
}

fn push_unique(entities: &mut Vec<Entity>, entity: Entity) {
    if !entities
        .iter()
        .any(|e| e.kind == entity.kind && e.value == entity.value)
    {
        entities.push(entity);
    }
}

/// Scope rules: exactly one file mention wins; `explain` widens to the
/// whole repository; everything else is multi-file.
fn determine_scope(kind: IntentKind, entities: &[Entity]) -> QueryScope {
    let files: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.kind == EntityKind::File)
        .collect();
    if files.len() == 1 {
        return QueryScope::SingleFile(files[0].value.clone());
    }
    if kind == IntentKind::Explain {
        return QueryScope::RepoWide;
    }
    QueryScope::MultiFile
}

/// Complexity: base 0.5, adjusted by intent, query length, history depth,
/// and architecture-level vocabulary; clamped to `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
fn estimate_complexity(query: &str, kind: IntentKind, history: &[String]) -> f32 {
    let intent_adjustment = match kind {
        IntentKind::BugFix => 0.0,
        IntentKind::FeatureAdd | IntentKind::Debug => 0.1,
        IntentKind::Explain => -0.2,
        IntentKind::Refactor => 0.2,
        IntentKind::Test => -0.1,
    };

    let mut complexity = 0.5 + intent_adjustment;
    complexity += (query.len() as f32 / 1000.0).min(0.2);
    complexity += (history.len() as f32 / 20.0).min(0.2);

    let architecture = static_regex!(RE_ARCH, r"(?i)\b(architecture|design|system|rethink)\b");
    if architecture.is_match(query) {
        complexity += 0.2;
    }

    complexity.clamp(0.0, 1.0)
}

/// Markers that the query leans on earlier conversation turns.
fn references_history(query: &str) -> bool {
    static_regex!(
        RE_HISTORY,
        r"(?i)\b(again|previous(ly)?|earlier|last time|as before|continue|keep going)\b"
    )
    .is_match(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn analyze(query: &str) -> QueryIntent {
        IntentAnalyzer::new().analyze(query, &[])
    }

    #[test_case("fix the auth bug" => IntentKind::BugFix)]
    #[test_case("the server crashes on startup" => IntentKind::BugFix)]
    #[test_case("add pagination support" => IntentKind::FeatureAdd)]
    #[test_case("refactor the storage layer" => IntentKind::Refactor)]
    #[test_case("write tests for the parser" => IntentKind::Test)]
    #[test_case("debug the flaky websocket" => IntentKind::Debug)]
    #[test_case("explain the retry policy" => IntentKind::Explain)]
    #[test_case("pagination strategy notes" => IntentKind::Explain; "unmatched defaults to explain")]
    fn test_classification(query: &str) -> IntentKind {
        analyze(query).kind
    }

    #[test]
    fn test_file_entity_extraction() {
        let intent = analyze("fix the bug in src/auth/service.ts please");
        let files: Vec<&Entity> = intent
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::File)
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].value, "src/auth/service.ts");
        assert!(files[0].position.is_some());
    }

    #[test]
    fn test_symbol_and_type_extraction() {
        let intent = analyze("why does fetchUser return a UserRecord with retry_count unset");
        let symbols: Vec<&str> = intent
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Symbol)
            .map(|e| e.value.as_str())
            .collect();
        assert!(symbols.contains(&"fetchUser"));
        assert!(symbols.contains(&"retry_count"));

        let types: Vec<&str> = intent
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Type)
            .map(|e| e.value.as_str())
            .collect();
        assert!(types.contains(&"UserRecord"));
    }

    #[test]
    fn test_type_stopwords_filtered() {
        let intent = analyze("What does the Parser do");
        let types: Vec<&str> = intent
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Type)
            .map(|e| e.value.as_str())
            .collect();
        assert_eq!(types, vec!["Parser"]);
    }

    #[test]
    fn test_keyword_extraction() {
        let intent = analyze("explain how the async function uses await");
        let keywords: Vec<&str> = intent
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Keyword)
            .map(|e| e.value.as_str())
            .collect();
        assert!(keywords.contains(&"async"));
        assert!(keywords.contains(&"function"));
        assert!(keywords.contains(&"await"));
    }

    #[test]
    fn test_symbols_inside_file_paths_not_duplicated() {
        let intent = analyze("look at user_service.py");
        assert!(
            !intent
                .entities
                .iter()
                .any(|e| e.kind == EntityKind::Symbol && e.value == "user_service")
        );
    }

    #[test]
    fn test_scope_single_file() {
        let intent = analyze("explain auth.ts");
        assert_eq!(intent.scope, QueryScope::SingleFile("auth.ts".to_string()));
    }

    #[test]
    fn test_scope_repo_wide_for_explain() {
        let intent = analyze("explain the indexing architecture");
        assert_eq!(intent.scope, QueryScope::RepoWide);
    }

    #[test]
    fn test_scope_multi_file_otherwise() {
        let intent = analyze("fix validation in auth.ts and session.ts");
        assert_eq!(intent.scope, QueryScope::MultiFile);
    }

    #[test]
    fn test_complexity_adjustments() {
        let explain = analyze("explain the cache");
        let refactor = analyze("refactor the cache");
        assert!(refactor.complexity > explain.complexity);

        let arch = analyze("refactor the system architecture");
        assert!(arch.complexity > refactor.complexity);
    }

    #[test]
    fn test_complexity_clamped() {
        let long_query = format!("refactor the architecture {}", "x".repeat(2000));
        let history: Vec<String> = (0..100).map(|i| format!("turn {i}")).collect();
        let intent = IntentAnalyzer::new().analyze(&long_query, &history);
        assert!(intent.complexity <= 1.0);

        let simple = analyze("explain");
        assert!(simple.complexity >= 0.0);
    }

    #[test]
    fn test_history_contribution() {
        let analyzer = IntentAnalyzer::new();
        let without = analyzer.analyze("fix the bug", &[]);
        let history: Vec<String> = (0..10).map(|i| format!("turn {i}")).collect();
        let with = analyzer.analyze("fix the bug", &history);
        assert!(with.complexity > without.complexity);
    }

    #[test]
    fn test_requires_history() {
        assert!(analyze("do that again like last time").requires_history);
        assert!(!analyze("fix the bug in auth.ts").requires_history);
    }
}
