//! Language detection and construct patterns.
//!
//! Each supported language contributes a set of anchored regex patterns that
//! locate construct starts (functions, classes, methods, variables,
//! interfaces). Adding a language means adding a variant here plus its
//! pattern set; detection is by file extension.

use crate::core::FragmentKind;
use regex::Regex;
use std::sync::OnceLock;

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// TypeScript (including TSX).
    TypeScript,
    /// JavaScript (including JSX).
    JavaScript,
    /// Python.
    Python,
    /// Rust.
    Rust,
    /// Go.
    Go,
    /// Java.
    Java,
}

impl Language {
    /// Detects a language from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" | "pyw" | "pyi" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    /// Detects a language from a file path.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        path.rsplit('.').next().and_then(Self::from_extension)
    }

    /// Returns the identifier stored on fragments (e.g. `"typescript"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
        }
    }

    /// Returns the construct patterns for this language, in precedence
    /// order: when two patterns match the same line, the earlier one wins.
    pub(crate) fn construct_patterns(self) -> &'static [ConstructPattern] {
        match self {
            Self::TypeScript => ts_patterns(),
            Self::JavaScript => js_patterns(),
            Self::Python => python_patterns(),
            Self::Rust => rust_patterns(),
            Self::Go => go_patterns(),
            Self::Java => java_patterns(),
        }
    }

    /// Line-comment prefixes for this language.
    #[must_use]
    pub const fn line_comment(self) -> &'static str {
        match self {
            Self::Python => "#",
            _ => "//",
        }
    }
}

/// How a matched construct should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConstructRole {
    /// Emit a fragment of the given kind.
    Emit(FragmentKind),
    /// Do not emit, but mark a method context (Rust `impl` blocks).
    Context,
}

/// One construct-start pattern.
pub(crate) struct ConstructPattern {
    /// Role of a match.
    pub role: ConstructRole,
    /// Anchored multiline regex with `name` (and optional `indent`) groups.
    pub regex: &'static Regex,
    /// Whether a match of this pattern can parent methods (classes,
    /// interfaces, impl blocks).
    pub method_parent: bool,
}

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {{
        static $name: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::expect_used)]
        $name.get_or_init(|| Regex::new($pattern).expect("valid regex"))
    }};
}

macro_rules! patterns {
    ($fn_name:ident, $static_name:ident, [$(($role:expr, $parent:expr, $re_name:ident, $re:expr)),+ $(,)?]) => {
        fn $fn_name() -> &'static [ConstructPattern] {
            static $static_name: OnceLock<Vec<ConstructPattern>> = OnceLock::new();
            $static_name.get_or_init(|| {
                vec![
                    $(ConstructPattern {
                        role: $role,
                        regex: static_regex!($re_name, $re),
                        method_parent: $parent,
                    }),+
                ]
            })
        }
    };
}

use ConstructRole::{Context, Emit};
use FragmentKind::{Class, Function, Interface, Method, Variable};

patterns!(ts_patterns, TS_PATTERNS, [
    (Emit(Class), true, TS_CLASS,
        r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>\w+)"),
    (Emit(Interface), true, TS_INTERFACE,
        r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?interface\s+(?P<name>\w+)"),
    (Emit(Interface), false, TS_TYPE_ALIAS,
        r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?type\s+(?P<name>\w+)(?:<[^>]*>)?\s*="),
    (Emit(Function), false, TS_FUNCTION,
        r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>\w+)"),
    (Emit(Function), false, TS_ARROW,
        r"(?m)^(?P<indent>)(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)(?:\s*:[^=]+)?\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*(?::[^=]*)?=>"),
    (Emit(Variable), false, TS_VARIABLE,
        r"(?m)^(?P<indent>)(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)(?:\s*:[^=]+)?\s*="),
    (Emit(Method), false, TS_METHOD,
        r"(?m)^(?P<indent>[ \t]+)(?:(?:public|private|protected|static|readonly|override)\s+)*(?:async\s+)?(?:get\s+|set\s+)?(?P<name>\w+)\s*(?:<[^>]*>)?\([^)]*\)\s*(?::[^{;]+)?\{"),
]);

patterns!(js_patterns, JS_PATTERNS, [
    (Emit(Class), true, JS_CLASS,
        r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:default\s+)?class\s+(?P<name>\w+)"),
    (Emit(Function), false, JS_FUNCTION,
        r"(?m)^(?P<indent>[ \t]*)(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>\w+)"),
    (Emit(Function), false, JS_ARROW,
        r"(?m)^(?P<indent>)(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>"),
    (Emit(Variable), false, JS_VARIABLE,
        r"(?m)^(?P<indent>)(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*="),
    (Emit(Method), false, JS_METHOD,
        r"(?m)^(?P<indent>[ \t]+)(?:static\s+)?(?:async\s+)?(?:get\s+|set\s+)?(?P<name>\w+)\s*\([^)]*\)\s*\{"),
]);

patterns!(python_patterns, PYTHON_PATTERNS, [
    (Emit(Class), true, PY_CLASS,
        r"(?m)^(?P<indent>[ \t]*)class\s+(?P<name>\w+)"),
    (Emit(Function), false, PY_DEF,
        r"(?m)^(?P<indent>[ \t]*)(?:async\s+)?def\s+(?P<name>\w+)"),
    (Emit(Variable), false, PY_CONSTANT,
        r"(?m)^(?P<name>[A-Z][A-Z0-9_]*)\s*="),
]);

patterns!(rust_patterns, RUST_PATTERNS, [
    (Context, true, RS_IMPL,
        r"(?m)^(?P<indent>[ \t]*)(?:unsafe\s+)?impl(?:<[^>]*>)?\s+(?P<name>[\w:]+)"),
    (Emit(Interface), true, RS_TRAIT,
        r"(?m)^(?P<indent>[ \t]*)(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?trait\s+(?P<name>\w+)"),
    (Emit(Class), false, RS_STRUCT,
        r"(?m)^(?P<indent>[ \t]*)(?:pub(?:\([^)]*\))?\s+)?struct\s+(?P<name>\w+)"),
    (Emit(Class), false, RS_ENUM,
        r"(?m)^(?P<indent>[ \t]*)(?:pub(?:\([^)]*\))?\s+)?enum\s+(?P<name>\w+)"),
    (Emit(Function), false, RS_FN,
        r"(?m)^(?P<indent>[ \t]*)(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+(?P<name>\w+)"),
    (Emit(Variable), false, RS_CONST,
        r"(?m)^(?P<indent>)(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(?P<name>\w+)"),
]);

patterns!(go_patterns, GO_PATTERNS, [
    (Emit(Method), false, GO_METHOD,
        r"(?m)^(?P<indent>)func\s+\([^)]+\)\s*(?P<name>\w+)"),
    (Emit(Function), false, GO_FUNC,
        r"(?m)^(?P<indent>)func\s+(?P<name>\w+)"),
    (Emit(Class), false, GO_STRUCT,
        r"(?m)^(?P<indent>)type\s+(?P<name>\w+)\s+struct"),
    (Emit(Interface), false, GO_INTERFACE,
        r"(?m)^(?P<indent>)type\s+(?P<name>\w+)\s+interface"),
    (Emit(Variable), false, GO_VAR,
        r"(?m)^(?P<indent>)(?:var|const)\s+(?P<name>\w+)"),
]);

patterns!(java_patterns, JAVA_PATTERNS, [
    (Emit(Class), true, JAVA_CLASS,
        r"(?m)^(?P<indent>[ \t]*)(?:(?:public|private|protected|abstract|final|static)\s+)*class\s+(?P<name>\w+)"),
    (Emit(Interface), true, JAVA_INTERFACE,
        r"(?m)^(?P<indent>[ \t]*)(?:public\s+)?interface\s+(?P<name>\w+)"),
    (Emit(Method), false, JAVA_METHOD,
        r"(?m)^(?P<indent>[ \t]+)(?:(?:public|private|protected|static|final|synchronized|abstract)\s+)+[\w<>\[\],\s]*?\s(?P<name>\w+)\s*\([^)]*\)\s*(?:\{|throws)"),
]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("js"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("java"), Some(Language::Java));
        assert_eq!(Language::from_extension("zig"), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("src/a/b.test.ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("noext"), None);
    }

    #[test]
    fn test_ts_patterns_match() {
        let class = "export class UserService {";
        assert!(ts_patterns()[0].regex.is_match(class));

        let arrow = "export const handler = async (req) => {";
        assert!(ts_patterns()[4].regex.is_match(arrow));

        let method = "  async fetchUser(id: string): Promise<User> {";
        assert!(ts_patterns()[6].regex.is_match(method));
    }

    #[test]
    fn test_python_patterns_match() {
        assert!(python_patterns()[0].regex.is_match("class Parser:"));
        assert!(python_patterns()[1].regex.is_match("async def run():"));
        assert!(python_patterns()[2].regex.is_match("MAX_RETRIES = 3"));
        assert!(!python_patterns()[2].regex.is_match("lowercase = 3"));
    }

    #[test]
    fn test_rust_patterns_match() {
        assert!(rust_patterns()[0].regex.is_match("impl<T> Store<T> {"));
        assert!(rust_patterns()[4].regex.is_match("pub async fn index(&self) {"));
        assert!(rust_patterns()[5].regex.is_match("pub const MAX: usize = 10;"));
        // const inside a function body (indented) is not a top-level variable
        assert!(!rust_patterns()[5].regex.is_match("    const LOCAL: usize = 1;"));
    }

    #[test]
    fn test_go_method_vs_function() {
        assert!(go_patterns()[0].regex.is_match("func (s *Server) Start() error {"));
        assert!(!go_patterns()[0].regex.is_match("func Start() error {"));
        assert!(go_patterns()[1].regex.is_match("func Start() error {"));
    }

    #[test]
    fn test_java_method_pattern() {
        let m = "    public static String render(int n) {";
        assert!(java_patterns()[2].regex.is_match(m));
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(Language::Python.line_comment(), "#");
        assert_eq!(Language::Rust.line_comment(), "//");
    }
}
