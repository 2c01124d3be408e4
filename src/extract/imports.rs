//! Import-statement parsing.
//!
//! Produces the file-level map of imported names to their source modules.
//! The extractor intersects these bindings with each fragment's text to fill
//! `metadata.imports` and `metadata.dependencies`.

use crate::extract::Language;
use regex::Regex;
use std::sync::OnceLock;

/// One imported name and the module it comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportBinding {
    /// Local name the import binds.
    pub name: String,
    /// Module specifier or path the name comes from.
    pub module: String,
}

/// All imports of a file.
#[derive(Debug, Clone, Default)]
pub(crate) struct FileImports {
    /// Name -> module bindings.
    pub bindings: Vec<ImportBinding>,
    /// Every referenced module, including side-effect imports.
    pub modules: Vec<String>,
}

impl FileImports {
    fn push(&mut self, name: &str, module: &str) {
        let name = name.trim();
        if name.is_empty() || name == "*" {
            return;
        }
        self.bindings.push(ImportBinding {
            name: name.to_string(),
            module: module.to_string(),
        });
        self.push_module(module);
    }

    fn push_module(&mut self, module: &str) {
        if !module.is_empty() && !self.modules.iter().any(|m| m == module) {
            self.modules.push(module.to_string());
        }
    }
}

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {{
        static $name: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::expect_used)]
        $name.get_or_init(|| Regex::new($pattern).expect("valid regex"))
    }};
}

/// Parses the import statements of a file.
pub(crate) fn parse_imports(content: &str, language: Language) -> FileImports {
    match language {
        Language::TypeScript | Language::JavaScript => parse_ecma(content),
        Language::Python => parse_python(content),
        Language::Rust => parse_rust(content),
        Language::Go => parse_go(content),
        Language::Java => parse_java(content),
    }
}

/// Splits an `{a, b as c}` style clause into bound names.
fn split_named(clause: &str) -> Vec<String> {
    clause
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            // `orig as alias` binds the alias.
            let bound = part
                .rsplit_once(" as ")
                .map_or(part, |(_, alias)| alias.trim());
            (!bound.is_empty()).then(|| bound.to_string())
        })
        .collect()
}

fn parse_ecma(content: &str) -> FileImports {
    let from_import = static_regex!(
        ECMA_FROM,
        r#"(?m)^[ \t]*import\s+(?P<clause>[^;'"]+?)\s+from\s+['"](?P<module>[^'"]+)['"]"#
    );
    let bare_import = static_regex!(ECMA_BARE, r#"(?m)^[ \t]*import\s+['"](?P<module>[^'"]+)['"]"#);
    let require = static_regex!(
        ECMA_REQUIRE,
        r#"(?m)^[ \t]*(?:const|let|var)\s+(?:\{(?P<named>[^}]*)\}|(?P<name>\w+))\s*=\s*require\(\s*['"](?P<module>[^'"]+)['"]"#
    );

    let mut imports = FileImports::default();

    for cap in from_import.captures_iter(content) {
        let module = &cap["module"];
        let clause = cap["clause"].trim();
        // `Default, { a, b }` / `{ a as b }` / `* as ns` / `Default`
        for piece in split_import_clause(clause) {
            imports.push(&piece, module);
        }
    }

    for cap in bare_import.captures_iter(content) {
        imports.push_module(&cap["module"]);
    }

    for cap in require.captures_iter(content) {
        let module = &cap["module"];
        if let Some(named) = cap.name("named") {
            for name in split_named(named.as_str()) {
                imports.push(&name, module);
            }
        } else if let Some(name) = cap.name("name") {
            imports.push(name.as_str(), module);
        }
    }

    imports
}

/// Breaks an ECMAScript import clause into individual bound names.
fn split_import_clause(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = clause;

    if let Some(brace_start) = rest.find('{') {
        let before = rest[..brace_start].trim().trim_end_matches(',').trim();
        if !before.is_empty() {
            names.push(before.to_string());
        }
        if let Some(brace_end) = rest.find('}') {
            names.extend(split_named(&rest[brace_start + 1..brace_end]));
            rest = rest[brace_end + 1..].trim();
        } else {
            rest = "";
        }
        if !rest.is_empty() {
            names.extend(split_named(rest.trim_start_matches(',')));
        }
    } else if let Some(ns) = clause.strip_prefix("* as ") {
        names.push(ns.trim().to_string());
    } else {
        names.extend(split_named(rest));
    }

    names
}

fn parse_python(content: &str) -> FileImports {
    let plain = static_regex!(
        PY_IMPORT,
        r"(?m)^import\s+(?P<module>[\w.]+)(?:\s+as\s+(?P<alias>\w+))?"
    );
    let from = static_regex!(
        PY_FROM,
        r"(?m)^from\s+(?P<module>[\w.]+)\s+import\s+(?P<names>[^#\n]+)"
    );

    let mut imports = FileImports::default();

    for cap in plain.captures_iter(content) {
        let module = &cap["module"];
        let bound = cap.name("alias").map_or_else(
            || module.split('.').next().unwrap_or(module),
            |a| a.as_str(),
        );
        imports.push(bound, module);
    }

    for cap in from.captures_iter(content) {
        let module = &cap["module"];
        for name in split_named(cap["names"].trim_end_matches(['(', ')', '\\'])) {
            imports.push(&name, module);
        }
    }

    imports
}

fn parse_rust(content: &str) -> FileImports {
    let use_stmt = static_regex!(
        RS_USE,
        r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?use\s+(?P<path>[\w:]+)(?:::\{(?P<group>[^}]*)\})?(?:\s+as\s+(?P<alias>\w+))?\s*;"
    );

    let mut imports = FileImports::default();

    for cap in use_stmt.captures_iter(content) {
        let path = &cap["path"];
        if let Some(group) = cap.name("group") {
            for name in split_named(group.as_str()) {
                // `self` inside a group binds the path's last segment.
                let bound = if name == "self" {
                    path.rsplit("::").next().unwrap_or(path).to_string()
                } else {
                    name
                };
                imports.push(&bound, path);
            }
        } else {
            let bound = cap.name("alias").map_or_else(
                || path.rsplit("::").next().unwrap_or(path),
                |a| a.as_str(),
            );
            imports.push(bound, path);
        }
    }

    imports
}

fn parse_go(content: &str) -> FileImports {
    let single = static_regex!(
        GO_SINGLE,
        r#"(?m)^import\s+(?:(?P<alias>\w+)\s+)?"(?P<module>[^"]+)""#
    );
    let block = static_regex!(GO_BLOCK, r"(?ms)^import\s*\((?P<body>.*?)\)");
    let block_line = static_regex!(GO_LINE, r#"(?:(?P<alias>\w+)\s+)?"(?P<module>[^"]+)""#);

    let mut imports = FileImports::default();

    let mut add = |alias: Option<&str>, module: &str| {
        let bound =
            alias.map_or_else(|| module.rsplit('/').next().unwrap_or(module), |a| a);
        let binding = ImportBinding {
            name: bound.to_string(),
            module: module.to_string(),
        };
        if !imports.bindings.contains(&binding) {
            imports.push(bound, module);
        }
    };

    for cap in single.captures_iter(content) {
        add(cap.name("alias").map(|a| a.as_str()), &cap["module"]);
    }

    for cap in block.captures_iter(content) {
        for line in block_line.captures_iter(&cap["body"]) {
            add(line.name("alias").map(|a| a.as_str()), &line["module"]);
        }
    }

    imports
}

fn parse_java(content: &str) -> FileImports {
    let import = static_regex!(
        JAVA_IMPORT,
        r"(?m)^import\s+(?:static\s+)?(?P<path>[\w.]+)\s*;"
    );

    let mut imports = FileImports::default();

    for cap in import.captures_iter(content) {
        let path = &cap["path"];
        let bound = path.rsplit('.').next().unwrap_or(path);
        imports.push(bound, path);
    }

    imports
}
