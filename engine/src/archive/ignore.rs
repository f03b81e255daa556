//! Ignore files for directory archives

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// Files whose lines are read as ignore patterns, in this order
pub const IGNORE_FILES: &[&str] = &[".cfignore", ".cloudignore", ".zipignore"];

const DEFAULT_PATTERNS: &[&str] = &[
    ".zipignore",
    ".cfignore",
    ".gitignore",
    ".cloudignore",
    ".git",
    ".hg",
    ".svn",
    "_darcs",
    ".DS_Store",
];

struct Rule {
    matcher: GlobMatcher,
    anchored: bool,
    ignore: bool,
}

/// Ordered ignore rules, the last matching rule decides
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

/// Lexically clean a slash separated pattern
fn clean(pattern: &str) -> String {
    let anchored = pattern.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in pattern.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if anchored {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

fn compile(pattern: &str) -> Option<GlobMatcher> {
    match GlobBuilder::new(pattern).literal_separator(false).build() {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            warn!("Ignoring invalid ignore pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// The pattern itself, everything below it and, when not anchored, the same at any depth
fn globs_for(pattern: &str) -> Vec<String> {
    let mut globs = vec![
        pattern.to_string(),
        format!("{}/*", pattern),
        format!("{}/**/*", pattern),
    ];
    if !pattern.starts_with('/') {
        globs.push(format!("**/{}", pattern));
        globs.push(format!("**/{}/*", pattern));
        globs.push(format!("**/{}/**/*", pattern));
    }
    globs
}

impl IgnoreRules {
    /// Defaults followed by the lines of `text`
    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        let lines = DEFAULT_PATTERNS.iter().copied().chain(text.lines());
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (ignore, line) = match line.strip_prefix('!') {
                Some(rest) => (false, rest),
                None => (true, line),
            };
            let pattern = clean(line);
            for glob in globs_for(&pattern) {
                if let Some(matcher) = compile(&glob) {
                    rules.push(Rule {
                        anchored: glob.starts_with('/'),
                        matcher,
                        ignore,
                    });
                }
            }
        }
        Self { rules }
    }

    /// Rules from the ignore files present at the root of `dir`
    pub fn load(dir: &Path) -> Self {
        let mut text = String::new();
        for name in IGNORE_FILES {
            if let Ok(content) = std::fs::read_to_string(dir.join(name)) {
                text.push_str(&content);
                text.push('\n');
            }
        }
        Self::parse(&text)
    }

    /// Whether a slash separated path relative to the root is excluded
    pub fn is_ignored(&self, path: &str) -> bool {
        let anchored_path = format!("/{}", path.trim_start_matches('/'));
        let mut result = false;
        for rule in &self.rules {
            let candidate = if rule.anchored { anchored_path.as_str() } else { path };
            if rule.matcher.is_match(candidate) {
                result = rule.ignore;
            }
        }
        result
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::parse("")
    }
}
