// fillpdf-service/src/token/scanner.rs

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// One `[namespace:path]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// The token exactly as written, brackets included.
    pub raw: String,
    pub namespace: String,
    pub path: String,
}

impl Token {
    /// Path split on `:`.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split(':').collect()
    }
}

/// Tokens sharing a namespace, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGroup {
    pub namespace: String,
    pub tokens: Vec<Token>,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[([^\s\[\]:]+):([^\[\]]+)\]").expect("token pattern is valid")
    })
}

/// Every token occurrence in `text`, duplicates included.
pub fn scan(text: &str) -> Vec<Token> {
    token_pattern()
        .captures_iter(text)
        .map(|caps| Token {
            raw: caps[0].to_string(),
            namespace: caps[1].to_string(),
            path: caps[2].to_string(),
        })
        .collect()
}

pub fn has_tokens(text: &str) -> bool {
    token_pattern().is_match(text)
}

/// Distinct tokens grouped by namespace.
pub fn group_by_namespace(tokens: &[Token]) -> Vec<TokenGroup> {
    let mut groups: Vec<TokenGroup> = Vec::new();
    for token in tokens {
        match groups.iter_mut().find(|g| g.namespace == token.namespace) {
            Some(group) => {
                if !group.tokens.iter().any(|t| t.raw == token.raw) {
                    group.tokens.push(token.clone());
                }
            }
            None => groups.push(TokenGroup {
                namespace: token.namespace.clone(),
                tokens: vec![token.clone()],
            }),
        }
    }
    groups
}

/// Single pass substitution: each token occurrence is swapped for its value
/// and substituted content is never rescanned. Tokens without a value are
/// left as written.
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in token_pattern().find_iter(text) {
        if let Some(value) = values.get(m.as_str()) {
            out.push_str(&text[last..m.start()]);
            out.push_str(value);
            last = m.end();
        }
    }
    out.push_str(&text[last..]);
    out
}
