//! Series name patterns.
//!
//! Patterns use the familiar graphite-style glob syntax:
//!
//! | Syntax    | Matches                                      |
//! |-----------|----------------------------------------------|
//! | `*`       | any run of characters, dots included         |
//! | `?`       | exactly one character                        |
//! | `[a-c]`   | one character from the class (`[!..]` negates) |
//! | `{x,y}`   | one of the comma-separated alternatives      |
//!
//! An unterminated `[` or `{` is taken literally.
//!
//! Every pattern is classified into a [`MatchKind`] that decides how the
//! [`PatternIndex`](crate::index::PatternIndex) resolves it: exact lookup,
//! sorted prefix scan, or trigram candidate search followed by verification
//! against the compiled [`Regex`].

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a pattern was resolved against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    /// No wildcard syntax: exact name lookup.
    Literal,
    /// A single trailing `*`: prefix scan over sorted names.
    Prefix,
    /// Wildcards elsewhere: trigram candidates, then full verification.
    Trigram,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchKind::Literal => "literal",
            MatchKind::Prefix => "prefix",
            MatchKind::Trigram => "trigram",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    AnyRun,
    AnyOne,
    Class { negated: bool, body: String },
    Alternation(Vec<String>),
}

/// A parsed name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<Token>,
    kind: MatchKind,
}

impl Pattern {
    /// Parses a pattern. Parsing never fails; malformed wildcard syntax is
    /// treated as literal text.
    pub fn parse(pattern: &str) -> Self {
        let tokens = tokenize(pattern);
        let kind = match tokens.as_slice() {
            [] | [Token::Literal(_)] => MatchKind::Literal,
            [Token::AnyRun] | [Token::Literal(_), Token::AnyRun] => MatchKind::Prefix,
            _ => MatchKind::Trigram,
        };
        Self { tokens, kind }
    }

    /// Returns the resolution strategy for this pattern.
    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// The exact name to look up, for [`MatchKind::Literal`] patterns.
    pub fn literal(&self) -> Option<&str> {
        match (self.kind, self.tokens.as_slice()) {
            (MatchKind::Literal, []) => Some(""),
            (MatchKind::Literal, [Token::Literal(s)]) => Some(s),
            _ => None,
        }
    }

    /// The fixed prefix to scan, for [`MatchKind::Prefix`] patterns.
    pub fn prefix(&self) -> Option<&str> {
        match self.tokens.as_slice() {
            [Token::AnyRun] => Some(""),
            [Token::Literal(s), Token::AnyRun] => Some(s),
            _ => None,
        }
    }

    /// The fixed (wildcard-free) runs of the pattern, in order.
    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Literal(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Compiles the pattern into an anchored regular expression.
    ///
    /// Returns `None` only if the generated expression is rejected by the
    /// regex engine, e.g. a character class with a reversed range.
    pub fn to_regex(&self) -> Option<Regex> {
        let mut re = String::from("(?s)^");
        for token in &self.tokens {
            match token {
                Token::Literal(s) => re.push_str(&regex::escape(s)),
                Token::AnyRun => re.push_str(".*"),
                Token::AnyOne => re.push('.'),
                Token::Class { negated, body } => {
                    re.push('[');
                    if *negated {
                        re.push('^');
                    }
                    re.push_str(&class_body(body));
                    re.push(']');
                }
                Token::Alternation(alts) => {
                    re.push_str("(?:");
                    let escaped: Vec<String> = alts.iter().map(|a| regex::escape(a)).collect();
                    re.push_str(&escaped.join("|"));
                    re.push(')');
                }
            }
        }
        re.push('$');
        Regex::new(&re).ok()
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let token = match chars[i] {
            '*' => {
                i += 1;
                Some(Token::AnyRun)
            }
            '?' => {
                i += 1;
                Some(Token::AnyOne)
            }
            '[' => closing(&chars, i, ']').map(|end| {
                let mut body: String = chars[i + 1..end].iter().collect();
                let negated = body.starts_with('!') || body.starts_with('^');
                if negated {
                    body.remove(0);
                }
                i = end + 1;
                Token::Class { negated, body }
            }),
            '{' => closing(&chars, i, '}').map(|end| {
                let body: String = chars[i + 1..end].iter().collect();
                i = end + 1;
                Token::Alternation(body.split(',').map(str::to_string).collect())
            }),
            _ => None,
        };

        match token {
            Some(token) => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                // "**" means the same as "*"
                if !(token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun)) {
                    tokens.push(token);
                }
            }
            None => {
                literal.push(chars[i]);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

fn closing(chars: &[char], open: usize, close: char) -> Option<usize> {
    chars[open + 1..]
        .iter()
        .position(|&c| c == close)
        .map(|offset| open + 1 + offset)
}

/// Escapes a glob character class body for the regex engine, keeping
/// `a-z` style ranges.
fn class_body(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len() * 2);
    for (i, &c) in chars.iter().enumerate() {
        let is_range = c == '-' && i > 0 && i + 1 < chars.len();
        if !is_range && !c.is_ascii_alphanumeric() && c.is_ascii() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, name: &str) -> bool {
        Pattern::parse(pattern).to_regex().unwrap().is_match(name)
    }

    #[test]
    fn test_classify() {
        assert_eq!(Pattern::parse("a.b.c").kind(), MatchKind::Literal);
        assert_eq!(Pattern::parse("").kind(), MatchKind::Literal);
        assert_eq!(Pattern::parse("a.b.*").kind(), MatchKind::Prefix);
        assert_eq!(Pattern::parse("*").kind(), MatchKind::Prefix);
        assert_eq!(Pattern::parse("a.b.**").kind(), MatchKind::Prefix);
        assert_eq!(Pattern::parse("a.*.c").kind(), MatchKind::Trigram);
        assert_eq!(Pattern::parse("a.b.?").kind(), MatchKind::Trigram);
        assert_eq!(Pattern::parse("a.{b,c}.d").kind(), MatchKind::Trigram);
        assert_eq!(Pattern::parse("*.cpu").kind(), MatchKind::Trigram);
    }

    #[test]
    fn test_unterminated_syntax_is_literal() {
        let p = Pattern::parse("a.[b");
        assert_eq!(p.kind(), MatchKind::Literal);
        assert_eq!(p.literal(), Some("a.[b"));

        let p = Pattern::parse("a.{b,c");
        assert_eq!(p.literal(), Some("a.{b,c"));
    }

    #[test]
    fn test_literal_and_prefix_text() {
        assert_eq!(Pattern::parse("host.cpu").literal(), Some("host.cpu"));
        assert_eq!(Pattern::parse("host.*").prefix(), Some("host."));
        assert_eq!(Pattern::parse("*").prefix(), Some(""));
        assert_eq!(Pattern::parse("host.*").literal(), None);
        assert_eq!(Pattern::parse("a.*.c").prefix(), None);
    }

    #[test]
    fn test_fragments() {
        let p = Pattern::parse("servers.*.cpu.{idle,user}.total");
        let frags: Vec<&str> = p.fragments().collect();
        assert_eq!(frags, vec!["servers.", ".cpu.", ".total"]);
    }

    #[test]
    fn test_wildcards() {
        assert!(matches("a.*.c", "a.b.c"));
        assert!(matches("a.*.c", "a.b.x.c"));
        assert!(!matches("a.*.c", "a.b.d"));
        assert!(matches("a.b?", "a.bx"));
        assert!(!matches("a.b?", "a.b"));
        assert!(matches("host[0-9].cpu", "host7.cpu"));
        assert!(!matches("host[0-9].cpu", "hostx.cpu"));
        assert!(matches("host[!0-9].cpu", "hostx.cpu"));
        assert!(matches("a.{cpu,mem}.b", "a.mem.b"));
        assert!(!matches("a.{cpu,mem}.b", "a.disk.b"));
    }

    #[test]
    fn test_wildcards_cross_newlines() {
        assert!(matches("a*", "a\nb.cpu"));
        assert!(matches("a*cpu", "a\nb.cpu"));
        assert!(matches("a?b.cpu", "a\nb.cpu"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("a+b.*", "a+b.c"));
        assert!(!matches("a+b.*", "aab.c"));
        assert!(matches("x.(y)|z?", "x.(y)|zz"));
        assert!(matches("[.]x*", ".xy"));
    }

    #[test]
    fn test_reversed_range_does_not_compile() {
        assert!(Pattern::parse("a[z-a]*").to_regex().is_none());
    }
}
