//! Balanced-delimiter and lexical scanning helpers shared by the parser and
//! the code generator.
//!
//! Embedded expression snippets are never grammar-parsed; every question the
//! compiler asks about them (which identifiers appear, which names are
//! declared, does the unit suspend) is answered by the lexical scans below,
//! run over string-blanked copies of the text. This is intentionally
//! approximate; see the design notes in DESIGN.md before tightening it.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap();
    static ref AWAIT_RE: Regex = Regex::new(r"\bawait\b").unwrap();
    static ref DECL_RE: Regex =
        Regex::new(r"\b(?:let|const|var|function)\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap();
    static ref ITER_KEYWORD_RE: Regex = Regex::new(r"\b(?:of|in)\b").unwrap();

    /// Reserved words of the embedded expression language, skipped by the
    /// identifier scan.
    pub static ref JS_RESERVED: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for w in [
            "async", "await", "break", "case", "catch", "class", "const", "continue",
            "debugger", "default", "delete", "do", "else", "export", "extends", "false",
            "finally", "for", "function", "if", "import", "in", "instanceof", "let",
            "new", "null", "of", "return", "static", "super", "switch", "this", "throw",
            "true", "try", "typeof", "var", "void", "while", "with", "yield",
        ] {
            s.insert(w);
        }
        s
    };

    /// Ambient globals of the execution environment; never auto-bound.
    pub static ref JS_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for w in [
            "Array", "Boolean", "Date", "Error", "Infinity", "JSON", "Map", "Math",
            "NaN", "Number", "Object", "Promise", "Proxy", "Reflect", "RegExp", "Set",
            "String", "Symbol", "console", "decodeURIComponent", "encodeURIComponent",
            "globalThis", "isFinite", "isNaN", "parseFloat", "parseInt", "undefined",
        ] {
            s.insert(w);
        }
        s
    };
}

/// Result of a balanced-delimiter scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balanced {
    /// Text between the outer delimiter pair.
    pub content: String,
    /// Index just past the closing delimiter (end of input when unterminated).
    pub end: usize,
    pub closed: bool,
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        other => other,
    }
}

/// Extract the contents of a bracketed run starting at `open_idx`, which must
/// hold one of `(`, `[`, `{`. Tracks nesting across all three bracket kinds
/// and quoted-string state, honoring backslash escapes. An unterminated run
/// yields everything up to end-of-input with `closed: false`.
pub fn balanced_block(chars: &[char], open_idx: usize) -> Balanced {
    let open = chars[open_idx];
    let close = closing_for(open);
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut i = open_idx + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            i += 2;
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 && c == close {
                    return Balanced {
                        content: chars[open_idx + 1..i].iter().collect(),
                        end: i + 1,
                        closed: true,
                    };
                }
                // Mismatched closer at depth zero: treat as terminator anyway
                // so a stray `)` cannot swallow the rest of the template.
                if depth == 0 {
                    return Balanced {
                        content: chars[open_idx + 1..i].iter().collect(),
                        end: i + 1,
                        closed: false,
                    };
                }
            }
            _ => {}
        }
        i += 1;
    }

    Balanced {
        content: chars[open_idx + 1..].iter().collect(),
        end: chars.len(),
        closed: false,
    }
}

/// Split `input` at top-level occurrences of `sep`, using the same balancing
/// discipline as [`balanced_block`]. Pieces are trimmed. Empty or
/// whitespace-only input yields no pieces.
pub fn split_top_level(input: &str, sep: char) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = input.chars().collect();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            i += 2;
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if c == sep && depth == 0 => {
                pieces.push(chars[start..i].iter().collect::<String>().trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    pieces.push(chars[start..].iter().collect::<String>().trim().to_string());
    pieces
}

/// Replace the interior of every quoted string with spaces, preserving the
/// delimiters and all newlines so line structure survives. Used before every
/// lexical scan to avoid false matches inside literals.
pub fn blank_strings(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut quote: Option<char> = None;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    // Blank the escape pair too.
                    out.push(' ');
                    if let Some(&next) = chars.peek() {
                        chars.next();
                        out.push(if next == '\n' { '\n' } else { ' ' });
                    }
                } else if c == q {
                    quote = None;
                    out.push(c);
                } else {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                }
            }
            None => {
                if c == '"' || c == '\'' || c == '`' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

/// Word-boundary scan for the suspension operator, over blanked text.
pub fn contains_await(src: &str) -> bool {
    AWAIT_RE.is_match(&blank_strings(src))
}

/// Collect every bare identifier token in `snippet` into `out`, skipping
/// reserved words and property accesses (tokens directly preceded by `.`).
pub fn collect_identifiers(snippet: &str, out: &mut HashSet<String>) {
    let blanked = blank_strings(snippet);
    for m in IDENT_RE.find_iter(&blanked) {
        let name = m.as_str();
        if JS_RESERVED.contains(name) {
            continue;
        }
        let preceded_by_dot = blanked[..m.start()]
            .chars()
            .next_back()
            .map(|c| c == '.')
            .unwrap_or(false);
        if preceded_by_dot {
            continue;
        }
        out.insert(name.to_string());
    }
}

/// Collect names introduced by `let`/`const`/`var`/`function` inside an
/// embedded-code block.
pub fn collect_declarations(snippet: &str, out: &mut HashSet<String>) {
    let blanked = blank_strings(snippet);
    for caps in DECL_RE.captures_iter(&blanked) {
        out.insert(caps[1].to_string());
    }
}

/// Split an iteration head (`item of items`, `(key, value) in entries`) at
/// the first membership keyword, returning the binding side. Operates on the
/// blanked copy, which is all the identifier scan downstream needs.
pub fn iteration_bindings(head: &str) -> Option<String> {
    let blanked = blank_strings(head);
    let m = ITER_KEYWORD_RE.find(&blanked)?;
    Some(blanked[..m.start()].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_simple() {
        let chars: Vec<char> = "(a, b)".chars().collect();
        let b = balanced_block(&chars, 0);
        assert_eq!(b.content, "a, b");
        assert_eq!(b.end, 6);
        assert!(b.closed);
    }

    #[test]
    fn test_balanced_nested_and_quoted() {
        let chars: Vec<char> = r#"(f(x, [1, 2]), "a)b", 'c\'d')rest"#.chars().collect();
        let b = balanced_block(&chars, 0);
        assert_eq!(b.content, r#"f(x, [1, 2]), "a)b", 'c\'d'"#);
        assert!(b.closed);
        assert_eq!(chars[b.end..].iter().collect::<String>(), "rest");
    }

    #[test]
    fn test_balanced_unterminated() {
        let chars: Vec<char> = "(a, (b".chars().collect();
        let b = balanced_block(&chars, 0);
        assert_eq!(b.content, "a, (b");
        assert!(!b.closed);
        assert_eq!(b.end, chars.len());
    }

    #[test]
    fn test_split_top_level_counts() {
        assert_eq!(split_top_level("a, f(b, c), [d, e]", ',').len(), 3);
        assert_eq!(split_top_level(r#""x,y", z"#, ','), vec![r#""x,y""#, "z"]);
        assert!(split_top_level("   ", ',').is_empty());
    }

    #[test]
    fn test_blank_strings_keeps_lines() {
        let blanked = blank_strings("a + \"two\nlines\" + b");
        assert_eq!(blanked.lines().count(), 2);
        assert!(!blanked.contains("two"));
        assert!(blanked.contains('a') && blanked.contains('b'));
    }

    #[test]
    fn test_contains_await() {
        assert!(contains_await("const x = await load();"));
        assert!(!contains_await("const x = \"await\";"));
        assert!(!contains_await("awaitable()"));
    }

    #[test]
    fn test_collect_identifiers() {
        let mut out = HashSet::new();
        collect_identifiers("user.name + count || 'fallback' && typeof flag", &mut out);
        assert!(out.contains("user"));
        assert!(out.contains("count"));
        assert!(out.contains("flag"));
        assert!(!out.contains("name"));
        assert!(!out.contains("fallback"));
        assert!(!out.contains("typeof"));
    }

    #[test]
    fn test_collect_declarations() {
        let mut out = HashSet::new();
        collect_declarations("let a = 1; const b = 'let c = 2'; function helper() {}", &mut out);
        assert!(out.contains("a"));
        assert!(out.contains("b"));
        assert!(out.contains("helper"));
        assert!(!out.contains("c"));
    }

    #[test]
    fn test_iteration_bindings() {
        assert_eq!(iteration_bindings("item of items").as_deref(), Some("item "));
        assert_eq!(
            iteration_bindings("(key, value) in entries").as_deref(),
            Some("(key, value) ")
        );
        assert_eq!(iteration_bindings("no keyword here?"), None);
    }
}
