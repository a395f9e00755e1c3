//! Platform qualifiers and qualifier expressions.
//!
//! Port manifests constrain dependencies and support with Boolean
//! expressions over a closed token set (`!uwp`, `windows&!arm`,
//! `(x64|arm)&!static`, ...). The parsed tree evaluates against a platform
//! set; the flattened qualifier vector is what gets stored on a port node.

use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Uwp,
    Linux,
    Osx,
    Android,
    X86,
    X64,
    Arm,
    Static,
}

impl Platform {
    pub fn parse(token: &str) -> Option<Platform> {
        Some(match token.to_ascii_lowercase().as_str() {
            "windows" => Platform::Windows,
            "uwp" => Platform::Uwp,
            "linux" => Platform::Linux,
            "osx" => Platform::Osx,
            "android" => Platform::Android,
            "x86" => Platform::X86,
            "x64" => Platform::X64,
            // vcpkg spells several arm flavours; they all constrain the
            // same way for our reporting purposes.
            "arm" | "arm64" | "arm64ec" => Platform::Arm,
            "static" => Platform::Static,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Uwp => "uwp",
            Platform::Linux => "linux",
            Platform::Osx => "osx",
            Platform::Android => "android",
            Platform::X86 => "x86",
            Platform::X64 => "x64",
            Platform::Arm => "arm",
            Platform::Static => "static",
        }
    }
}

/// One slot of a qualifier vector. The representation makes `!P` and `P`
/// mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qualifier {
    pub platform: Platform,
    pub negated: bool,
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.platform.as_str())
        } else {
            f.write_str(self.platform.as_str())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformExpr {
    Token(Platform),
    Not(Box<PlatformExpr>),
    All(Vec<PlatformExpr>),
    AnyOf(Vec<PlatformExpr>),
}

impl PlatformExpr {
    /// Parse `!tok`, `tok&tok`, `tok|tok` and parenthesized sub-expressions.
    /// vcpkg also accepts `,` as a low-precedence "or".
    pub fn parse(text: &str) -> Result<PlatformExpr> {
        let mut parser = Parser {
            tokens: lex(text)?,
            pos: 0,
        };
        let expr = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            bail!("trailing tokens in platform expression {text:?}");
        }
        Ok(expr)
    }

    pub fn eval(&self, enabled: &HashSet<Platform>) -> bool {
        match self {
            PlatformExpr::Token(p) => enabled.contains(p),
            PlatformExpr::Not(inner) => !inner.eval(enabled),
            PlatformExpr::All(parts) => parts.iter().all(|p| p.eval(enabled)),
            PlatformExpr::AnyOf(parts) => parts.iter().any(|p| p.eval(enabled)),
        }
    }

    /// Flatten to the qualifier vector stored on port nodes. Negation
    /// parity is tracked through nested `!`.
    pub fn qualifiers(&self) -> Vec<Qualifier> {
        fn walk(expr: &PlatformExpr, negated: bool, out: &mut Vec<Qualifier>) {
            match expr {
                PlatformExpr::Token(p) => out.push(Qualifier {
                    platform: *p,
                    negated,
                }),
                PlatformExpr::Not(inner) => walk(inner, !negated, out),
                PlatformExpr::All(parts) | PlatformExpr::AnyOf(parts) => {
                    for part in parts {
                        walk(part, negated, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, false, &mut out);
        out
    }
}

impl fmt::Display for PlatformExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformExpr::Token(p) => f.write_str(p.as_str()),
            PlatformExpr::Not(inner) => write!(f, "!{inner}"),
            PlatformExpr::All(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", joined.join("&"))
            }
            PlatformExpr::AnyOf(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", joined.join("|"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Not,
    And,
    Or,
    Open,
    Close,
    Platform(Platform),
}

fn lex(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' | ',' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if c.is_ascii_alphanumeric() => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match Platform::parse(&word) {
                    Some(p) => tokens.push(Token::Platform(p)),
                    None => bail!("unknown platform token {word:?}"),
                }
            }
            other => bail!("unexpected character {other:?} in platform expression"),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or_expr(&mut self) -> Result<PlatformExpr> {
        let mut parts = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            parts.push(self.and_expr()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            PlatformExpr::AnyOf(parts)
        })
    }

    fn and_expr(&mut self) -> Result<PlatformExpr> {
        let mut parts = vec![self.factor()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            parts.push(self.factor()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            PlatformExpr::All(parts)
        })
    }

    fn factor(&mut self) -> Result<PlatformExpr> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(PlatformExpr::Not(Box::new(self.factor()?)))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                match self.peek() {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => bail!("missing ')' in platform expression"),
                }
            }
            Some(Token::Platform(p)) => {
                let p = *p;
                self.pos += 1;
                Ok(PlatformExpr::Token(p))
            }
            _ => bail!("expected platform token"),
        }
    }
}

/// Platforms implied by an installed triplet (`x64-windows-static`).
pub fn triplet_platforms(triplet: &str) -> Vec<Platform> {
    triplet
        .split('-')
        .filter_map(Platform::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(platforms: &[Platform]) -> HashSet<Platform> {
        platforms.iter().copied().collect()
    }

    #[test]
    fn parses_and_evaluates_basic_forms() {
        let expr = PlatformExpr::parse("!uwp").unwrap();
        assert!(expr.eval(&enabled(&[Platform::Windows])));
        assert!(!expr.eval(&enabled(&[Platform::Uwp])));

        let expr = PlatformExpr::parse("windows&!arm").unwrap();
        assert!(expr.eval(&enabled(&[Platform::Windows, Platform::X64])));
        assert!(!expr.eval(&enabled(&[Platform::Windows, Platform::Arm])));

        let expr = PlatformExpr::parse("(x64|arm)&!static").unwrap();
        assert!(expr.eval(&enabled(&[Platform::X64, Platform::Windows])));
        assert!(!expr.eval(&enabled(&[Platform::X64, Platform::Static])));
        assert!(!expr.eval(&enabled(&[Platform::X86])));
    }

    #[test]
    fn comma_acts_as_or() {
        let expr = PlatformExpr::parse("linux,osx").unwrap();
        assert!(expr.eval(&enabled(&[Platform::Osx])));
        assert!(!expr.eval(&enabled(&[Platform::Windows])));
    }

    #[test]
    fn rejects_unknown_tokens_and_bad_syntax() {
        assert!(PlatformExpr::parse("freebsd").is_err());
        assert!(PlatformExpr::parse("(windows").is_err());
        assert!(PlatformExpr::parse("windows &").is_err());
    }

    #[test]
    fn qualifier_vector_matches_boolean_semantics() {
        let expr = PlatformExpr::parse("!windows&x64").unwrap();
        let quals = expr.qualifiers();
        assert_eq!(quals.len(), 2);
        assert!(quals.contains(&Qualifier {
            platform: Platform::Windows,
            negated: true
        }));
        assert!(quals.contains(&Qualifier {
            platform: Platform::X64,
            negated: false
        }));
        // Double negation cancels.
        let expr = PlatformExpr::parse("!(!linux)").unwrap();
        assert_eq!(
            expr.qualifiers(),
            [Qualifier {
                platform: Platform::Linux,
                negated: false
            }]
        );
    }

    #[test]
    fn triplets_imply_their_platform_set() {
        assert_eq!(
            triplet_platforms("x64-windows-static"),
            [Platform::X64, Platform::Windows, Platform::Static]
        );
        assert_eq!(
            triplet_platforms("arm64-uwp"),
            [Platform::Arm, Platform::Uwp]
        );
        assert_eq!(triplet_platforms("wasm32-emscripten"), []);
    }
}
