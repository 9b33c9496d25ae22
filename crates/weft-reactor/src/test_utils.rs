//! Test-only helpers: a minimal statement-tree parser so fixtures can be
//! written as source text instead of hand-assembled skeletons.

use std::sync::Arc;

use weft_model::{Skeleton, SourceRef};

/// Parse one statement tree from `text`. Grammar is the minimal statement
/// shape: `keyword [argument] (';' | '{' statements '}')`, with arguments
/// either bare words or double-quoted strings. Panics on malformed input;
/// fixtures are under test control.
pub fn parse(source: &str, text: &str) -> Arc<Skeleton> {
    let mut parser = Parser {
        source: Arc::from(source),
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let statement = parser
        .statement()
        .unwrap_or_else(|| panic!("fixture `{source}` contains no statement"));
    parser.skip_trivia();
    assert!(
        parser.at_end(),
        "fixture `{source}` has trailing input at line {}",
        parser.line
    );
    Arc::new(statement)
}

struct Parser {
    source: Arc<str>,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '/' && self.chars.get(self.pos + 1) == Some(&'/') {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | ';' | '"') {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn quoted(&mut self) -> String {
        assert_eq!(self.bump(), Some('"'));
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some(c) => out.push(c),
                None => panic!("unterminated string in `{}`", self.source),
            }
        }
        out
    }

    fn statement(&mut self) -> Option<Skeleton> {
        self.skip_trivia();
        if self.at_end() || self.peek() == Some('}') {
            return None;
        }
        let at = SourceRef::new(Arc::clone(&self.source), self.line, self.column);
        let keyword = self.word();
        assert!(
            !keyword.is_empty(),
            "expected a keyword at {}:{}:{}",
            self.source,
            self.line,
            self.column
        );
        self.skip_trivia();

        let argument = match self.peek() {
            Some('"') => Some(self.quoted()),
            Some('{' | ';') | None => None,
            Some(_) => Some(self.word()),
        };
        let mut statement = Skeleton::new(keyword, argument.as_deref(), at);

        self.skip_trivia();
        match self.bump() {
            Some(';') => {}
            Some('{') => {
                while let Some(child) = self.statement() {
                    statement = statement.with_child(child);
                }
                self.skip_trivia();
                assert_eq!(
                    self.bump(),
                    Some('}'),
                    "unclosed block in `{}`",
                    self.source
                );
            }
            other => panic!(
                "expected `;` or `{{` in `{}`, found {other:?} at line {}",
                self.source, self.line
            ),
        }
        Some(statement)
    }
}
