//! SQL tokenizer.
//!
//! Just enough to find keywords and statement boundaries. String literals,
//! quoted identifiers, dollar-quoted bodies and comments are skipped, so
//! keywords inside them are never seen.

/// Token kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind {
    /// Keyword or unquoted identifier.
    Word,
    /// `;`
    Semicolon,
}

/// Token and where it starts in the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: Kind,
    pub text: &'a str,
    pub start: usize,
}

impl Token<'_> {
    /// Case-insensitive keyword match.
    pub fn is(&self, keyword: &str) -> bool {
        self.kind == Kind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Iterator over the tokens of a query.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    query: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            bytes: query.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if c == b'\n' {
                break;
            }
        }
    }

    /// Block comments nest.
    fn skip_block_comment(&mut self) {
        let mut depth = 0;
        while self.pos < self.bytes.len() {
            match (self.peek(0), self.peek(1)) {
                (Some(b'/'), Some(b'*')) => {
                    depth += 1;
                    self.pos += 2;
                }
                (Some(b'*'), Some(b'/')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Skip a quoted string or identifier. Doubled quotes are escapes.
    fn skip_quoted(&mut self, quote: u8, backslash: bool) {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if backslash && c == b'\\' {
                self.pos += 1;
            } else if c == quote {
                if self.peek(0) == Some(quote) {
                    self.pos += 1;
                } else {
                    return;
                }
            }
        }
    }

    /// `$tag$ ... $tag$`. Returns false if this isn't a dollar quote,
    /// e.g. a `$1` parameter.
    fn skip_dollar_quoted(&mut self) -> bool {
        let rest = &self.query[self.pos + 1..];
        let tag_len = rest
            .bytes()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == b'_')
            .count();

        if rest.as_bytes().get(tag_len) != Some(&b'$')
            || rest.as_bytes().first().is_some_and(|c| c.is_ascii_digit())
        {
            return false;
        }

        let tag = &self.query[self.pos..self.pos + tag_len + 2];
        let body = self.pos + tag.len();

        match self.query[body..].find(tag) {
            Some(end) => self.pos = body + end + tag.len(),
            None => self.pos = self.bytes.len(),
        }

        true
    }

    fn word(&mut self) -> Token<'a> {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || !c.is_ascii() {
                self.pos += 1;
            } else {
                break;
            }
        }

        Token {
            kind: Kind::Word,
            text: &self.query[start..self.pos],
            start,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(c) = self.peek(0) {
            match c {
                b'-' if self.peek(1) == Some(b'-') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'\'' => self.skip_quoted(b'\'', false),
                b'"' => self.skip_quoted(b'"', false),
                b'$' => {
                    if !self.skip_dollar_quoted() {
                        self.pos += 1;
                    }
                }
                b';' => {
                    let start = self.pos;
                    self.pos += 1;
                    return Some(Token {
                        kind: Kind::Semicolon,
                        text: ";",
                        start,
                    });
                }
                c if c.is_ascii_digit() => {
                    while self
                        .peek(0)
                        .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'_')
                    {
                        self.pos += 1;
                    }
                }
                c if c.is_ascii_alphabetic() || c == b'_' || !c.is_ascii() => {
                    let token = self.word();
                    // E'...' strings allow backslash escapes.
                    if token.text.eq_ignore_ascii_case("e") && self.peek(0) == Some(b'\'') {
                        self.skip_quoted(b'\'', true);
                        continue;
                    }
                    return Some(token);
                }
                _ => self.pos += 1,
            }
        }

        None
    }
}

/// One statement of a multi-statement query.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    /// Offset of the first token.
    pub start: usize,
    /// Offset just past the terminating `;`, or the end of the query.
    pub end: usize,
    /// Leading keywords.
    pub words: Vec<&'a str>,
}

impl Statement<'_> {
    /// The statement starts with these keywords.
    pub fn starts_with(&self, keywords: &[&str]) -> bool {
        self.words.len() >= keywords.len()
            && self
                .words
                .iter()
                .zip(keywords)
                .all(|(word, keyword)| word.eq_ignore_ascii_case(keyword))
    }
}

/// Split a query into statements. Empty statements are skipped.
pub fn statements(query: &str) -> Vec<Statement<'_>> {
    const WORDS: usize = 2;

    let mut statements = vec![];
    let mut current: Option<Statement<'_>> = None;

    for token in Lexer::new(query) {
        match token.kind {
            Kind::Word => {
                let statement = current.get_or_insert_with(|| Statement {
                    start: token.start,
                    end: query.len(),
                    words: vec![],
                });
                if statement.words.len() < WORDS {
                    statement.words.push(token.text);
                }
            }
            Kind::Semicolon => {
                if let Some(mut statement) = current.take() {
                    statement.end = token.start + 1;
                    statements.push(statement);
                }
            }
        }
    }

    statements.extend(current);
    statements
}
