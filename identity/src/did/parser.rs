//! # DID Parser
//!
//! Left-to-right scanner for DID URLs:
//!
//! ```text
//! did:<method>:<id>[:<id>...][;name=value...][/path...][?query][#fragment]
//! ```
//!
//! The scanner is an explicit state machine. Each state consumes input from
//! the cursor and returns the next state, or `None` once input is exhausted.
//! Any failure stops the machine with the byte offset where it happened.
//!
//! Inside the id-string and parameters a `%` escapes the following byte:
//! both are copied verbatim and the escaped byte is never treated as a
//! delimiter. No percent-decoding happens, so rendering a parsed DID yields
//! the input unchanged.

use thiserror::Error;

use crate::config::MIN_DID_LENGTH;

/// A DID string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid DID at byte {offset}: {message}")]
pub struct ParseError {
    /// Byte offset into the input where parsing failed.
    pub offset: usize,
    /// What was expected there.
    pub message: String,
}

/// One `;name=value` DID parameter. The value is optional (`;name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

/// Structured fields of a parsed DID URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDid {
    pub method: String,
    /// Method-specific id, including any `:`-separated sub-ids.
    pub id: String,
    pub params: Vec<Param>,
    pub path_segments: Vec<String>,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Prefix,
    Method,
    Id,
    ParamName,
    ParamValue,
    Path,
    Query,
    Fragment,
}

struct Scanner<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: ParsedDid,
}

/// Parse a DID URL string.
///
/// # Example
///
/// ```
/// use aospace_identity::did::parser::parse;
///
/// let did = parse("did:aospace:abc;service=x/path?q=1#did0").unwrap();
/// assert_eq!(did.method, "aospace");
/// assert_eq!(did.id, "abc");
/// assert_eq!(did.fragment.as_deref(), Some("did0"));
/// ```
pub fn parse(input: &str) -> Result<ParsedDid, ParseError> {
    if input.len() < MIN_DID_LENGTH {
        return Err(ParseError {
            offset: 0,
            message: format!("input is shorter than {} bytes", MIN_DID_LENGTH),
        });
    }

    let mut scanner = Scanner {
        input,
        bytes: input.as_bytes(),
        pos: 0,
        out: ParsedDid::default(),
    };
    let mut state = Some(State::Prefix);
    while let Some(current) = state {
        state = scanner.step(current)?;
    }
    Ok(scanner.out)
}

impl<'a> Scanner<'a> {
    fn step(&mut self, state: State) -> Result<Option<State>, ParseError> {
        match state {
            State::Prefix => self.prefix(),
            State::Method => self.method(),
            State::Id => self.id(),
            State::ParamName => self.param_name(),
            State::ParamValue => self.param_value(),
            State::Path => self.path(),
            State::Query => self.query(),
            State::Fragment => self.fragment(),
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            offset,
            message: message.into(),
        }
    }

    /// Scan from the cursor to the first unescaped byte in `delimiters`,
    /// returning the scanned slice. The cursor stops on the delimiter.
    fn scan_escaped(&mut self, delimiters: &[u8]) -> Result<&'a str, ParseError> {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            if byte == b'%' {
                if self.pos + 1 >= self.bytes.len() {
                    return Err(self.error(self.pos, "'%' must be followed by a character"));
                }
                // Step over the escaped character as a whole.
                let next = self.input[self.pos + 1..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
                self.pos += 1 + next;
                continue;
            }
            if delimiters.contains(&byte) {
                break;
            }
            self.pos += 1;
        }
        Ok(&self.input[start..self.pos])
    }

    /// Scan to the first byte in `delimiters`, without escape handling.
    fn scan_plain(&mut self, delimiters: &[u8]) -> &'a str {
        let start = self.pos;
        while self.pos < self.bytes.len() && !delimiters.contains(&self.bytes[self.pos]) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// Consume the delimiter under the cursor and map it to the next state.
    fn dispatch(&mut self) -> Option<State> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        match byte {
            b':' => Some(State::Id),
            b';' => Some(State::ParamName),
            b'=' => Some(State::ParamValue),
            b'/' => Some(State::Path),
            b'?' => Some(State::Query),
            b'#' => Some(State::Fragment),
            _ => None,
        }
    }

    fn prefix(&mut self) -> Result<Option<State>, ParseError> {
        if !self.input.starts_with("did:") {
            return Err(self.error(0, "expected 'did:' prefix"));
        }
        self.pos = 4;
        Ok(Some(State::Method))
    }

    fn method(&mut self) -> Result<Option<State>, ParseError> {
        let start = self.pos;
        let method = self.scan_plain(b":");
        if self.pos >= self.bytes.len() {
            return Err(self.error(self.pos, "missing ':' after method name"));
        }
        if method.is_empty() {
            return Err(self.error(start, "method name is empty"));
        }
        self.out.method = method.to_string();
        self.pos += 1;
        Ok(Some(State::Id))
    }

    fn id(&mut self) -> Result<Option<State>, ParseError> {
        let start = self.pos;
        let first = self.out.id.is_empty();
        let segment = self.scan_escaped(b":;/?#")?;
        if first && segment.is_empty() {
            return Err(self.error(start, "method-specific id is empty"));
        }
        if !first {
            self.out.id.push(':');
        }
        self.out.id.push_str(segment);
        Ok(self.dispatch())
    }

    fn param_name(&mut self) -> Result<Option<State>, ParseError> {
        let start = self.pos;
        let name = self.scan_escaped(b"=;/?#")?;
        if name.is_empty() {
            return Err(self.error(start, "parameter name is empty"));
        }
        self.out.params.push(Param {
            name: name.to_string(),
            value: None,
        });
        Ok(self.dispatch())
    }

    fn param_value(&mut self) -> Result<Option<State>, ParseError> {
        let value = self.scan_escaped(b";/?#")?;
        if let Some(param) = self.out.params.last_mut() {
            param.value = Some(value.to_string());
        }
        Ok(self.dispatch())
    }

    fn path(&mut self) -> Result<Option<State>, ParseError> {
        let start = self.pos;
        let segment = self.scan_plain(b"/?#");
        if self.out.path_segments.is_empty() && segment.is_empty() {
            return Err(self.error(start, "first path segment is empty"));
        }
        self.out.path_segments.push(segment.to_string());
        Ok(self.dispatch())
    }

    fn query(&mut self) -> Result<Option<State>, ParseError> {
        let query = self.scan_plain(b"#");
        self.out.query = Some(query.to_string());
        Ok(self.dispatch())
    }

    fn fragment(&mut self) -> Result<Option<State>, ParseError> {
        self.out.fragment = Some(self.input[self.pos..].to_string());
        self.pos = self.bytes.len();
        Ok(None)
    }
}

impl ParsedDid {
    /// Render the parsed fields back into a DID URL string.
    pub fn render(&self) -> String {
        let mut out = format!("did:{}:{}", self.method, self.id);
        for param in &self.params {
            out.push(';');
            out.push_str(&param.name);
            if let Some(value) = &param.value {
                out.push('=');
                out.push_str(value);
            }
        }
        for segment in &self.path_segments {
            out.push('/');
            out.push_str(segment);
        }
        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}
