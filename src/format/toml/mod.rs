//! TOML format handler.
//!
//! TOML isn't indentation-sensitive like YAML, so there's no need for a
//! block/flow distinction in the parser: arrays and inline tables are
//! parsed the same way regardless of where they appear, recursively, via
//! `scan_value`. The same re-quoting rule as the YAML and JSON handlers
//! applies: a transformed scalar is always written back as a basic
//! double-quoted string, never as a literal string, because ciphertext may
//! contain bytes a TOML literal string can't carry verbatim in every case
//! and basic strings are the one form every TOML parser accepts unconditionally.

use std::sync::Arc;
use std::thread;

use crate::error::{EcfgError, Result};
use crate::format::{decode_public_key, Action, FormatHandler, PUBLIC_KEY_FIELD};
use crate::pipeline::Pipeline;

pub struct Toml;

impl FormatHandler for Toml {
    fn extract_public_key(&self, data: &[u8]) -> Result<[u8; 32]> {
        let raw = find_root_key(data, PUBLIC_KEY_FIELD)?;
        decode_public_key(raw.as_deref())
    }

    fn transform_scalar_values(&self, data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>> {
        transform(data, action)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }
    fn starts_with(&self, s: &str) -> bool {
        self.data[self.pos..].starts_with(s.as_bytes())
    }
    fn at_eof(&self) -> bool {
        self.pos >= self.data.len()
    }
}

struct Transformable {
    start: usize,
    end: usize,
    decoded: Vec<u8>,
}

fn skip_inline_ws(c: &mut Cursor) {
    while matches!(c.peek(), Some(b' ') | Some(b'\t')) {
        c.pos += 1;
    }
}

fn skip_ws_newlines_and_comments(c: &mut Cursor) {
    loop {
        match c.peek() {
            Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => c.pos += 1,
            Some(b'#') => {
                while !matches!(c.peek(), Some(b'\n') | None) {
                    c.pos += 1;
                }
            }
            _ => break,
        }
    }
}

fn skip_to_eol(c: &mut Cursor) {
    while !matches!(c.peek(), Some(b'\n') | None) {
        c.pos += 1;
    }
}

/// Whether this key's own value should be suppressed: the final dotted
/// segment, with quoting stripped, starts with `_`.
fn key_is_commented(key_text: &str) -> bool {
    let last = key_text.trim().rsplit('.').next().unwrap_or("");
    let last = last.trim().trim_matches('"').trim_matches('\'');
    last.starts_with('_')
}

fn parse_key_text(c: &mut Cursor) -> Result<String> {
    let start = c.pos;
    loop {
        match c.peek() {
            None | Some(b'\n') => return Err(EcfgError::DocumentMalformed("unterminated key".into())),
            Some(b'=') => break,
            Some(b'"') => skip_basic_string_raw(c)?,
            Some(b'\'') => skip_literal_string_raw(c)?,
            _ => c.pos += 1,
        }
    }
    Ok(String::from_utf8_lossy(&c.data[start..c.pos]).trim().to_string())
}

fn skip_basic_string_raw(c: &mut Cursor) -> Result<()> {
    c.pos += 1;
    loop {
        match c.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated string".into())),
            Some(b'\\') => {
                c.pos += 1;
            }
            Some(b'"') => return Ok(()),
            _ => {}
        }
    }
}

fn skip_literal_string_raw(c: &mut Cursor) -> Result<()> {
    c.pos += 1;
    loop {
        match c.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated string".into())),
            Some(b'\'') => return Ok(()),
            _ => {}
        }
    }
}

fn find_root_key(data: &[u8], name: &str) -> Result<Option<String>> {
    let mut c = Cursor::new(data);
    let mut dummy = Vec::new();
    loop {
        skip_ws_newlines_and_comments(&mut c);
        if c.at_eof() {
            return Ok(None);
        }
        if c.peek() == Some(b'[') {
            return Ok(None);
        }
        let key = parse_key_text(&mut c)?;
        if c.peek() != Some(b'=') {
            return Err(EcfgError::DocumentMalformed("expected '=' in key/value pair".into()));
        }
        c.pos += 1;
        skip_inline_ws(&mut c);
        if key.trim() == name {
            return match c.peek() {
                Some(b'"') | Some(b'\'') => {
                    let before = dummy.len();
                    scan_value(&mut c, false, &mut dummy)?;
                    Ok(dummy.get(before).map(|t| String::from_utf8_lossy(&t.decoded).into_owned()))
                }
                _ => Err(EcfgError::PublicKeyInvalid),
            };
        }
        scan_value(&mut c, true, &mut dummy)?;
        skip_inline_ws(&mut c);
        if c.starts_with("#") {
            skip_to_eol(&mut c);
        }
    }
}

fn transform(data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>> {
    let mut c = Cursor::new(data);
    let mut spans = Vec::new();
    loop {
        skip_ws_newlines_and_comments(&mut c);
        if c.at_eof() {
            break;
        }
        if c.peek() == Some(b'[') {
            skip_to_eol(&mut c);
            continue;
        }
        let key = parse_key_text(&mut c)?;
        if c.peek() != Some(b'=') {
            return Err(EcfgError::DocumentMalformed("expected '=' in key/value pair".into()));
        }
        c.pos += 1;
        skip_inline_ws(&mut c);
        let suppressed = key_is_commented(&key);
        scan_value(&mut c, suppressed, &mut spans)?;
        skip_inline_ws(&mut c);
        if c.starts_with("#") {
            skip_to_eol(&mut c);
        }
    }

    spans.sort_by_key(|t| t.start);
    let mut pline = Pipeline::new();
    let mut cursor = 0usize;
    for t in spans {
        if t.start < cursor {
            continue;
        }
        pline.append_bytes(&data[cursor..t.start]);
        let action = Arc::clone(action);
        let decoded = t.decoded;
        let handle = thread::Builder::new()
            .spawn(move || -> Result<Vec<u8>> {
                let transformed = action(&decoded).map_err(|e| EcfgError::ActionFailed(Box::new(e)))?;
                Ok(requote(&transformed))
            })
            .expect("spawning a scalar-transform thread never fails");
        pline.append_job(handle);
        cursor = t.end;
    }
    pline.append_bytes(&data[cursor..]);
    pline.flush()
}

fn requote(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plain.len() + 2);
    out.push(b'"');
    for &b in plain {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b'"');
    out
}

/// Parses whatever value starts at `c`'s current position, recording the
/// raw span and decoded content of every string it contains (respecting
/// `suppress` for this value and inline-table keys resetting it for their
/// own nested values), and leaves `c` positioned just past the value.
fn scan_value(c: &mut Cursor, suppress: bool, out: &mut Vec<Transformable>) -> Result<()> {
    match c.peek() {
        Some(b'"') if c.starts_with("\"\"\"") => {
            let (span, decoded) = parse_multiline_basic(c)?;
            if !suppress {
                out.push(Transformable { start: span.0, end: span.1, decoded });
            }
            Ok(())
        }
        Some(b'"') => {
            let (span, decoded) = parse_basic_string(c)?;
            if !suppress {
                out.push(Transformable { start: span.0, end: span.1, decoded });
            }
            Ok(())
        }
        Some(b'\'') if c.starts_with("'''") => {
            let (span, decoded) = parse_multiline_literal(c)?;
            if !suppress {
                out.push(Transformable { start: span.0, end: span.1, decoded });
            }
            Ok(())
        }
        Some(b'\'') => {
            let (span, decoded) = parse_literal_string(c)?;
            if !suppress {
                out.push(Transformable { start: span.0, end: span.1, decoded });
            }
            Ok(())
        }
        Some(b'[') => {
            c.pos += 1;
            loop {
                skip_ws_newlines_and_comments(c);
                if c.peek() == Some(b']') {
                    c.pos += 1;
                    break;
                }
                if c.at_eof() {
                    return Err(EcfgError::DocumentMalformed("unterminated array".into()));
                }
                scan_value(c, suppress, out)?;
                skip_ws_newlines_and_comments(c);
                if c.peek() == Some(b',') {
                    c.pos += 1;
                }
            }
            Ok(())
        }
        Some(b'{') => {
            c.pos += 1;
            loop {
                skip_inline_ws(c);
                if c.peek() == Some(b'}') {
                    c.pos += 1;
                    break;
                }
                if c.at_eof() {
                    return Err(EcfgError::DocumentMalformed("unterminated inline table".into()));
                }
                let key = parse_key_text(c)?;
                if c.peek() != Some(b'=') {
                    return Err(EcfgError::DocumentMalformed("expected '=' in inline table".into()));
                }
                c.pos += 1;
                skip_inline_ws(c);
                let key_suppressed = key_is_commented(&key);
                scan_value(c, key_suppressed, out)?;
                skip_inline_ws(c);
                if c.peek() == Some(b',') {
                    c.pos += 1;
                }
            }
            Ok(())
        }
        None => Err(EcfgError::DocumentMalformed("expected a value".into())),
        _ => {
            while !matches!(c.peek(), Some(b',') | Some(b']') | Some(b'}') | Some(b'\n') | Some(b'#') | None) {
                c.pos += 1;
            }
            Ok(())
        }
    }
}

fn parse_basic_string(c: &mut Cursor) -> Result<((usize, usize), Vec<u8>)> {
    let start = c.pos;
    c.pos += 1;
    let mut decoded = Vec::new();
    loop {
        match c.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated string".into())),
            Some(b'"') => break,
            Some(b'\\') => decode_escape(c, &mut decoded)?,
            Some(b) => decoded.push(b),
        }
    }
    Ok(((start, c.pos), decoded))
}

fn parse_literal_string(c: &mut Cursor) -> Result<((usize, usize), Vec<u8>)> {
    let start = c.pos;
    c.pos += 1;
    let mut decoded = Vec::new();
    loop {
        match c.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated string".into())),
            Some(b'\'') => break,
            Some(b) => decoded.push(b),
        }
    }
    Ok(((start, c.pos), decoded))
}

fn parse_multiline_basic(c: &mut Cursor) -> Result<((usize, usize), Vec<u8>)> {
    let start = c.pos;
    c.pos += 3;
    if c.peek() == Some(b'\n') {
        c.pos += 1;
    } else if c.starts_with("\r\n") {
        c.pos += 2;
    }
    let mut decoded = Vec::new();
    loop {
        if c.starts_with("\"\"\"") {
            c.pos += 3;
            break;
        }
        match c.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated multi-line string".into())),
            Some(b'\\') if matches!(c.peek(), Some(b'\n') | Some(b'\r')) => {
                // line-ending backslash: trim the newline and any leading
                // whitespace on the next line
                while matches!(c.peek(), Some(b'\n') | Some(b'\r') | Some(b' ') | Some(b'\t')) {
                    c.pos += 1;
                }
            }
            Some(b'\\') => decode_escape(c, &mut decoded)?,
            Some(b) => decoded.push(b),
        }
    }
    Ok(((start, c.pos), decoded))
}

fn parse_multiline_literal(c: &mut Cursor) -> Result<((usize, usize), Vec<u8>)> {
    let start = c.pos;
    c.pos += 3;
    if c.peek() == Some(b'\n') {
        c.pos += 1;
    } else if c.starts_with("\r\n") {
        c.pos += 2;
    }
    let mut decoded = Vec::new();
    loop {
        if c.starts_with("'''") {
            c.pos += 3;
            break;
        }
        match c.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated multi-line string".into())),
            Some(b) => decoded.push(b),
        }
    }
    Ok(((start, c.pos), decoded))
}

fn decode_escape(c: &mut Cursor, decoded: &mut Vec<u8>) -> Result<()> {
    match c.bump() {
        Some(b'n') => decoded.push(b'\n'),
        Some(b't') => decoded.push(b'\t'),
        Some(b'r') => decoded.push(b'\r'),
        Some(b'"') => decoded.push(b'"'),
        Some(b'\\') => decoded.push(b'\\'),
        Some(b'b') => decoded.push(0x08),
        Some(b'f') => decoded.push(0x0C),
        Some(b'u') => push_codepoint(c, 4, decoded)?,
        Some(b'U') => push_codepoint(c, 8, decoded)?,
        Some(other) => decoded.push(other),
        None => return Err(EcfgError::DocumentMalformed("unterminated escape".into())),
    }
    Ok(())
}

fn push_codepoint(c: &mut Cursor, digits: usize, decoded: &mut Vec<u8>) -> Result<()> {
    let start = c.pos;
    for _ in 0..digits {
        if !matches!(c.peek(), Some(b) if b.is_ascii_hexdigit()) {
            return Err(EcfgError::DocumentMalformed("invalid unicode escape".into()));
        }
        c.pos += 1;
    }
    let hex = std::str::from_utf8(&c.data[start..c.pos]).unwrap();
    let value = u32::from_str_radix(hex, 16).map_err(|_| EcfgError::DocumentMalformed("invalid unicode escape".into()))?;
    let ch = char::from_u32(value).ok_or_else(|| EcfgError::DocumentMalformed("invalid unicode escape".into()))?;
    let mut buf = [0u8; 4];
    decoded.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    Ok(())
}
