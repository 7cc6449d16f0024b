//! YAML format handler.
//!
//! A hand-rolled recursive-descent parser over block-style YAML (mappings,
//! sequences, plain/quoted/block scalars, tags, anchors, aliases). No flow
//! collections (`{a: b}`, `[a, b]`) — secrets files are written in block
//! style in every example this tool has seen, and supporting both styles
//! roughly doubles the parser for a case that doesn't occur.
//!
//! Re-quoting: whatever style a transformed scalar originally had, its
//! replacement is always written as a double-quoted string. A `BoxedMessage`
//! wire form contains `:` and `[`/`]`, which are YAML-significant in plain
//! scalars, so preserving "it was plain before" isn't an option once the
//! value changes. Decrypted plaintext gets the same treatment for
//! consistency rather than trying to guess whether it would be safe
//! unquoted.

mod scanner;

use std::sync::Arc;
use std::thread;

use scanner::Scanner;

use crate::error::{EcfgError, Result};
use crate::format::{decode_public_key, Action, FormatHandler, PUBLIC_KEY_FIELD};
use crate::pipeline::Pipeline;

pub struct Yaml;

impl FormatHandler for Yaml {
    fn extract_public_key(&self, data: &[u8]) -> Result<[u8; 32]> {
        let root = parse_document(data)?;
        let raw = find_top_level(&root, PUBLIC_KEY_FIELD.as_bytes())
            .map(|s| String::from_utf8_lossy(&s.decoded).into_owned());
        decode_public_key(raw.as_deref())
    }

    fn transform_scalar_values(&self, data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>> {
        transform(data, action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

#[derive(Debug, Clone, Copy)]
enum Chomp {
    Strip,
    Clip,
    Keep,
}

#[derive(Debug)]
struct Scalar {
    #[allow(dead_code)]
    style: ScalarStyle,
    decoded: Vec<u8>,
    /// Byte range in the original document that a transformed replacement
    /// must overwrite — the quotes/block header included, the tag/anchor
    /// that may precede it excluded (those stay untouched).
    raw_span: (usize, usize),
}

impl Scalar {
    fn empty_at(pos: usize) -> Self {
        Scalar {
            style: ScalarStyle::Plain,
            decoded: Vec::new(),
            raw_span: (pos, pos),
        }
    }
}

#[derive(Debug)]
enum Node {
    Mapping(Vec<(Node, Node)>),
    Sequence(Vec<Node>),
    Scalar(Scalar),
    Alias,
}

pub fn parse_document(data: &[u8]) -> Result<Node> {
    let mut sc = Scanner::new(data);
    sc.skip_blank_and_comment_lines();
    if sc.starts_with("---") {
        sc.skip_to_eol();
        if sc.peek() == Some(b'\n') {
            sc.pos += 1;
        }
        sc.skip_blank_and_comment_lines();
    }
    if sc.at_eof() {
        return Ok(Node::Scalar(Scalar::empty_at(sc.pos)));
    }
    let indent = sc.column();
    parse_node(&mut sc, indent)
}

fn find_top_level<'a>(node: &'a Node, key_name: &[u8]) -> Option<&'a Scalar> {
    if let Node::Mapping(entries) = node {
        for (k, v) in entries {
            if let Node::Scalar(ks) = k {
                if ks.decoded == key_name {
                    if let Node::Scalar(vs) = v {
                        return Some(vs);
                    }
                }
            }
        }
    }
    None
}

struct Transformable {
    start: usize,
    end: usize,
    decoded: Vec<u8>,
}

fn collect(node: &Node, suppressed: bool, out: &mut Vec<Transformable>) {
    match node {
        Node::Scalar(s) => {
            if !suppressed && s.raw_span.1 > s.raw_span.0 {
                out.push(Transformable {
                    start: s.raw_span.0,
                    end: s.raw_span.1,
                    decoded: s.decoded.clone(),
                });
            }
        }
        Node::Sequence(items) => {
            for item in items {
                collect(item, suppressed, out);
            }
        }
        Node::Mapping(entries) => {
            for (key, value) in entries {
                let key_suppressed = match key {
                    Node::Scalar(ks) => ks.decoded.first() == Some(&b'_'),
                    _ => false,
                };
                collect(value, key_suppressed, out);
            }
        }
        Node::Alias => {}
    }
}

fn transform(data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>> {
    let root = parse_document(data)?;
    let mut spans = Vec::new();
    collect(&root, false, &mut spans);
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

fn parse_node(sc: &mut Scanner, indent: usize) -> Result<Node> {
    sc.skip_blank_and_comment_lines();
    if sc.at_eof() || sc.column() != indent {
        return Ok(Node::Scalar(Scalar::empty_at(sc.pos)));
    }
    if is_sequence_marker(sc) {
        parse_block_sequence(sc, indent)
    } else if line_has_mapping_colon(sc) {
        parse_block_mapping(sc, indent)
    } else {
        parse_scalar_or_alias(sc, indent)
    }
}

fn parse_nested_value(sc: &mut Scanner, parent_indent: usize) -> Result<Node> {
    let checkpoint = sc.pos;
    sc.skip_blank_and_comment_lines();
    if sc.at_eof() || sc.column() <= parent_indent {
        sc.pos = checkpoint;
        return Ok(Node::Scalar(Scalar::empty_at(checkpoint)));
    }
    let child_indent = sc.column();
    parse_node(sc, child_indent)
}

fn parse_block_mapping(sc: &mut Scanner, indent: usize) -> Result<Node> {
    let mut entries = Vec::new();
    loop {
        sc.skip_blank_and_comment_lines();
        if sc.at_eof() || sc.column() != indent {
            break;
        }
        if sc.starts_with("---") || sc.starts_with("...") || is_sequence_marker(sc) {
            break;
        }
        let key = parse_key(sc)?;
        sc.skip_spaces();
        if sc.peek() != Some(b':') {
            return Err(EcfgError::DocumentMalformed("expected ':' after mapping key".into()));
        }
        sc.pos += 1;
        let value = match sc.peek() {
            Some(b' ') => {
                sc.skip_spaces();
                if matches!(sc.peek(), None | Some(b'\n')) || sc.starts_with("#") {
                    parse_nested_value(sc, indent)?
                } else {
                    parse_scalar_or_alias(sc, indent)?
                }
            }
            None | Some(b'\n') => parse_nested_value(sc, indent)?,
            _ => return Err(EcfgError::DocumentMalformed("expected space after ':'".into())),
        };
        entries.push((Node::Scalar(key), value));
    }
    Ok(Node::Mapping(entries))
}

fn parse_block_sequence(sc: &mut Scanner, indent: usize) -> Result<Node> {
    let mut items = Vec::new();
    loop {
        sc.skip_blank_and_comment_lines();
        if sc.at_eof() || sc.column() != indent || !is_sequence_marker(sc) {
            break;
        }
        sc.pos += 1;
        if sc.peek() == Some(b' ') {
            sc.skip_spaces();
        }
        if matches!(sc.peek(), None | Some(b'\n')) || sc.starts_with("#") {
            items.push(parse_nested_value(sc, indent)?);
        } else {
            let item_col = sc.column();
            if line_has_mapping_colon(sc) {
                items.push(parse_block_mapping(sc, item_col)?);
            } else {
                items.push(parse_scalar_or_alias(sc, item_col)?);
            }
        }
    }
    Ok(Node::Sequence(items))
}

fn is_sequence_marker(sc: &Scanner) -> bool {
    sc.peek() == Some(b'-') && !sc.starts_with("---") && matches!(sc.peek_at(1), Some(b' ') | Some(b'\n') | None)
}

/// Scans the rest of the current line, quote-aware, for a top-level `:`
/// that marks this as a mapping key line rather than a bare scalar.
fn line_has_mapping_colon(sc: &Scanner) -> bool {
    let data = sc.data;
    let mut i = sc.pos;
    let mut in_single = false;
    let mut in_double = false;
    while i < data.len() && data[i] != b'\n' {
        let b = data[i];
        if in_double {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_double = false;
            }
            i += 1;
            continue;
        }
        if in_single {
            if b == b'\'' {
                if data.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                in_single = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                in_double = true;
                i += 1;
            }
            b'\'' => {
                in_single = true;
                i += 1;
            }
            b'#' if i > sc.pos && data[i - 1] == b' ' => return false,
            b':' => {
                let next = data.get(i + 1).copied();
                if next.is_none() || next == Some(b'\n') || next == Some(b' ') {
                    return true;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    false
}

fn parse_scalar_or_alias(sc: &mut Scanner, owner_indent: usize) -> Result<Node> {
    match sc.peek() {
        Some(b'!') => {
            sc.pos += 1;
            skip_non_blank(sc);
            sc.skip_spaces();
            parse_scalar_or_alias(sc, owner_indent)
        }
        Some(b'&') => {
            sc.pos += 1;
            skip_non_blank(sc);
            sc.skip_spaces();
            parse_scalar_or_alias(sc, owner_indent)
        }
        Some(b'*') => {
            sc.pos += 1;
            skip_non_blank(sc);
            Ok(Node::Alias)
        }
        Some(b'"') => Ok(Node::Scalar(parse_double_quoted(sc)?)),
        Some(b'\'') => Ok(Node::Scalar(parse_single_quoted(sc)?)),
        Some(b'|') => Ok(Node::Scalar(parse_block_scalar(sc, ScalarStyle::Literal, owner_indent)?)),
        Some(b'>') => Ok(Node::Scalar(parse_block_scalar(sc, ScalarStyle::Folded, owner_indent)?)),
        _ => Ok(Node::Scalar(parse_plain_value(sc)?)),
    }
}

fn skip_non_blank(sc: &mut Scanner) {
    while !matches!(sc.peek(), None | Some(b' ') | Some(b'\n')) {
        sc.pos += 1;
    }
}

fn parse_key(sc: &mut Scanner) -> Result<Scalar> {
    match sc.peek() {
        Some(b'"') => parse_double_quoted(sc),
        Some(b'\'') => parse_single_quoted(sc),
        _ => parse_plain_key(sc),
    }
}

fn parse_plain_key(sc: &mut Scanner) -> Result<Scalar> {
    let start = sc.pos;
    loop {
        match sc.peek() {
            None | Some(b'\n') => break,
            Some(b':') if matches!(sc.peek_at(1), Some(b' ') | Some(b'\n') | None) => break,
            _ => sc.pos += 1,
        }
    }
    let end = sc.pos;
    let raw = &sc.data[start..end];
    let trimmed_len = trim_trailing_len(raw);
    Ok(Scalar {
        style: ScalarStyle::Plain,
        decoded: raw[..trimmed_len].to_vec(),
        raw_span: (start, start + trimmed_len),
    })
}

fn parse_plain_value(sc: &mut Scanner) -> Result<Scalar> {
    let start = sc.pos;
    while let Some(b) = sc.peek() {
        if b == b'\n' {
            break;
        }
        if b == b'#' && sc.pos > start && sc.data[sc.pos - 1] == b' ' {
            break;
        }
        sc.pos += 1;
    }
    let end = sc.pos;
    let raw = &sc.data[start..end];
    let trimmed_len = trim_trailing_len(raw);
    Ok(Scalar {
        style: ScalarStyle::Plain,
        decoded: raw[..trimmed_len].to_vec(),
        raw_span: (start, start + trimmed_len),
    })
}

fn parse_double_quoted(sc: &mut Scanner) -> Result<Scalar> {
    let start = sc.pos;
    sc.pos += 1;
    let mut decoded = Vec::new();
    loop {
        match sc.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated double-quoted scalar".into())),
            Some(b'"') => break,
            Some(b'\\') => match sc.bump() {
                Some(b'n') => decoded.push(b'\n'),
                Some(b't') => decoded.push(b'\t'),
                Some(b'r') => decoded.push(b'\r'),
                Some(b'"') => decoded.push(b'"'),
                Some(b'\\') => decoded.push(b'\\'),
                Some(b'0') => decoded.push(0),
                Some(other) => decoded.push(other),
                None => return Err(EcfgError::DocumentMalformed("unterminated escape".into())),
            },
            Some(b'\n') => decoded.push(b' '),
            Some(b) => decoded.push(b),
        }
    }
    let end = sc.pos;
    Ok(Scalar {
        style: ScalarStyle::DoubleQuoted,
        decoded,
        raw_span: (start, end),
    })
}

fn parse_single_quoted(sc: &mut Scanner) -> Result<Scalar> {
    let start = sc.pos;
    sc.pos += 1;
    let mut decoded = Vec::new();
    loop {
        match sc.bump() {
            None => return Err(EcfgError::DocumentMalformed("unterminated single-quoted scalar".into())),
            Some(b'\'') => {
                if sc.peek() == Some(b'\'') {
                    decoded.push(b'\'');
                    sc.pos += 1;
                } else {
                    break;
                }
            }
            Some(b) => decoded.push(b),
        }
    }
    let end = sc.pos;
    Ok(Scalar {
        style: ScalarStyle::SingleQuoted,
        decoded,
        raw_span: (start, end),
    })
}

fn parse_block_scalar(sc: &mut Scanner, style: ScalarStyle, owner_indent: usize) -> Result<Scalar> {
    let indicator_pos = sc.pos;
    sc.pos += 1;
    let mut chomp = Chomp::Clip;
    match sc.peek() {
        Some(b'-') => {
            chomp = Chomp::Strip;
            sc.pos += 1;
        }
        Some(b'+') => {
            chomp = Chomp::Keep;
            sc.pos += 1;
        }
        _ => {}
    }
    if let Some(b) = sc.peek() {
        if b.is_ascii_digit() {
            sc.pos += 1;
        }
    }
    sc.skip_spaces();
    if sc.starts_with("#") {
        sc.skip_to_eol();
    }
    if sc.peek() == Some(b'\n') {
        sc.pos += 1;
    }

    let mut body_indent: Option<usize> = None;
    let mut lines: Vec<(usize, usize)> = Vec::new();
    loop {
        if sc.at_eof() {
            break;
        }
        let line_start = sc.pos;
        let mut p = line_start;
        while sc.data.get(p) == Some(&b' ') {
            p += 1;
        }
        let indent_here = p - line_start;
        let is_blank = matches!(sc.data.get(p), Some(b'\n') | None);
        if is_blank {
            lines.push((p, p));
            sc.pos = p;
            if sc.peek() == Some(b'\n') {
                sc.pos += 1;
            }
            continue;
        }
        match body_indent {
            Some(bi) if indent_here < bi => break,
            Some(_) => {}
            None => {
                if indent_here <= owner_indent {
                    break;
                }
                body_indent = Some(indent_here);
            }
        }
        let bi = body_indent.unwrap();
        sc.pos = line_start + bi;
        let content_start = sc.pos;
        sc.skip_to_eol();
        lines.push((content_start, sc.pos));
        if sc.peek() == Some(b'\n') {
            sc.pos += 1;
        }
    }

    let mut decoded = Vec::new();
    for idx in 0..lines.len() {
        let (s, e) = lines[idx];
        let blank = s == e;
        if idx > 0 {
            match style {
                ScalarStyle::Literal => decoded.push(b'\n'),
                _ => {
                    if blank {
                        decoded.push(b'\n');
                    } else {
                        let prev_blank = lines[idx - 1].0 == lines[idx - 1].1;
                        if !prev_blank {
                            decoded.push(b' ');
                        }
                    }
                }
            }
        }
        decoded.extend_from_slice(&sc.data[s..e]);
    }
    match chomp {
        Chomp::Strip => {}
        Chomp::Clip => {
            if !lines.is_empty() {
                decoded.push(b'\n');
            }
        }
        Chomp::Keep => {
            let trailing_blanks = lines.iter().rev().take_while(|(s, e)| s == e).count();
            decoded.push(b'\n');
            for _ in 0..trailing_blanks {
                decoded.push(b'\n');
            }
        }
    }

    Ok(Scalar {
        style,
        decoded,
        raw_span: (indicator_pos, sc.pos),
    })
}

fn trim_trailing_len(raw: &[u8]) -> usize {
    let mut len = raw.len();
    while len > 0 && matches!(raw[len - 1], b' ' | b'\t' | b'\r') {
        len -= 1;
    }
    len
}
