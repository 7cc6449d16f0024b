//! JSON format handler.
//!
//! Implemented as a single forward pass over the byte stream with an
//! explicit pushdown stack — no generic object model (`serde_json::Value`)
//! is built for the transform itself, because JSON objects have no
//! canonical key order once parsed into one; re-serializing from a generic
//! model would scramble key order and destroy diffs. `extract_public_key`
//! is the one place a generic decode is fine, since it only reads a single
//! top-level field and never re-serializes.

use std::sync::Arc;
use std::thread;

use serde::Deserialize;

use crate::error::{EcfgError, Result};
use crate::format::{decode_public_key, Action, FormatHandler, PUBLIC_KEY_FIELD};
use crate::pipeline::Pipeline;

pub struct Json;

#[derive(Deserialize)]
struct TopLevel {
    #[serde(rename = "_public_key")]
    public_key: Option<String>,
}

impl FormatHandler for Json {
    fn extract_public_key(&self, data: &[u8]) -> Result<[u8; 32]> {
        let _ = PUBLIC_KEY_FIELD; // documented via the struct's rename above
        let top: TopLevel = serde_json::from_slice(data)
            .map_err(|e| EcfgError::DocumentMalformed(e.to_string()))?;
        decode_public_key(top.public_key.as_deref())
    }

    fn transform_scalar_values(&self, data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>> {
        transform(data, action)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ObjWant {
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ArrWant {
    ValueOrEnd,
    CommaOrEnd,
}

enum Frame {
    Obj(ObjWant),
    Arr(ArrWant),
}

/// Walks the byte stream, splicing `action`'s result over every
/// transformable string value. Array elements and nested scalars are
/// dispatched as they're discovered; each runs the action on its own
/// thread, and `Pipeline` reassembles them in document order.
fn transform(data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>> {
    let mut pline = Pipeline::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut is_comment = false;
    let mut done = false;

    let mut i = 0usize;
    while i < data.len() {
        let c = data[i];

        if done {
            if c.is_ascii_whitespace() {
                pline.append_byte(c);
                i += 1;
                continue;
            }
            return Err(EcfgError::DocumentMalformed("trailing data after document".into()));
        }

        if c.is_ascii_whitespace() {
            pline.append_byte(c);
            i += 1;
            continue;
        }

        match c {
            b'{' => {
                expect_value_position(&mut stack)?;
                stack.push(Frame::Obj(ObjWant::Key));
                pline.append_byte(c);
                i += 1;
            }
            b'[' => {
                expect_value_position(&mut stack)?;
                stack.push(Frame::Arr(ArrWant::ValueOrEnd));
                pline.append_byte(c);
                i += 1;
            }
            b'}' => {
                match stack.pop() {
                    Some(Frame::Obj(ObjWant::Key)) | Some(Frame::Obj(ObjWant::CommaOrEnd)) => {}
                    _ => return Err(EcfgError::DocumentMalformed("unexpected '}'".into())),
                }
                pline.append_byte(c);
                i += 1;
                done = complete_value(&mut stack)?;
            }
            b']' => {
                match stack.pop() {
                    Some(Frame::Arr(ArrWant::ValueOrEnd)) | Some(Frame::Arr(ArrWant::CommaOrEnd)) => {}
                    _ => return Err(EcfgError::DocumentMalformed("unexpected ']'".into())),
                }
                pline.append_byte(c);
                i += 1;
                done = complete_value(&mut stack)?;
            }
            b':' => {
                match stack.last_mut() {
                    Some(Frame::Obj(want @ ObjWant::Colon)) => *want = ObjWant::Value,
                    _ => return Err(EcfgError::DocumentMalformed("unexpected ':'".into())),
                }
                pline.append_byte(c);
                i += 1;
            }
            b',' => {
                match stack.last_mut() {
                    Some(Frame::Obj(want @ ObjWant::CommaOrEnd)) => *want = ObjWant::Key,
                    Some(Frame::Arr(want @ ArrWant::CommaOrEnd)) => *want = ArrWant::ValueOrEnd,
                    _ => return Err(EcfgError::DocumentMalformed("unexpected ','".into())),
                }
                pline.append_byte(c);
                i += 1;
            }
            b'"' => {
                let is_key = matches!(stack.last(), Some(Frame::Obj(ObjWant::Key)));
                let start = i;
                let end = scan_string(data, i)?;
                let literal = &data[start..end];

                if is_key {
                    is_comment = literal.len() >= 2 && literal[1] == b'_';
                    pline.append_bytes(literal);
                    if let Some(Frame::Obj(want)) = stack.last_mut() {
                        *want = ObjWant::Colon;
                    }
                } else {
                    expect_value_position(&mut stack)?;
                    if is_comment {
                        pline.append_bytes(literal);
                    } else {
                        let owned = literal.to_vec();
                        let handle = spawn_action(Arc::clone(action), owned);
                        pline.append_job(handle);
                    }
                    done = complete_value(&mut stack)?;
                }
                i = end;
            }
            _ => {
                // Bare literal: number, true, false, or null. Always
                // emitted verbatim — only quoted strings are transformable.
                expect_value_position(&mut stack)?;
                let start = i;
                let end = scan_bare_literal(data, i);
                pline.append_bytes(&data[start..end]);
                i = end;
                done = complete_value(&mut stack)?;
            }
        }
    }

    if !stack.is_empty() {
        return Err(EcfgError::DocumentMalformed("unexpected end of input".into()));
    }

    pline.flush()
}

fn spawn_action(action: Arc<Action>, literal: Vec<u8>) -> thread::JoinHandle<Result<Vec<u8>>> {
    thread::Builder::new()
        .spawn(move || {
            let plain = unquote(&literal)?;
            let transformed = action(&plain).map_err(|e| EcfgError::ActionFailed(Box::new(e)))?;
            requote(&transformed)
        })
        .expect("spawning a scalar-transform thread never fails")
}

fn expect_value_position(stack: &mut [Frame]) -> Result<()> {
    match stack.last() {
        None => Ok(()),
        Some(Frame::Obj(ObjWant::Value)) => Ok(()),
        Some(Frame::Arr(ArrWant::ValueOrEnd)) => Ok(()),
        _ => Err(EcfgError::DocumentMalformed("value in unexpected position".into())),
    }
}

/// Advance the parent frame's state machine after a value (of any kind)
/// completes. Returns `true` if the whole document is now complete (the
/// stack is empty and we were at the top level).
fn complete_value(stack: &mut [Frame]) -> Result<bool> {
    match stack.last_mut() {
        None => Ok(true),
        Some(Frame::Obj(want @ ObjWant::Value)) => {
            *want = ObjWant::CommaOrEnd;
            Ok(false)
        }
        Some(Frame::Arr(want @ ArrWant::ValueOrEnd)) => {
            *want = ArrWant::CommaOrEnd;
            Ok(false)
        }
        _ => Ok(false),
    }
}

fn scan_string(data: &[u8], start: usize) -> Result<usize> {
    let mut i = start + 1;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 2,
            b'"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(EcfgError::DocumentMalformed("unterminated string".into()))
}

fn scan_bare_literal(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < data.len() && !matches!(data[i], b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r') {
        i += 1;
    }
    i
}

fn unquote(literal: &[u8]) -> Result<Vec<u8>> {
    let s = std::str::from_utf8(literal).map_err(|_| EcfgError::DocumentMalformed("invalid utf-8".into()))?;
    serde_json::from_str::<String>(s)
        .map(|s| s.into_bytes())
        .map_err(|e| EcfgError::DocumentMalformed(e.to_string()))
}

fn requote(plain: &[u8]) -> Result<Vec<u8>> {
    let s = std::str::from_utf8(plain).map_err(|_| EcfgError::DocumentMalformed("invalid utf-8".into()))?;
    let quoted = serde_json::to_string(s).map_err(|e| EcfgError::DocumentMalformed(e.to_string()))?;
    Ok(quoted.into_bytes())
}
