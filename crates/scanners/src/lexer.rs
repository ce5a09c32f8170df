//! Delimiter-counting lexer for Groovy-flavoured workflow sources.
//!
//! Braces are balanced at any depth; braces inside `//` and `/* */`
//! comments, single, double and triple quoted strings are ignored, while
//! `${...}` interpolations inside double-quoted strings are balanced
//! recursively.

use std::ops::Range;

/// A named `process NAME { ... }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block<'a> {
    pub name: &'a str,
    pub body: &'a str,
    /// Byte offset of `body` within the source
    pub body_offset: usize,
}

/// The embedded shell script of a block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptSection<'a> {
    pub text: &'a str,
    /// Byte offset of `text` within the block body
    pub text_offset: usize,
    /// Body range covered by the keyword and the string literal
    pub span: Range<usize>,
}

/// Index of the `}` matching the `{` at `open`.
pub(crate) fn find_closing_brace(src: &str, open: usize) -> Option<usize> {
    closing_brace(src.as_bytes(), open)
}

fn closing_brace(bytes: &[u8], open: usize) -> Option<usize> {
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i + 2)?,
            b'"' | b'\'' => i = skip_string(bytes, i)?,
            _ => i += 1,
        }
    }
    None
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| from + pos)
}

fn skip_block_comment(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(2)
        .position(|pair| pair == b"*/")
        .map(|pos| from + pos + 2)
}

/// Index just past the string literal starting at `start`.
///
/// A newline ends an unterminated single-line string so one stray quote
/// cannot swallow the rest of the file.
fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let fence = [quote; 3];
    let triple = bytes.get(start..start + 3) == Some(&fence[..]);
    let interpolating = quote == b'"';
    let mut i = start + if triple { 3 } else { 1 };
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if interpolating && bytes.get(i + 1) == Some(&b'{') => {
                i = closing_brace(bytes, i + 1)? + 1;
            }
            b'\n' if !triple => return Some(i),
            b if b == quote => {
                if !triple {
                    return Some(i + 1);
                }
                if bytes.get(i..i + 3) == Some(&fence[..]) {
                    return Some(i + 3);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Every top-level `process NAME { ... }` block in document order.
pub(crate) fn find_processes(src: &str) -> Vec<Block<'_>> {
    let Some(header) = static_regex!(r"(?m)^[ \t]*process[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\{")
    else {
        return Vec::new();
    };
    let mut blocks = Vec::new();
    let mut resume = 0;
    while let Some(caps) = header.captures_at(src, resume) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let open = whole.end() - 1;
        let Some(close) = find_closing_brace(src, open) else {
            log::debug!("unbalanced process block {}", name.as_str());
            resume = whole.end();
            continue;
        };
        blocks.push(Block {
            name: name.as_str(),
            body: &src[open + 1..close],
            body_offset: open + 1,
        });
        resume = close + 1;
    }
    blocks
}

/// Locate the `script:`/`shell:` string of a process body.
///
/// The first triple-quoted string after the keyword wins, else a quoted
/// string directly following it. Bodies without the keyword fall back to
/// their first triple-quoted string.
pub(crate) fn script_section(body: &str) -> Option<ScriptSection<'_>> {
    let keyword = static_regex!(r"(?m)^[ \t]*(?:script|shell)[ \t]*:")?;
    let Some(found) = keyword.find(body) else {
        let (start, end) = triple_quoted_from(body, 0)?;
        return Some(section(body, start, end, 3, start..end));
    };
    let after = found.end();
    let rest = &body[after..];
    let lead = rest.len() - rest.trim_start().len();
    let start = after + lead;
    let bytes = body.as_bytes();
    match bytes.get(start) {
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            let fence = [quote; 3];
            if bytes.get(start..start + 3) == Some(&fence[..]) {
                let end = skip_string(bytes, start)?;
                Some(section(body, start, end, 3, found.start()..end))
            } else {
                let end = skip_string(bytes, start)?;
                if bytes.get(end - 1) != Some(&quote) || end - start < 2 {
                    return None;
                }
                Some(section(body, start, end, 1, found.start()..end))
            }
        }
        _ => {
            let (start, end) = triple_quoted_from(body, after)?;
            Some(section(body, start, end, 3, found.start()..end))
        }
    }
}

fn section(body: &str, start: usize, end: usize, fence: usize, span: Range<usize>) -> ScriptSection<'_> {
    let inner_end = end.saturating_sub(fence).max(start + fence);
    ScriptSection {
        text: body.get(start + fence..inner_end).unwrap_or(""),
        text_offset: start + fence,
        span,
    }
}

/// `(start, end)` of the first complete triple-quoted string at or after `from`.
fn triple_quoted_from(body: &str, from: usize) -> Option<(usize, usize)> {
    let tail = body.get(from..)?;
    let start = [tail.find("\"\"\""), tail.find("'''")]
        .into_iter()
        .flatten()
        .min()?
        + from;
    let end = skip_string(body.as_bytes(), start)?;
    Some((start, end))
}

/// 1-based line number of a byte offset.
pub(crate) fn line_at(src: &str, offset: usize) -> usize {
    let offset = offset.min(src.len());
    src.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}
