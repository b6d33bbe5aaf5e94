// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Parsing of individual part-header lines.
//!
//! Only `Content-Disposition` and `Content-Type` matter to the decoder, and
//! the parameter grammar it needs (`; key=value` with optional quoting) is a
//! small subset of RFC 2045, so the lines are parsed locally instead of
//! pulling in a general MIME header parser. Unknown fields and parameters are
//! preserved for the caller to inspect but are otherwise ignored.

use std::str;

use log::warn;

/// One parsed header line, field name and parameter keys lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderLine {
    pub name: String,
    pub value: String,
    pub params: Vec<(String, String)>,
}

impl HeaderLine {
    /// First parameter with the given (lowercase) key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a single header line with the trailing CRLF already stripped.
///
/// Errors are reasons only; the decoder attaches the stream offset.
pub(crate) fn parse(line: &[u8]) -> Result<HeaderLine, String> {
    let line = str::from_utf8(line).map_err(|_| "header line is not valid UTF-8".to_owned())?;

    let colon = line
        .find(':')
        .ok_or_else(|| format!("header line {:?} has no colon", line))?;

    let name = line[..colon].trim();
    if name.is_empty() {
        return Err("header field name is empty".to_owned());
    }

    let rest = &line[colon + 1..];
    let (value, mut rest) = match rest.find(';') {
        Some(semi) => (&rest[..semi], &rest[semi + 1..]),
        None => (rest, ""),
    };

    let mut params = Vec::new();
    while let Some((key, value, after)) = split_param(rest) {
        params.push((key.to_ascii_lowercase(), value));
        rest = after;
    }

    Ok(HeaderLine {
        name: name.to_ascii_lowercase(),
        value: value.trim().to_owned(),
        params,
    })
}

/// Take one `key=value` pair off the front of a parameter list.
fn split_param(input: &str) -> Option<(&str, String, &str)> {
    let input = input.trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
    if input.is_empty() {
        return None;
    }

    match input.find(|c| c == '=' || c == ';') {
        Some(at) if input[at..].starts_with('=') => {
            let key = input[..at].trim();
            let (value, rest) = param_value(&input[at + 1..]);
            Some((key, value, rest))
        }
        // A bare token without a value; keep it with an empty value.
        Some(at) => Some((input[..at].trim(), String::new(), &input[at + 1..])),
        None => Some((input.trim(), String::new(), "")),
    }
}

/// Read a parameter value, either a bare token or a quoted string with
/// `\"` and `\\` escapes.
fn param_value(input: &str) -> (String, &str) {
    let input = input.trim_start();

    if let Some(quoted) = input.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = quoted.char_indices();

        while let Some((at, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                '"' => return (value, &quoted[at + 1..]),
                _ => value.push(c),
            }
        }

        warn!("unterminated quoted string in header parameter: {:?}", input);
        (value, "")
    } else {
        match input.find(';') {
            Some(semi) => (input[..semi].trim().to_owned(), &input[semi + 1..]),
            None => (input.trim().to_owned(), ""),
        }
    }
}
