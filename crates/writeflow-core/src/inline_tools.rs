// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Grammar-aware extraction of inline tool-use spans.
//!
//! Some providers emit tool calls as native structured items; others (or a
//! misconfigured request to an otherwise-native provider) inline them as
//! XML-like spans inside the text stream:
//!
//! ```text
//! <invoke name="read_file"><parameter name="path">src/lib.rs</parameter></invoke>
//! ```
//!
//! [`extract_inline_tool_calls`] finds every *balanced* `<invoke>` span in a
//! completed text block, turns it into a [`ToolCall`] indistinguishable from
//! one the provider announced natively, and removes it from the visible
//! text. An `<invoke>` with no matching `</invoke>` is left untouched in the
//! returned text — an unbalanced span is a contract violation, not a tool
//! call, and must not be silently swallowed.
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use writeflow_tools::ToolCall;

fn invoke_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<invoke\s+name="([^"]*)"\s*>"#).expect("valid regex"))
}

fn parameter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<parameter\s+name="([^"]*)"\s*>(.*?)</parameter>"#).expect("valid regex")
    })
}

const INVOKE_CLOSE: &str = "</invoke>";

/// Result of running the extractor over one completed text block.
#[derive(Debug, Default, Clone)]
pub struct Extraction {
    /// The input text with every balanced `<invoke>` span removed.
    pub text: String,
    /// Tool calls recovered from the removed spans, in the order they
    /// appeared in the original text.
    pub tool_calls: Vec<ToolCall>,
}

/// Scan `text` for balanced `<invoke name="…"><parameter name="…">…</parameter>…</invoke>`
/// spans and extract them as [`ToolCall`]s. Spans are not nested — only the
/// inner `<parameter>` tags are structural. An opening `<invoke>` with no
/// matching `</invoke>` before the end of `text` is left in place verbatim.
pub fn extract_inline_tool_calls(text: &str, call_id_prefix: &str) -> Extraction {
    let mut out = String::with_capacity(text.len());
    let mut calls = Vec::new();
    let mut cursor = 0usize;
    let mut seq = 0u32;

    loop {
        let Some(open) = invoke_open_re().captures_at(text, cursor) else {
            out.push_str(&text[cursor..]);
            break;
        };
        let whole_open = open.get(0).unwrap();
        let name = open.get(1).unwrap().as_str().to_string();

        let Some(close_rel) = text[whole_open.end()..].find(INVOKE_CLOSE) else {
            // Unbalanced: no closing tag anywhere after this point. Stop
            // extracting and keep the remainder of the text verbatim —
            // re-surfacing it rather than silently dropping it.
            out.push_str(&text[cursor..]);
            break;
        };
        let body_start = whole_open.end();
        let body_end = body_start + close_rel;
        let span_end = body_end + INVOKE_CLOSE.len();

        out.push_str(&text[cursor..whole_open.start()]);

        let body = &text[body_start..body_end];
        let mut args = Map::new();
        for p in parameter_re().captures_iter(body) {
            let key = p.get(1).unwrap().as_str().to_string();
            let value = p.get(2).unwrap().as_str().trim().to_string();
            args.insert(key, Value::String(value));
        }

        seq += 1;
        calls.push(ToolCall {
            id: format!("{call_id_prefix}-{seq}"),
            name,
            args: Value::Object(args),
        });

        cursor = span_end;
    }

    Extraction { text: out.trim().to_string(), tool_calls: calls }
}

/// Re-serialize an extracted [`ToolCall`] back into its inline XML-like form.
/// Used only by the round-trip test below; never called from the agent loop.
fn reserialize(call: &ToolCall) -> String {
    let mut s = format!(r#"<invoke name="{}">"#, call.name);
    if let Value::Object(map) = &call.args {
        for (k, v) in map {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            s.push_str(&format!(r#"<parameter name="{k}">{v}</parameter>"#));
        }
    }
    s.push_str(INVOKE_CLOSE);
    s
}
