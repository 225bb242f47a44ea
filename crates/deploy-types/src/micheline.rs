//! Micheline JSON helpers.
//!
//! The pipeline never encodes Micheline to binary. It builds a few small values
//! (setter arguments, storage maps), digs packed bytes out of compiler output,
//! and renders values as Michelson text for tools that do not accept JSON.

use serde_json::{json, Value};

/// `Pair <bytes> <index>`, the record `{ func; index }` after field sorting.
pub fn pair_bytes_index(bytes: &[u8], index: u32) -> Value {
    json!({
        "prim": "Pair",
        "args": [
            { "bytes": hex::encode(bytes) },
            { "int": index.to_string() }
        ]
    })
}

/// A `big_map nat bytes` literal: `{ Elt 0 0x..; Elt 1 0x.. }`.
pub fn big_map_literal<'a>(entries: impl IntoIterator<Item = (u32, &'a [u8])>) -> Value {
    Value::Array(
        entries
            .into_iter()
            .map(|(index, bytes)| {
                json!({
                    "prim": "Elt",
                    "args": [
                        { "int": index.to_string() },
                        { "bytes": hex::encode(bytes) }
                    ]
                })
            })
            .collect(),
    )
}

/// Decode a `{ "bytes": "..." }` node.
pub fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    value
        .get("bytes")
        .and_then(Value::as_str)
        .and_then(|s| hex::decode(s).ok())
}

/// Find the packed lambda for `index` inside a compiled setter expression.
///
/// Depth-first search for a `Pair` whose first argument is a bytes node and
/// whose second is the int `index`. The position of the record inside the
/// contract's parameter type varies, so the shape is matched instead of a path.
pub fn find_packed_fragment(value: &Value, index: u32) -> Option<Vec<u8>> {
    match value {
        Value::Object(obj) => {
            if obj.get("prim").and_then(Value::as_str) == Some("Pair") {
                if let Some(args) = obj.get("args").and_then(Value::as_array) {
                    if args.len() == 2 {
                        let index_matches = args[1]
                            .get("int")
                            .and_then(Value::as_str)
                            .map(|i| i == index.to_string())
                            .unwrap_or(false);
                        if index_matches {
                            if let Some(bytes) = as_bytes(&args[0]) {
                                return Some(bytes);
                            }
                        }
                    }
                }
            }
            obj.get("args")
                .and_then(Value::as_array)
                .and_then(|args| args.iter().find_map(|a| find_packed_fragment(a, index)))
        }
        Value::Array(items) => items.iter().find_map(|v| find_packed_fragment(v, index)),
        _ => None,
    }
}

/// Render a Micheline JSON value as Michelson source text.
pub fn to_michelson(value: &Value) -> String {
    let mut out = String::new();
    write_node(value, false, &mut out);
    out
}

fn write_node(value: &Value, nested: bool, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                out.push_str(if i == 0 { " " } else { " ; " });
                write_node(item, false, out);
            }
            out.push_str(if items.is_empty() { "}" } else { " }" });
        }
        Value::Object(obj) => {
            if let Some(int) = obj.get("int").and_then(Value::as_str) {
                out.push_str(int);
            } else if let Some(s) = obj.get("string").and_then(Value::as_str) {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            } else if let Some(bytes) = obj.get("bytes").and_then(Value::as_str) {
                out.push_str("0x");
                out.push_str(bytes);
            } else if let Some(prim) = obj.get("prim").and_then(Value::as_str) {
                let args = obj
                    .get("args")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let annots = obj
                    .get("annots")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let wrap = nested && (!args.is_empty() || !annots.is_empty());
                if wrap {
                    out.push('(');
                }
                out.push_str(prim);
                for annot in annots.iter().filter_map(Value::as_str) {
                    out.push(' ');
                    out.push_str(annot);
                }
                for arg in args {
                    out.push(' ');
                    write_node(arg, true, out);
                }
                if wrap {
                    out.push(')');
                }
            }
        }
        _ => {}
    }
}
