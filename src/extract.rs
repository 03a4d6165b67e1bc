use serde_json::Value;

use crate::node::ResponseData;

/// Resolve a dotted/bracket path like `data.users[0].id` against a JSON
/// value. An empty path returns the whole value; any missing intermediate
/// yields `None`. This never fails, which is what lets the engine treat a
/// path miss as "skip propagation" rather than an error.
///
/// A `null` leaf is a hit: the field exists and its value is null, which
/// still propagates. Only descending *through* a null is a miss (`get` on
/// `Null` answers `None`).
pub fn extract<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for segment in segments(path) {
        match segment {
            Segment::Key(key) => {
                current = current.get(key)?;
            }
            Segment::Index(idx) => {
                current = current.get(idx)?;
            }
        }
    }
    Some(current)
}

enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split `a.b[0].c` into Key("a"), Key("b"), Index(0), Key("c"). A leading
/// `[0]` (path into a top-level array) is also accepted.
fn segments(path: &str) -> impl Iterator<Item = Segment<'_>> {
    path.split('.').filter(|p| !p.is_empty()).flat_map(|part| {
        let mut out = Vec::new();
        match part.find('[') {
            Some(open) => {
                if open > 0 {
                    out.push(Segment::Key(&part[..open]));
                }
                let mut rest = &part[open..];
                while let Some(close) = rest.find(']') {
                    if let Ok(idx) = rest[1..close].parse::<usize>() {
                        out.push(Segment::Index(idx));
                    }
                    rest = &rest[close + 1..];
                    if !rest.starts_with('[') {
                        break;
                    }
                }
            }
            None => out.push(Segment::Key(part)),
        }
        out.into_iter()
    })
}

/// One selectable path discovered in a response, offered by the
/// output-socket editing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub path: String,
    pub name: String,
    pub type_name: String,
    pub preview: String,
}

const PREVIEW_LEN: usize = 50;

fn type_name_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview_of(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(PREVIEW_LEN).collect()
}

/// Walk a response body and enumerate the leaf paths a user can bind an
/// output socket to. Arrays contribute themselves plus their first three
/// items, mirroring what the editing surface shows.
pub fn available_fields(data: &Value, prefix: &str) -> Vec<FieldInfo> {
    let mut fields = Vec::new();
    collect_fields(data, prefix, &mut fields);
    fields
}

/// Every path an output socket can bind to on a response: the status
/// fields, one entry per header, then the body walked under `data`.
pub fn response_fields(response: &ResponseData) -> Vec<FieldInfo> {
    let mut fields = vec![
        FieldInfo {
            path: "status".to_string(),
            name: "status".to_string(),
            type_name: "number".to_string(),
            preview: response.status.to_string(),
        },
        FieldInfo {
            path: "statusText".to_string(),
            name: "statusText".to_string(),
            type_name: "string".to_string(),
            preview: response.status_text.clone(),
        },
    ];
    for (key, value) in &response.headers {
        fields.push(FieldInfo {
            path: format!("headers.{key}"),
            name: format!("headers.{key}"),
            type_name: "string".to_string(),
            preview: value.chars().take(PREVIEW_LEN).collect(),
        });
    }
    collect_fields(&response.data, "data", &mut fields);
    fields
}

fn collect_fields(value: &Value, prefix: &str, fields: &mut Vec<FieldInfo>) {
    match value {
        Value::Array(items) => {
            fields.push(FieldInfo {
                path: prefix.to_string(),
                name: prefix.rsplit('.').next().unwrap_or("array").to_string(),
                type_name: "array".to_string(),
                preview: format!("Array({})", items.len()),
            });
            for (idx, item) in items.iter().take(3).enumerate() {
                let item_path = format!("{prefix}[{idx}]");
                if item.is_object() || item.is_array() {
                    collect_fields(item, &item_path, fields);
                } else {
                    fields.push(FieldInfo {
                        path: item_path,
                        name: format!("[{idx}]"),
                        type_name: type_name_of(item).to_string(),
                        preview: preview_of(item),
                    });
                }
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if child.is_object() || child.is_array() {
                    collect_fields(child, &child_path, fields);
                } else {
                    fields.push(FieldInfo {
                        path: child_path,
                        name: key.clone(),
                        type_name: type_name_of(child).to_string(),
                        preview: preview_of(child),
                    });
                }
            }
        }
        leaf => {
            fields.push(FieldInfo {
                path: prefix.to_string(),
                name: prefix.rsplit('.').next().unwrap_or("").to_string(),
                type_name: type_name_of(leaf).to_string(),
                preview: preview_of(leaf),
            });
        }
    }
}
