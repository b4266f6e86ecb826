use serde_json::{json, Map, Value};

use crate::error::{LogDrainError, Result};
use crate::parser::parse_timestamp_str;

/// Argument type accepted by a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Positive integer; numbers and digit strings are coerced.
    Integer,
    Str,
    /// RFC 3339 or `YYYY-MM-DD HH:MM:SS` string.
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<i64>,
    pub description: &'static str,
}

/// One named, schema-described query operation. The catalog is fixed for
/// the process lifetime and shared verbatim by both protocol front-ends.
#[derive(Debug, Clone, Copy)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamDef],
}

const LIMIT: ParamDef = ParamDef {
    name: "limit",
    kind: ParamKind::Integer,
    required: false,
    default: Some(100),
    description: "Number of logs to return",
};

pub const TOOLS: &[ToolDef] = &[
    ToolDef {
        name: "logs.recent",
        description: "Get recent logs",
        params: &[LIMIT],
    },
    ToolDef {
        name: "logs.timeRange",
        description: "Get logs within time range",
        params: &[
            ParamDef {
                name: "from",
                kind: ParamKind::Timestamp,
                required: true,
                default: None,
                description: "Start timestamp",
            },
            ParamDef {
                name: "to",
                kind: ParamKind::Timestamp,
                required: true,
                default: None,
                description: "End timestamp",
            },
        ],
    },
    ToolDef {
        name: "logs.errors",
        description: "Get error logs only",
        params: &[LIMIT],
    },
    ToolDef {
        name: "logs.search",
        description: "Search logs by message text (case-insensitive substring)",
        params: &[
            ParamDef {
                name: "query",
                kind: ParamKind::Str,
                required: true,
                default: None,
                description: "Search query",
            },
            LIMIT,
        ],
    },
    ToolDef {
        name: "logs.byRequest",
        description: "Get all logs for a request ID",
        params: &[ParamDef {
            name: "requestId",
            kind: ParamKind::Str,
            required: true,
            default: None,
            description: "Request ID to search for",
        }],
    },
    ToolDef {
        name: "logs.stats",
        description: "Get log statistics",
        params: &[ParamDef {
            name: "hours",
            kind: ParamKind::Integer,
            required: false,
            default: Some(24),
            description: "Number of hours to analyze",
        }],
    },
];

/// Resolve a tool by either spelling: the canonical line-protocol name
/// (`logs.recent`) or the discover/invoke alias (`logs_recent`).
pub fn find(name: &str) -> Option<&'static ToolDef> {
    TOOLS
        .iter()
        .find(|t| t.name == name || t.invoke_name() == name)
}

/// Full catalog for the discovery operation.
pub fn catalog() -> Value {
    Value::Array(
        TOOLS
            .iter()
            .map(|t| {
                json!({
                    "name": t.invoke_name(),
                    "description": t.description,
                    "inputSchema": t.input_schema(),
                })
            })
            .collect(),
    )
}

impl ToolDef {
    pub fn invoke_name(&self) -> String {
        self.name.replace('.', "_")
    }

    /// JSON schema generated from the parameter definitions, so discovery
    /// always reflects exactly what the dispatcher validates.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in self.params {
            let mut prop = Map::new();
            let kind = match p.kind {
                ParamKind::Integer => "number",
                ParamKind::Str | ParamKind::Timestamp => "string",
            };
            prop.insert("type".to_string(), json!(kind));
            prop.insert("description".to_string(), json!(p.description));
            if let Some(default) = p.default {
                prop.insert("default".to_string(), json!(default));
            }
            properties.insert(p.name.to_string(), Value::Object(prop));
            if p.required {
                required.push(p.name);
            }
        }

        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Fill defaults for omitted optional parameters, reject missing
    /// required ones, and coerce the rest to their declared kinds.
    pub fn resolve_args(&self, args: &Value) -> Result<Map<String, Value>> {
        let empty = Map::new();
        let supplied = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(LogDrainError::InvalidParams(
                    "arguments must be an object".to_string(),
                ))
            }
        };

        let mut resolved = Map::new();
        for p in self.params {
            match supplied.get(p.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    resolved.insert(p.name.to_string(), coerce(p, value)?);
                }
                None if p.required => {
                    return Err(LogDrainError::InvalidParams(format!(
                        "missing required parameter `{}`",
                        p.name
                    )));
                }
                None => {
                    if let Some(default) = p.default {
                        resolved.insert(p.name.to_string(), json!(default));
                    }
                }
            }
        }
        Ok(resolved)
    }
}

fn coerce(param: &ParamDef, value: &Value) -> Result<Value> {
    match param.kind {
        ParamKind::Integer => coerce_positive_int(value)
            .map(|n| json!(n))
            .ok_or_else(|| {
                LogDrainError::InvalidParams(format!(
                    "`{}` must be a positive integer",
                    param.name
                ))
            }),
        ParamKind::Str => value
            .as_str()
            .map(|s| json!(s))
            .ok_or_else(|| {
                LogDrainError::InvalidParams(format!("`{}` must be a string", param.name))
            }),
        ParamKind::Timestamp => {
            let text = value.as_str().ok_or_else(|| {
                LogDrainError::InvalidParams(format!("`{}` must be a timestamp string", param.name))
            })?;
            if parse_timestamp_str(text).is_none() {
                return Err(LogDrainError::InvalidParams(format!(
                    "`{}` is not a valid timestamp: {text}",
                    param.name
                )));
            }
            Ok(json!(text))
        }
    }
}

fn coerce_positive_int(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (n > 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_name_spellings_resolve() {
        assert!(find("logs.recent").is_some());
        assert!(find("logs_recent").is_some());
        assert!(find("logs.timeRange").is_some());
        assert!(find("logs_timeRange").is_some());
        assert!(find("logs.raw_sql").is_none());
    }

    #[test]
    fn defaults_fill_and_required_reject() {
        let recent = find("logs.recent").unwrap();
        let resolved = recent.resolve_args(&Value::Null).unwrap();
        assert_eq!(resolved["limit"], json!(100));

        let range = find("logs.timeRange").unwrap();
        let err = range
            .resolve_args(&json!({ "from": "2024-05-01T00:00:00Z" }))
            .unwrap_err();
        assert!(err.to_string().contains("`to`"));
    }

    #[test]
    fn integer_coercion_rejects_non_positive() {
        let stats = find("logs.stats").unwrap();
        assert!(stats.resolve_args(&json!({ "hours": 0 })).is_err());
        assert!(stats.resolve_args(&json!({ "hours": -3 })).is_err());
        assert!(stats
            .resolve_args(&json!({ "hours": "24; DROP TABLE logs" }))
            .is_err());

        let resolved = stats.resolve_args(&json!({ "hours": "12" })).unwrap();
        assert_eq!(resolved["hours"], json!(12));
    }

    #[test]
    fn schema_lists_required_params() {
        let range = find("logs.timeRange").unwrap();
        let schema = range.input_schema();
        assert_eq!(schema["required"], json!(["from", "to"]));
        assert_eq!(schema["properties"]["from"]["type"], json!("string"));

        let recent = find("logs.recent").unwrap();
        let schema = recent.input_schema();
        assert!(schema.get("required").is_none());
        assert_eq!(schema["properties"]["limit"]["default"], json!(100));
    }

    #[test]
    fn catalog_has_all_tools() {
        let tools = catalog();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "logs_recent",
                "logs_timeRange",
                "logs_errors",
                "logs_search",
                "logs_byRequest",
                "logs_stats"
            ]
        );
    }
}
