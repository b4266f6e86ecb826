use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{LogDrainError, Result};
use crate::model::{LogRecord, StatsBucket};
use crate::parser::parse_timestamp_str;
use crate::store::LogStore;
use crate::tools;

/// Ordered result of one tool execution.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Records(Vec<LogRecord>),
    Stats(Vec<StatsBucket>),
}

/// 查询分发器：两个协议前端共用的“校验后执行”路径。
pub struct Dispatcher {
    store: LogStore,
}

impl Dispatcher {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    /// Execute a named tool: resolve the definition (either name spelling),
    /// validate and default-fill the arguments, then run the fixed query.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<ToolOutput> {
        let tool = tools::find(name)
            .ok_or_else(|| LogDrainError::ToolNotFound(name.to_string()))?;
        let args = tool.resolve_args(args)?;

        let output = match tool.name {
            "logs.recent" => ToolOutput::Records(self.store.recent(int_arg(&args, "limit")?).await?),
            "logs.timeRange" => {
                let from = time_arg(&args, "from")?;
                let to = time_arg(&args, "to")?;
                ToolOutput::Records(self.store.time_range(from, to).await?)
            }
            "logs.errors" => {
                ToolOutput::Records(self.store.errors_only(int_arg(&args, "limit")?).await?)
            }
            "logs.search" => ToolOutput::Records(
                self.store
                    .search(str_arg(&args, "query")?, int_arg(&args, "limit")?)
                    .await?,
            ),
            "logs.byRequest" => {
                ToolOutput::Records(self.store.by_request(str_arg(&args, "requestId")?).await?)
            }
            "logs.stats" => ToolOutput::Stats(self.store.stats(int_arg(&args, "hours")?).await?),
            other => return Err(LogDrainError::ToolNotFound(other.to_string())),
        };
        Ok(output)
    }
}

fn int_arg(args: &Map<String, Value>, name: &str) -> Result<i64> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| LogDrainError::InvalidParams(format!("missing `{name}`")))
}

fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| LogDrainError::InvalidParams(format!("missing `{name}`")))
}

fn time_arg(args: &Map<String, Value>, name: &str) -> Result<DateTime<Utc>> {
    str_arg(args, name).and_then(|text| {
        parse_timestamp_str(text).ok_or_else(|| {
            LogDrainError::InvalidParams(format!("`{name}` is not a valid timestamp: {text}"))
        })
    })
}
