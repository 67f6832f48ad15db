//! Types for build engine invocation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while invoking the build engine.
#[derive(Debug, Error)]
pub enum EngineError {
  /// The memory limit was not an integer. Raised before anything is sent.
  #[error("the memory limit has to be specified as an integer but is {found}")]
  InvalidResourceLimit { found: String },

  #[error("engine request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// The engine refused the build request.
  #[error("engine returned HTTP {code}: {message}")]
  Status { code: u16, message: String },

  /// The engine reported a build failure mid-stream.
  #[error("build failed: {message}")]
  Build { message: String },

  #[error("malformed engine event {line:?}: {message}")]
  Decode { line: String, message: String },
}

/// Container resource limits for a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
  pub memory: Option<u64>,
  pub memswap: Option<u64>,
}

impl ResourceLimits {
  /// Derive limits from a configured memory limit.
  ///
  /// The value must be an integer; `null` and `0` mean no limit. When a
  /// limit is set, memswap (memory *including* swap) is set to the same
  /// value so the build runs without swap.
  pub fn from_memory_limit(limit: &Value) -> Result<Self, EngineError> {
    let memory = match limit {
      Value::Null => 0,
      Value::Number(n) => n.as_u64().ok_or_else(|| EngineError::InvalidResourceLimit {
        found: format!("the number {}", n),
      })?,
      other => {
        return Err(EngineError::InvalidResourceLimit {
          found: format!("a {}", value_kind(other)),
        });
      }
    };

    if memory == 0 {
      return Ok(Self::default());
    }

    Ok(Self {
      memory: Some(memory),
      memswap: Some(memory),
    })
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// Everything the engine needs besides the context archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildRequest {
  pub tag: String,
  pub limits: ResourceLimits,
  pub build_args: BTreeMap<String, String>,
  pub cache_from: Vec<String>,
  /// Extra engine options, merged last so they win over computed ones.
  pub extra: BTreeMap<String, Value>,
}

impl BuildRequest {
  /// Query parameters for the engine's build endpoint.
  pub fn query(&self) -> BTreeMap<String, String> {
    let mut query = BTreeMap::new();
    query.insert("t".to_string(), self.tag.clone());
    query.insert("forcerm".to_string(), "1".to_string());
    query.insert("rm".to_string(), "1".to_string());

    if !self.build_args.is_empty() {
      query.insert("buildargs".to_string(), Value::from(self.build_args_json()).to_string());
    }
    if !self.cache_from.is_empty() {
      query.insert("cachefrom".to_string(), Value::from(self.cache_from.clone()).to_string());
    }
    if let Some(memory) = self.limits.memory {
      query.insert("memory".to_string(), memory.to_string());
    }
    if let Some(memswap) = self.limits.memswap {
      query.insert("memswap".to_string(), memswap.to_string());
    }

    for (key, value) in &self.extra {
      let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      query.insert(key.clone(), value);
    }

    query
  }

  fn build_args_json(&self) -> serde_json::Map<String, Value> {
    self
      .build_args
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect()
  }
}

/// A progress or log event from the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildEvent {
  /// Build log output.
  Stream { text: String },
  /// Layer pull / push progress.
  Status {
    id: Option<String>,
    status: String,
    progress: Option<String>,
  },
  /// Auxiliary data such as the built image id.
  Aux { value: Value },
  /// Anything not recognized, passed through untouched.
  Other { value: Value },
}

impl BuildEvent {
  /// Decode one line of the engine's JSON event stream.
  ///
  /// An `error` object becomes [`EngineError::Build`].
  pub fn from_json_line(line: &str) -> Result<Self, EngineError> {
    let value: Value = serde_json::from_str(line).map_err(|e| EngineError::Decode {
      line: line.to_string(),
      message: e.to_string(),
    })?;

    if let Some(error) = value.get("error") {
      let message = value
        .pointer("/errorDetail/message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
      return Err(EngineError::Build { message });
    }

    if let Some(text) = value.get("stream").and_then(Value::as_str) {
      return Ok(BuildEvent::Stream { text: text.to_string() });
    }

    if let Some(status) = value.get("status").and_then(Value::as_str) {
      return Ok(BuildEvent::Status {
        id: value.get("id").and_then(Value::as_str).map(str::to_string),
        status: status.to_string(),
        progress: value.get("progress").and_then(Value::as_str).map(str::to_string),
      });
    }

    if let Some(aux) = value.get("aux") {
      return Ok(BuildEvent::Aux { value: aux.clone() });
    }

    Ok(BuildEvent::Other { value })
  }
}
