//! Docker Engine API client for image builds.
//!
//! Submits the context archive to `POST /build` and decodes the
//! newline-delimited JSON response as it arrives.

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::archive::BuildContext;
use crate::consts::{DEFAULT_ENGINE_URL, DOCKER_HOST_ENV_VAR, ENGINE_ENV_VAR};

use super::types::{BuildEvent, BuildRequest, EngineError};

/// Events of a single build attempt. Finite and not restartable; dropping it
/// closes the connection to the engine.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<BuildEvent, EngineError>> + Send>>;

/// Resolve the engine endpoint.
///
/// Checks `PLAINPACK_ENGINE`, then a `tcp://` or `http(s)://` `DOCKER_HOST`,
/// then falls back to `http://localhost:2375`.
pub fn endpoint_from_env() -> String {
  if let Ok(url) = std::env::var(ENGINE_ENV_VAR)
    && !url.trim().is_empty()
  {
    return url.trim().trim_end_matches('/').to_string();
  }

  if let Ok(host) = std::env::var(DOCKER_HOST_ENV_VAR) {
    let host = host.trim();
    if let Some(address) = host.strip_prefix("tcp://") {
      return format!("http://{}", address.trim_end_matches('/'));
    }
    if host.starts_with("http://") || host.starts_with("https://") {
      return host.trim_end_matches('/').to_string();
    }
    if !host.is_empty() {
      warn!(host = %host, "unsupported DOCKER_HOST scheme, using default engine endpoint");
    }
  }

  DEFAULT_ENGINE_URL.to_string()
}

/// A build engine reachable over HTTP.
#[derive(Debug, Clone)]
pub struct DockerEngine {
  client: reqwest::Client,
  endpoint: String,
}

impl DockerEngine {
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      endpoint: endpoint.into().trim_end_matches('/').to_string(),
    }
  }

  pub fn from_env() -> Self {
    Self::new(endpoint_from_env())
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  /// Submit a build and return its event stream.
  ///
  /// Takes the context by value; once submitted it belongs to the request.
  /// Errors reported by the engine while building arrive through the stream.
  pub async fn build(&self, context: BuildContext, request: &BuildRequest) -> Result<EventStream, EngineError> {
    let url = format!("{}/build", self.endpoint);
    let query: Vec<(String, String)> = request.query().into_iter().collect();
    info!(
      url = %url,
      tag = %request.tag,
      context_size = context.len(),
      context_digest = %context.digest().short(),
      "submitting build"
    );
    debug!(?query, "build parameters");

    let response = self
      .client
      .post(&url)
      .query(&query)
      .header(reqwest::header::CONTENT_TYPE, "application/x-tar")
      .body(context.into_bytes())
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(EngineError::Status {
        code: status.as_u16(),
        message: message.trim().to_string(),
      });
    }

    Ok(decode_events(response.bytes_stream()))
  }
}

struct Decoder<S> {
  chunks: Pin<Box<S>>,
  buffer: Vec<u8>,
  done: bool,
}

/// Turn a stream of byte chunks into events, one per JSON line.
///
/// Lines may be split across chunks. The stream ends after the first error.
pub fn decode_events<S, B>(chunks: S) -> EventStream
where
  S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
  B: AsRef<[u8]> + Send + 'static,
{
  let decoder = Decoder {
    chunks: Box::pin(chunks),
    buffer: Vec::new(),
    done: false,
  };

  Box::pin(stream::unfold(decoder, |mut state| async move {
    loop {
      if state.done {
        return None;
      }

      if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if line.is_empty() {
          continue;
        }
        let event = BuildEvent::from_json_line(line);
        state.done = event.is_err();
        debug!(?event, "engine event");
        return Some((event, state));
      }

      match state.chunks.next().await {
        Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
        Some(Err(err)) => {
          state.done = true;
          return Some((Err(EngineError::Http(err)), state));
        }
        None => {
          state.done = true;
          let rest = String::from_utf8_lossy(&state.buffer).trim().to_string();
          state.buffer.clear();
          if rest.is_empty() {
            return None;
          }
          return Some((BuildEvent::from_json_line(&rest), state));
        }
      }
    }
  }))
}
