//! Request/response engine for channels started in RPC mode.
//!
//! One JSON object per line. Requests carry `id`, `method` and `params`;
//! a request without an `id` is a notification and gets no reply.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use super::ChannelId;
use crate::posix::env::{self, EnvError};
use crate::posix::Fd;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("malformed request: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params for {method}: expected string at position {index}")]
    InvalidParams { method: String, index: usize },

    #[error("environment: {0}")]
    Env(#[from] EnvError),

    #[error("environment writes are disabled on this channel")]
    EnvWritesDisabled,

    #[error("request line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Descriptor binding of the channel the engine serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub input_fd: Option<Fd>,
    pub output_fd: Option<Fd>,
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

pub struct RpcEngine {
    info: ChannelInfo,
    handled: usize,
    env_writes: bool,
}

impl RpcEngine {
    /// A new engine answers `env_set`/`env_unset` with an error until
    /// [`RpcEngine::allow_env_writes`] is called.
    pub fn new(info: ChannelInfo) -> Self {
        Self {
            info,
            handled: 0,
            env_writes: false,
        }
    }

    /// # Safety
    /// While the engine handles requests, no other thread may read or write
    /// the environment except through `std::env`.
    pub unsafe fn allow_env_writes(&mut self) {
        self.env_writes = true;
    }

    /// Requests and notifications processed so far, malformed lines excluded.
    pub fn handled(&self) -> usize {
        self.handled
    }

    /// Process one line of input and return the reply line, if any.
    pub fn handle_line(&mut self, line: &[u8]) -> Option<String> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }

        let request: Request = match serde_json::from_slice(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping malformed RPC line: {}", e);
                return Some(reply(Value::Null, Err(RpcError::Parse(e))));
            }
        };

        self.handled += 1;
        debug!(method = %request.method, "rpc request");
        let result = self.dispatch(&request.method, &request.params);

        match request.id {
            Some(id) => Some(reply(id, result)),
            None => {
                if let Err(e) = result {
                    warn!("RPC notification {} failed: {}", request.method, e);
                }
                None
            }
        }
    }

    /// Error reply for input dropped because no newline arrived within
    /// `limit` bytes.
    pub fn line_too_long(&self, limit: usize) -> String {
        reply(Value::Null, Err(RpcError::LineTooLong { limit }))
    }

    fn dispatch(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        match method {
            "ping" => Ok(json!("pong")),
            "channel_info" => Ok(serde_json::to_value(self.info)?),
            "env_get" => {
                let name = str_param(method, params, 0)?;
                match env::get(name) {
                    Ok(value) => Ok(json!(value)),
                    Err(EnvError::NotFound) => Ok(Value::Null),
                    Err(e) => Err(e.into()),
                }
            }
            "env_set" => {
                let name = str_param(method, params, 0)?;
                let value = str_param(method, params, 1)?;
                self.check_env_writes()?;
                // SAFETY: guaranteed by whoever enabled env writes.
                unsafe { env::set(name, value) }?;
                Ok(json!(true))
            }
            "env_unset" => {
                let name = str_param(method, params, 0)?;
                self.check_env_writes()?;
                // SAFETY: guaranteed by whoever enabled env writes.
                unsafe { env::unset(name) }?;
                Ok(json!(true))
            }
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}

impl RpcEngine {
    fn check_env_writes(&self) -> Result<(), RpcError> {
        if self.env_writes {
            Ok(())
        } else {
            Err(RpcError::EnvWritesDisabled)
        }
    }
}

fn str_param<'a>(method: &str, params: &'a [Value], index: usize) -> Result<&'a str, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidParams {
            method: method.to_string(),
            index,
        })
}

fn reply(id: Value, result: Result<Value, RpcError>) -> String {
    match result {
        Ok(value) => json!({ "id": id, "result": value }),
        Err(e) => json!({ "id": id, "error": e.to_string() }),
    }
    .to_string()
}
