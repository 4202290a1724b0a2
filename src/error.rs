//! 错误类型 (Error types)
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// 配置缺失或取值非法 (启动时致命)
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to open video source {src:?}: {reason}")]
    Capture { src: String, reason: String },

    #[error("video encoder error: {0}")]
    Encoder(String),

    #[error("recording buffer is empty, nothing to size the clip from")]
    EmptyBuffer,
}

pub type Result<T> = std::result::Result<T, SentinelError>;
