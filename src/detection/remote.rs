//! 远程检测器 - 把帧编码成JPEG发给外部推理服务
//!
//! 请求: `{"width": w, "height": h, "image": "<base64 jpeg>"}`
//! 响应: `[{"class_index": 0, "confidence": 0.87, "box": [x1, y1, x2, y2]}, ...]`

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine as _;
use image::ImageFormat;

use super::filter::DetectRaw;
use super::types::RawDetection;
use crate::frame::Frame;

pub struct RemoteDetector {
    endpoint: String,
    agent: ureq::Agent,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            endpoint: endpoint.into(),
            agent,
        }
    }
}

/// 帧 → JPEG字节
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    frame
        .to_image()
        .write_to(&mut bytes, ImageFormat::Jpeg)
        .context("JPEG编码失败")?;
    Ok(bytes.into_inner())
}

/// 解析推理服务的响应
pub fn parse_response(body: serde_json::Value) -> Result<Vec<RawDetection>> {
    serde_json::from_value(body).context("推理服务响应格式错误")
}

impl DetectRaw for RemoteDetector {
    fn detect_raw(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let jpeg = encode_jpeg(frame)?;
        let body = serde_json::json!({
            "width": frame.width(),
            "height": frame.height(),
            "image": base64_engine.encode(jpeg),
        });

        let response: serde_json::Value = self
            .agent
            .post(&self.endpoint)
            .send_json(body)
            .with_context(|| format!("请求推理服务 {} 失败", self.endpoint))?
            .into_json()
            .context("读取推理服务响应失败")?;

        parse_response(response)
    }
}
