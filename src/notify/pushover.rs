//! Pushover推送
//!
//! 模拟模式只打印消息; 正常模式在后台线程发送, 不阻塞主循环。

use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine as _;
use log::{error, info, warn};
use once_cell::sync::Lazy;

use super::Notifier;
use crate::config::PushoverConfig;
use crate::detection::remote::encode_jpeg;
use crate::error::{Result, SentinelError};
use crate::frame::Frame;

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

static AGENT: Lazy<ureq::Agent> = Lazy::new(|| {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()
});

#[derive(Clone)]
pub struct Pushover {
    config: PushoverConfig,
}

impl Pushover {
    /// 非模拟模式下必须提供 user_key 和 api_token
    pub fn new(config: PushoverConfig) -> Result<Self> {
        if !config.mock {
            if config.user_key.is_empty() {
                return Err(SentinelError::Config("pushover.user_key is required".into()));
            }
            if config.api_token.is_empty() {
                return Err(SentinelError::Config("pushover.api_token is required".into()));
            }
        }
        Ok(Self { config })
    }

    pub fn is_mock(&self) -> bool {
        self.config.mock
    }

    /// 组装表单字段
    fn form(&self, message: &str, image: Option<&Frame>) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("token", self.config.api_token.clone()),
            ("user", self.config.user_key.clone()),
            ("message", message.to_string()),
        ];

        if let Some(frame) = image {
            match encode_jpeg(frame) {
                Ok(jpeg) => {
                    form.push(("attachment_base64", base64_engine.encode(jpeg)));
                    form.push(("attachment_type", "image/jpeg".to_string()));
                }
                Err(e) => warn!(target: "sentinel::notify", "⚠️ 图片编码失败, 只发送文字: {:#}", e),
            }
        }
        form
    }
}

fn send(form: Vec<(&'static str, String)>) {
    let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let response = match AGENT.post(PUSHOVER_API_URL).send_form(&pairs) {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            error!(target: "sentinel::notify", "❌ Pushover返回 HTTP {}: {}", code, body);
            return;
        }
        Err(e) => {
            error!(target: "sentinel::notify", "❌ Pushover请求失败: {}", e);
            return;
        }
    };

    match response.into_json::<serde_json::Value>() {
        Ok(body) if body.get("status").and_then(|s| s.as_i64()) == Some(1) => {
            info!(target: "sentinel::notify", "✅ 推送已送达");
        }
        Ok(body) => error!(target: "sentinel::notify", "❌ Pushover错误: {}", body),
        Err(e) => error!(target: "sentinel::notify", "❌ 无法解析Pushover响应: {}", e),
    }
}

impl Notifier for Pushover {
    fn notify(&self, message: &str, image: Option<&Frame>) -> anyhow::Result<()> {
        if self.config.mock {
            info!(target: "sentinel::notify", "PUSHOVER_MOCK: {}", message);
            return Ok(());
        }

        let form = self.form(message, image);
        std::thread::Builder::new()
            .name("sentinel-pushover".into())
            .spawn(move || send(form))
            .context("无法创建推送线程")?;
        Ok(())
    }
}
