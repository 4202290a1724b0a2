//! 系统配置 - 通过JSON文件调整参数
//!
//! 每个配置组的字段都有默认值, 用户JSON只需写出要覆盖的键。
//! `writer` / `pushover` 组缺省即关闭对应功能。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

/// 采集宽高上限
pub const MAX_DIMENSION: u32 = 8192;

/// 秒数转Duration; 负数、NaN或超出Duration范围时返回None
pub fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

/// 视频源参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    pub src: String, // 纯数字为本地摄像头序号, 否则为流地址/文件
    pub width: u32,  // 采集后缩放到的宽度
    pub height: u32, // 采集后缩放到的高度
    pub reconnect: bool,
    pub stale_timeout_secs: f64, // 超过该时长无新帧则上报断流
}

impl VideoConfig {
    pub fn stale_timeout(&self) -> Duration {
        seconds(self.stale_timeout_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            src: "0".to_string(),
            width: 1280,
            height: 720,
            reconnect: true,
            stale_timeout_secs: 60.0,
        }
    }
}

/// 检测器参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    pub threaded: bool,
    pub endpoint: String, // 外部推理服务地址
    pub classes: Vec<String>,
    pub min_confidence: f32,
    pub show_detections: bool, // 通知图片上绘制检测框
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threaded: false,
            endpoint: "http://127.0.0.1:8500/detect".to_string(),
            classes: vec!["person".to_string()],
            min_confidence: 0.5,
            show_detections: true,
        }
    }
}

/// 检测序列参数 (时间单位: 秒)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub min_detection_frames: u32,
    pub min_detection_ratio: f64,
    pub detection_lapse_timeout: f64,
    pub max_detection_duration: f64,
    pub post_detection_debounce: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_detection_frames: 5,
            min_detection_ratio: 0.5,
            detection_lapse_timeout: 5.0,
            max_detection_duration: 60.0,
            post_detection_debounce: 10.0,
        }
    }
}

impl MonitorConfig {
    pub fn lapse_timeout(&self) -> Duration {
        seconds(self.detection_lapse_timeout).unwrap_or(Duration::MAX)
    }

    pub fn max_duration(&self) -> Duration {
        seconds(self.max_detection_duration).unwrap_or(Duration::MAX)
    }

    pub fn debounce(&self) -> Duration {
        seconds(self.post_detection_debounce).unwrap_or(Duration::MAX)
    }
}

/// 录像参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    pub buffer_size: usize, // 预录环形缓冲帧数
    pub min_disk_space_gb: f64,
    pub fps: u32,
    pub output_dir: String,
    pub extension: String,
    pub codec: String, // 传给ffmpeg的 -c:v
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            min_disk_space_gb: 1.0,
            fps: 15,
            output_dir: "~/sentinel/recordings".to_string(),
            extension: "avi".to_string(),
            codec: "mjpeg".to_string(),
        }
    }
}

impl WriterConfig {
    pub fn output_path(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }
}

/// Pushover推送参数
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PushoverConfig {
    pub user_key: String,
    pub api_token: String,
    pub mock: bool, // 只打印消息, 不真正推送
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub video: VideoConfig,
    pub detector: Option<DetectorConfig>,
    pub monitor: Option<MonitorConfig>,
    pub writer: Option<WriterConfig>,
    pub pushover: Option<PushoverConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoConfig::default(),
            detector: Some(DetectorConfig::default()),
            monitor: Some(MonitorConfig::default()),
            writer: None,
            pushover: None,
        }
    }
}

impl Config {
    /// 从JSON文件加载配置; 文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(target: "sentinel::config", "📝 配置文件 {} 不存在, 使用默认配置", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = Self::from_json(&json).map_err(|source| SentinelError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(target: "sentinel::config", "✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 检查取值范围, 非法配置在启动时直接报错
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SentinelError::Config(msg));

        if self.video.src.trim().is_empty() {
            return bad("video.src must not be empty".into());
        }
        if self.video.width == 0 || self.video.height == 0 {
            return bad("video.width and video.height must be positive".into());
        }
        if self.video.width > MAX_DIMENSION || self.video.height > MAX_DIMENSION {
            return bad(format!("video.width and video.height must not exceed {MAX_DIMENSION}"));
        }
        if !(self.video.stale_timeout_secs > 0.0) || seconds(self.video.stale_timeout_secs).is_none() {
            return bad("video.stale_timeout_secs must be a positive number of seconds".into());
        }

        if let Some(detector) = &self.detector {
            if !(0.0..1.0).contains(&detector.min_confidence) {
                return bad("detector.min_confidence must be in [0, 1)".into());
            }
            if detector.classes.is_empty() {
                return bad("detector.classes must name at least one class".into());
            }
        }

        if let Some(monitor) = &self.monitor {
            if monitor.min_detection_frames == 0 {
                return bad("monitor.min_detection_frames must be at least 1".into());
            }
            if !(monitor.min_detection_ratio > 0.0 && monitor.min_detection_ratio <= 1.0) {
                return bad("monitor.min_detection_ratio must be in (0, 1]".into());
            }
            for (key, value) in [
                ("detection_lapse_timeout", monitor.detection_lapse_timeout),
                ("max_detection_duration", monitor.max_detection_duration),
                ("post_detection_debounce", monitor.post_detection_debounce),
            ] {
                if seconds(value).is_none() {
                    return bad(format!("monitor.{key} must be a non-negative number of seconds"));
                }
            }
        }

        if let Some(writer) = &self.writer {
            if writer.buffer_size == 0 {
                return bad("writer.buffer_size must be at least 1".into());
            }
            if writer.fps == 0 {
                return bad("writer.fps must be positive".into());
            }
            if writer.extension.is_empty() || writer.output_dir.is_empty() {
                return bad("writer.extension and writer.output_dir are required".into());
            }
        }

        if let Some(pushover) = &self.pushover {
            if !pushover.mock {
                if pushover.user_key.is_empty() {
                    return bad("pushover.user_key is required".into());
                }
                if pushover.api_token.is_empty() {
                    return bad("pushover.api_token is required".into());
                }
            }
        }

        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(target: "sentinel::config", "🎛️  当前配置:");
        info!(target: "sentinel::config", "  视频源: {} ({}x{})", self.video.src, self.video.width, self.video.height);
        match &self.detector {
            Some(d) => info!(
                target: "sentinel::config",
                "  检测: 类别{:?} | 置信度>{:.2} | 多线程={}",
                d.classes, d.min_confidence, d.threaded
            ),
            None => info!(target: "sentinel::config", "  检测: 禁用"),
        }
        if let Some(m) = &self.monitor {
            info!(
                target: "sentinel::config",
                "  序列: 最少{}帧 | 比例{:.2} | 中断{}s | 最长{}s | 冷却{}s",
                m.min_detection_frames,
                m.min_detection_ratio,
                m.detection_lapse_timeout,
                m.max_detection_duration,
                m.post_detection_debounce
            );
        }
        match &self.writer {
            Some(w) => info!(
                target: "sentinel::config",
                "  录像: {} | 预录{}帧 | {}fps",
                w.output_path().display(),
                w.buffer_size,
                w.fps
            ),
            None => info!(target: "sentinel::config", "  录像: 禁用"),
        }
        match &self.pushover {
            Some(p) if p.mock => info!(target: "sentinel::config", "  推送: 模拟"),
            Some(_) => info!(target: "sentinel::config", "  推送: Pushover"),
            None => info!(target: "sentinel::config", "  推送: 禁用"),
        }
    }
}

/// 展开开头的 `~`
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.detector.is_some());
        assert!(config.monitor.is_some());
        assert!(config.writer.is_none());
        assert!(config.pushover.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_group_keeps_defaults() {
        let json = r#"{
            "monitor": { "min_detection_frames": 3 },
            "writer": { "output_dir": "/tmp/clips" }
        }"#;
        let config = Config::from_json(json).unwrap();
        let monitor = config.monitor.unwrap();
        assert_eq!(monitor.min_detection_frames, 3);
        assert_eq!(monitor.min_detection_ratio, 0.5);
        let writer = config.writer.unwrap();
        assert_eq!(writer.output_dir, "/tmp/clips");
        assert_eq!(writer.buffer_size, 64);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let json = r#"{ "monitor": { "min_detection_frame": 3 } }"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn test_validate_ratio_bounds() {
        let mut config = Config::default();
        config.monitor.as_mut().unwrap().min_detection_ratio = 0.0;
        assert!(matches!(config.validate(), Err(SentinelError::Config(_))));

        config.monitor.as_mut().unwrap().min_detection_ratio = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_duration_range() {
        let mut config = Config::default();
        config.monitor.as_mut().unwrap().max_detection_duration = 1e20;
        assert!(matches!(
            config.validate(),
            Err(SentinelError::Config(msg)) if msg.contains("max_detection_duration")
        ));

        config.monitor.as_mut().unwrap().max_detection_duration = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.video.stale_timeout_secs = 1e20;
        assert!(config.validate().is_err());
        config.video.stale_timeout_secs = 30.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.video.stale_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_duration_accessors_saturate() {
        let monitor = MonitorConfig {
            max_detection_duration: 1e20,
            ..Default::default()
        };
        assert_eq!(monitor.max_duration(), Duration::MAX);
        assert_eq!(monitor.lapse_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_dimension_cap() {
        let mut config = Config::default();
        config.video.width = 40_000;
        config.video.height = 40_000;
        assert!(matches!(config.validate(), Err(SentinelError::Config(_))));

        config.video.width = MAX_DIMENSION;
        config.video.height = MAX_DIMENSION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pushover_requires_credentials_unless_mock() {
        let mut config = Config::default();
        config.pushover = Some(PushoverConfig::default());
        assert!(config.validate().is_err());

        config.pushover.as_mut().unwrap().mock = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.video.src, "0");
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(SentinelError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/dir"), PathBuf::from("/abs/dir"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/clips"), home.join("clips"));
        }
    }
}
