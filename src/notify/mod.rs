/// 推送通知 (Notifications)
///
/// - Notifier: 通知接口, 监控器在序列激活时调用
/// - Pushover: Pushover推送实现
pub mod pushover;

use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detection::Detection;
use crate::frame::Frame;

pub use pushover::Pushover;

/// 检测框线宽 (像素)
const BOX_THICKNESS: i32 = 2;

/// 通知接口
pub trait Notifier: Send {
    fn notify(&self, message: &str, image: Option<&Frame>) -> anyhow::Result<()>;
}

/// 通知正文: "Person detected with confidence 0.876"
pub fn compose_message(label: &str, confidence: f32) -> String {
    format!(
        "{} detected with confidence {}",
        capitalize(label),
        truncate_decimals(confidence, 3)
    )
}

/// 首字母大写
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 截断 (不四舍五入) 到指定小数位
pub fn truncate_decimals(value: f32, places: usize) -> String {
    let text = value.to_string();
    match text.split_once('.') {
        Some((int, dec)) => format!("{}.{}", int, &dec[..dec.len().min(places)]),
        None => text,
    }
}

/// 在帧的副本上绘制检测框
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Frame {
    let mut img = frame.to_image();
    for detection in detections {
        let b = detection.bbox;
        for t in 0..BOX_THICKNESS {
            let w = (b.width() - 2 * t).max(1) as u32;
            let h = (b.height() - 2 * t).max(1) as u32;
            let rect = Rect::at(b.x1 + t, b.y1 + t).of_size(w, h);
            draw_hollow_rect_mut(&mut img, rect, Rgb(detection.color));
        }
    }
    Frame::from_image(img, frame.seq())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    #[test]
    fn test_compose_message() {
        assert_eq!(
            compose_message("person", 0.87654),
            "Person detected with confidence 0.876"
        );
        assert_eq!(compose_message("dog", 0.5), "Dog detected with confidence 0.5");
        assert_eq!(
            compose_message("teddy bear", 0.99999),
            "Teddy bear detected with confidence 0.999"
        );
    }

    #[test]
    fn test_truncate_never_rounds_up() {
        assert_eq!(truncate_decimals(0.9, 3), "0.9");
        assert_eq!(truncate_decimals(0.1239, 3), "0.123");
        assert_eq!(truncate_decimals(1.0, 3), "1");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("person"), "Person");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_annotate_draws_box_outline() {
        let frame = Frame::solid(20, 20, [0, 0, 0], 3);
        let detection = Detection {
            label: "person".into(),
            confidence: 0.9,
            bbox: BBox::new(2, 2, 12, 12),
            color: [255, 0, 0],
        };
        let out = annotate(&frame, &[detection]);
        let img = out.to_image();
        assert_eq!(img.get_pixel(2, 2).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(3, 3).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(7, 7).0, [0, 0, 0]);
        assert_eq!(out.seq(), 3);
        // 原帧不变
        assert_eq!(frame.to_image().get_pixel(2, 2).0, [0, 0, 0]);
    }
}
