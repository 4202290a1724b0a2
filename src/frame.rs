/// 视频帧 (Video Frame)
///
/// 采集线程产生后不可变; 像素数据用Arc共享, clone零拷贝,
/// 检测线程、监控器、录像缓冲可以同时持有同一帧。
use std::sync::Arc;

use image::{ImageBuffer, Rgb, RgbImage};

/// RGB24 帧的字节数; 溢出时返回None
pub fn rgb_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(3)
}

/// RGB24 帧
#[derive(Clone)]
pub struct Frame {
    rgb_data: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
    width: u32,
    height: u32,
    seq: u64, // 采集序号
}

impl Frame {
    /// 从RGB24原始数据构造; 长度不符时返回None
    pub fn from_rgb(width: u32, height: u32, rgb_data: Vec<u8>, seq: u64) -> Option<Self> {
        if width == 0 || height == 0 || rgb_len(width, height) != Some(rgb_data.len()) {
            return None;
        }
        Some(Self {
            rgb_data: Arc::new(rgb_data),
            width,
            height,
            seq,
        })
    }

    pub fn from_image(img: RgbImage, seq: u64) -> Self {
        let (width, height) = img.dimensions();
        Self {
            rgb_data: Arc::new(img.into_raw()),
            width,
            height,
            seq,
        }
    }

    /// 纯色帧, 测试和占位用
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], seq: u64) -> Self {
        let img = ImageBuffer::from_pixel(width, height, Rgb(rgb));
        Self::from_image(img, seq)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// 重新编号, 像素不复制
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.rgb_data
    }

    /// 复制出一份可修改的图像 (绘制检测框等)
    pub fn to_image(&self) -> RgbImage {
        // 长度在构造时已校验
        ImageBuffer::from_raw(self.width, self.height, self.rgb_data.as_ref().clone())
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }

    /// 两个Frame是否共享同一块像素内存
    #[cfg(test)]
    pub(crate) fn shares_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.rgb_data, &other.rgb_data)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
