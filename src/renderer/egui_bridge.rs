use crate::core::{PixelFormat, PlayerError, Result, VideoFrame};
use crate::renderer::Renderer;
use egui::ColorImage;
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

/// 跨线程共享的最新视频画面
///
/// 渲染事件循环在自己的线程上发布画面，egui 在主线程上取走并
/// 上传纹理。generation 单调递增，UI 据此判断是否有新帧需要上传。
#[derive(Clone, Default)]
pub struct SharedVideoImage {
    inner: Arc<RwLock<ImageSlot>>,
}

#[derive(Default)]
struct ImageSlot {
    image: Option<ColorImage>,
    generation: u64,
}

impl SharedVideoImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布新画面并推进代号
    fn publish(&self, image: ColorImage) {
        let mut slot = self.inner.write();
        slot.image = Some(image);
        slot.generation += 1;
    }

    /// 取走比 seen 更新的画面（没有新帧时返回 None）
    pub fn take_if_newer(&self, seen: u64) -> Option<(ColorImage, u64)> {
        let mut slot = self.inner.write();
        if slot.generation <= seen {
            return None;
        }
        let generation = slot.generation;
        slot.image.take().map(|image| (image, generation))
    }
}

/// egui 视频呈现桥
///
/// present 把 RGBA 帧转换成 ColorImage 发布到共享槽位，
/// 并请求 egui 重绘。真正的纹理上传发生在 UI 线程。
pub struct EguiVideoRenderer {
    ctx: egui::Context,
    shared: SharedVideoImage,
    presented: u64,
}

impl EguiVideoRenderer {
    pub fn new(ctx: egui::Context, shared: SharedVideoImage) -> Self {
        Self {
            ctx,
            shared,
            presented: 0,
        }
    }
}

impl Renderer for EguiVideoRenderer {
    fn present(&mut self, frame: VideoFrame) -> Result<()> {
        if frame.format != PixelFormat::RGBA {
            return Err(PlayerError::RenderError(format!(
                "仅支持 RGBA 帧，收到 {:?}",
                frame.format
            )));
        }
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.data.len() < expected {
            return Err(PlayerError::RenderError(format!(
                "帧数据长度不足: {} < {}",
                frame.data.len(),
                expected
            )));
        }

        let image = ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.data[..expected],
        );
        self.shared.publish(image);
        self.ctx.request_repaint();

        self.presented += 1;
        if self.presented <= 3 {
            debug!(
                "📺 呈现视频帧 #{}: {}x{}, PTS={}ms",
                self.presented, frame.width, frame.height, frame.pts
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_if_newer_tracks_generation() {
        let shared = SharedVideoImage::new();
        assert!(shared.take_if_newer(0).is_none());

        shared.publish(ColorImage::new([2, 2], egui::Color32::BLACK));
        let (_, generation) = shared.take_if_newer(0).unwrap();
        assert_eq!(generation, 1);

        // 同一代的画面只取走一次
        assert!(shared.take_if_newer(generation).is_none());

        shared.publish(ColorImage::new([2, 2], egui::Color32::BLACK));
        shared.publish(ColorImage::new([2, 2], egui::Color32::BLACK));
        let (_, generation) = shared.take_if_newer(generation).unwrap();
        assert_eq!(generation, 3);
    }
}
