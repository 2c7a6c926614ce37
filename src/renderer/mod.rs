// 视频呈现模块

pub mod egui_bridge;

pub use egui_bridge::{EguiVideoRenderer, SharedVideoImage};

use crate::core::{Result, VideoFrame};

/// 视频呈现接口
///
/// 渲染事件循环在每个节拍把出队的帧交给 present，
/// 实现方负责把帧送上屏幕。帧所有权随调用转移。
pub trait Renderer: Send {
    fn present(&mut self, frame: VideoFrame) -> Result<()>;
}
