// 核心数据结构和类型定义

pub mod types;
pub mod error;

// 重新导出常用类型
pub use types::{AudioFrame, MediaInfo, PixelFormat, SampleFormat, VideoFrame};

pub use error::*;
