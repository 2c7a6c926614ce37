use crate::core::{MediaInfo, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::Packet;

/// 流类型标签（打开媒体源时按流索引解析一次）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Audio => "音频",
            StreamKind::Video => "视频",
        }
    }
}

/// 媒体包（可跨线程传递）
pub struct MediaPacket {
    pub packet: Packet,
    pub kind: StreamKind,
    pub stream_index: usize,
}

// 实现 Send，允许跨线程传递
unsafe impl Send for MediaPacket {}

/// Demuxer 数据源抽象接口
///
/// 所有解封装实现必须提供的方法。解码编排器只依赖这个接口，
/// 不关心包从本地文件还是其它来源读出。
pub trait DemuxerSource: Send {
    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达流末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<MediaPacket>>;

    /// 获取媒体信息
    fn media_info(&self) -> &MediaInfo;

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;
}
