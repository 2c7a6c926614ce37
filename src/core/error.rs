use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开媒体源: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("无法找到音频流")]
    NoAudioStream,

    #[error("编解码器初始化失败: {0}")]
    CodecOpenError(String),

    #[error("码流解码错误: {0}")]
    StreamError(String),

    #[error("渲染错误: {0}")]
    RenderError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("资源耗尽: {0}")]
    ResourceExhausted(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
