use crate::core::{MediaInfo, PlayerError, Result};
use crate::player::demuxer_source::{DemuxerSource, MediaPacket, StreamKind};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 解封装器 - 负责读取媒体文件并分离音视频流
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    media_info: MediaInfo,  // 缓存媒体信息
    source_path: String,    // 媒体源路径（用于描述）
}

impl Demuxer {
    /// 打开媒体文件
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开文件: {}", path);

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path, e)))?;

        // 查找视频流和音频流
        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index());

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        if video_stream_index.is_none() {
            return Err(PlayerError::NoVideoStream);
        }

        debug!("视频流索引: {:?}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        let mut demuxer = Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            media_info: MediaInfo::default(),  // 临时默认值
            source_path: path.to_string(),
        };

        // 获取并缓存媒体信息
        demuxer.media_info = demuxer.extract_media_info()?;

        Ok(demuxer)
    }

    /// 提取媒体信息（内部使用）
    fn extract_media_info(&self) -> Result<MediaInfo> {
        let video_stream = self
            .input_ctx
            .stream(self.video_stream_index.unwrap_or_default())
            .ok_or(PlayerError::NoVideoStream)?;

        let video_codec = video_stream.parameters();

        // 先获取编解码器名称（在 video_codec 被移动前）
        let video_codec_name = video_codec.id().name().to_string();

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_codec)?;
        let video_decoder = decoder.decoder().video()?;

        let width = video_decoder.width();
        let height = video_decoder.height();
        let fps = video_stream.avg_frame_rate();
        let fps = fps.numerator() as f64 / fps.denominator().max(1) as f64;

        let duration = self.input_ctx.duration() / 1000; // 微秒转毫秒

        let (audio_codec_name, sample_rate, channels) =
            if let Some(audio_idx) = self.audio_stream_index {
                let audio_stream = self
                    .input_ctx
                    .stream(audio_idx)
                    .ok_or(PlayerError::NoAudioStream)?;
                let audio_codec = audio_stream.parameters();

                let codec_name = audio_codec.id().name().to_string();

                let decoder = ffmpeg::codec::context::Context::from_parameters(audio_codec)?;
                let audio_decoder = decoder.decoder().audio()?;

                (codec_name, audio_decoder.rate(), audio_decoder.channels())
            } else {
                ("none".to_string(), 0, 0)
            };

        Ok(MediaInfo {
            duration,
            width,
            height,
            fps,
            video_codec: video_codec_name,
            audio_codec: audio_codec_name,
            sample_rate,
            channels,
        })
    }

    /// 获取视频流
    pub fn video_stream(&self) -> Option<format::stream::Stream> {
        self.video_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 获取音频流
    pub fn audio_stream(&self) -> Option<format::stream::Stream> {
        self.audio_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }
}

impl DemuxerSource for Demuxer {
    fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    let stream_index = stream.index();

                    // 按打开时解析好的流索引打标签
                    if Some(stream_index) == self.video_stream_index {
                        return Ok(Some(MediaPacket {
                            packet,
                            kind: StreamKind::Video,
                            stream_index,
                        }));
                    } else if Some(stream_index) == self.audio_stream_index {
                        return Ok(Some(MediaPacket {
                            packet,
                            kind: StreamKind::Audio,
                            stream_index,
                        }));
                    }
                    // 其它流（字幕/数据）直接跳过，继续循环
                }
                None => return Ok(None),
            }
        }
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
