use crate::core::{AudioFrame, PixelFormat, Result, SampleFormat, VideoFrame};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};

/// 音频解码接口
///
/// decode 对应一次 submit + 尽可能多的 receive；
/// flush 提交终止包并排空解码器内部缓冲的帧。
pub trait AudioDecode: Send {
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<AudioFrame>>;
    fn flush(&mut self) -> Result<Vec<AudioFrame>>;
}

/// 视频解码接口
pub trait VideoDecode: Send {
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<VideoFrame>>;
    fn flush(&mut self) -> Result<Vec<VideoFrame>>;
}

/// 视频解码器（软件解码）
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    time_base: f64,
}

// SwsContext 本身不是 Send，但我们确保只在单个线程中使用它
// 这是安全的，因为每个解码器实例只会在一个线程中使用
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        let time_base = stream.time_base();
        let time_base = time_base.numerator() as f64 / time_base.denominator() as f64;

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            scaler: None,
            time_base,
        })
    }

    fn receive_all(&mut self, frames: &mut Vec<VideoFrame>) -> Result<()> {
        loop {
            let mut decoded_frame = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => {
                    if let Some(frame) = self.convert_frame(decoded_frame)? {
                        frames.push(frame);
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN: 需要更多输入
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    // 个别帧的解码错误可以容忍，跳过即可
                    warn!("视频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// 转换帧格式为 RGBA
    fn convert_frame(&mut self, frame: util::frame::Video) -> Result<Option<VideoFrame>> {
        let width = frame.width();
        let height = frame.height();

        // 初始化 scaler（YUV -> RGBA）
        if self.scaler.is_none() {
            self.scaler = Some(software::scaling::Context::get(
                frame.format(),
                width,
                height,
                util::format::Pixel::RGBA,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?);
        }

        let mut rgba_frame = util::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(&frame, &mut rgba_frame)?;
        }

        // 计算 PTS（毫秒）
        let pts = frame
            .timestamp()
            .map(|timestamp| (timestamp as f64 * self.time_base * 1000.0) as i64)
            .unwrap_or(0);

        // 按行复制数据到连续内存，去掉 stride 对齐填充
        let data_size = (width * height * 4) as usize;
        let mut data = vec![0u8; data_size];

        let stride = rgba_frame.stride(0);
        let frame_data = rgba_frame.data(0);

        for y in 0..height as usize {
            let src_offset = y * stride;
            let dst_offset = y * (width as usize * 4);
            let row_size = width as usize * 4;
            data[dst_offset..dst_offset + row_size]
                .copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        Ok(Some(VideoFrame {
            pts,
            width,
            height,
            format: PixelFormat::RGBA,
            data,
        }))
    }
}

impl VideoDecode for VideoDecoder {
    /// 解码数据包
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<VideoFrame>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），忽略本次包");
                return Ok(frames);
            }
            Err(e) => return Err(e.into()),
        }

        self.receive_all(&mut frames)?;
        Ok(frames)
    }

    /// 刷新解码器（获取缓冲的帧）
    fn flush(&mut self) -> Result<Vec<VideoFrame>> {
        let mut frames = Vec::new();

        self.decoder.send_eof()?;

        loop {
            let mut decoded_frame = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => {
                    if let Some(frame) = self.convert_frame(decoded_frame)? {
                        frames.push(frame);
                    }
                }
                Err(_) => break,
            }
        }

        self.decoder.flush();

        Ok(frames)
    }
}

/// 音频解码器
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    time_base: f64,
    target_channels: u16,      // 目标声道数（用于声道转换）
    target_sample_rate: u32,   // 目标采样率
}

unsafe impl Send for AudioDecoder {}

impl AudioDecoder {
    /// 从音频流创建解码器（指定目标输出配置）
    pub fn from_stream_with_config(
        stream: format::stream::Stream,
        target_sample_rate: u32,
        target_channels: u16,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        let time_base = stream.time_base();
        let time_base = time_base.numerator() as f64 / time_base.denominator() as f64;

        debug!(
            "音频解码器: {} Hz, {} 声道 → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            target_sample_rate,
            target_channels
        );

        Ok(Self {
            decoder,
            resampler: None,
            time_base,
            target_channels,
            target_sample_rate,
        })
    }

    fn receive_all(&mut self, frames: &mut Vec<AudioFrame>) -> Result<()> {
        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => {
                    if let Some(frame) = self.convert_frame(decoded_frame)? {
                        frames.push(frame);
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN: 需要更多输入
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// 转换音频帧为 f32 交错格式（支持声道转换和重采样）
    fn convert_frame(&mut self, frame: util::frame::Audio) -> Result<Option<AudioFrame>> {
        let source_rate = frame.rate();
        let source_channels = frame.channels();

        // 初始化 resampler（支持声道转换和重采样）
        if self.resampler.is_none() {
            let target_layout = match self.target_channels {
                1 => util::channel_layout::ChannelLayout::MONO,
                2 => util::channel_layout::ChannelLayout::STEREO,
                6 => util::channel_layout::ChannelLayout::_5POINT1,
                _ => util::channel_layout::ChannelLayout::STEREO, // 默认立体声
            };

            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                source_rate, source_channels, self.target_sample_rate, self.target_channels
            );

            self.resampler = Some(software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                source_rate,
                util::format::Sample::F32(util::format::sample::Type::Packed),
                target_layout,
                self.target_sample_rate,
            )?);
        }

        let mut resampled = util::frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.run(&frame, &mut resampled)?;
        }

        // 计算 PTS（毫秒）
        let pts = frame
            .timestamp()
            .map(|timestamp| (timestamp as f64 * self.time_base * 1000.0) as i64)
            .unwrap_or(0);

        // 复制音频数据（交错排列，使用目标声道数）
        let samples = resampled.samples();
        let data_size = samples * self.target_channels as usize;
        if data_size == 0 {
            return Ok(None);
        }
        let mut data = vec![0f32; data_size];

        let frame_data = resampled.data(0);
        let byte_slice =
            unsafe { std::slice::from_raw_parts(frame_data.as_ptr() as *const f32, data_size) };
        data.copy_from_slice(byte_slice);

        Ok(Some(AudioFrame {
            pts,
            sample_rate: self.target_sample_rate,
            channels: self.target_channels,
            format: SampleFormat::F32,
            data,
        }))
    }
}

impl AudioDecode for AudioDecoder {
    /// 解码数据包
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<AudioFrame>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("音频解码器收到 EOF（send_packet），忽略本次包");
                return Ok(frames);
            }
            Err(e) => return Err(e.into()),
        }

        self.receive_all(&mut frames)?;
        Ok(frames)
    }

    /// 刷新解码器（获取缓冲的帧）
    fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        let mut frames = Vec::new();

        self.decoder.send_eof()?;

        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => {
                    if let Some(frame) = self.convert_frame(decoded_frame)? {
                        frames.push(frame);
                    }
                }
                Err(_) => break,
            }
        }

        self.decoder.flush();

        Ok(frames)
    }
}
