use crate::core::{PlayerError, Result};
use crate::player::session::PlaybackSession;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 音频输出 - 使用 cpal 播放音频
///
/// 声卡按自己的节奏异步调用回调拉取采样。回调从会话的音频缓冲区
/// 拉字节：缓冲区空时输出保持静音（pull 补零），绝不阻塞等待数据，
/// 声卡回调必须在期限内返回。
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    volume: Arc<Mutex<f32>>,
}

impl AudioOutput {
    /// 创建音频输出（支持非标准配置自动回退）
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        // 尝试使用请求的配置
        let mut config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // 检查设备是否支持该配置，如果不支持则回退到标准配置
        if !Self::is_supported(&device, &config)? {
            warn!(
                "⚠️  音频设备不支持 {} Hz, {} 声道配置，回退到标准配置",
                sample_rate, channels
            );

            let fallback_configs = [
                (48000, 2),  // 最常见
                (44100, 2),  // CD 音质
                (48000, 1),  // 单声道高质量
                (44100, 1),  // 单声道 CD 质量
                (sample_rate, 1), // 原采样率单声道（可能支持）
            ];

            let mut found_fallback = false;
            for (fb_rate, fb_channels) in fallback_configs {
                let fb_config = StreamConfig {
                    channels: fb_channels,
                    sample_rate: cpal::SampleRate(fb_rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                if Self::is_supported(&device, &fb_config)? {
                    info!("✅ 使用回退配置: {} Hz, {} 声道", fb_rate, fb_channels);
                    config = fb_config;
                    found_fallback = true;
                    break;
                }
            }

            if !found_fallback {
                return Err(PlayerError::AudioError(format!(
                    "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                    sample_rate, channels
                )));
            }
        }

        Ok(Self {
            device,
            config,
            stream: None,
            volume: Arc::new(Mutex::new(1.0)),
        })
    }

    fn is_supported(device: &Device, config: &StreamConfig) -> Result<bool> {
        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;

        for supported_config in supported_configs {
            if Self::is_config_compatible(config, &supported_config) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    /// 构建输出流并开始播放
    ///
    /// 回调持有会话引用，从音频缓冲区拉取采样字节。
    /// 数据未就绪时 pull 输出全零（静音），不会阻塞。
    pub fn start(&mut self, session: Arc<PlaybackSession>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let volume = self.volume.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    {
                        let bytes: &mut [u8] = bytemuck::cast_slice_mut(data);
                        session.audio_ring.pull(bytes);
                    }
                    let vol = *volume.lock();
                    if (vol - 1.0).abs() > f32::EPSILON {
                        for sample in data.iter_mut() {
                            *sample *= vol;
                        }
                    }
                },
                move |err| {
                    warn!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");

        Ok(())
    }

    /// 停止播放
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    /// 获取实际使用的音频配置
    pub fn actual_config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
