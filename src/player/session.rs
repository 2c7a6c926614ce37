use crate::core::{PixelFormat, PlayerError, Result, SampleFormat};
use crate::player::audio_buffer::AudioRingBuffer;
use crate::player::bounded_queue::BoundedQueue;
use crate::player::demuxer_source::MediaPacket;
use crate::player::frame_ring::VideoFrameRing;
use log::info;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// 缓冲区容量配置
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// 音频包预读队列深度
    pub audio_packet_depth: usize,
    /// 音频缓冲区总容量（字节）
    pub audio_buffer_capacity: usize,
    /// 音频缓冲区低水位补水阈值（字节）
    pub audio_refill_threshold: usize,
    /// 视频帧环槽位数
    pub video_ring_slots: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            audio_packet_depth: 60,
            audio_buffer_capacity: 4_096_000,
            audio_refill_threshold: 51_200,
            video_ring_slots: 30,
        }
    }
}

impl BufferConfig {
    fn validate(&self) -> Result<()> {
        if self.audio_packet_depth == 0
            || self.audio_buffer_capacity == 0
            || self.video_ring_slots == 0
        {
            return Err(PlayerError::ResourceExhausted(
                "缓冲区容量不能为 0".to_string(),
            ));
        }
        if self.audio_refill_threshold >= self.audio_buffer_capacity {
            return Err(PlayerError::ResourceExhausted(format!(
                "补水阈值 {} 必须小于缓冲区容量 {}",
                self.audio_refill_threshold, self.audio_buffer_capacity
            )));
        }
        Ok(())
    }
}

/// 停机状态机: Running → StopRequested → Draining → Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    StopRequested = 1,
    Draining = 2,
    Terminated = 3,
}

/// 停机协调器
///
/// 状态只会单调前进。各线程在循环中协作式地检查 is_stop_requested，
/// 没有抢占式打断；节拍线程观察到停机后发出唯一一次终止事件，
/// 保证事件循环确定性退出。
pub struct ShutdownCoordinator {
    state: AtomicU8,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
        }
    }

    /// 请求停止（幂等，只会从 Running 前进）
    pub fn request_stop(&self) {
        let prev = self.advance(ShutdownState::StopRequested);
        if prev < ShutdownState::StopRequested as u8 {
            info!("⏹ 收到停止请求");
        }
    }

    /// 进入排空阶段：已缓冲的数据播完再关闭
    pub fn begin_drain(&self) {
        self.advance(ShutdownState::Draining);
    }

    /// 会话终结
    pub fn terminate(&self) {
        self.advance(ShutdownState::Terminated);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) >= ShutdownState::StopRequested as u8
    }

    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::Acquire) {
            0 => ShutdownState::Running,
            1 => ShutdownState::StopRequested,
            2 => ShutdownState::Draining,
            _ => ShutdownState::Terminated,
        }
    }

    fn advance(&self, to: ShutdownState) -> u8 {
        // fetch_max 保证状态单调，不会从 Terminated 退回
        self.state.fetch_max(to as u8, Ordering::AcqRel)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话级流参数（打开媒体源时协商一次，之后只读）
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

/// 播放会话
///
/// 集中持有一次播放的全部可变共享状态：音频包队列、音频缓冲区、
/// 视频帧环和停机协调器。各线程只持有对会话的 Arc 引用，
/// 没有任何状态逃逸到会话之外。
pub struct PlaybackSession {
    pub params: SessionParams,
    pub audio_packets: BoundedQueue<MediaPacket>,
    pub audio_ring: AudioRingBuffer,
    pub video_frames: VideoFrameRing,
    pub shutdown: ShutdownCoordinator,
    pub refill_threshold: usize,
}

impl PlaybackSession {
    pub fn new(params: SessionParams, config: &BufferConfig) -> Result<Arc<Self>> {
        config.validate()?;
        info!(
            "创建播放会话: {}x{} @ {:.2}fps, {} Hz {} 声道",
            params.width, params.height, params.frame_rate, params.sample_rate, params.channels
        );
        Ok(Arc::new(Self {
            params,
            audio_packets: BoundedQueue::new(config.audio_packet_depth),
            audio_ring: AudioRingBuffer::new(config.audio_buffer_capacity),
            video_frames: VideoFrameRing::new(config.video_ring_slots),
            shutdown: ShutdownCoordinator::new(),
            refill_threshold: config.audio_refill_threshold,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn test_params() -> SessionParams {
        SessionParams {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::F32,
            frame_rate: 25.0,
            width: 64,
            height: 48,
            pixel_format: PixelFormat::RGBA,
        }
    }

    #[test]
    fn test_shutdown_states_are_monotonic() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert!(!coordinator.is_stop_requested());

        coordinator.request_stop();
        assert_eq!(coordinator.state(), ShutdownState::StopRequested);
        assert!(coordinator.is_stop_requested());

        // 重复请求是幂等的
        coordinator.request_stop();
        assert_eq!(coordinator.state(), ShutdownState::StopRequested);

        coordinator.begin_drain();
        coordinator.terminate();
        assert_eq!(coordinator.state(), ShutdownState::Terminated);

        // 终结后不会退回
        coordinator.request_stop();
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = BufferConfig {
            video_ring_slots: 0,
            ..BufferConfig::default()
        };
        assert!(PlaybackSession::new(test_params(), &config).is_err());
    }

    #[test]
    fn test_threshold_must_be_below_capacity() {
        let config = BufferConfig {
            audio_buffer_capacity: 1024,
            audio_refill_threshold: 1024,
            ..BufferConfig::default()
        };
        assert!(PlaybackSession::new(test_params(), &config).is_err());
    }

    #[test]
    fn test_session_buffers_start_empty() {
        let session = PlaybackSession::new(test_params(), &BufferConfig::default()).unwrap();
        assert!(session.audio_packets.is_empty());
        assert!(session.audio_ring.is_empty());
        assert!(session.video_frames.is_empty());
        assert_eq!(session.video_frames.capacity(), 30);
        assert_eq!(session.audio_ring.capacity(), 4_096_000);
    }
}
