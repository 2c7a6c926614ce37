use crate::core::{MediaInfo, PixelFormat, PlayerError, Result, SampleFormat};
use crate::player::audio_output::AudioOutput;
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::event_loop::{self, PlayerEvent};
use crate::player::orchestrator::DecodeOrchestrator;
use crate::player::pacing::PacingClock;
use crate::player::session::{BufferConfig, PlaybackSession, SessionParams};
use crate::renderer::Renderer;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 播放管理器
///
/// 拥有一次播放会话的全部线程与外设：解码线程、节拍线程、
/// 渲染事件循环线程和音频输出流。open 阶段的任何失败都是启动失败，
/// 管理器把底层错误包装成指明失败阶段的单条诊断信息。
pub struct PlaybackManager {
    session: Arc<PlaybackSession>,
    media_info: MediaInfo,
    audio_output: Option<AudioOutput>,
    event_tx: Sender<PlayerEvent>,
    event_rx: Option<Receiver<PlayerEvent>>,

    // start() 之前暂存，启动时移交给解码线程
    demuxer: Option<Box<dyn DemuxerSource>>,
    audio_decoder: Option<AudioDecoder>,
    video_decoder: Option<VideoDecoder>,

    decode_thread: Option<JoinHandle<Result<()>>>,
    event_thread: Option<JoinHandle<()>>,
    pacing: Option<PacingClock>,
    stopped: bool,
}

impl PlaybackManager {
    /// 打开媒体文件并完成全部协商（源 → 编解码器 → 音频设备）
    pub fn open(path: &str, config: &BufferConfig) -> Result<Self> {
        // 阶段一：打开媒体源
        let demuxer = Demuxer::open(path)?;
        let media_info = demuxer.media_info().clone();
        info!(
            "媒体信息: {}x{} @ {:.2}fps, 视频 {}, 音频 {} ({} Hz, {} 声道)",
            media_info.width,
            media_info.height,
            media_info.fps,
            media_info.video_codec,
            media_info.audio_codec,
            media_info.sample_rate,
            media_info.channels
        );

        // 阶段二：视频解码器
        let video_stream = demuxer.video_stream().ok_or(PlayerError::NoVideoStream)?;
        let video_decoder = VideoDecoder::from_stream(video_stream)
            .map_err(|e| PlayerError::CodecOpenError(format!("视频解码器: {}", e)))?;

        // 阶段三：音频设备协商 + 音频解码器（目标参数取设备实际配置）
        let mut audio_output = None;
        let mut audio_decoder = None;
        let (mut sample_rate, mut channels) = (media_info.sample_rate, media_info.channels);
        if let Some(audio_stream) = demuxer.audio_stream() {
            let output = AudioOutput::new(media_info.sample_rate, media_info.channels)?;
            let (actual_rate, actual_channels) = output.actual_config();
            sample_rate = actual_rate;
            channels = actual_channels;
            audio_decoder = Some(
                AudioDecoder::from_stream_with_config(audio_stream, actual_rate, actual_channels)
                    .map_err(|e| PlayerError::CodecOpenError(format!("音频解码器: {}", e)))?,
            );
            audio_output = Some(output);
        } else {
            warn!("媒体源没有音频流，仅播放视频");
        }

        let frame_rate = if media_info.fps > 0.0 {
            media_info.fps
        } else {
            warn!("媒体源未标明帧率，按 25fps 播放");
            25.0
        };

        let params = SessionParams {
            sample_rate,
            channels,
            sample_format: SampleFormat::F32,
            frame_rate,
            width: media_info.width,
            height: media_info.height,
            pixel_format: PixelFormat::RGBA,
        };
        let session = PlaybackSession::new(params, config)?;

        // 阶段四：启动音频流（数据就绪前回调输出静音）
        if let Some(output) = audio_output.as_mut() {
            output.start(session.clone())?;
        }

        let (event_tx, event_rx) = unbounded();

        Ok(Self {
            session,
            media_info,
            audio_output,
            event_tx,
            event_rx: Some(event_rx),
            demuxer: Some(Box::new(demuxer)),
            audio_decoder,
            video_decoder: Some(video_decoder),
            decode_thread: None,
            event_thread: None,
            pacing: None,
            stopped: false,
        })
    }

    /// 启动播放线程：解码、节拍、渲染事件循环
    pub fn start(&mut self, renderer: Box<dyn Renderer>) {
        let demuxer = match self.demuxer.take() {
            Some(demuxer) => demuxer,
            None => {
                warn!("播放已启动，忽略重复的 start()");
                return;
            }
        };

        // 解码线程
        let mut orchestrator = DecodeOrchestrator::new(
            demuxer,
            self.audio_decoder.take(),
            self.video_decoder.take(),
            self.session.clone(),
        );
        self.decode_thread = Some(thread::spawn(move || orchestrator.run()));

        // 节拍线程
        self.pacing = Some(PacingClock::start(
            self.session.params.frame_rate,
            self.event_tx.clone(),
            self.session.clone(),
        ));

        // 渲染事件循环线程
        if let Some(event_rx) = self.event_rx.take() {
            let session = self.session.clone();
            let mut renderer = renderer;
            self.event_thread = Some(thread::spawn(move || {
                event_loop::run(&event_rx, &session, renderer.as_mut());
            }));
        }

        info!("▶️ 播放已启动");
    }

    /// 停止播放并回收所有线程（幂等）
    ///
    /// 流程: StopRequested → 关闭队列唤醒阻塞的生产者 → 回收解码线程
    /// → Draining（播完缓冲区里剩余的音频）→ 关闭音频流 → Terminated
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        info!("⏹ 正在停止播放...");
        self.session.shutdown.request_stop();

        // 唤醒可能阻塞在满队列上的解码线程
        self.session.video_frames.close();
        self.session.audio_packets.close();

        if let Some(handle) = self.decode_thread.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("❌ 解码阶段错误: {}", e),
                Err(_) => error!("❌ 解码线程 panic"),
            }
        }

        // 排空阶段：已缓冲的音频播完再关设备
        self.session.shutdown.begin_drain();
        if self.audio_output.is_some() && !self.session.audio_ring.is_empty() {
            info!(
                "🔊 排空剩余音频: {} 字节",
                self.session.audio_ring.len()
            );
            if !self.session.audio_ring.wait_drained(Duration::from_secs(2)) {
                warn!("音频排空超时，放弃剩余 {} 字节", self.session.audio_ring.len());
            }
        }
        if let Some(output) = self.audio_output.as_mut() {
            output.stop();
        }

        if let Some(pacing) = self.pacing.as_mut() {
            pacing.join();
        }
        if let Some(handle) = self.event_thread.take() {
            let _ = handle.join();
        }

        self.session.shutdown.terminate();
        info!("✅ 播放会话已终结");
    }

    /// 获取媒体信息
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 事件发送端（供 UI 推送退出请求）
    pub fn event_sender(&self) -> Sender<PlayerEvent> {
        self.event_tx.clone()
    }

    /// 缓冲区占用情况: (音频包队列, 音频缓冲字节, 视频帧数)
    pub fn buffer_status(&self) -> (usize, usize, usize) {
        (
            self.session.audio_packets.len(),
            self.session.audio_ring.len(),
            self.session.video_frames.len(),
        )
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        if let Some(output) = self.audio_output.as_ref() {
            output.set_volume(volume);
        }
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.stop();
    }
}
