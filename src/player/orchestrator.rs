use crate::core::{PlayerError, Result};
use crate::player::decoder::{AudioDecode, VideoDecode};
use crate::player::demuxer_source::{DemuxerSource, MediaPacket, StreamKind};
use crate::player::session::PlaybackSession;
use log::{debug, info};
use std::sync::Arc;

/// 解码编排器
///
/// 在独立线程上驱动解封装循环：每读出一个包，按流标签路由到对应
/// 解码路径，把解码结果送入音频缓冲区或视频帧环。
///
/// 背压策略：
/// - 视频帧直接阻塞式 push 进帧环，环满即等待渲染侧消费；
/// - 音频包先进预读队列，在缓冲区低于补水阈值（或队列占满）时
///   集中补水：等消费者把缓冲区喝到阈值以下 → 压缩窗口 →
///   把队列里的包解码、追加到填充目标为止。
///
/// 码流错误让本循环优雅退出并把错误带给会话持有者，
/// 渲染与音频侧继续消费已缓冲的数据；EAGAIN/EOF 属于正常流控。
pub struct DecodeOrchestrator<A: AudioDecode, V: VideoDecode> {
    demuxer: Box<dyn DemuxerSource>,
    audio_decoder: Option<A>,
    video_decoder: Option<V>,
    session: Arc<PlaybackSession>,
}

impl<A: AudioDecode, V: VideoDecode> DecodeOrchestrator<A, V> {
    pub fn new(
        demuxer: Box<dyn DemuxerSource>,
        audio_decoder: Option<A>,
        video_decoder: Option<V>,
        session: Arc<PlaybackSession>,
    ) -> Self {
        Self {
            demuxer,
            audio_decoder,
            video_decoder,
            session,
        }
    }

    /// 编排循环主体（阻塞直到流结束、停机或码流错误）
    pub fn run(&mut self) -> Result<()> {
        info!("🎛 解码线程启动: {}", self.demuxer.description());

        let mut packet_count: usize = 0;
        let mut audio_packet_count: usize = 0;
        let mut video_packet_count: usize = 0;

        loop {
            // 协作式停机：每个循环迭代检查一次标志
            if self.session.shutdown.is_stop_requested() {
                info!("🎛 解码线程观察到停机标志，停止解封装");
                self.flush_on_stop();
                break;
            }

            match self.demuxer.read_packet() {
                Ok(Some(media_packet)) => {
                    packet_count += 1;
                    match media_packet.kind {
                        StreamKind::Audio => {
                            audio_packet_count += 1;
                            self.on_audio_packet(media_packet)?;
                        }
                        StreamKind::Video => {
                            video_packet_count += 1;
                            self.on_video_packet(media_packet)?;
                        }
                    }
                }
                Ok(None) => {
                    info!("📄 到达流末尾，共读取 {} 个包", packet_count);
                    self.finish_stream()?;
                    break;
                }
                Err(e) => {
                    return Err(PlayerError::StreamError(format!("读取数据包失败: {}", e)));
                }
            }
        }

        info!(
            "🎛 解码线程退出（{} 包：{} 音频，{} 视频）",
            packet_count, audio_packet_count, video_packet_count
        );
        Ok(())
    }

    /// 音频包：入预读队列，必要时触发补水
    fn on_audio_packet(&mut self, media_packet: MediaPacket) -> Result<()> {
        let session = self.session.clone();
        if self.audio_decoder.is_none() {
            return Ok(());
        }

        // 队列占满说明缓冲区还没喝空：先补水腾出队列空间，
        // 补水内部会等待消费者把缓冲区降到阈值以下（背压）
        if session.audio_packets.is_full() {
            self.refill_audio()?;
        }

        if session.audio_packets.push(media_packet).is_err() {
            // 队列已关闭：停机中，按正常流控退出
            debug!("音频包队列已关闭，丢弃本包");
            return Ok(());
        }

        // 缓冲区低于阈值时立刻补水，避免声卡回调吃到静音
        if session.audio_ring.len() <= session.refill_threshold {
            self.refill_audio()?;
        }
        Ok(())
    }

    /// 补水周期：等待 → 压缩 → 解码填充
    fn refill_audio(&mut self) -> Result<()> {
        let session = self.session.clone();
        let decoder = match self.audio_decoder.as_mut() {
            Some(decoder) => decoder,
            None => return Ok(()),
        };

        let ring = &session.audio_ring;
        let shutdown = &session.shutdown;
        ring.wait_below(session.refill_threshold, || shutdown.is_stop_requested());
        if shutdown.is_stop_requested() {
            return Ok(());
        }

        // 把未读窗口移回头部，之后才允许在尾部追加
        ring.compact();

        // 填到容量减一个阈值为止，给单包解码量留出余量
        let fill_target = ring.capacity() - session.refill_threshold;
        while ring.len() < fill_target {
            let media_packet = match session.audio_packets.try_pop() {
                Some(media_packet) => media_packet,
                None => break,
            };
            let frames = decoder
                .decode(&media_packet.packet)
                .map_err(|e| PlayerError::StreamError(format!("音频解码失败: {}", e)))?;
            for frame in &frames {
                ring.append(bytemuck::cast_slice(&frame.data))?;
            }
        }
        Ok(())
    }

    /// 视频包：立即解码，帧阻塞式入环
    fn on_video_packet(&mut self, media_packet: MediaPacket) -> Result<()> {
        let session = self.session.clone();
        let decoder = match self.video_decoder.as_mut() {
            Some(decoder) => decoder,
            None => return Ok(()),
        };

        let frames = decoder
            .decode(&media_packet.packet)
            .map_err(|e| PlayerError::StreamError(format!("视频解码失败: {}", e)))?;
        for frame in frames {
            // 环满时阻塞（背压）；环关闭说明正在停机
            if session.video_frames.push(frame).is_err() {
                debug!("视频帧环已关闭，停止入环");
                return Ok(());
            }
        }
        Ok(())
    }

    /// 停机路径的 flush：释放解码器内部缓冲的帧
    ///
    /// 消费侧的缓冲区归渲染/音频线程排空，这里不去清空它们，
    /// flush 出来的帧直接丢弃。
    fn flush_on_stop(&mut self) {
        if let Some(decoder) = self.audio_decoder.as_mut() {
            if let Err(e) = decoder.flush() {
                debug!("停机 flush 音频解码器: {}", e);
            }
        }
        if let Some(decoder) = self.video_decoder.as_mut() {
            if let Err(e) = decoder.flush() {
                debug!("停机 flush 视频解码器: {}", e);
            }
        }
    }

    /// 流末尾：排空预读队列，flush 两个解码器
    fn finish_stream(&mut self) -> Result<()> {
        let session = self.session.clone();

        // 先把滞留在队列里的音频包全部解码进缓冲区
        while !session.audio_packets.is_empty() && !session.shutdown.is_stop_requested() {
            self.refill_audio()?;
        }

        if let Some(decoder) = self.audio_decoder.as_mut() {
            let frames = decoder
                .flush()
                .map_err(|e| PlayerError::StreamError(format!("音频解码器 flush 失败: {}", e)))?;
            debug!("音频解码器 flush 得到 {} 帧", frames.len());
            for frame in &frames {
                let ring = &session.audio_ring;
                let shutdown = &session.shutdown;
                ring.wait_below(session.refill_threshold, || shutdown.is_stop_requested());
                if shutdown.is_stop_requested() {
                    return Ok(());
                }
                ring.compact();
                ring.append(bytemuck::cast_slice(&frame.data))?;
            }
        }

        if let Some(decoder) = self.video_decoder.as_mut() {
            let frames = decoder
                .flush()
                .map_err(|e| PlayerError::StreamError(format!("视频解码器 flush 失败: {}", e)))?;
            debug!("视频解码器 flush 得到 {} 帧", frames.len());
            for frame in frames {
                if session.video_frames.push(frame).is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AudioFrame, MediaInfo, PixelFormat, SampleFormat, VideoFrame};
    use crate::player::event_loop::{self, PlayerEvent};
    use crate::player::session::{BufferConfig, SessionParams};
    use crate::renderer::Renderer;
    use ffmpeg_next as ffmpeg;
    use std::collections::VecDeque;
    use std::thread;
    use std::time::Duration;

    const SAMPLES_PER_PACKET: usize = 256;

    /// 预先编排好的假解封装器
    struct FakeDemuxer {
        packets: VecDeque<StreamKind>,
        info: MediaInfo,
    }

    impl FakeDemuxer {
        fn new(kinds: &[StreamKind]) -> Self {
            Self {
                packets: kinds.iter().copied().collect(),
                info: MediaInfo::default(),
            }
        }
    }

    impl DemuxerSource for FakeDemuxer {
        fn read_packet(&mut self) -> Result<Option<MediaPacket>> {
            Ok(self.packets.pop_front().map(|kind| MediaPacket {
                packet: ffmpeg::Packet::copy(&[0u8; 8]),
                kind,
                stream_index: 0,
            }))
        }

        fn media_info(&self) -> &MediaInfo {
            &self.info
        }

        fn description(&self) -> String {
            "FakeDemuxer".to_string()
        }
    }

    /// 每个包产出固定采样数的假音频解码器
    struct FakeAudioDecoder;

    impl AudioDecode for FakeAudioDecoder {
        fn decode(&mut self, _packet: &ffmpeg::Packet) -> Result<Vec<AudioFrame>> {
            Ok(vec![AudioFrame {
                pts: 0,
                sample_rate: 48000,
                channels: 2,
                format: SampleFormat::F32,
                data: vec![0.25f32; SAMPLES_PER_PACKET],
            }])
        }

        fn flush(&mut self) -> Result<Vec<AudioFrame>> {
            Ok(vec![])
        }
    }

    /// 每个包产出一帧的假视频解码器
    struct FakeVideoDecoder {
        next_pts: i64,
    }

    impl VideoDecode for FakeVideoDecoder {
        fn decode(&mut self, _packet: &ffmpeg::Packet) -> Result<Vec<VideoFrame>> {
            let pts = self.next_pts;
            self.next_pts += 40;
            Ok(vec![VideoFrame {
                pts,
                width: 2,
                height: 2,
                format: PixelFormat::RGBA,
                data: vec![0u8; 16],
            }])
        }

        fn flush(&mut self) -> Result<Vec<VideoFrame>> {
            Ok(vec![])
        }
    }

    /// 一直报码流错误的音频解码器
    struct BrokenAudioDecoder;

    impl AudioDecode for BrokenAudioDecoder {
        fn decode(&mut self, _packet: &ffmpeg::Packet) -> Result<Vec<AudioFrame>> {
            Err(PlayerError::StreamError("坏码流".to_string()))
        }

        fn flush(&mut self) -> Result<Vec<AudioFrame>> {
            Ok(vec![])
        }
    }

    struct CountingRenderer {
        presented: usize,
    }

    impl Renderer for CountingRenderer {
        fn present(&mut self, _frame: VideoFrame) -> Result<()> {
            self.presented += 1;
            Ok(())
        }
    }

    fn session() -> Arc<PlaybackSession> {
        let params = SessionParams {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::F32,
            frame_rate: 25.0,
            width: 2,
            height: 2,
            pixel_format: PixelFormat::RGBA,
        };
        // 容量足够大，解码全程不会触发阻塞
        PlaybackSession::new(params, &BufferConfig::default()).unwrap()
    }

    #[test]
    fn test_end_to_end_drain_and_shutdown() {
        let session = session();
        let demuxer = FakeDemuxer::new(&[
            StreamKind::Audio,
            StreamKind::Video,
            StreamKind::Audio,
            StreamKind::Video,
            StreamKind::Audio,
        ]);

        let mut orchestrator = DecodeOrchestrator::new(
            Box::new(demuxer),
            Some(FakeAudioDecoder),
            Some(FakeVideoDecoder { next_pts: 0 }),
            session.clone(),
        );
        orchestrator.run().unwrap();

        // 3 个音频包全部进入缓冲区，2 个视频包全部进入帧环
        assert_eq!(session.audio_ring.len(), 3 * SAMPLES_PER_PACKET * 4);
        assert_eq!(session.video_frames.len(), 2);

        // 模拟停机：事件循环消费两拍后收到退出与终止
        let (tx, rx) = crossbeam_channel::unbounded();
        let loop_session = session.clone();
        let handle = thread::spawn(move || {
            let mut renderer = CountingRenderer { presented: 0 };
            event_loop::run(&rx, &loop_session, &mut renderer);
            renderer.presented
        });

        tx.send(PlayerEvent::RefreshTick).unwrap();
        tx.send(PlayerEvent::RefreshTick).unwrap();
        tx.send(PlayerEvent::Quit).unwrap();
        tx.send(PlayerEvent::PacingStopped).unwrap();
        let presented = handle.join().unwrap();

        assert_eq!(presented, 2);
        assert!(session.video_frames.is_empty());
        assert!(session.shutdown.is_stop_requested());

        // 声卡侧把剩余音频抽干
        let mut out = vec![0u8; 3 * SAMPLES_PER_PACKET * 4];
        assert_eq!(session.audio_ring.pull(&mut out), out.len());
        assert!(session.audio_ring.is_empty());
    }

    #[test]
    fn test_stream_error_terminates_loop() {
        let session = session();
        let demuxer = FakeDemuxer::new(&[StreamKind::Audio]);
        let mut orchestrator = DecodeOrchestrator::new(
            Box::new(demuxer),
            Some(BrokenAudioDecoder),
            Some(FakeVideoDecoder { next_pts: 0 }),
            session.clone(),
        );

        let result = orchestrator.run();
        assert!(matches!(result, Err(PlayerError::StreamError(_))));
        // 码流错误不触发停机，消费侧继续排空
        assert!(!session.shutdown.is_stop_requested());
    }

    #[test]
    fn test_shutdown_stops_demux_loop() {
        let session = session();
        session.shutdown.request_stop();

        // 停机后不应再读任何包
        let demuxer = FakeDemuxer::new(&[StreamKind::Audio; 10]);
        let mut orchestrator = DecodeOrchestrator::new(
            Box::new(demuxer),
            Some(FakeAudioDecoder),
            Some(FakeVideoDecoder { next_pts: 0 }),
            session.clone(),
        );
        orchestrator.run().unwrap();
        assert!(session.audio_ring.is_empty());
        assert!(session.audio_packets.is_empty());
    }

    #[test]
    fn test_video_backpressure_blocks_until_pop() {
        let params = SessionParams {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::F32,
            frame_rate: 25.0,
            width: 2,
            height: 2,
            pixel_format: PixelFormat::RGBA,
        };
        let config = BufferConfig {
            video_ring_slots: 2,
            ..BufferConfig::default()
        };
        let session = PlaybackSession::new(params, &config).unwrap();

        let demuxer = FakeDemuxer::new(&[StreamKind::Video; 4]);
        let mut orchestrator = DecodeOrchestrator::new(
            Box::new(demuxer),
            None::<FakeAudioDecoder>,
            Some(FakeVideoDecoder { next_pts: 0 }),
            session.clone(),
        );

        let handle = thread::spawn(move || orchestrator.run());

        // 环只有 2 个槽位，解码线程必然被背压卡住
        thread::sleep(Duration::from_millis(100));
        assert_eq!(session.video_frames.len(), 2);
        assert!(!handle.is_finished());

        // 渲染侧逐帧消费后解码线程完成
        assert_eq!(session.video_frames.pop().unwrap().pts, 0);
        assert_eq!(session.video_frames.pop().unwrap().pts, 40);
        handle.join().unwrap().unwrap();
        assert_eq!(session.video_frames.len(), 2);
    }
}
