use crate::player::event_loop::PlayerEvent;
use crate::player::session::PlaybackSession;
use crossbeam_channel::Sender;
use log::info;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 视频呈现节拍时钟
///
/// 独立线程按 1000 / frame_rate 毫秒的间隔向事件流发送呈现节拍，
/// 节拍本身不携带帧数据。呈现节奏只跟随墙钟帧率，与解码快慢解耦：
/// 解码超前或落后都不影响节拍周期。
///
/// 观察到停机标志后停止发节拍，并发出恰好一次终止事件再退出，
/// 保证事件循环不会悬死在下一次等待上。
pub struct PacingClock {
    handle: Option<JoinHandle<()>>,
}

impl PacingClock {
    /// 启动节拍线程
    pub fn start(
        frame_rate: f64,
        events: Sender<PlayerEvent>,
        session: Arc<PlaybackSession>,
    ) -> Self {
        let interval = Duration::from_millis((1000.0 / frame_rate.max(1.0)) as u64);
        let handle = thread::spawn(move || Self::tick_loop(interval, events, session));
        Self {
            handle: Some(handle),
        }
    }

    fn tick_loop(interval: Duration, events: Sender<PlayerEvent>, session: Arc<PlaybackSession>) {
        info!("⏱ 节拍线程启动: 每 {:?} 一拍", interval);
        let mut tick_count: u64 = 0;
        // 以绝对时刻推进，避免发送耗时累积成漂移
        let mut next_tick = Instant::now() + interval;
        loop {
            if session.shutdown.is_stop_requested() {
                break;
            }
            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
            }
            next_tick += interval;
            if session.shutdown.is_stop_requested() {
                break;
            }
            if events.send(PlayerEvent::RefreshTick).is_err() {
                // 接收端已不在，无人消费终止事件
                info!("⏱ 事件流已断开，节拍线程退出");
                return;
            }
            tick_count += 1;
        }
        // 恰好一次的终止事件，唤醒事件循环
        let _ = events.send(PlayerEvent::PacingStopped);
        info!("⏱ 节拍线程退出（共 {} 拍）", tick_count);
    }

    /// 等待节拍线程结束
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PacingClock {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PixelFormat, SampleFormat};
    use crate::player::session::{BufferConfig, SessionParams};

    fn session(frame_rate: f64) -> Arc<PlaybackSession> {
        let params = SessionParams {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::F32,
            frame_rate,
            width: 2,
            height: 2,
            pixel_format: PixelFormat::RGBA,
        };
        PlaybackSession::new(params, &BufferConfig::default()).unwrap()
    }

    #[test]
    fn test_ticks_at_configured_interval() {
        // 40 fps = 25ms 周期
        let session = session(40.0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut clock = PacingClock::start(40.0, tx, session.clone());

        thread::sleep(Duration::from_millis(200));
        session.shutdown.request_stop();
        clock.join();

        let events: Vec<_> = rx.try_iter().collect();
        let ticks = events
            .iter()
            .filter(|e| **e == PlayerEvent::RefreshTick)
            .count();
        // 200ms / 25ms ≈ 8 拍，放宽到调度抖动容忍范围
        assert!(ticks >= 3, "期望至少 3 拍，实际 {}", ticks);
        assert!(ticks <= 16, "期望至多 16 拍，实际 {}", ticks);
    }

    #[test]
    fn test_exactly_one_terminal_event_after_stop() {
        let session = session(50.0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut clock = PacingClock::start(50.0, tx, session.clone());

        thread::sleep(Duration::from_millis(60));
        session.shutdown.request_stop();
        clock.join();

        let events: Vec<_> = rx.try_iter().collect();
        let terminals = events
            .iter()
            .filter(|e| **e == PlayerEvent::PacingStopped)
            .count();
        assert_eq!(terminals, 1);
        // 终止事件之后不再有任何节拍
        assert_eq!(events.last(), Some(&PlayerEvent::PacingStopped));
    }

    #[test]
    fn test_stop_before_first_tick() {
        let session = session(1.0); // 1000ms 周期，首拍之前就停
        let (tx, rx) = crossbeam_channel::unbounded();
        session.shutdown.request_stop();
        let mut clock = PacingClock::start(1.0, tx, session);
        clock.join();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events, vec![PlayerEvent::PacingStopped]);
    }
}
