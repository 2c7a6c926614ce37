use crate::player::session::PlaybackSession;
use crate::renderer::Renderer;
use crossbeam_channel::Receiver;
use log::{error, info};

/// 播放器事件
///
/// 节拍线程、退出请求和停机终止信号汇入同一条串行事件流，
/// 由渲染循环单线程消费。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// 呈现节拍（不携带帧数据）
    RefreshTick,
    /// 外部退出请求
    Quit,
    /// 节拍线程已停止（停机终止信号，只发一次）
    PacingStopped,
}

/// 渲染事件循环
///
/// 节拍到达时非阻塞地取一帧送去呈现；帧环为空则本次节拍空转，
/// 上一帧继续显示（不丢帧也不补帧）。收到 Quit 只置停机标志，
/// 真正的退出由节拍线程的终止事件驱动，保证循环恰好观察到一次停机。
pub fn run(events: &Receiver<PlayerEvent>, session: &PlaybackSession, renderer: &mut dyn Renderer) {
    info!("🖥 渲染事件循环启动");
    let mut presented: u64 = 0;
    loop {
        match events.recv() {
            Ok(PlayerEvent::RefreshTick) => {
                // 不在帧环上阻塞，节拍必须保持准时
                if let Some(frame) = session.video_frames.try_pop() {
                    match renderer.present(frame) {
                        Ok(()) => presented += 1,
                        Err(e) => error!("呈现视频帧失败: {}", e),
                    }
                }
            }
            Ok(PlayerEvent::Quit) => {
                session.shutdown.request_stop();
            }
            Ok(PlayerEvent::PacingStopped) => break,
            // 所有发送端已断开，等价于停机
            Err(_) => break,
        }
    }
    info!("🖥 渲染事件循环退出（共呈现 {} 帧）", presented);
}
