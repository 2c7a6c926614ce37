use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

mod core;
mod player;
mod renderer;
mod app;

use app::VideoPlayerApp;
use player::manager::PlaybackManager;
use player::session::BufferConfig;

/// 音视频播放器
#[derive(Parser, Debug)]
#[command(name = "yoyo_player", version, about = "音视频播放器")]
struct Cli {
    /// 输入媒体文件路径
    input: PathBuf,
}

fn main() {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        // 启动失败：单条诊断信息 + 非零退出码
        error!("❌ {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    info!("🎬 YOYO Player 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;

    let path = cli.input.to_string_lossy().to_string();
    let manager = PlaybackManager::open(&path, &BufferConfig::default())?;

    let info = manager.media_info();
    let title = format!(
        "悠悠播放器 - {} ({}x{} @ {:.2}fps)",
        cli.input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone()),
        info.width,
        info.height,
        info.fps
    );

    // 启动 egui 应用
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([640.0, 360.0])
            .with_title(title),
        renderer: eframe::Renderer::Wgpu, // 使用 wgpu 后端获得最佳性能
        ..Default::default()
    };

    eframe::run_native(
        "悠悠播放器",
        options,
        Box::new(move |cc| Box::new(VideoPlayerApp::new(cc, manager))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    info!("🎬 YOYO Player 正常退出");
    Ok(())
}
