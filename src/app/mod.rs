use egui::{Color32, Context, TextureHandle, TextureOptions};
use log::info;

use crate::player::event_loop::PlayerEvent;
use crate::player::manager::PlaybackManager;
use crate::renderer::{EguiVideoRenderer, SharedVideoImage};

/// 播放器窗口
///
/// 窗口只是呈现面：渲染事件循环线程通过 SharedVideoImage 发布
/// 最新画面，这里在 UI 线程上传纹理并按宽高比居中绘制。
/// 关窗或按 Esc 时向事件流推送退出请求，由停机协调器收尾。
pub struct VideoPlayerApp {
    manager: PlaybackManager,
    shared: SharedVideoImage,
    texture: Option<TextureHandle>,
    uploaded_generation: u64,
    quit_tx: crossbeam_channel::Sender<PlayerEvent>,
    quit_sent: bool,
}

impl VideoPlayerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, mut manager: PlaybackManager) -> Self {
        let shared = SharedVideoImage::new();
        let renderer = EguiVideoRenderer::new(cc.egui_ctx.clone(), shared.clone());
        let quit_tx = manager.event_sender();

        manager.start(Box::new(renderer));

        Self {
            manager,
            shared,
            texture: None,
            uploaded_generation: 0,
            quit_tx,
            quit_sent: false,
        }
    }

    fn send_quit(&mut self) {
        if !self.quit_sent {
            info!("用户请求退出");
            let _ = self.quit_tx.send(PlayerEvent::Quit);
            self.quit_sent = true;
        }
    }

    /// 把渲染线程发布的最新画面上传为纹理
    fn sync_video_texture(&mut self, ctx: &Context) {
        if let Some((image, generation)) = self.shared.take_if_newer(self.uploaded_generation) {
            match self.texture.as_mut() {
                Some(handle) => handle.set(image, TextureOptions::LINEAR),
                None => {
                    self.texture = Some(ctx.load_texture("video_frame", image, TextureOptions::LINEAR))
                }
            }
            self.uploaded_generation = generation;
        }
    }
}

impl eframe::App for VideoPlayerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        // Esc 退出
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.send_quit();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        self.sync_video_texture(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                match &self.texture {
                    Some(texture) => {
                        // 保持宽高比，居中显示
                        let size = texture.size_vec2();
                        let video_aspect = size.x / size.y;
                        let rect_aspect = rect.width() / rect.height();

                        let display_size = if video_aspect > rect_aspect {
                            egui::Vec2::new(rect.width(), rect.width() / video_aspect)
                        } else {
                            egui::Vec2::new(rect.height() * video_aspect, rect.height())
                        };

                        let display_rect = egui::Rect::from_center_size(rect.center(), display_size);
                        ui.allocate_ui_at_rect(display_rect, |ui| {
                            ui.add(
                                egui::Image::from_texture(texture).fit_to_exact_size(display_size),
                            );
                        });
                    }
                    None => {
                        ui.centered_and_justified(|ui| {
                            ui.colored_label(Color32::GRAY, "正在解码...");
                        });
                    }
                }
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.send_quit();
        self.manager.stop();
    }
}
