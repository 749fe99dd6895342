//! Video sink: a pixels surface inside a winit window.
//!
//! Owns the window and graphics context and therefore lives on the main
//! thread; frames arrive as user events from the event consumer.

use crate::nes::config::Config;
use anyhow::Context;
use nestrel_core::ppu::Ppu;
use pixels::{Pixels, SurfaceTexture};
use std::sync::Arc;
use tracing::debug;
use winit::{dpi::LogicalSize, event_loop::ActiveEventLoop, window::Window};

#[must_use]
pub struct Renderer {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    scale: u32,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("scale", &self.scale)
            .field("window", &self.window.is_some())
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub const fn new(scale: u32) -> Self {
        Self {
            window: None,
            pixels: None,
            scale,
        }
    }

    /// Create the window and surface. Called from the winit `resumed`
    /// callback on the main thread.
    ///
    /// # Errors
    ///
    /// If the window or surface fails to initialize, then an error is
    /// returned.
    pub fn resume(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let size = LogicalSize::new(Ppu::WIDTH * self.scale, Ppu::HEIGHT * self.scale);
        let attributes = Window::default_attributes()
            .with_title(Config::WINDOW_TITLE)
            .with_inner_size(size)
            .with_min_inner_size(LogicalSize::new(Ppu::WIDTH, Ppu::HEIGHT))
            .with_resizable(false);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let inner_size = window.inner_size();
        let surface =
            SurfaceTexture::new(inner_size.width, inner_size.height, Arc::clone(&window));
        let pixels =
            Pixels::new(Ppu::WIDTH, Ppu::HEIGHT, surface).context("failed to create surface")?;

        debug!("window created: {}x{} at {}x scale", Ppu::WIDTH, Ppu::HEIGHT, self.scale);
        self.window = Some(window);
        self.pixels = Some(pixels);
        Ok(())
    }

    /// Latch a completed RGBA frame and request a redraw.
    pub fn on_frame(&mut self, frame: &[u8]) {
        if let Some(pixels) = &mut self.pixels {
            let buffer = pixels.frame_mut();
            let len = buffer.len().min(frame.len());
            buffer[..len].copy_from_slice(&frame[..len]);
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    /// Present the latched frame.
    ///
    /// # Errors
    ///
    /// If presenting the surface fails, then an error is returned.
    pub fn render(&mut self) -> anyhow::Result<()> {
        if let Some(pixels) = &self.pixels {
            pixels.render().context("failed to render frame")?;
        }
        Ok(())
    }
}
