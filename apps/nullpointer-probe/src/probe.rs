//! Window event handling.

use ash::vk;
use nullpointer_gpu::{
    submit, wait_for_fence, FrameSyncManager, GpuContext, GpuContextBuilder, Swapchain,
    SwapchainConfig,
};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::options::ProbeOptions;

const FRAMES_IN_FLIGHT: usize = 2;
const SMOKE_TIMEOUT_NS: u64 = 1_000_000_000;

pub struct Probe {
    options: ProbeOptions,
    state: Option<ProbeState>,
    error: Option<anyhow::Error>,
}

impl Probe {
    pub fn new(options: ProbeOptions) -> Self {
        Self {
            options,
            state: None,
            error: None,
        }
    }

    /// The first fatal error, if any.
    pub fn into_result(mut self) -> anyhow::Result<()> {
        self.state = None;
        self.error.map_or(Ok(()), Err)
    }

    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ProbeState> {
        let window_attrs = Window::default_attributes()
            .with_title("Nullpointer Probe")
            .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
        let window = event_loop.create_window(window_attrs)?;

        let gpu = GpuContextBuilder::new()
            .app_name("Nullpointer Probe")
            .validation(self.options.validation)
            .build_for_window(&window)?;
        info!("GPU: {}", gpu.summary().summary());
        info!("Queue families: {:?}", gpu.queue_families());

        smoke_test(&gpu)?;

        let config = SwapchainConfig::default()
            .with_present_mode(self.options.present_mode)
            .with_fallback_extent(self.options.width, self.options.height);
        let swapchain = gpu.create_swapchain(&config)?;
        log_swapchain(&swapchain);

        Ok(ProbeState {
            swapchain: Some(swapchain),
            config,
            gpu,
            window,
        })
    }
}

/// Round-trip an empty submission through the graphics queue.
fn smoke_test(gpu: &GpuContext) -> anyhow::Result<()> {
    let device = gpu.device();
    let frames = FrameSyncManager::new(device, FRAMES_IN_FLIGHT)?;
    let frame = frames.current();

    let result = frame.reset(device).and_then(|()| {
        submit(
            device,
            gpu.graphics_queue(),
            &[],
            &[],
            &[],
            frame.in_flight,
        )?;
        wait_for_fence(device, frame.in_flight, SMOKE_TIMEOUT_NS)
    });

    frames.destroy(device);
    result?;
    info!("Graphics queue accepted an empty submission");
    Ok(())
}

fn log_swapchain(swapchain: &Swapchain) {
    let descriptor = swapchain.descriptor();
    info!(
        "Swapchain {}x{}: {} images, {:?} / {:?}, {:?}, usage {:?}, transform {:?}, alpha {:?}",
        descriptor.extent.width,
        descriptor.extent.height,
        swapchain.images().len(),
        descriptor.format,
        descriptor.color_space,
        descriptor.present_mode,
        descriptor.usage,
        descriptor.transform,
        descriptor.composite_alpha,
    );
}

struct ProbeState {
    swapchain: Option<Swapchain>,
    config: SwapchainConfig,
    // The context must be dropped before the window it presents to.
    gpu: GpuContext,
    window: Window,
}

impl ProbeState {
    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            // Minimized; keep the current swapchain until there is a surface to fill.
            return Ok(());
        }

        self.config.fallback_extent = vk::Extent2D { width, height };
        self.gpu.wait_idle()?;

        match &mut self.swapchain {
            Some(swapchain) => self.gpu.recreate_swapchain(swapchain, &self.config)?,
            None => self.swapchain = Some(self.gpu.create_swapchain(&self.config)?),
        }

        if let Some(swapchain) = &self.swapchain {
            log_swapchain(swapchain);
        }
        Ok(())
    }
}

impl Drop for ProbeState {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            warn!("Wait idle failed during shutdown: {e}");
        }
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(self.gpu.device());
        }
    }
}

impl ApplicationHandler for Probe {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
                info!("Probe ready, close the window to exit");
            }
            Err(e) => {
                error!("Failed to bring up Vulkan: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.state = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }
}
