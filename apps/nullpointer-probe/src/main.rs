//! Nullpointer probe
//!
//! Opens a window, brings up Vulkan for it and logs the device, queues and
//! swapchain that were negotiated. The swapchain is rebuilt on every resize.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p nullpointer-probe -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod options;
mod probe;

use nullpointer_gpu::GpuContextBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;
use winit::event_loop::{ControlFlow, EventLoop};

use crate::options::ProbeOptions;
use crate::probe::Probe;

fn main() -> anyhow::Result<()> {
    let options = ProbeOptions::parse(std::env::args().skip(1))?;
    if options.help {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if options.headless {
        return run_headless(&options);
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut probe = Probe::new(options);
    event_loop.run_app(&mut probe)?;
    probe.into_result()
}

fn run_headless(options: &ProbeOptions) -> anyhow::Result<()> {
    let gpu = GpuContextBuilder::new()
        .app_name("Nullpointer Probe")
        .validation(options.validation)
        .build()?;

    info!("GPU: {}", gpu.summary().summary());
    info!("Queue families: {:?}", gpu.queue_families());
    info!("Enabled device extensions: {:?}", gpu.device().extensions());
    Ok(())
}

fn print_help() {
    eprintln!(
        "Nullpointer probe

USAGE:
    cargo run -p nullpointer-probe -- [OPTIONS]

OPTIONS:
    --headless              Bring up a device without a window and exit
    --no-validation         Do not request validation layers
    --fifo                  Ask for FIFO presentation instead of mailbox
    --size <W>x<H>          Initial window size (default: 640x480)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
