//! Entry point for the particle simulation.
//!
//! Two modes:
//! - windowed (default): a winit window whose redraws drive the frame loop,
//!   paced by the surface's FIFO presentation;
//! - headless (`--headless`): an offscreen target ticked a fixed number of
//!   times, optionally saving the final image (`--save-frame`).
//!
//! # Event Handling
//! - Q/Escape or closing the window: drain the GPU and exit
//! - Window resize: reconfigure the surface (the simulated domain keeps the
//!   aspect ratio captured at startup)

use anyhow::{Context, Result};
use clap::Parser;
use pingpong_particles::{
    config::SimulationConfig,
    cpu_ref,
    driver::{FixedTicks, FrameDriver, FrameStatus, IntervalTicker},
    error::{self, GpuFault},
    gpu::GpuContext,
    kernels::KernelSource,
    target::{OffscreenTarget, SurfaceTarget},
};
use std::{path::PathBuf, sync::Arc};
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowBuilder},
};

const DEFAULT_WINDOW_WIDTH: u32 = 1280;
const DEFAULT_WINDOW_HEIGHT: u32 = 720;
const DEFAULT_HEADLESS_FRAMES: u64 = 120;

#[derive(Parser, Debug)]
#[command(name = "particles")]
#[command(about = "GPU particle simulation with ping-pong state buffers")]
struct Args {
    /// TOML file with simulation settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the particle count
    #[arg(long)]
    particles: Option<u32>,

    /// Override the RNG seed used for the initial scatter
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many frames (headless default: 120)
    #[arg(long)]
    frames: Option<u64>,

    /// Render offscreen instead of opening a window
    #[arg(long)]
    headless: bool,

    /// Pace headless ticks at this rate instead of running flat out
    #[arg(long)]
    fps: Option<u32>,

    /// Save the last headless frame as PNG
    #[arg(long)]
    save_frame: Option<PathBuf>,

    /// Replacement compute kernel (WGSL)
    #[arg(long)]
    compute_shader: Option<PathBuf>,

    /// Replacement render kernel (WGSL)
    #[arg(long)]
    render_shader: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_WINDOW_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_WINDOW_HEIGHT)]
    height: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let kernels = kernel_source(&args);

    if args.headless {
        run_headless(&args, config, &kernels)
    } else {
        run_windowed(&args, config, &kernels)
    }
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(particles) = args.particles {
        config.particle_count = particles;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    config.validate().context("invalid simulation config")?;
    Ok(config)
}

fn kernel_source(args: &Args) -> KernelSource {
    if args.compute_shader.is_none() && args.render_shader.is_none() {
        return KernelSource::Builtin;
    }
    KernelSource::Files {
        compute: args.compute_shader.clone(),
        render: args.render_shader.clone(),
    }
}

fn run_headless(args: &Args, config: SimulationConfig, kernels: &KernelSource) -> Result<()> {
    let gpu = pollster::block_on(GpuContext::new())?;
    let mut target = OffscreenTarget::new(&gpu, args.width, args.height)?;
    let mut driver = FrameDriver::new(gpu, config, kernels, &target)?;

    let frames = args.frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
    let presented = match args.fps {
        Some(fps) => driver.run(&mut IntervalTicker::new(fps, Some(frames)), &mut target)?,
        None => driver.run(&mut FixedTicks::new(frames), &mut target)?,
    };

    report_snapshot(&driver, presented)?;

    if let Some(path) = &args.save_frame {
        target.save_png(driver.gpu(), path)?;
    }
    Ok(())
}

fn report_snapshot(driver: &FrameDriver, presented: u64) -> Result<()> {
    let records = driver.snapshot()?;
    let centroid = cpu_ref::centroid(&records);
    log::info!(
        "{} frames presented; centroid ({:.4}, {:.4}), kinetic energy {:.6}",
        presented,
        centroid.x,
        centroid.y,
        cpu_ref::kinetic_energy(&records)
    );
    Ok(())
}

/// Live simulation bound to a window. Absent when the GPU lacked a capability
/// or memory at startup, in which case the window stays open but draws nothing.
struct WindowedApp {
    driver: FrameDriver,
    target: SurfaceTarget,
    frame_limit: Option<u64>,
}

fn run_windowed(args: &Args, config: SimulationConfig, kernels: &KernelSource) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(create_window(&event_loop, args.width, args.height)?);

    let started = start_gpu(&window).and_then(|(gpu, target)| {
        let driver = FrameDriver::new(gpu, config, kernels, &target)?;
        Ok(WindowedApp {
            driver,
            target,
            frame_limit: args.frames,
        })
    });
    let mut app = match started {
        Ok(app) => Some(app),
        Err(err) if error::is_inert_fault(&err) => {
            log::error!("GPU setup failed, nothing will be rendered: {:#}", err);
            None
        }
        Err(err) => return Err(err),
    };

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        match event {
            Event::AboutToWait => {
                if app.is_some() {
                    window.request_redraw();
                }
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => shutdown(&app, elwt),
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(KeyCode::KeyQ | KeyCode::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => shutdown(&app, elwt),
                WindowEvent::Resized(size) => {
                    if let Some(app) = app.as_mut() {
                        app.target.resize(app.driver.gpu(), size.width, size.height);
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Some(live) = app.as_mut() {
                        handle_redraw(live, elwt);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    })?;

    Ok(())
}

fn create_window(event_loop: &EventLoop<()>, width: u32, height: u32) -> Result<Window> {
    let window = WindowBuilder::new()
        .with_title("Ping-Pong Particles")
        .with_inner_size(winit::dpi::PhysicalSize::new(width, height))
        .build(event_loop)?;
    Ok(window)
}

fn start_gpu(window: &Arc<Window>) -> Result<(GpuContext, SurfaceTarget)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .map_err(|e| GpuFault::Unavailable(e.to_string()))?;
    let gpu = pollster::block_on(GpuContext::with_instance(instance, Some(&surface)))?;

    let size = window.inner_size();
    let target = SurfaceTarget::new(&gpu, surface, size.width, size.height)?;
    Ok((gpu, target))
}

fn handle_redraw(app: &mut WindowedApp, elwt: &EventLoopWindowTarget<()>) {
    match app.driver.tick(&mut app.target) {
        Ok(FrameStatus::Presented(_)) => {
            if app.frame_limit.is_some_and(|limit| app.driver.frame() >= limit) {
                log::info!("Reached frame limit {}", app.driver.frame());
                app.driver.finish();
                elwt.exit();
            }
        }
        Ok(FrameStatus::Skipped) => {}
        Err(err) => {
            log::error!("Fatal frame error: {:#}", err);
            app.driver.finish();
            elwt.exit();
        }
    }
}

fn shutdown(app: &Option<WindowedApp>, elwt: &EventLoopWindowTarget<()>) {
    if let Some(app) = app {
        app.driver.finish();
    }
    elwt.exit();
}
