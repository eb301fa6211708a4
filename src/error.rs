//! Fatal failure classes.
//!
//! None of these are recoverable: the particle state has no rollback, so a
//! failure at startup or during a submission ends the run. A windowed run
//! outlives the first two classes at startup by keeping an inert window.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuFault {
    /// No adapter, device or surface format could be obtained.
    Unavailable(String),
    /// A buffer or texture could not be created.
    Allocation(String),
    /// A kernel's bindings or vertex layout do not match the buffers fed to it.
    Layout(String),
    /// A frame's command submission was rejected by the device.
    Submission(String),
}

impl GpuFault {
    pub fn kind(&self) -> &'static str {
        match self {
            GpuFault::Unavailable(_) => "unavailable capability",
            GpuFault::Allocation(_) => "allocation failure",
            GpuFault::Layout(_) => "binding/layout mismatch",
            GpuFault::Submission(_) => "submission failure",
        }
    }

    /// Missing capability or memory: the window may stay up without a driver.
    /// Layout and submission faults point at a broken build and end the run.
    pub fn leaves_surface_inert(&self) -> bool {
        matches!(self, GpuFault::Unavailable(_) | GpuFault::Allocation(_))
    }

    fn detail(&self) -> &str {
        match self {
            GpuFault::Unavailable(detail)
            | GpuFault::Allocation(detail)
            | GpuFault::Layout(detail)
            | GpuFault::Submission(detail) => detail,
        }
    }
}

impl fmt::Display for GpuFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.detail())
    }
}

impl std::error::Error for GpuFault {}

/// Whether `err` carries a [`GpuFault`] that [`GpuFault::leaves_surface_inert`].
pub fn is_inert_fault(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GpuFault>()
        .is_some_and(GpuFault::leaves_surface_inert)
}

/// Runs `create` inside a device error scope and turns a captured error into
/// the given fault class.
pub fn scoped<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    what: &str,
    create: impl FnOnce() -> T,
) -> anyhow::Result<T> {
    let out_of_memory = matches!(filter, wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(filter);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(err) => {
            let detail = format!("{}: {}", what, err);
            let fault = if out_of_memory {
                GpuFault::Allocation(detail)
            } else {
                GpuFault::Layout(detail)
            };
            Err(fault.into())
        }
    }
}
