pub mod compute;
pub mod config;
pub mod cpu_ref;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod kernels;
pub mod params;
pub mod particle;
pub mod render;
pub mod state_store;
pub mod target;
