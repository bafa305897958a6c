//! Frame lifecycle and GPU resource management.
//!
//! This crate orchestrates the rendering process:
//! - Device context and swapchain lifetime
//! - Frame scheduling over a ring of in-flight slots
//! - The fixed render pass, descriptor layouts and pipeline
//! - Uploading the scene and recording its draws

pub mod context;
pub mod depth_buffer;
pub mod frame_scheduler;
pub mod frame_slot;
pub mod gpu_scene;
pub mod renderer;
pub mod scene_pipeline;
pub mod swapchain_manager;

pub use context::DeviceContext;
pub use frame_scheduler::{FrameBackend, FrameScheduler, FrameStatus, SlotProbe, SlotState};
pub use renderer::Renderer;
pub use swapchain_manager::{PresentTargets, RecreateOutcome, SwapchainManager};
