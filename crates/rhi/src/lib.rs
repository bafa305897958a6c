//! Thin RAII layer over `ash` (the render hardware interface).
//!
//! Every wrapper holds an `Arc<Device>` and destroys its handle on drop.
//! Covers:
//! - Instance creation and physical device selection
//! - Logical device, queues and the GPU memory allocator
//! - Swapchain creation, acquisition and presentation
//! - Command recording and synchronization primitives
//! - Buffers, images, samplers and staging uploads
//! - Render pass, framebuffers, descriptors and pipelines

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
