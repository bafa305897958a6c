//! Platform layer for the Vulkan renderer.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation via ash-window
//! - The [`PlatformEvent`] stream the frame loop consumes

mod events;
mod window;

pub use events::{EventQueue, EventSource, PlatformEvent};
pub use window::{Surface, Window};

// Re-export winit types the application needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
