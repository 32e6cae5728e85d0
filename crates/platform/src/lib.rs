//! Platform layer: the winit window and the Vulkan surface bound to it.

mod window;

pub use window::{FramebufferSize, Surface, Window};

// Re-export winit types the application loop needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
