pub mod camera;
pub mod context;
pub mod device;
pub mod error;

pub use camera::Camera;
pub use context::{AppIdentity, DeviceDriverKey, RenderContext, RenderSurface};
pub use device::{DrawableAreaParams, GraphicsDevice, LoadedShader};
pub use error::{ContextError, DeviceError};
