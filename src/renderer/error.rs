use ash::vk;

/// Failures of the instance-level context.
///
/// Logical precondition violations get their own variant; anything the
/// driver itself reports is passed through as [`ContextError::Vk`] without
/// reinterpretation.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("vulkan library could not be loaded: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("these extensions and layers are not supported: {0}")]
    ExtensionOrLayerNotSupported(String),

    #[error("instance is not created yet")]
    InstanceNotCreated,

    #[error("physical device does not belong to this context")]
    PhysicalDeviceNotExist,

    #[error("surface is not created yet")]
    SurfaceNotCreated,

    #[error("surface already exists for this context")]
    SurfaceAlreadyCreated,

    #[error("device driver does not exist")]
    DeviceDriverNotExist,

    #[error("window handle is unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("vulkan error: {0}")]
    Vk(#[from] vk::Result),
}

/// Failures of the graphics device state machine.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("logical device is not created yet")]
    DeviceNotCreated,

    #[error("drawing surface is not connected yet")]
    SurfaceNotConnected,

    #[error("drawing surface is already connected")]
    SurfaceAlreadyConnected,

    #[error("passed surface no longer exists")]
    SurfaceExpired,

    #[error("present mode {0:?} is not supported by the surface")]
    PresentModeNotSupported(vk::PresentModeKHR),

    #[error("surface does not support any desired formats")]
    SurfaceNoSupportedFormats,

    #[error("these shaders have been missed: {0}")]
    NoDesiredShaders(String),

    #[error("device does not support any graphics queues")]
    NoGraphicsQueue,

    #[error("device does not support any presentation queues")]
    NoPresentationQueue,

    #[error("these device extensions are not supported: {0}")]
    ExtensionNotSupported(String),

    #[error("work environment is not created yet")]
    EnvironmentNotCreated,

    #[error("vulkan error: {0}")]
    Vk(#[from] vk::Result),
}
