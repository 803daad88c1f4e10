use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Weak;

use ash::vk;
use raw_window_handle::HasDisplayHandle;
use winit::window::Window;

use crate::renderer::camera::Camera;
use crate::renderer::context::{AppIdentity, DeviceDriverKey, RenderContext, RenderSurface};
use crate::renderer::device::DrawableAreaParams;
use crate::renderer::error::ContextError;
use crate::resources::{ResourceError, ResourceManager};

use super::camera_controller::CameraController;
use super::input_queue::InputEvent;
use super::settings::{Settings, SettingsError};

pub const SETTINGS_PATH: &str = "settings.conf";

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const LOG_FILE_NAME: &str = "firstlight.log";

const CAMERA_NEAR: f32 = 0.1;
const CAMERA_FAR: f32 = 100.0;
const CAMERA_FOV_Y_DEG: f32 = 90.0;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("settings initialization error: {0}")]
    Settings(#[from] SettingsError),

    #[error("logger initialization error: {0}")]
    Logger(String),

    #[error("window initialization error: {0}")]
    Window(String),

    #[error("drawing context initialization error: {0}")]
    DrawContext(ContextError),

    #[error("resource manager error: {0}")]
    ResourceManager(#[from] ResourceError),

    #[error("no available devices found")]
    NoAvailableDevices,

    #[error("surface handshake error: {0}")]
    SurfaceHandshake(ContextError),

    #[error("graphics device initialization error: {0}")]
    GraphicsDeviceInit(ContextError),

    #[error("graphics device environment creation error: {0}")]
    EnvironmentCreation(ContextError),

    #[error("runtime error: {0}")]
    Runtime(ContextError),
}

/// Sequences the initialization phases, owns every long-lived component and
/// drives the per-tick update/draw cycle.
pub struct Engine {
    settings: Settings,
    context: RenderContext,
    resource_manager: ResourceManager,
    camera: Camera,
    controller: CameraController,
    device_key: Option<DeviceDriverKey>,
    surface_observer: Weak<RenderSurface>,
    graphics_ready: bool,
}

impl Engine {
    /// The pre-window phases: settings, then logging. Graphics phases run
    /// later, once the event loop hands over a window.
    pub fn bootstrap() -> Result<Self, EngineError> {
        let (settings, issues) = match Settings::load(SETTINGS_PATH) {
            Ok(loaded) => loaded,
            Err(err) => {
                // First launch has no settings file yet; leave the defaults
                // behind the way a clean shutdown would, then report.
                let _ = Settings::default().store(SETTINGS_PATH);
                return Err(err.into());
            }
        };

        init_logging(&settings)?;
        for issue in &issues {
            log::warn!("settings: {issue}");
        }
        log::info!("settings loaded from {SETTINGS_PATH}");

        let resource_manager = ResourceManager::new(settings.shaders_path.clone());

        Ok(Self {
            settings,
            context: RenderContext::new(),
            resource_manager,
            camera: Camera::new(),
            controller: CameraController::new(),
            device_key: None,
            surface_observer: Weak::new(),
            graphics_ready: false,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The window-dependent phases, in fixed order. Each failure aborts the
    /// whole startup; a second call after success is a no-op.
    pub fn initialize_graphics(&mut self, window: &Window) -> Result<(), EngineError> {
        if self.graphics_ready {
            return Ok(());
        }

        self.init_draw_context(window)?;
        self.init_surface_handshake(window)?;
        self.log_available_devices()?;
        self.init_graphics_device()?;
        self.create_graphics_device_env()?;
        self.setup_camera();

        self.graphics_ready = true;
        log::info!("engine is initialized successfully");
        Ok(())
    }

    fn init_draw_context(&mut self, window: &Window) -> Result<(), EngineError> {
        let display_handle = window
            .display_handle()
            .map_err(|err| EngineError::DrawContext(ContextError::WindowHandle(err)))?;
        let window_extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|err| EngineError::DrawContext(ContextError::Vk(err)))?;

        let mut extensions = window_extensions
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect::<Vec<_>>();
        extensions.push(ash::ext::debug_utils::NAME);

        let layers = [VALIDATION_LAYER];
        let identity = AppIdentity {
            application_name: c"firstlight",
            application_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: c"firstlight",
            engine_version: vk::make_api_version(0, 1, 0, 0),
        };

        self.context
            .init(&layers, &extensions, &identity)
            .map_err(EngineError::DrawContext)?;

        log::info!("drawing context initialized");
        Ok(())
    }

    fn init_surface_handshake(&mut self, window: &Window) -> Result<(), EngineError> {
        self.surface_observer = self
            .context
            .window_handshake(window)
            .map_err(EngineError::SurfaceHandshake)?;

        log::info!("window surface handshake completed");
        Ok(())
    }

    fn log_available_devices(&self) -> Result<(), EngineError> {
        let devices = self.context.physical_devices();
        if devices.is_empty() {
            return Err(EngineError::NoAvailableDevices);
        }

        for &ph_dev in devices {
            let props = self
                .context
                .physical_device_properties(ph_dev)
                .map_err(EngineError::DrawContext)?;
            log::info!(
                "available device: {} | device id: {} | vendor id: {:#06x} | type: {:?}",
                props.device_name_as_c_str().unwrap_or(c"unknown").to_string_lossy(),
                props.device_id,
                props.vendor_id,
                props.device_type,
            );
        }

        Ok(())
    }

    fn select_physical_device(&self) -> Result<vk::PhysicalDevice, EngineError> {
        let devices = self.context.physical_devices();

        for &ph_dev in devices {
            let props = self
                .context
                .physical_device_properties(ph_dev)
                .map_err(EngineError::DrawContext)?;
            if matches!(
                props.device_type,
                vk::PhysicalDeviceType::INTEGRATED_GPU | vk::PhysicalDeviceType::DISCRETE_GPU
            ) {
                return Ok(ph_dev);
            }
        }

        match devices.first() {
            Some(&ph_dev) => {
                log::warn!(
                    "no integrated or discrete GPU in the current system; using the first reported device instead"
                );
                Ok(ph_dev)
            }
            None => Err(EngineError::NoAvailableDevices),
        }
    }

    fn init_graphics_device(&mut self) -> Result<(), EngineError> {
        let ph_dev = self.select_physical_device()?;

        let key = self
            .context
            .allocate_graphics_device(ph_dev)
            .map_err(EngineError::GraphicsDeviceInit)?;
        self.context
            .bind_surface(key)
            .map_err(EngineError::GraphicsDeviceInit)?;
        self.context
            .init_graphics_device(key, ph_dev)
            .map_err(EngineError::GraphicsDeviceInit)?;

        self.device_key = Some(key);
        log::info!("graphics device initialized");
        Ok(())
    }

    fn create_graphics_device_env(&mut self) -> Result<(), EngineError> {
        let key = self
            .device_key
            .ok_or(EngineError::GraphicsDeviceInit(ContextError::DeviceDriverNotExist))?;

        let required = {
            let device = self
                .context
                .graphics_device_mut(key)
                .map_err(EngineError::GraphicsDeviceInit)?;
            if device.is_env_created() {
                return Ok(());
            }
            device.required_shaders()
        };

        self.resource_manager.load_shaders(required)?;
        let shaders = self.resource_manager.shader_bytecode(required)?;

        let params = DrawableAreaParams {
            width: self.settings.window_width,
            height: self.settings.window_height,
            present_mode: vk::PresentModeKHR::IMMEDIATE,
        };

        let device = self
            .context
            .graphics_device_mut(key)
            .map_err(EngineError::GraphicsDeviceInit)?;
        device
            .create_work_env(&params, &shaders)
            .map_err(|err| EngineError::EnvironmentCreation(ContextError::Device(err)))?;

        log::info!("graphics device environment created");
        Ok(())
    }

    fn setup_camera(&mut self) {
        let aspect_ratio = self.settings.window_width as f32 / self.settings.window_height as f32;
        self.camera
            .set_perspective(CAMERA_NEAR, CAMERA_FAR, CAMERA_FOV_Y_DEG, aspect_ratio);
        self.camera.translate_forward(-2.0);
        self.controller.sync_orientation(&mut self.camera);
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        self.controller.handle_event(event, &mut self.camera);
    }

    pub fn quit_requested(&self) -> bool {
        self.controller.quit_requested()
    }

    /// One loop tick after events were drained: apply run states, compose
    /// the transform, draw.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        if !self.graphics_ready {
            return Ok(());
        }

        self.controller.apply_run_states(&mut self.camera);
        let transform = self.camera.view_projection();

        let key = self
            .device_key
            .ok_or(EngineError::Runtime(ContextError::DeviceDriverNotExist))?;
        let device = self
            .context
            .graphics_device_mut(key)
            .map_err(EngineError::Runtime)?;
        device
            .draw(&transform)
            .map_err(|err| EngineError::Runtime(ContextError::Device(err)))?;

        Ok(())
    }

    /// Settings go back to disk on the way out, whatever else happened.
    pub fn shutdown(&mut self) {
        if self.surface_observer.upgrade().is_some() {
            log::debug!("drawable surface still alive at shutdown; context teardown destroys it");
        }
        if let Err(err) = self.settings.store(SETTINGS_PATH) {
            log::error!("failed to store settings: {err}");
        }
        log::info!("engine terminated");
    }
}

/// Configures the global logger from the settings: a file sink under
/// `log_output_path` when one is set, tee'd to stderr while `clog_is_enabled`.
fn init_logging(settings: &Settings) -> Result<(), EngineError> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if settings.log_output_path.as_os_str().is_empty() {
        if !settings.clog_is_enabled {
            builder.filter_level(log::LevelFilter::Off);
        }
    } else {
        std::fs::create_dir_all(&settings.log_output_path).map_err(|err| {
            EngineError::Logger(format!(
                "cannot create log directory {}: {err}",
                settings.log_output_path.display()
            ))
        })?;
        let path = settings.log_output_path.join(LOG_FILE_NAME);
        let file = File::create(&path).map_err(|err| {
            EngineError::Logger(format!("cannot open log file {}: {err}", path.display()))
        })?;

        let sink: Box<dyn Write + Send + 'static> = if settings.clog_is_enabled {
            Box::new(TeeWriter { file })
        } else {
            Box::new(file)
        };
        builder.target(env_logger::Target::Pipe(sink));
    }

    builder
        .try_init()
        .map_err(|err| EngineError::Logger(err.to_string()))
}

/// Mirrors the file sink to stderr.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        let _ = io::stderr().write_all(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stderr().flush()
    }
}
