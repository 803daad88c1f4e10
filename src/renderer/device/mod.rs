mod frame;
mod pipeline;
mod swapchain;

use std::collections::BTreeMap;
use std::sync::Weak;

use ash::vk;
use glam::Mat4;

use super::context::RenderSurface;
use super::error::DeviceError;

use frame::FrameSync;
use swapchain::SwapchainBundle;

const VERTEX_SHADER: &str = "triangle.vert.spv";
const FRAGMENT_SHADER: &str = "triangle.frag.spv";

/// Shader names the device expects the caller to resolve to bytecode.
pub const REQUIRED_SHADERS: &[&str] = &[VERTEX_SHADER, FRAGMENT_SHADER];

/// Parameters for the presentable drawing area.
#[derive(Debug, Clone, Copy)]
pub struct DrawableAreaParams {
    pub width: u32,
    pub height: u32,
    pub present_mode: vk::PresentModeKHR,
}

/// One named piece of SPIR-V supplied by the resource manager.
#[derive(Debug, Clone, Copy)]
pub struct LoadedShader<'a> {
    pub name: &'a str,
    pub code: &'a [u32],
}

/// The device-side state machine. States advance strictly forward:
/// surface connect, logical device, then the whole work environment
/// (swapchain, renderpass, framebuffers, shaders, pipeline, frame sync)
/// exactly once. There is no partial teardown; drop releases everything in
/// reverse creation order.
pub struct GraphicsDevice {
    device: Option<ash::Device>,
    physical: vk::PhysicalDevice,
    surface: Weak<RenderSurface>,

    graphics_queue: Option<(u32, vk::Queue)>,
    presentation_queue: Option<(u32, vk::Queue)>,

    swapchain_loader: Option<ash::khr::swapchain::Device>,
    swapchain: Option<SwapchainBundle>,
    render_pass: vk::RenderPass,

    shaders: BTreeMap<&'static str, vk::ShaderModule>,

    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,

    command_pool: vk::CommandPool,
    frames: Vec<FrameSync>,
    target_frame: usize,

    env_created: bool,
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("device", &self.device.is_some())
            .field("physical", &self.physical)
            .field("surface", &self.surface)
            .field("graphics_queue", &self.graphics_queue)
            .field("presentation_queue", &self.presentation_queue)
            .field("swapchain_loader", &self.swapchain_loader.is_some())
            .field("swapchain", &self.swapchain)
            .field("render_pass", &self.render_pass)
            .field("shaders", &self.shaders)
            .field("pipeline_layout", &self.pipeline_layout)
            .field("pipeline", &self.pipeline)
            .field("command_pool", &self.command_pool)
            .field("frames", &self.frames)
            .field("target_frame", &self.target_frame)
            .field("env_created", &self.env_created)
            .finish()
    }
}

impl GraphicsDevice {
    /// Ring depth for frames in flight. The ring logic works for any depth;
    /// at one, CPU and GPU work are serialized each frame.
    pub const FRAMES_IN_FLIGHT: usize = 1;

    pub fn new() -> Self {
        Self {
            device: None,
            physical: vk::PhysicalDevice::null(),
            surface: Weak::new(),
            graphics_queue: None,
            presentation_queue: None,
            swapchain_loader: None,
            swapchain: None,
            render_pass: vk::RenderPass::null(),
            shaders: BTreeMap::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            command_pool: vk::CommandPool::null(),
            frames: Vec::new(),
            target_frame: 0,
            env_created: false,
        }
    }

    pub fn connect_surface(&mut self, surface: Weak<RenderSurface>) -> Result<(), DeviceError> {
        if self.surface.strong_count() > 0 {
            return Err(DeviceError::SurfaceAlreadyConnected);
        }
        if surface.strong_count() == 0 {
            return Err(DeviceError::SurfaceExpired);
        }

        self.surface = surface;
        Ok(())
    }

    pub fn is_surface_connected(&self) -> bool {
        self.surface.strong_count() > 0
    }

    /// Creates the logical device and fetches the queue pair. Queue family
    /// selection happens before anything is created, so a device without a
    /// usable family fails clean.
    pub fn init(
        &mut self,
        instance: &ash::Instance,
        ph_dev: vk::PhysicalDevice,
    ) -> Result<(), DeviceError> {
        let surface = self
            .surface
            .upgrade()
            .ok_or(DeviceError::SurfaceNotConnected)?;

        let families = unsafe { instance.get_physical_device_queue_family_properties(ph_dev) };
        let selection = select_queue_families(&families, |index| unsafe {
            surface
                .loader()
                .get_physical_device_surface_support(ph_dev, index, surface.handle())
        })?;

        let required_extensions = [ash::khr::swapchain::NAME];
        let available_extensions =
            unsafe { instance.enumerate_device_extension_properties(ph_dev)? };
        let missing = required_extensions
            .iter()
            .filter(|required| {
                !available_extensions.iter().any(|props| {
                    props
                        .extension_name_as_c_str()
                        .is_ok_and(|name| name == *required)
                })
            })
            .map(|required| required.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DeviceError::ExtensionNotSupported(missing.join(" ")));
        }

        let queue_priorities = [1.0f32];
        let mut queue_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(selection.graphics)
                .queue_priorities(&queue_priorities),
        ];
        if !selection.is_unified() {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(selection.presentation)
                    .queue_priorities(&queue_priorities),
            );
        }

        let extension_ptrs = required_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&enabled_features);

        let device = unsafe { instance.create_device(ph_dev, &device_info, None)? };

        let graphics_queue = unsafe { device.get_device_queue(selection.graphics, 0) };
        let presentation_queue = unsafe { device.get_device_queue(selection.presentation, 0) };

        self.swapchain_loader = Some(ash::khr::swapchain::Device::new(instance, &device));
        self.graphics_queue = Some((selection.graphics, graphics_queue));
        self.presentation_queue = Some((selection.presentation, presentation_queue));
        self.physical = ph_dev;
        self.device = Some(device);

        Ok(())
    }

    pub fn is_inited(&self) -> bool {
        self.device.is_some()
    }

    pub fn required_shaders(&self) -> &'static [&'static str] {
        REQUIRED_SHADERS
    }

    /// Builds the whole work environment in its fixed order. Calling this on
    /// a device that already has one is a no-op success; the flag is never
    /// reset once set.
    pub fn create_work_env(
        &mut self,
        params: &DrawableAreaParams,
        shaders: &[LoadedShader],
    ) -> Result<(), DeviceError> {
        if self.env_created {
            return Ok(());
        }

        self.create_swapchain(params)?;
        self.create_renderpass()?;
        self.create_framebuffers()?;
        self.load_shaders(shaders)?;
        self.create_pipeline()?;
        self.create_frame_sync()?;

        self.env_created = true;
        Ok(())
    }

    pub fn is_env_created(&self) -> bool {
        self.env_created
    }

    /// One full acquire/record/submit/present cycle for the given transform.
    pub fn draw(&mut self, transform: &Mat4) -> Result<(), DeviceError> {
        if !self.env_created {
            return Err(DeviceError::EnvironmentNotCreated);
        }

        self.explicit_blind_draw(transform)
    }
}

impl Default for GraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };

        unsafe {
            if let Err(err) = device.device_wait_idle() {
                log::error!("device wait idle failed during teardown: {err}");
            }

            for frame in self.frames.drain(..) {
                device.destroy_fence(frame.submit_fence, None);
                device.destroy_semaphore(frame.present_semaphore, None);
                device.destroy_semaphore(frame.acquire_semaphore, None);
                device.free_command_buffers(self.command_pool, &[frame.command_buffer]);
            }
            if self.command_pool != vk::CommandPool::null() {
                device.destroy_command_pool(self.command_pool, None);
            }

            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            for (_, module) in std::mem::take(&mut self.shaders) {
                device.destroy_shader_module(module, None);
            }

            if let Some(swapchain) = self.swapchain.take() {
                for framebuffer in &swapchain.framebuffers {
                    device.destroy_framebuffer(*framebuffer, None);
                }
                if self.render_pass != vk::RenderPass::null() {
                    device.destroy_render_pass(self.render_pass, None);
                }
                for view in &swapchain.image_views {
                    device.destroy_image_view(*view, None);
                }
                if let Some(loader) = self.swapchain_loader.take() {
                    loader.destroy_swapchain(swapchain.handle, None);
                }
            } else if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
            }

            device.destroy_device(None);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueSelection {
    pub graphics: u32,
    pub presentation: u32,
}

impl QueueSelection {
    pub fn is_unified(&self) -> bool {
        self.graphics == self.presentation
    }
}

/// Scans queue families for one supporting both graphics and presentation;
/// falls back to an independent pair when no single family can do both.
pub(crate) fn select_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> Result<QueueSelection, DeviceError>
where
    F: FnMut(u32) -> Result<bool, vk::Result>,
{
    for (index, props) in families.iter().enumerate() {
        if props.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_present(index as u32)? {
            return Ok(QueueSelection {
                graphics: index as u32,
                presentation: index as u32,
            });
        }
    }

    let graphics = families
        .iter()
        .position(|props| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .ok_or(DeviceError::NoGraphicsQueue)? as u32;

    let mut presentation = None;
    for index in 0..families.len() as u32 {
        if supports_present(index)? {
            presentation = Some(index);
            break;
        }
    }
    let presentation = presentation.ok_or(DeviceError::NoPresentationQueue)?;

    Ok(QueueSelection {
        graphics,
        presentation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties::default()
            .queue_flags(flags)
            .queue_count(1)
    }

    #[test]
    fn unified_family_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let selection = select_queue_families(&families, |_| Ok(true)).unwrap();
        assert_eq!(
            selection,
            QueueSelection {
                graphics: 1,
                presentation: 1
            }
        );
        assert!(selection.is_unified());
    }

    #[test]
    fn split_families_when_no_single_one_can_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        // Only the transfer family can present.
        let selection = select_queue_families(&families, |index| Ok(index == 1)).unwrap();
        assert_eq!(
            selection,
            QueueSelection {
                graphics: 0,
                presentation: 1
            }
        );
        assert!(!selection.is_unified());
    }

    #[test]
    fn missing_graphics_family_fails_before_anything_else() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let err = select_queue_families(&families, |_| Ok(true)).unwrap_err();
        assert!(matches!(err, DeviceError::NoGraphicsQueue));
    }

    #[test]
    fn missing_presentation_family_fails() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = select_queue_families(&families, |_| Ok(false)).unwrap_err();
        assert!(matches!(err, DeviceError::NoPresentationQueue));
    }

    #[test]
    fn surface_query_errors_pass_through() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = select_queue_families(&families, |_| Err(vk::Result::ERROR_SURFACE_LOST_KHR))
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Vk(vk::Result::ERROR_SURFACE_LOST_KHR)
        ));
    }

    #[test]
    fn draw_requires_an_environment() {
        let mut device = GraphicsDevice::new();
        let err = device.draw(&Mat4::IDENTITY).unwrap_err();
        assert!(matches!(err, DeviceError::EnvironmentNotCreated));
    }

    #[test]
    fn fresh_device_reports_nothing_connected() {
        let device = GraphicsDevice::new();
        assert!(!device.is_surface_connected());
        assert!(!device.is_inited());
        assert!(!device.is_env_created());
    }

    #[test]
    fn work_env_requires_a_connected_surface_first() {
        let mut device = GraphicsDevice::new();
        let params = DrawableAreaParams {
            width: 800,
            height: 600,
            present_mode: vk::PresentModeKHR::FIFO,
        };

        let err = device.create_work_env(&params, &[]).unwrap_err();
        assert!(matches!(err, DeviceError::SurfaceNotConnected));
        assert!(!device.is_env_created());
    }

    #[test]
    fn environment_creation_is_a_noop_once_created() {
        let mut device = GraphicsDevice::new();
        device.env_created = true;

        // Nothing is recreated and nothing fails; the flag is never reset.
        let params = DrawableAreaParams {
            width: 800,
            height: 600,
            present_mode: vk::PresentModeKHR::FIFO,
        };
        assert!(device.create_work_env(&params, &[]).is_ok());
        assert!(device.is_env_created());
    }

    #[test]
    fn expired_surface_is_rejected() {
        let mut device = GraphicsDevice::new();
        let err = device.connect_surface(Weak::new()).unwrap_err();
        assert!(matches!(err, DeviceError::SurfaceExpired));
        assert!(!device.is_surface_connected());
    }
}
