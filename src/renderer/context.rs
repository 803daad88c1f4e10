use std::ffi::CStr;
use std::sync::{Arc, Weak};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use slotmap::SlotMap;
use winit::window::Window;

use super::device::GraphicsDevice;
use super::error::ContextError;

/// Identity reported to the driver when the instance is created.
pub struct AppIdentity {
    pub application_name: &'static CStr,
    pub application_version: u32,
    pub engine_name: &'static CStr,
    pub engine_version: u32,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            application_name: c"application_placeholder_name",
            application_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: c"engine_placeholder_name",
            engine_version: vk::make_api_version(0, 1, 0, 0),
        }
    }
}

/// The drawable surface, shared between the window collaborator and the
/// graphics devices. The context's `Arc` is the only strong reference;
/// everyone else observes through a `Weak`, so the surface is destroyed
/// exactly once, at context teardown.
pub struct RenderSurface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl RenderSurface {
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

slotmap::new_key_type! {
    /// Observer handle to a device driver owned by the context. Keys are
    /// versioned, so a key kept past `drop_device_driver` reports dead
    /// instead of aliasing a reused slot.
    pub struct DeviceDriverKey;
}

/// Closed set of device-driver kinds, dispatched by pattern match.
pub enum DeviceDriver {
    Graphics(GraphicsDevice),
}

/// Owns the instance, the enumerated physical devices, the shared drawable
/// surface and every allocated device driver.
pub struct RenderContext {
    entry: Option<ash::Entry>,
    instance: Option<ash::Instance>,
    physical_devices: Vec<vk::PhysicalDevice>,
    surface: Option<Arc<RenderSurface>>,
    device_drivers: SlotMap<DeviceDriverKey, DeviceDriver>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            entry: None,
            instance: None,
            physical_devices: Vec::new(),
            surface: None,
            device_drivers: SlotMap::with_key(),
        }
    }

    /// Loads the Vulkan library, verifies every requested layer and
    /// extension against the platform's sets, creates the instance and
    /// caches the physical-device list.
    pub fn init(
        &mut self,
        layers: &[&CStr],
        extensions: &[&CStr],
        identity: &AppIdentity,
    ) -> Result<(), ContextError> {
        let entry = unsafe { ash::Entry::load()? };

        let api_version = unsafe { entry.try_enumerate_instance_version()? }
            .unwrap_or(vk::API_VERSION_1_0);

        let available_extensions =
            unsafe { entry.enumerate_instance_extension_properties(None)? };
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let available_extension_names = available_extensions
            .iter()
            .filter_map(|props| props.extension_name_as_c_str().ok())
            .collect::<Vec<_>>();
        let available_layer_names = available_layers
            .iter()
            .filter_map(|props| props.layer_name_as_c_str().ok())
            .collect::<Vec<_>>();

        let mut missing = missing_names(extensions, &available_extension_names);
        missing.extend(missing_names(layers, &available_layer_names));
        if !missing.is_empty() {
            return Err(ContextError::ExtensionOrLayerNotSupported(
                missing.join(" "),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(identity.application_name)
            .application_version(identity.application_version)
            .engine_name(identity.engine_name)
            .engine_version(identity.engine_version)
            .api_version(api_version);

        let layer_ptrs = layers.iter().map(|layer| layer.as_ptr()).collect::<Vec<_>>();
        let extension_ptrs = extensions.iter().map(|ext| ext.as_ptr()).collect::<Vec<_>>();
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let physical_devices = match unsafe { instance.enumerate_physical_devices() } {
            Ok(devices) => devices,
            Err(err) => {
                // Don't leave a half-born context behind.
                unsafe { instance.destroy_instance(None) };
                return Err(err.into());
            }
        };

        self.entry = Some(entry);
        self.instance = Some(instance);
        self.physical_devices = physical_devices;
        Ok(())
    }

    pub fn is_inited(&self) -> bool {
        self.instance.is_some()
    }

    pub fn physical_devices(&self) -> &[vk::PhysicalDevice] {
        &self.physical_devices
    }

    pub fn physical_device_properties(
        &self,
        ph_dev: vk::PhysicalDevice,
    ) -> Result<vk::PhysicalDeviceProperties, ContextError> {
        let instance = self
            .instance
            .as_ref()
            .ok_or(ContextError::InstanceNotCreated)?;
        if !self.physical_devices.contains(&ph_dev) {
            return Err(ContextError::PhysicalDeviceNotExist);
        }
        Ok(unsafe { instance.get_physical_device_properties(ph_dev) })
    }

    /// The one moment a surface comes to exist: asks the window to produce a
    /// drawable surface bound to this instance and keeps the owning
    /// reference. Returns the window-side observer.
    pub fn window_handshake(
        &mut self,
        window: &Window,
    ) -> Result<Weak<RenderSurface>, ContextError> {
        let entry = self
            .entry
            .as_ref()
            .ok_or(ContextError::InstanceNotCreated)?;
        let instance = self
            .instance
            .as_ref()
            .ok_or(ContextError::InstanceNotCreated)?;
        if self.surface.is_some() {
            return Err(ContextError::SurfaceAlreadyCreated);
        }

        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        let loader = ash::khr::surface::Instance::new(entry, instance);

        let surface = Arc::new(RenderSurface { handle, loader });
        let observer = Arc::downgrade(&surface);
        self.surface = Some(surface);
        Ok(observer)
    }

    pub fn allocate_graphics_device(
        &mut self,
        ph_dev: vk::PhysicalDevice,
    ) -> Result<DeviceDriverKey, ContextError> {
        if self.instance.is_none() {
            return Err(ContextError::InstanceNotCreated);
        }
        if !self.physical_devices.contains(&ph_dev) {
            return Err(ContextError::PhysicalDeviceNotExist);
        }

        Ok(self
            .device_drivers
            .insert(DeviceDriver::Graphics(GraphicsDevice::new())))
    }

    pub fn bind_surface(&mut self, key: DeviceDriverKey) -> Result<(), ContextError> {
        if self.instance.is_none() {
            return Err(ContextError::InstanceNotCreated);
        }
        let surface = self
            .surface
            .as_ref()
            .ok_or(ContextError::SurfaceNotCreated)?;
        let observer = Arc::downgrade(surface);

        match self.device_drivers.get_mut(key) {
            Some(DeviceDriver::Graphics(device)) => {
                device.connect_surface(observer).map_err(ContextError::from)
            }
            None => Err(ContextError::DeviceDriverNotExist),
        }
    }

    pub fn init_graphics_device(
        &mut self,
        key: DeviceDriverKey,
        ph_dev: vk::PhysicalDevice,
    ) -> Result<(), ContextError> {
        let instance = self
            .instance
            .as_ref()
            .ok_or(ContextError::InstanceNotCreated)?;
        if !self.physical_devices.contains(&ph_dev) {
            return Err(ContextError::PhysicalDeviceNotExist);
        }

        match self.device_drivers.get_mut(key) {
            Some(DeviceDriver::Graphics(device)) => {
                device.init(instance, ph_dev).map_err(ContextError::from)
            }
            None => Err(ContextError::DeviceDriverNotExist),
        }
    }

    pub fn graphics_device_mut(
        &mut self,
        key: DeviceDriverKey,
    ) -> Result<&mut GraphicsDevice, ContextError> {
        match self.device_drivers.get_mut(key) {
            Some(DeviceDriver::Graphics(device)) => Ok(device),
            None => Err(ContextError::DeviceDriverNotExist),
        }
    }

    pub fn contains_driver(&self, key: DeviceDriverKey) -> bool {
        self.device_drivers.contains_key(key)
    }

    /// Removes and destroys the driver now. Outstanding keys simply stop
    /// resolving; nothing dangles.
    pub fn drop_device_driver(&mut self, key: DeviceDriverKey) {
        self.device_drivers.remove(key);
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        // Fixed order: device drivers, then the shared surface, then the
        // instance itself.
        self.device_drivers.clear();

        if let Some(surface) = self.surface.take() {
            match Arc::try_unwrap(surface) {
                Ok(surface) => drop(surface),
                Err(still_shared) => {
                    log::error!(
                        "drawable surface is still strongly referenced at context teardown; leaking it"
                    );
                    std::mem::forget(still_shared);
                }
            }
        }

        if let Some(instance) = self.instance.take() {
            unsafe { instance.destroy_instance(None) };
        }
    }
}

/// Names in `requested` that are absent from `available`, in request order.
fn missing_names(requested: &[&CStr], available: &[&CStr]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_are_collected_in_one_batch() {
        let requested: &[&CStr] = &[c"VK_KHR_surface", c"VK_EXT_imaginary", c"VK_NV_made_up"];
        let available: &[&CStr] = &[c"VK_KHR_surface", c"VK_KHR_swapchain"];

        let missing = missing_names(requested, available);
        assert_eq!(missing, vec!["VK_EXT_imaginary", "VK_NV_made_up"]);

        let missing = missing_names(&requested[..1], available);
        assert!(missing.is_empty());
    }

    #[test]
    fn operations_before_init_report_instance_not_created() {
        let mut context = RenderContext::new();
        assert!(!context.is_inited());

        let err = context
            .allocate_graphics_device(vk::PhysicalDevice::null())
            .unwrap_err();
        assert!(matches!(err, ContextError::InstanceNotCreated));

        let err = context.bind_surface(DeviceDriverKey::default()).unwrap_err();
        assert!(matches!(err, ContextError::InstanceNotCreated));

        let err = context
            .physical_device_properties(vk::PhysicalDevice::null())
            .unwrap_err();
        assert!(matches!(err, ContextError::InstanceNotCreated));
    }

    #[test]
    fn stale_keys_report_dead_instead_of_aliasing() {
        let mut context = RenderContext::new();
        let key = DeviceDriverKey::default();

        assert!(!context.contains_driver(key));
        let err = context.graphics_device_mut(key).unwrap_err();
        assert!(matches!(err, ContextError::DeviceDriverNotExist));

        // Dropping an unknown driver is a quiet no-op.
        context.drop_device_driver(key);
    }
}
