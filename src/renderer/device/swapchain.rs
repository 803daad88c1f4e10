use ash::vk;

use crate::renderer::error::DeviceError;

use super::{DrawableAreaParams, GraphicsDevice};

/// Everything the swapchain owns, kept together as one unit. It is created
/// wholesale and destroyed wholesale, never partially.
#[derive(Debug)]
pub(crate) struct SwapchainBundle {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

/// Extra images requested on top of the surface's reported minimum, so the
/// driver never blocks an acquire on internal bookkeeping.
const SWAPCHAIN_IMAGE_COUNT_EXTENT: u32 = 2;

/// `max == 0` means the surface advertises no cap.
pub(crate) fn select_image_count(min: u32, max: u32) -> u32 {
    let wanted = min + SWAPCHAIN_IMAGE_COUNT_EXTENT;
    if max == 0 { wanted } else { wanted.min(max) }
}

/// First surface format in the standard non-linear sRGB color space whose
/// format code falls in the 8-bit RGBA/BGRA unorm-through-srgb range.
pub(crate) fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats.iter().copied().find(|format| {
        format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            && format.format.as_raw() >= vk::Format::R8G8B8A8_UNORM.as_raw()
            && format.format.as_raw() <= vk::Format::B8G8R8A8_SRGB.as_raw()
    })
}

/// Uses the surface's reported extent unless a dimension carries the
/// undefined sentinel, in which case the caller's request is clamped to the
/// surface maximum.
pub(crate) fn select_extent(
    current: vk::Extent2D,
    requested_width: u32,
    requested_height: u32,
    max: vk::Extent2D,
) -> vk::Extent2D {
    let pick = |current: u32, requested: u32, max: u32| {
        if current == 0 || current == u32::MAX {
            requested.min(max)
        } else {
            current
        }
    };

    vk::Extent2D {
        width: pick(current.width, requested_width, max.width),
        height: pick(current.height, requested_height, max.height),
    }
}

/// The requested mode must be present verbatim; nothing is substituted.
pub(crate) fn ensure_present_mode(
    supported: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> Result<(), DeviceError> {
    if supported.contains(&requested) {
        Ok(())
    } else {
        Err(DeviceError::PresentModeNotSupported(requested))
    }
}

impl GraphicsDevice {
    pub(crate) fn create_swapchain(
        &mut self,
        params: &DrawableAreaParams,
    ) -> Result<(), DeviceError> {
        let surface = self
            .surface
            .upgrade()
            .ok_or(DeviceError::SurfaceNotConnected)?;
        let loader = self
            .swapchain_loader
            .as_ref()
            .ok_or(DeviceError::DeviceNotCreated)?;
        let (graphics_family, _) = self.graphics_queue.ok_or(DeviceError::DeviceNotCreated)?;
        let (presentation_family, _) = self
            .presentation_queue
            .ok_or(DeviceError::DeviceNotCreated)?;

        let formats = unsafe {
            surface
                .loader()
                .get_physical_device_surface_formats(self.physical, surface.handle())?
        };
        let capabilities = unsafe {
            surface
                .loader()
                .get_physical_device_surface_capabilities(self.physical, surface.handle())?
        };
        let present_modes = unsafe {
            surface
                .loader()
                .get_physical_device_surface_present_modes(self.physical, surface.handle())?
        };

        let min_image_count =
            select_image_count(capabilities.min_image_count, capabilities.max_image_count);
        let format =
            select_surface_format(&formats).ok_or(DeviceError::SurfaceNoSupportedFormats)?;
        let extent = select_extent(
            capabilities.current_extent,
            params.width,
            params.height,
            capabilities.max_image_extent,
        );
        ensure_present_mode(&present_modes, params.present_mode)?;

        let (sharing_mode, queue_family_indices) = if graphics_family == presentation_family {
            (vk::SharingMode::EXCLUSIVE, vec![graphics_family])
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![graphics_family, presentation_family],
            )
        };

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(params.present_mode)
            .clipped(true);

        let handle = unsafe { loader.create_swapchain(&swapchain_info, None)? };

        let images = match unsafe { loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(err) => {
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(err.into());
            }
        };

        log::debug!(
            "swapchain created: {:?} {}x{}, {} images, {:?}",
            format.format,
            extent.width,
            extent.height,
            images.len(),
            params.present_mode,
        );

        self.swapchain = Some(SwapchainBundle {
            handle,
            format: format.format,
            color_space: format.color_space,
            extent,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_is_min_plus_two_when_uncapped() {
        assert_eq!(select_image_count(2, 0), 4);
        assert_eq!(select_image_count(1, 0), 3);
    }

    #[test]
    fn image_count_respects_the_cap() {
        assert_eq!(select_image_count(2, 3), 3);
        assert_eq!(select_image_count(2, 8), 4);
        // Degenerate but well-formed caps still hold the invariant.
        assert_eq!(select_image_count(3, 3), 3);
    }

    #[test]
    fn format_wants_srgb_nonlinear_in_the_8bit_range() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let picked = select_surface_format(&formats).unwrap();
        assert_eq!(picked.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(picked.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn no_acceptable_format_yields_none() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        assert!(select_surface_format(&formats).is_none());
    }

    #[test]
    fn defined_surface_extent_is_authoritative() {
        let extent = select_extent(
            vk::Extent2D {
                width: 640,
                height: 480,
            },
            1024,
            768,
            vk::Extent2D {
                width: 4096,
                height: 4096,
            },
        );
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 480);
    }

    #[test]
    fn undefined_extent_falls_back_to_the_request() {
        // A 1024x768 request against the undefined sentinel yields exactly
        // the request when the surface maximum allows it.
        let extent = select_extent(
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            1024,
            768,
            vk::Extent2D {
                width: 4096,
                height: 4096,
            },
        );
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 768);

        // ...and the surface maximum when it does not.
        let extent = select_extent(
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            1024,
            768,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn unsupported_present_mode_is_not_substituted() {
        let supported = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert!(ensure_present_mode(&supported, vk::PresentModeKHR::FIFO).is_ok());

        let err = ensure_present_mode(&supported, vk::PresentModeKHR::IMMEDIATE).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::PresentModeNotSupported(vk::PresentModeKHR::IMMEDIATE)
        ));
    }
}
