use std::mem;
use std::slice;

use ash::vk;
use glam::Mat4;

use crate::renderer::error::DeviceError;

use super::{FRAGMENT_SHADER, GraphicsDevice, LoadedShader, VERTEX_SHADER};

/// Matches every required shader name against the supplied bytecode list.
/// All missing names are collected and reported together, not one by one.
pub(crate) fn match_required_shaders<'a>(
    required: &[&'static str],
    loaded: &[LoadedShader<'a>],
) -> Result<Vec<(&'static str, &'a [u32])>, DeviceError> {
    let mut matched = Vec::with_capacity(required.len());
    let mut missing = Vec::new();

    for &name in required {
        match loaded
            .iter()
            .find(|shader| shader.name == name && !shader.code.is_empty())
        {
            Some(shader) => matched.push((name, shader.code)),
            None => missing.push(name),
        }
    }

    if missing.is_empty() {
        Ok(matched)
    } else {
        Err(DeviceError::NoDesiredShaders(missing.join(" ")))
    }
}

impl GraphicsDevice {
    pub(crate) fn create_renderpass(&mut self) -> Result<(), DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::DeviceNotCreated)?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or(DeviceError::DeviceNotCreated)?;

        let color_attachment = vk::AttachmentDescription::default()
            .format(swapchain.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(slice::from_ref(&color_attachment_ref));

        // Pin color-attachment output against the external scope in both
        // directions, by region, so frame boundaries don't serialize more
        // than they have to.
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ,
                )
                .dependency_flags(vk::DependencyFlags::BY_REGION),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ,
                )
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags::empty())
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        ];

        let renderpass_info = vk::RenderPassCreateInfo::default()
            .attachments(slice::from_ref(&color_attachment))
            .subpasses(slice::from_ref(&subpass))
            .dependencies(&dependencies);

        self.render_pass = unsafe { device.create_render_pass(&renderpass_info, None)? };
        log::debug!(
            "renderpass created against {:?} ({:?})",
            swapchain.format,
            swapchain.color_space,
        );
        Ok(())
    }

    pub(crate) fn create_framebuffers(&mut self) -> Result<(), DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::DeviceNotCreated)?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or(DeviceError::DeviceNotCreated)?;

        let mut image_views = Vec::with_capacity(swapchain.images.len());
        for &image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(swapchain.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(view),
                Err(err) => {
                    for &view in &image_views {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    return Err(err.into());
                }
            }
        }

        let mut framebuffers = Vec::with_capacity(image_views.len());
        for &view in &image_views {
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(slice::from_ref(&view))
                .width(swapchain.extent.width)
                .height(swapchain.extent.height)
                .layers(1);

            match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(err) => {
                    for &framebuffer in &framebuffers {
                        unsafe { device.destroy_framebuffer(framebuffer, None) };
                    }
                    for &view in &image_views {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    return Err(err.into());
                }
            }
        }

        if let Some(swapchain) = self.swapchain.as_mut() {
            swapchain.image_views = image_views;
            swapchain.framebuffers = framebuffers;
        }
        Ok(())
    }

    /// Validates the full shader set first; modules are only compiled once
    /// every required name resolved, and a failed compile destroys whatever
    /// the same pass already produced.
    pub(crate) fn load_shaders(&mut self, loaded: &[LoadedShader]) -> Result<(), DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::DeviceNotCreated)?;

        let matched = match_required_shaders(super::REQUIRED_SHADERS, loaded)?;

        let mut compiled = Vec::with_capacity(matched.len());
        for (name, code) in matched {
            let shader_info = vk::ShaderModuleCreateInfo::default().code(code);
            match unsafe { device.create_shader_module(&shader_info, None) } {
                Ok(module) => compiled.push((name, module)),
                Err(err) => {
                    for &(_, module) in &compiled {
                        unsafe { device.destroy_shader_module(module, None) };
                    }
                    return Err(err.into());
                }
            }
        }

        self.shaders.extend(compiled);
        Ok(())
    }

    pub(crate) fn create_pipeline(&mut self) -> Result<(), DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::DeviceNotCreated)?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or(DeviceError::DeviceNotCreated)?;

        let stage_table = [
            (VERTEX_SHADER, vk::ShaderStageFlags::VERTEX),
            (FRAGMENT_SHADER, vk::ShaderStageFlags::FRAGMENT),
        ];

        let mut stages = Vec::with_capacity(stage_table.len());
        let mut missing = Vec::new();
        for (name, stage) in stage_table {
            match self.shaders.get(name) {
                Some(&module) => stages.push(
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(stage)
                        .module(module)
                        .name(c"main"),
                ),
                None => missing.push(name),
            }
        }
        if !missing.is_empty() {
            return Err(DeviceError::NoDesiredShaders(missing.join(" ")));
        }

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Static viewport and scissor; resizing the drawable area is not
        // supported, so nothing is dynamic.
        let viewport = vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(swapchain.extent.width as f32)
            .height(swapchain.extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: swapchain.extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(slice::from_ref(&viewport))
            .scissors(slice::from_ref(&scissor));

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ZERO)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA);

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(slice::from_ref(&color_blend_attachment));

        // One transform matrix, visible to the vertex stage only.
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(mem::size_of::<Mat4>() as u32);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .push_constant_ranges(slice::from_ref(&push_constant_range));

        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(0);

        let pipelines = match unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                slice::from_ref(&pipeline_info),
                None,
            )
        } {
            Ok(pipelines) => pipelines,
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(err.into());
            }
        };

        self.pipeline_layout = layout;
        self.pipeline = pipelines[0];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS: &[u32] = &[0x0723_0203, 0, 0, 0];

    #[test]
    fn full_shader_set_matches_in_required_order() {
        let loaded = [
            LoadedShader {
                name: FRAGMENT_SHADER,
                code: WORDS,
            },
            LoadedShader {
                name: VERTEX_SHADER,
                code: WORDS,
            },
        ];

        let matched = match_required_shaders(super::super::REQUIRED_SHADERS, &loaded).unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].0, VERTEX_SHADER);
        assert_eq!(matched[1].0, FRAGMENT_SHADER);
    }

    #[test]
    fn one_missing_shader_is_named_exactly() {
        let loaded = [LoadedShader {
            name: VERTEX_SHADER,
            code: WORDS,
        }];

        let err = match_required_shaders(super::super::REQUIRED_SHADERS, &loaded).unwrap_err();
        match err {
            DeviceError::NoDesiredShaders(names) => assert_eq!(names, FRAGMENT_SHADER),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_bytecode_counts_as_missing() {
        let loaded = [
            LoadedShader {
                name: VERTEX_SHADER,
                code: &[],
            },
            LoadedShader {
                name: FRAGMENT_SHADER,
                code: WORDS,
            },
        ];

        let err = match_required_shaders(super::super::REQUIRED_SHADERS, &loaded).unwrap_err();
        match err {
            DeviceError::NoDesiredShaders(names) => assert_eq!(names, VERTEX_SHADER),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn all_missing_shaders_are_reported_together() {
        let err = match_required_shaders(super::super::REQUIRED_SHADERS, &[]).unwrap_err();
        match err {
            DeviceError::NoDesiredShaders(names) => {
                assert_eq!(names, format!("{VERTEX_SHADER} {FRAGMENT_SHADER}"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
