use ash::vk;
use glam::Mat4;

use crate::renderer::error::DeviceError;

use super::GraphicsDevice;

/// One ring slot: everything a single frame in flight needs.
#[derive(Debug)]
pub(crate) struct FrameSync {
    /// Signaled when the slot's submission has fully executed; waiting on it
    /// is the only backpressure bounding how far the CPU runs ahead.
    pub submit_fence: vk::Fence,
    pub acquire_semaphore: vk::Semaphore,
    pub present_semaphore: vk::Semaphore,
    pub command_buffer: vk::CommandBuffer,
}

pub(crate) fn advance_frame_index(index: usize, ring_size: usize) -> usize {
    (index + 1) % ring_size
}

impl GraphicsDevice {
    pub(crate) fn create_frame_sync(&mut self) -> Result<(), DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::DeviceNotCreated)?;
        let (graphics_family, _) = self.graphics_queue.ok_or(DeviceError::DeviceNotCreated)?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);
        let pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(Self::FRAMES_IN_FLIGHT as u32);
        let command_buffers = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers,
            Err(err) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(err.into());
            }
        };

        // Destroying the pool frees the command buffers with it.
        let unwind = |frames: &[FrameSync]| unsafe {
            for frame in frames {
                device.destroy_fence(frame.submit_fence, None);
                device.destroy_semaphore(frame.acquire_semaphore, None);
                device.destroy_semaphore(frame.present_semaphore, None);
            }
            device.destroy_command_pool(pool, None);
        };

        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let semaphore_info = vk::SemaphoreCreateInfo::default();

        let mut frames = Vec::with_capacity(Self::FRAMES_IN_FLIGHT);
        for &command_buffer in &command_buffers {
            let submit_fence = match unsafe { device.create_fence(&fence_info, None) } {
                Ok(fence) => fence,
                Err(err) => {
                    unwind(&frames);
                    return Err(err.into());
                }
            };
            let acquire_semaphore = match unsafe { device.create_semaphore(&semaphore_info, None) }
            {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    unsafe { device.destroy_fence(submit_fence, None) };
                    unwind(&frames);
                    return Err(err.into());
                }
            };
            let present_semaphore = match unsafe { device.create_semaphore(&semaphore_info, None) }
            {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    unsafe {
                        device.destroy_fence(submit_fence, None);
                        device.destroy_semaphore(acquire_semaphore, None);
                    }
                    unwind(&frames);
                    return Err(err.into());
                }
            };

            frames.push(FrameSync {
                submit_fence,
                acquire_semaphore,
                present_semaphore,
                command_buffer,
            });
        }

        self.command_pool = pool;
        self.frames = frames;
        self.target_frame = 0;
        Ok(())
    }

    /// The blind draw cycle: wait on the slot's fence, acquire, record,
    /// submit, present, advance the ring. Any driver failure aborts the
    /// cycle as-is; a stale swapchain surfaces as the raw error.
    pub(crate) fn explicit_blind_draw(&mut self, transform: &Mat4) -> Result<(), DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::DeviceNotCreated)?;
        let loader = self
            .swapchain_loader
            .as_ref()
            .ok_or(DeviceError::DeviceNotCreated)?;
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or(DeviceError::DeviceNotCreated)?;
        let (_, graphics_queue) = self.graphics_queue.ok_or(DeviceError::DeviceNotCreated)?;
        let (_, presentation_queue) = self
            .presentation_queue
            .ok_or(DeviceError::DeviceNotCreated)?;
        let frame = self
            .frames
            .get(self.target_frame)
            .ok_or(DeviceError::EnvironmentNotCreated)?;

        unsafe {
            device.wait_for_fences(&[frame.submit_fence], false, u64::MAX)?;
            device.reset_fences(&[frame.submit_fence])?;

            let (image_index, _suboptimal) = loader.acquire_next_image(
                swapchain.handle,
                u64::MAX,
                frame.acquire_semaphore,
                vk::Fence::null(),
            )?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(frame.command_buffer, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            }];
            let pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_pass)
                .framebuffer(swapchain.framebuffers[image_index as usize])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: swapchain.extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(frame.command_buffer, &pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                frame.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
            device.cmd_push_constants(
                frame.command_buffer,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(transform),
            );
            device.cmd_draw(frame.command_buffer, 3, 1, 0, 0);
            device.cmd_end_render_pass(frame.command_buffer);
            device.end_command_buffer(frame.command_buffer)?;

            let wait_semaphores = [frame.acquire_semaphore];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [frame.command_buffer];
            let signal_semaphores = [frame.present_semaphore];
            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);
            device.queue_submit(graphics_queue, &[submit_info], frame.submit_fence)?;

            let swapchains = [swapchain.handle];
            let image_indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&signal_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);
            let _suboptimal = loader.queue_present(presentation_queue, &present_info)?;
        }

        self.target_frame = advance_frame_index(self.target_frame, self.frames.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_index_wraps_modulo_ring_size() {
        let mut index = 0;
        for draw in 0..10usize {
            assert_eq!(index, draw % 3);
            index = advance_frame_index(index, 3);
        }
    }

    #[test]
    fn depth_one_ring_stays_on_slot_zero() {
        let mut index = 0;
        for _ in 0..4 {
            index = advance_frame_index(index, GraphicsDevice::FRAMES_IN_FLIGHT);
            assert_eq!(index, 0);
        }
    }
}
