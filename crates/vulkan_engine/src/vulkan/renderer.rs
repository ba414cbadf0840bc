//! The frame-rendering state machine
//!
//! [`Renderer`] owns everything a frame needs: the swapchain, one command
//! buffer + fence + semaphore pair + uniform buffers per frame slot, the
//! descriptor pool, and the swapchain-dependent chain (depth buffer, render
//! pass, pipeline, framebuffers).
//!
//! Each slot moves through Idle -> WaitFence -> Acquire -> Record -> Submit
//! -> Idle, driven by exactly three ordered calls per displayed frame:
//! [`Renderer::begin_frame`], [`Renderer::record_commands`],
//! [`Renderer::end_frame_and_present`]. Blocking on the slot's fence in
//! `begin_frame` is what bounds in-flight GPU work to the configured number
//! of frames: slot `i + N` cannot start writing until slot `i`'s submission
//! has retired.
//!
//! Swapchain staleness is the one recoverable failure: the affected frame is
//! skipped and the swapchain plus every resource embedding its extent or
//! format is rebuilt as a unit. All other submit/present failures propagate
//! as fatal errors.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Vector3};
use std::sync::Arc;

use crate::config::RendererConfig;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::commands::CommandManager;
use crate::vulkan::context::VulkanContext;
use crate::vulkan::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use crate::vulkan::frame_data::{CameraMatrices, OverlayRenderer, Renderable};
use crate::vulkan::framebuffer::{DepthBuffer, Framebuffer};
use crate::vulkan::pipeline::{GraphicsPipeline, ShaderModule};
use crate::vulkan::render_pass::RenderPass;
use crate::vulkan::swapchain::Swapchain;
use crate::vulkan::sync::FrameSync;
use crate::vulkan::{VulkanError, VulkanResult};

/// Slot index following `current`, wrapping at `frame_count`
pub(crate) fn next_frame_slot(current: usize, frame_count: usize) -> usize {
    (current + 1) % frame_count
}

/// Directional light parameters written into the per-frame light UBO
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    /// Direction the light travels, world space
    pub direction: Vector3<f32>,
    /// Light color
    pub color: Vector3<f32>,
    /// Scalar intensity multiplier
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vector3::new(-0.4, -1.0, -0.3),
            color: Vector3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
        }
    }
}

// Layouts match the std140 uniform blocks in the forward shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CameraUbo {
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightUbo {
    direction: [f32; 4],
    // rgb premultiplied by intensity, intensity itself in alpha
    color: [f32; 4],
}

impl From<&DirectionalLight> for LightUbo {
    fn from(light: &DirectionalLight) -> Self {
        let scaled = light.color * light.intensity;
        Self {
            direction: [light.direction.x, light.direction.y, light.direction.z, 0.0],
            color: [scaled.x, scaled.y, scaled.z, light.intensity],
        }
    }
}

/// Orchestrator of the per-frame state machine
///
/// Construct one per surface with [`Renderer::new`]; drive it with the
/// three-call contract; call [`Renderer::wait_idle`] before shutdown.
pub struct Renderer {
    // Declaration order doubles as drop order: everything device-dependent
    // goes before `context`.
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    vertex_shader: ShaderModule,
    fragment_shader: ShaderModule,
    render_pass: RenderPass,
    depth_buffer: DepthBuffer,
    frame_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    material_set_layout: DescriptorSetLayout,
    frame_set_layout: DescriptorSetLayout,
    light_ubos: Vec<Buffer>,
    camera_ubos: Vec<Buffer>,
    frame_syncs: Vec<FrameSync>,
    command_manager: CommandManager,
    swapchain: Swapchain,

    frames_in_flight: usize,
    clear_color: [f32; 4],
    light: DirectionalLight,
    current_frame: usize,
    current_image: u32,
    frame_in_progress: bool,
    swapchain_dirty: bool,
    surface_extent: (u32, u32),
    warned_incomplete_mesh: bool,
    warned_missing_material: bool,

    context: Arc<VulkanContext>,
}

impl Renderer {
    /// Create the renderer and every per-frame resource
    ///
    /// `width`/`height` is the initial framebuffer size of the window the
    /// context was built against. Construction failures are setup failures:
    /// there is no degraded mode, callers are expected to terminate.
    pub fn new(
        context: Arc<VulkanContext>,
        config: &RendererConfig,
        width: u32,
        height: u32,
    ) -> VulkanResult<Self> {
        let frames_in_flight = config.frames_in_flight;
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "frames_in_flight must be at least 1".to_string(),
            });
        }

        let device = context.device().clone();
        log::info!("Creating renderer ({frames_in_flight} frames in flight)");

        let swapchain = Swapchain::new(&context, width, height)?;
        let command_manager = CommandManager::new(&context, frames_in_flight)?;

        let mut frame_syncs = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            frame_syncs.push(FrameSync::new(device.clone())?);
        }

        // Per-slot uniform buffers, persistently mapped: each slot writes
        // only its own pair, so overlapping frames never race on them.
        let mut camera_ubos = Vec::with_capacity(frames_in_flight);
        let mut light_ubos = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            let mut camera = Buffer::new(
                &context,
                std::mem::size_of::<CameraUbo>() as vk::DeviceSize,
                1,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            camera.map()?;
            camera_ubos.push(camera);

            let mut light = Buffer::new(
                &context,
                std::mem::size_of::<LightUbo>() as vk::DeviceSize,
                1,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            light.map()?;
            light_ubos.push(light);
        }

        // Set 0: camera (vertex stage) + light (fragment stage).
        let frame_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;
        // Set 1: one combined texture sampler per material.
        let material_set_layout = DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;

        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            frames_in_flight as u32,
            config.max_material_sets,
        )?;

        let layouts = vec![frame_set_layout.handle(); frames_in_flight];
        let frame_sets = descriptor_pool.allocate(&layouts)?;
        for (slot, &set) in frame_sets.iter().enumerate() {
            let camera_info = [camera_ubos[slot].descriptor_info()];
            let light_info = [light_ubos[slot].descriptor_info()];
            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&camera_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&light_info)
                    .build(),
            ];
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        let depth_buffer = DepthBuffer::new(&context, swapchain.extent())?;
        let render_pass = RenderPass::new_forward(
            device.clone(),
            Self::color_format(&swapchain),
            depth_buffer.format(),
        )?;

        let vertex_shader = ShaderModule::from_file(device.clone(), &config.vertex_shader_path)?;
        let fragment_shader =
            ShaderModule::from_file(device.clone(), &config.fragment_shader_path)?;

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            &[frame_set_layout.handle(), material_set_layout.handle()],
            &vertex_shader,
            &fragment_shader,
        )?;

        let framebuffers =
            Self::create_framebuffers(&context, &render_pass, &swapchain, &depth_buffer)?;

        log::info!("Renderer created");
        Ok(Self {
            framebuffers,
            pipeline,
            vertex_shader,
            fragment_shader,
            render_pass,
            depth_buffer,
            frame_sets,
            descriptor_pool,
            material_set_layout,
            frame_set_layout,
            light_ubos,
            camera_ubos,
            frame_syncs,
            command_manager,
            swapchain,
            frames_in_flight,
            clear_color: config.clear_color,
            light: DirectionalLight::default(),
            current_frame: 0,
            current_image: 0,
            frame_in_progress: false,
            swapchain_dirty: false,
            surface_extent: (width, height),
            warned_incomplete_mesh: false,
            warned_missing_material: false,
            context,
        })
    }

    // A headless swapchain reports UNDEFINED; the dependent chain still
    // needs a concrete format to build against.
    fn color_format(swapchain: &Swapchain) -> vk::Format {
        if swapchain.format() == vk::Format::UNDEFINED {
            vk::Format::B8G8R8A8_SRGB
        } else {
            swapchain.format()
        }
    }

    fn create_framebuffers(
        context: &VulkanContext,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_buffer: &DepthBuffer,
    ) -> VulkanResult<Vec<Framebuffer>> {
        let device = context.device();
        let extent = swapchain.extent();
        swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    render_pass.handle(),
                    &[view, depth_buffer.view()],
                    extent,
                )
            })
            .collect()
    }

    /// Start a frame; `Ok(false)` means "skip this one and try again"
    ///
    /// Blocks on the slot's fence, acquires a swapchain image, resets the
    /// fence and opens the slot's command buffer. A stale swapchain (or a
    /// pending resize flag) triggers a synchronous rebuild and skips the
    /// frame; a merely suboptimal one proceeds and defers the rebuild.
    pub fn begin_frame(&mut self) -> VulkanResult<bool> {
        assert!(
            !self.frame_in_progress,
            "begin_frame called while a frame is already in progress"
        );

        // Surface-less swapchains have nothing to acquire.
        if self.swapchain.image_count() == 0 {
            log::trace!("begin_frame skipped: swapchain has no images");
            return Ok(false);
        }

        if self.swapchain_dirty {
            let (width, height) = self.surface_extent;
            if width == 0 || height == 0 {
                // Minimized; the driver keeps pumping events and retries
                // once a nonzero size arrives.
                return Ok(false);
            }
            self.recreate_swapchain()?;
            self.swapchain_dirty = false;
            return Ok(false);
        }

        self.frame_syncs[self.current_frame].in_flight.wait()?;

        let acquire = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                self.frame_syncs[self.current_frame].image_available.handle(),
                vk::Fence::null(),
            )
        };
        let image_index = match acquire {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swapchain suboptimal at acquire, flagging recreation");
                    self.swapchain_dirty = true;
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain()?;
                self.swapchain_dirty = false;
                return Ok(false);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        // Reset only after a successful acquire so a skipped frame leaves
        // the fence signaled for the next attempt.
        self.frame_syncs[self.current_frame].in_flight.reset()?;
        self.command_manager.begin_frame_recording(self.current_frame)?;

        self.current_image = image_index;
        self.frame_in_progress = true;
        Ok(true)
    }

    /// Record the frame: render pass, scene renderables, then the overlay
    ///
    /// Writes this slot's camera and light UBOs (identity matrices when
    /// `camera` is `None`), draws every complete renderable, and gives the
    /// overlay — when one is active — a chance to append commands into the
    /// still-open pass. Records only; nothing is submitted here.
    pub fn record_commands(
        &mut self,
        renderables: &[Renderable<'_>],
        camera: Option<&CameraMatrices>,
        overlay: Option<&mut dyn OverlayRenderer>,
    ) -> VulkanResult<()> {
        assert!(
            self.frame_in_progress,
            "record_commands called outside begin_frame / end_frame_and_present"
        );

        let device = self.context.device().clone();
        let command_buffer = self.command_manager.command_buffer(self.current_frame);
        let extent = self.swapchain.extent();

        let (view, projection) = match camera {
            Some(camera) => (camera.view, camera.projection),
            None => (Matrix4::identity(), Matrix4::identity()),
        };
        let camera_ubo = CameraUbo {
            view: view.into(),
            projection: projection.into(),
        };
        self.camera_ubos[self.current_frame].write_value(&camera_ubo)?;
        let light_ubo = LightUbo::from(&self.light);
        self.light_ubos[self.current_frame].write_value(&light_ubo)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[self.current_image as usize].handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(command_buffer, &pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);

            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[self.frame_sets[self.current_frame]],
                &[],
            );
        }

        for renderable in renderables {
            if !renderable.mesh.is_complete() {
                if !self.warned_incomplete_mesh {
                    log::warn!("Skipping renderable with missing GPU buffers (warned once)");
                    self.warned_incomplete_mesh = true;
                }
                continue;
            }

            let model: [[f32; 4]; 4] = (*renderable.transform).into();
            unsafe {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&model),
                );
            }

            match renderable.mesh.material_set {
                Some(material_set) => unsafe {
                    device.cmd_bind_descriptor_sets(
                        command_buffer,
                        vk::PipelineBindPoint::GRAPHICS,
                        self.pipeline.layout(),
                        1,
                        &[material_set],
                        &[],
                    );
                },
                None => {
                    // Not yet bound by the asset loader; draw with whatever
                    // material set is currently bound rather than aborting.
                    if !self.warned_missing_material {
                        log::warn!("Renderable has no material descriptor set (warned once)");
                        self.warned_missing_material = true;
                    }
                }
            }

            unsafe {
                device.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    &[renderable.mesh.vertex_buffer],
                    &[renderable.mesh.vertex_offset],
                );
                device.cmd_bind_index_buffer(
                    command_buffer,
                    renderable.mesh.index_buffer,
                    renderable.mesh.index_offset,
                    vk::IndexType::UINT32,
                );
                device.cmd_draw_indexed(command_buffer, renderable.mesh.index_count, 1, 0, 0, 0);
            }
        }

        if let Some(overlay) = overlay {
            overlay.record(command_buffer);
        }

        unsafe { device.cmd_end_render_pass(command_buffer) };
        Ok(())
    }

    /// Close recording, submit, and request presentation
    ///
    /// The submission waits on the acquire semaphore at color-attachment
    /// output and signals the render-finished semaphore plus the slot's
    /// fence; presentation waits on render-finished. Staleness reported here
    /// only marks the swapchain dirty — rebuilding immediately would race
    /// the work just submitted. Advances the slot index modulo N.
    pub fn end_frame_and_present(&mut self) -> VulkanResult<()> {
        assert!(
            self.frame_in_progress,
            "end_frame_and_present called without begin_frame"
        );

        self.command_manager.end_frame_recording(self.current_frame)?;
        let command_buffer = self.command_manager.command_buffer(self.current_frame);
        let sync = &self.frame_syncs[self.current_frame];

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context
                .device()
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info.build()],
                    sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain.handle()];
        let image_indices = [self.current_image];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.context.present_queue(), &present_info)
        };

        self.frame_in_progress = false;
        match present {
            Ok(suboptimal) => {
                if suboptimal {
                    self.swapchain_dirty = true;
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.swapchain_dirty = true;
            }
            Err(e) => return Err(VulkanError::Api(e)),
        }

        self.current_frame = next_frame_slot(self.current_frame, self.frames_in_flight);
        Ok(())
    }

    /// Note a new framebuffer size; the rebuild happens in the next `begin_frame`
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.surface_extent = (width, height);
        self.swapchain_dirty = true;
    }

    // Everything embedding the swapchain's extent or format rebuilds as a
    // unit: depth buffer, render pass, pipeline, framebuffers.
    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let (width, height) = self.surface_extent;
        log::info!("Recreating swapchain at {width}x{height}");

        self.context.wait_idle()?;
        self.framebuffers.clear();
        self.swapchain.recreate(&self.context, width, height)?;

        let device = self.context.device().clone();
        self.depth_buffer = DepthBuffer::new(&self.context, self.swapchain.extent())?;
        self.render_pass = RenderPass::new_forward(
            device.clone(),
            Self::color_format(&self.swapchain),
            self.depth_buffer.format(),
        )?;
        self.pipeline = GraphicsPipeline::new(
            device,
            self.render_pass.handle(),
            &[
                self.frame_set_layout.handle(),
                self.material_set_layout.handle(),
            ],
            &self.vertex_shader,
            &self.fragment_shader,
        )?;
        self.framebuffers = Self::create_framebuffers(
            &self.context,
            &self.render_pass,
            &self.swapchain,
            &self.depth_buffer,
        )?;
        Ok(())
    }

    /// Set the directional light written into every subsequent frame's UBO
    pub fn set_directional_light(&mut self, light: DirectionalLight) {
        self.light = light;
    }

    /// Command buffer of the frame currently being recorded
    ///
    /// For the UI collaborator; only valid between `begin_frame` and
    /// `end_frame_and_present`.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.frame_in_progress,
            "current_command_buffer outside an open frame"
        );
        self.command_manager.command_buffer(self.current_frame)
    }

    /// Render pass handle, for collaborators building compatible pipelines
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Material set layout, for the asset collaborator's set allocation
    pub fn material_set_layout(&self) -> vk::DescriptorSetLayout {
        self.material_set_layout.handle()
    }

    /// Shared descriptor pool, for the asset collaborator's set allocation
    pub fn descriptor_pool(&self) -> vk::DescriptorPool {
        self.descriptor_pool.handle()
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot index the next `begin_frame` will use
    pub fn current_frame_slot(&self) -> usize {
        self.current_frame
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Block until the device is idle; call before tearing anything down
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Per-frame resources may still be referenced by in-flight work.
        let _ = self.context.wait_idle();
        log::debug!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_cycles_modulo_frame_count() {
        for n in 1..=4 {
            let mut slot = 0;
            for i in 1..=3 * n {
                slot = next_frame_slot(slot, n);
                assert_eq!(slot, i % n);
                assert!(slot < n);
            }
            // Back at slot zero after full cycles.
            assert_eq!(slot, 0);
        }
    }

    #[test]
    fn camera_ubo_is_two_mat4s() {
        assert_eq!(std::mem::size_of::<CameraUbo>(), 128);
    }

    #[test]
    fn light_ubo_matches_std140_block() {
        assert_eq!(std::mem::size_of::<LightUbo>(), 32);

        let light = DirectionalLight {
            direction: Vector3::new(0.0, -1.0, 0.0),
            color: Vector3::new(1.0, 0.5, 0.25),
            intensity: 2.0,
        };
        let ubo = LightUbo::from(&light);
        assert_eq!(ubo.direction, [0.0, -1.0, 0.0, 0.0]);
        approx::assert_relative_eq!(ubo.color[0], 2.0);
        approx::assert_relative_eq!(ubo.color[1], 1.0);
        approx::assert_relative_eq!(ubo.color[2], 0.5);
        approx::assert_relative_eq!(ubo.color[3], 2.0);
    }

    #[test]
    fn identity_matrices_substituted_without_camera() {
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        let ubo = CameraUbo {
            view: identity,
            projection: identity,
        };
        assert_eq!(ubo.view[0][0], 1.0);
        assert_eq!(ubo.view[3][3], 1.0);
        assert_eq!(ubo.view[0][1], 0.0);
    }
}
