//! Rotating textured cube demo
//!
//! Exercises the engine end to end: context and renderer construction, mesh
//! upload through a staging buffer, procedural texture upload with a full
//! mipmap chain, material descriptor set allocation from the renderer's
//! shared pool, and the three-call per-frame contract with live resize
//! handling.
//!
//! Shaders must be compiled to SPIR-V first; see `shaders/README.md`.

use ash::vk;
use nalgebra::{Matrix4, Point3, Rotation3, Vector3};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use vulkan_engine::vulkan::{
    transfer, Buffer, CameraMatrices, GpuImage, MeshBinding, Renderable, Renderer, SamplerCache,
    Vertex, VulkanContext, VulkanError, VulkanResult,
};
use vulkan_engine::{Config, RendererConfig};

const CONFIG_PATH: &str = "cube_app/renderer.toml";
const WINDOW_WIDTH: u32 = 1024;
const WINDOW_HEIGHT: u32 = 768;
const TEXTURE_SIZE: u32 = 256;

fn cube_vertices() -> Vec<Vertex> {
    // 24 vertices: each face carries its own normal and full uv range.
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        // +Z
        (
            [0.0, 0.0, 1.0],
            [
                [-0.5, -0.5, 0.5],
                [0.5, -0.5, 0.5],
                [0.5, 0.5, 0.5],
                [-0.5, 0.5, 0.5],
            ],
        ),
        // -Z
        (
            [0.0, 0.0, -1.0],
            [
                [0.5, -0.5, -0.5],
                [-0.5, -0.5, -0.5],
                [-0.5, 0.5, -0.5],
                [0.5, 0.5, -0.5],
            ],
        ),
        // +X
        (
            [1.0, 0.0, 0.0],
            [
                [0.5, -0.5, 0.5],
                [0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        // -X
        (
            [-1.0, 0.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [-0.5, -0.5, 0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        // +Y
        (
            [0.0, 1.0, 0.0],
            [
                [-0.5, 0.5, 0.5],
                [0.5, 0.5, 0.5],
                [0.5, 0.5, -0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        // -Y
        (
            [0.0, -1.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, -0.5],
                [0.5, -0.5, 0.5],
                [-0.5, -0.5, 0.5],
            ],
        ),
    ];

    let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
    let mut vertices = Vec::with_capacity(24);
    for (normal, corners) in faces {
        for (corner, uv) in corners.iter().zip(uvs.iter()) {
            vertices.push(Vertex {
                position: *corner,
                normal,
                uv: *uv,
            });
        }
    }
    vertices
}

fn cube_indices() -> Vec<u32> {
    (0..6u32)
        .flat_map(|face| {
            let base = face * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect()
}

/// Stage `bytes` into a new device-local buffer with the given usage
fn upload_device_local(
    context: &VulkanContext,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> VulkanResult<Buffer> {
    let size = bytes.len() as vk::DeviceSize;
    let mut staging = Buffer::new(
        context,
        size,
        1,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    staging.write_to_buffer(bytes, 0)?;

    let device_local = Buffer::new(
        context,
        size,
        1,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    transfer::copy_buffer(
        context.device(),
        context.transfer_pool(),
        context.graphics_queue(),
        staging.handle(),
        device_local.handle(),
        size,
    )?;
    Ok(device_local)
}

/// Build a checkerboard texture, upload it, and generate its mip chain
fn create_checker_texture(context: &VulkanContext) -> VulkanResult<GpuImage> {
    let mut pixels = Vec::with_capacity((TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize);
    for y in 0..TEXTURE_SIZE {
        for x in 0..TEXTURE_SIZE {
            let lit = ((x / 32) + (y / 32)) % 2 == 0;
            let value = if lit { 230 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }

    let format = vk::Format::R8G8B8A8_SRGB;
    let props = unsafe {
        context
            .instance()
            .get_physical_device_format_properties(context.physical_device(), format)
    };
    let blit_support = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
        | vk::FormatFeatureFlags::BLIT_SRC
        | vk::FormatFeatureFlags::BLIT_DST;
    let mip_levels = if props.optimal_tiling_features.contains(blit_support) {
        transfer::mip_level_count(TEXTURE_SIZE, TEXTURE_SIZE)
    } else {
        log::warn!("Format {format:?} cannot blit; texture will have a single mip level");
        1
    };

    let image = GpuImage::new(
        context.device(),
        context.instance(),
        context.physical_device(),
        TEXTURE_SIZE,
        TEXTURE_SIZE,
        mip_levels,
        format,
        vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::SAMPLED,
        vk::ImageAspectFlags::COLOR,
    )?;

    let mut staging = Buffer::new(
        context,
        pixels.len() as vk::DeviceSize,
        1,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    staging.write_to_buffer(&pixels, 0)?;

    let device = context.device();
    let pool = context.transfer_pool();
    let queue = context.graphics_queue();

    transfer::transition_image_layout(
        device,
        pool,
        queue,
        image.handle(),
        format,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        0,
        1,
    )?;
    transfer::copy_buffer_to_image(
        device,
        pool,
        queue,
        staging.handle(),
        image.handle(),
        TEXTURE_SIZE,
        TEXTURE_SIZE,
    )?;

    if mip_levels > 1 {
        transfer::generate_mipmaps(
            device,
            context.instance(),
            context.physical_device(),
            pool,
            queue,
            image.handle(),
            format,
            TEXTURE_SIZE,
            TEXTURE_SIZE,
            mip_levels,
        )?;
    } else {
        transfer::transition_image_layout(
            device,
            pool,
            queue,
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            0,
            1,
        )?;
    }

    Ok(image)
}

/// Allocate and populate a material set from the renderer's shared pool
fn create_material_set(
    context: &VulkanContext,
    renderer: &Renderer,
    texture: &GpuImage,
    sampler: vk::Sampler,
) -> VulkanResult<vk::DescriptorSet> {
    let layouts = [renderer.material_set_layout()];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(renderer.descriptor_pool())
        .set_layouts(&layouts);
    let set = unsafe {
        context
            .device()
            .allocate_descriptor_sets(&alloc_info)
            .map_err(VulkanError::Api)?[0]
    };

    let image_info = [vk::DescriptorImageInfo {
        sampler,
        image_view: texture.view(),
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];
    let write = vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_info)
        .build();
    unsafe { context.device().update_descriptor_sets(&[write], &[]) };
    Ok(set)
}

fn orbit_camera(extent: vk::Extent2D) -> CameraMatrices {
    let aspect = extent.width.max(1) as f32 / extent.height.max(1) as f32;
    let mut projection =
        nalgebra::Perspective3::new(aspect, 45.0_f32.to_radians(), 0.1, 100.0).to_homogeneous();
    // Vulkan clip space has Y pointing down.
    projection[(1, 1)] *= -1.0;

    let view = Matrix4::look_at_rh(
        &Point3::new(2.0, 1.5, 3.0),
        &Point3::origin(),
        &Vector3::y(),
    );
    CameraMatrices { view, projection }
}

fn load_config() -> RendererConfig {
    if Path::new(CONFIG_PATH).exists() {
        match RendererConfig::load_from_file(CONFIG_PATH) {
            Ok(config) => return config,
            Err(e) => log::warn!("Could not load {CONFIG_PATH}: {e}, using defaults"),
        }
    }
    RendererConfig {
        application_name: "cube demo".to_string(),
        vertex_shader_path: "cube_app/shaders/simple.vert.spv".to_string(),
        fragment_shader_path: "cube_app/shaders/simple.frag.spv".to_string(),
        ..RendererConfig::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut glfw = glfw::init(glfw::fail_on_errors)
        .map_err(|e| format!("failed to initialize GLFW: {e:?}"))?;
    glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
    glfw.window_hint(glfw::WindowHint::Resizable(true));

    let (mut window, events) = glfw
        .create_window(
            WINDOW_WIDTH,
            WINDOW_HEIGHT,
            "vulkan_engine - cube demo",
            glfw::WindowMode::Windowed,
        )
        .ok_or("window creation failed")?;
    window.set_key_polling(true);
    window.set_framebuffer_size_polling(true);

    let config = load_config();
    let context = Arc::new(VulkanContext::new(&*window, &config)?);

    let (fb_width, fb_height) = window.get_framebuffer_size();
    let mut renderer = Renderer::new(
        Arc::clone(&context),
        &config,
        fb_width as u32,
        fb_height as u32,
    )?;

    // Asset setup: mesh buffers, texture, sampler, material set.
    let vertices = cube_vertices();
    let indices = cube_indices();
    let vertex_buffer = upload_device_local(
        &context,
        bytemuck::cast_slice(&vertices),
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    let index_buffer = upload_device_local(
        &context,
        bytemuck::cast_slice(&indices),
        vk::BufferUsageFlags::INDEX_BUFFER,
    )?;

    let texture = create_checker_texture(&context)?;
    let samplers = SamplerCache::new(
        context.device().clone(),
        context.instance(),
        context.physical_device(),
    )?;
    let material_set = create_material_set(&context, &renderer, &texture, samplers.default_sampler())?;

    let mesh = MeshBinding {
        vertex_buffer: vertex_buffer.handle(),
        vertex_offset: 0,
        index_buffer: index_buffer.handle(),
        index_offset: 0,
        index_count: indices.len() as u32,
        material_set: Some(material_set),
    };

    log::info!("Entering render loop");
    let start = Instant::now();
    while !window.should_close() {
        glfw.poll_events();
        for (_, event) in glfw::flush_messages(&events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    renderer.handle_resize(width as u32, height as u32);
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    window.set_should_close(true);
                }
                _ => {}
            }
        }

        if !renderer.begin_frame()? {
            continue;
        }

        let angle = start.elapsed().as_secs_f32() * 0.8;
        let transform =
            Rotation3::from_axis_angle(&Vector3::y_axis(), angle).to_homogeneous();
        let renderables = [Renderable {
            mesh: &mesh,
            transform: &transform,
        }];
        let camera = orbit_camera(renderer.extent());

        renderer.record_commands(&renderables, Some(&camera), None)?;
        renderer.end_frame_and_present()?;
    }

    renderer.wait_idle()?;
    log::info!("Shutting down");
    Ok(())
}
