//! Camera and light data shared by every pass of a frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use prism_core::collections::SmallVec;
use prism_core::log::warn;
use prism_rhi::{Backend, Extent2D, GpuBufferMetaData, ResourceViewDesc, RhiBuffer};
use crate::engine::LowLevelGraphicsEngine;
use crate::error::RenderResult;
use crate::registry::{BufferHandle, GpuRegistry, ViewHandle};

pub const MAX_POINT_LIGHTS: usize = 128;
pub const MAX_SPOT_LIGHTS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub range: f32,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub range: f32,
    pub direction: Vec3,
    /// Half angle of the cone in radians.
    pub angle: f32,
    pub color: Vec3,
    pub intensity: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_projection: Mat4,
    pub camera_position: Vec4,
    /// Width, height, point light count, spot light count.
    pub screen: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position_range: Vec4,
    pub color_intensity: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuSpotLight {
    pub position_range: Vec4,
    pub direction_angle: Vec4,
    pub color_intensity: Vec4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightConstants {
    pub point_lights: [GpuPointLight; MAX_POINT_LIGHTS],
    pub spot_lights: [GpuSpotLight; MAX_SPOT_LIGHTS],
}

/// Camera and lights of one frame.
#[derive(Debug, Clone)]
pub struct SceneView {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub screen_size: Extent2D,
    pub point_lights: Vec<PointLight>,
    pub spot_lights: Vec<SpotLight>,
}

impl SceneView {
    pub const FOV_Y: f32 = std::f32::consts::FRAC_PI_3;
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 1000.0;

    pub fn new(screen_size: Extent2D) -> Self {
        let mut scene = Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            screen_size,
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
        };
        scene.look_at(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO);
        scene.set_screen_size(screen_size);
        scene
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        self.camera_position = eye;
        self.view = Mat4::look_at_rh(eye, target, Vec3::Y);
    }

    /// Update the projection for a new render target size.
    pub fn set_screen_size(&mut self, screen_size: Extent2D) {
        self.screen_size = screen_size;
        let aspect = screen_size.width.max(1) as f32 / screen_size.height.max(1) as f32;
        self.projection = Mat4::perspective_rh(Self::FOV_Y, aspect, Self::NEAR, Self::FAR);
    }

    #[inline]
    pub fn point_light_count(&self) -> u32 {
        self.point_lights.len().min(MAX_POINT_LIGHTS) as u32
    }

    #[inline]
    pub fn spot_light_count(&self) -> u32 {
        self.spot_lights.len().min(MAX_SPOT_LIGHTS) as u32
    }

    pub fn constants(&self) -> SceneConstants {
        SceneConstants {
            view: self.view,
            projection: self.projection,
            view_projection: self.projection * self.view,
            inverse_projection: self.projection.inverse(),
            camera_position: self.camera_position.extend(1.0),
            screen: [
                self.screen_size.width,
                self.screen_size.height,
                self.point_light_count(),
                self.spot_light_count(),
            ],
        }
    }

    fn light_overflow(&self) -> Option<String> {
        if self.point_lights.len() <= MAX_POINT_LIGHTS && self.spot_lights.len() <= MAX_SPOT_LIGHTS {
            return None;
        }
        Some(format!(
            "Scene has {} point and {} spot lights, only {} point and {} spot lights are shaded",
            self.point_lights.len(),
            self.spot_lights.len(),
            MAX_POINT_LIGHTS,
            MAX_SPOT_LIGHTS
        ))
    }

    /// Lights beyond the fixed capacity are dropped.
    pub fn light_constants(&self) -> LightConstants {
        if let Some(message) = self.light_overflow() {
            warn!("{message}");
        }

        let mut constants = LightConstants::zeroed();
        for (gpu, light) in constants.point_lights.iter_mut().zip(&self.point_lights) {
            *gpu = GpuPointLight {
                position_range: light.position.extend(light.range),
                color_intensity: light.color.extend(light.intensity),
            };
        }
        for (gpu, light) in constants.spot_lights.iter_mut().zip(&self.spot_lights) {
            *gpu = GpuSpotLight {
                position_range: light.position.extend(light.range),
                direction_angle: light.direction.normalize_or_zero().extend(light.angle),
                color_intensity: light.color.extend(light.intensity),
            };
        }
        constants
    }
}

/// Per-frame constant buffers holding [`SceneConstants`] and [`LightConstants`].
pub struct SceneBuffers {
    scene: BufferHandle,
    lights: BufferHandle,
    scene_views: SmallVec<[ViewHandle; 4]>,
    light_views: SmallVec<[ViewHandle; 4]>,
}

impl SceneBuffers {
    pub fn new<B: Backend>(engine: &mut LowLevelGraphicsEngine<B>) -> RenderResult<Self> {
        let frame_count = engine.frame_buffer_count();
        let (device, registry) = engine.device_and_registry();

        let scene = registry.create_buffer(
            device,
            &GpuBufferMetaData::constant_buffer("scene", std::mem::size_of::<SceneConstants>() as u32, frame_count),
        )?;
        let lights = registry.create_buffer(
            device,
            &GpuBufferMetaData::constant_buffer("lights", std::mem::size_of::<LightConstants>() as u32, frame_count),
        )?;

        let mut scene_views = SmallVec::new();
        let mut light_views = SmallVec::new();
        for frame in 0..frame_count {
            let per_frame = ResourceViewDesc::constant_buffer().with_range(frame, 1);
            scene_views.push(registry.create_buffer_view(device, scene, &per_frame)?);
            light_views.push(registry.create_buffer_view(device, lights, &per_frame)?);
        }

        Ok(Self {
            scene,
            lights,
            scene_views,
            light_views,
        })
    }

    /// Write `scene` into the elements of `frame_index`.
    pub fn upload<B: Backend>(&self, registry: &GpuRegistry<B>, frame_index: u32, scene: &SceneView) -> RenderResult<()> {
        let buffer = registry.buffer(self.scene)?;
        buffer.write(
            frame_index as u64 * buffer.meta().stride as u64,
            bytemuck::bytes_of(&scene.constants()),
        )?;

        let buffer = registry.buffer(self.lights)?;
        buffer.write(
            frame_index as u64 * buffer.meta().stride as u64,
            bytemuck::bytes_of(&scene.light_constants()),
        )?;
        Ok(())
    }

    #[inline]
    pub fn scene_view(&self, frame_index: u32) -> ViewHandle {
        self.scene_views[frame_index as usize]
    }

    #[inline]
    pub fn light_view(&self, frame_index: u32) -> ViewHandle {
        self.light_views[frame_index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_layouts_have_no_padding() {
        assert_eq!(std::mem::size_of::<SceneConstants>(), 4 * 64 + 16 + 16);
        assert_eq!(std::mem::size_of::<GpuPointLight>(), 32);
        assert_eq!(std::mem::size_of::<GpuSpotLight>(), 48);
        assert_eq!(std::mem::size_of::<LightConstants>(), 128 * 32 + 128 * 48);
    }

    #[test]
    fn constants_report_clamped_light_counts() {
        let mut scene = SceneView::new(Extent2D::new(1280, 720));
        scene.point_lights = vec![
            PointLight {
                position: Vec3::ZERO,
                range: 4.0,
                color: Vec3::ONE,
                intensity: 1.0,
            };
            MAX_POINT_LIGHTS + 3
        ];
        scene.spot_lights.push(SpotLight {
            position: Vec3::Y,
            range: 10.0,
            direction: Vec3::new(0.0, -2.0, 0.0),
            angle: 0.5,
            color: Vec3::ONE,
            intensity: 2.0,
        });

        let constants = scene.constants();
        assert_eq!(constants.screen, [1280, 720, MAX_POINT_LIGHTS as u32, 1]);

        let lights = scene.light_constants();
        assert_eq!(lights.spot_lights[0].direction_angle, Vec4::new(0.0, -1.0, 0.0, 0.5));
        assert_eq!(lights.spot_lights[1].color_intensity, Vec4::ZERO);
    }

    #[test]
    fn overflow_names_both_light_caps() {
        let mut scene = SceneView::new(Extent2D::new(64, 64));
        assert!(scene.light_overflow().is_none());

        scene.spot_lights = vec![
            SpotLight {
                position: Vec3::ZERO,
                range: 1.0,
                direction: Vec3::NEG_Y,
                angle: 0.5,
                color: Vec3::ONE,
                intensity: 1.0,
            };
            MAX_SPOT_LIGHTS + 1
        ];
        let message = scene.light_overflow().unwrap();
        assert!(message.contains(&format!("0 point and {} spot lights", MAX_SPOT_LIGHTS + 1)));
        assert!(message.contains(&format!("only {} point and {} spot lights", MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS)));
    }

    #[test]
    fn projection_follows_the_screen_aspect() {
        let mut scene = SceneView::new(Extent2D::new(100, 100));
        let square = scene.projection;
        scene.set_screen_size(Extent2D::new(200, 100));
        assert_eq!(scene.screen_size, Extent2D::new(200, 100));
        assert!(scene.projection.x_axis.x < square.x_axis.x);
    }
}
