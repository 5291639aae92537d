//! Shadow cameras, shadow maps and the matrices the lit shader samples with.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::device::{FilterMode, GraphicsDevice, TextureDescriptor, WrapMode};
use crate::error::GraphicsError;
use crate::scene::{Camera, Light, LightType, Projection, ShadowMap, ShadowStorage};

/// View direction and up vector of each cubemap face, in +X, -X, +Y, -Y,
/// +Z, -Z order.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

const VSM_BIAS: f32 = -0.0002;

// =============================================================================
// Shadow maps
// =============================================================================

fn create_shadow_map(device: &mut GraphicsDevice, light: &Light) -> Result<ShadowMap, GraphicsError> {
    let (filter, storage) = light.shadow_format(device.capabilities());
    let resolution = light.shadow_resolution.max(1);
    let format = storage.pixel_format();
    let point = light.light_type == LightType::Point;

    let descriptor = if point {
        TextureDescriptor::new_cube(resolution, format)
    } else {
        TextureDescriptor::new_2d(resolution, resolution, format)
    };
    let texture = device.create_texture(descriptor.with_label("shadow map"));
    let sampling = if filter.is_vsm() && storage != ShadowStorage::PackedRgba8 {
        FilterMode::Linear
    } else {
        FilterMode::Nearest
    };
    texture.set_min_filter(sampling);
    texture.set_mag_filter(sampling);
    texture.set_wrap(WrapMode::Clamp, WrapMode::Clamp);

    let targets = if point {
        (0..6)
            .map(|face| device.create_render_target(Some(texture.clone()), Some(face), true))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        vec![device.create_render_target(Some(texture.clone()), None, true)?]
    };
    log::debug!(
        "Created {resolution}px {:?} shadow map ({storage:?}, {filter:?})",
        light.light_type
    );
    Ok(ShadowMap {
        texture,
        targets,
        resolution,
        filter,
        storage,
        device_id: device.id(),
    })
}

/// Make sure `light` has a shadow map matching its current settings,
/// recreating it after a resolution, filter or type change.
///
/// Returns true if a new map was created.
pub(crate) fn ensure_shadow_map(
    device: &mut GraphicsDevice,
    light: &mut Light,
) -> Result<bool, GraphicsError> {
    let (filter, storage) = light.shadow_format(device.capabilities());
    let faces = if light.light_type == LightType::Point { 6 } else { 1 };
    let current = light.shadow_map().is_some_and(|map| {
        map.device_id == device.id()
            && map.resolution == light.shadow_resolution.max(1)
            && map.filter == filter
            && map.storage == storage
            && map.targets.len() == faces
    });
    if current {
        return Ok(false);
    }
    if let Some(old) = light.replace_shadow_map(None) {
        if old.device_id == device.id() {
            old.destroy(device);
        }
    }
    let map = create_shadow_map(device, light)?;
    light.replace_shadow_map(Some(map));
    Ok(true)
}

// =============================================================================
// Shadow cameras
// =============================================================================

/// Orientation of a shadow camera looking along the light's -Y axis.
fn shadow_rotation(light: &Light) -> Quat {
    let (_, rotation, _) = light.transform().to_scale_rotation_translation();
    rotation * Quat::from_rotation_x(-FRAC_PI_2)
}

/// Fit the directional shadow camera around the part of `camera`'s view
/// volume closer than the light's shadow distance.
///
/// The box is centered on the slice in light space and extended toward the
/// light by the shadow distance so casters outside the view still land in
/// the map.
pub fn fit_directional(light: &mut Light, camera: &Camera, aspect: f32) {
    let rotation = shadow_rotation(light);
    let to_light = rotation.inverse();
    let corners = camera.frustum_corners(light.shadow_distance, aspect);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let local = to_light * corner;
        min = min.min(local);
        max = max.max(local);
    }
    let center = (min + max) * 0.5;
    let half = ((max - min) * 0.5).max(Vec3::splat(1e-4));
    let margin = light.shadow_distance.max(0.0);
    let eye = rotation * Vec3::new(center.x, center.y, max.z + margin);

    let shadow_camera = light.shadow_camera_mut();
    shadow_camera.projection = Projection::Orthographic;
    shadow_camera.ortho_height = half.y;
    shadow_camera.aspect_ratio = Some(half.x / half.y);
    shadow_camera.near_clip = 0.0;
    shadow_camera.far_clip = max.z - min.z + margin;
    shadow_camera.set_transform(Mat4::from_rotation_translation(rotation, eye));
}

/// Point the spot shadow camera down the cone.
pub fn setup_spot(light: &mut Light) {
    let rotation = shadow_rotation(light);
    let position = light.position();
    let range = light.range;
    let fov = light.outer_cone_angle * 2.0;

    let shadow_camera = light.shadow_camera_mut();
    shadow_camera.projection = Projection::Perspective;
    shadow_camera.fov = fov;
    shadow_camera.aspect_ratio = Some(1.0);
    shadow_camera.near_clip = range / 1000.0;
    shadow_camera.far_clip = range;
    shadow_camera.set_transform(Mat4::from_rotation_translation(rotation, position));
}

/// Point the point-light shadow camera at cubemap face `face`.
pub fn setup_point_face(light: &mut Light, face: usize) {
    let position = light.position();
    let range = light.range;
    let (direction, up) = CUBE_FACES[face % 6];

    let shadow_camera = light.shadow_camera_mut();
    shadow_camera.projection = Projection::Perspective;
    shadow_camera.fov = 90.0;
    shadow_camera.aspect_ratio = Some(1.0);
    shadow_camera.near_clip = range / 1000.0;
    shadow_camera.far_clip = range;
    shadow_camera.set_transform(Mat4::look_to_rh(position, direction, up).inverse());
}

/// View-projection of a shadow camera.
pub fn view_projection(camera: &Camera) -> Mat4 {
    let aspect = camera.aspect_ratio.unwrap_or(1.0);
    camera.projection_matrix(aspect) * camera.view_matrix()
}

/// Map clip space [-1, 1] to texture space [0, 1] after `view_projection`.
pub fn shadow_matrix(view_projection: Mat4) -> Mat4 {
    Mat4::from_translation(Vec3::splat(0.5)) * Mat4::from_scale(Vec3::splat(0.5)) * view_projection
}

/// `(resolution, normal bias, depth bias, 1 / range)` for the lit shader.
pub fn shadow_params(light: &Light, far_clip: f32) -> Vec4 {
    let resolution = light.shadow_resolution as f32;
    let vsm = light
        .shadow_map()
        .map_or(light.shadow_filter.is_vsm(), |map| map.filter.is_vsm());
    match light.light_type {
        LightType::Directional => {
            let (normal_bias, bias) = if vsm {
                (light.vsm_bias / (far_clip / 7.0), VSM_BIAS)
            } else {
                (light.normal_offset_bias, light.shadow_bias / far_clip * 100.0)
            };
            Vec4::new(resolution, normal_bias, bias, 0.0)
        }
        LightType::Spot => {
            let (normal_bias, bias) = if vsm {
                (light.vsm_bias / (light.range / 7.0), VSM_BIAS)
            } else {
                (light.normal_offset_bias, light.shadow_bias * 20.0)
            };
            Vec4::new(resolution, normal_bias, bias, 1.0 / light.range)
        }
        LightType::Point => Vec4::new(
            resolution,
            light.normal_offset_bias,
            light.shadow_bias,
            1.0 / light.range,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_fit_contains_view_slice() {
        let mut light = Light::directional()
            .with_shadow_distance(30.0)
            .with_transform(Mat4::from_rotation_x(-0.7) * Mat4::from_rotation_z(0.3));
        let camera = Camera::new()
            .with_clip(0.3, 200.0)
            .looking_at(Vec3::new(5.0, 4.0, 12.0), Vec3::new(0.0, 0.0, -3.0), Vec3::Y);
        let aspect = 16.0 / 9.0;
        fit_directional(&mut light, &camera, aspect);

        let vp = view_projection(light.shadow_camera());
        for corner in camera.frustum_corners(light.shadow_distance, aspect) {
            let ndc = vp.project_point3(corner);
            assert!(ndc.abs().max_element() <= 1.0 + 1e-3, "{corner} -> {ndc}");
        }
    }

    #[test]
    fn test_directional_camera_looks_along_light() {
        let mut light = Light::directional();
        fit_directional(&mut light, &Camera::new(), 1.0);
        assert!((light.shadow_camera().forward() - light.direction()).length() < 1e-5);
        assert_eq!(light.shadow_camera().projection, Projection::Orthographic);
    }

    #[test]
    fn test_spot_camera() {
        let mut light = Light::spot()
            .with_range(20.0)
            .with_cone_angles(20.0, 30.0)
            .with_transform(Mat4::from_translation(Vec3::new(1.0, 5.0, 0.0)));
        setup_spot(&mut light);
        let camera = light.shadow_camera();
        assert_eq!(camera.fov, 60.0);
        assert_eq!(camera.far_clip, 20.0);
        assert!((camera.forward() - Vec3::NEG_Y).length() < 1e-5);
        assert!((camera.position() - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_point_faces_cover_axes() {
        let mut light = Light::point().with_transform(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        let expected = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, direction) in expected.into_iter().enumerate() {
            setup_point_face(&mut light, face);
            assert!((light.shadow_camera().forward() - direction).length() < 1e-5, "face {face}");
        }
    }

    #[test]
    fn test_shadow_matrix_maps_to_unit_range() {
        let mut light = Light::spot().with_range(10.0);
        setup_spot(&mut light);
        let matrix = shadow_matrix(view_projection(light.shadow_camera()));
        let on_axis = matrix.project_point3(Vec3::new(0.0, -5.0, 0.0));
        assert!((on_axis.x - 0.5).abs() < 1e-5);
        assert!((on_axis.y - 0.5).abs() < 1e-5);
        assert!(on_axis.z > 0.0 && on_axis.z < 1.0);
    }

    #[test]
    fn test_shadow_params() {
        let light = Light::directional().with_shadow_bias(0.05).with_shadow_resolution(2048);
        let params = shadow_params(&light, 50.0);
        assert_eq!(params.x, 2048.0);
        assert!((params.z - 0.1).abs() < 1e-6);

        let spot = Light::spot().with_range(8.0).with_shadow_bias(0.01);
        let params = shadow_params(&spot, 8.0);
        assert!((params.z - 0.2).abs() < 1e-6);
        assert_eq!(params.w, 0.125);

        let vsm = Light::spot()
            .with_range(7.0)
            .with_shadow_filter(crate::scene::ShadowFilter::Vsm16);
        let params = shadow_params(&vsm, 7.0);
        assert_eq!(params.z, VSM_BIAS);
        assert!((params.y - vsm.vsm_bias).abs() < 1e-6);
    }
}
