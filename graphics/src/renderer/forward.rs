//! Per-frame orchestration of the forward renderer.

use std::sync::Arc;

use glam::{Mat3, Mat4};

use crate::device::{BlendMode, ClearOptions, ColorWrites, CullMode, GraphicsDevice, Rect};
use crate::error::GraphicsError;
use crate::scene::{
    Camera, DrawCall, Frustum, Light, LightType, MeshInstance, Scene, SceneShaderSettings,
    ShaderPass, ShadowUpdateMode, VariantKey,
};
use crate::scope::{ScopeId, ScopeSpace};
use crate::shader::{GammaMode, LightKey, Shader, ShaderKey, main_shadow_light};
use crate::{frame_mark, profile_scope};

use super::shadow;
use super::sort::{SortEntry, draw_call_key, sort_entries};
use super::{RendererConfig, RendererState, RendererStats};

// =============================================================================
// Scope ids
// =============================================================================

/// Uniforms set once per frame or per draw.
struct FrameIds {
    view_projection: ScopeId,
    view_position: ScopeId,
    view3: ScopeId,
    model: ScopeId,
    normal: ScopeId,
    pose: ScopeId,
    light_radius: ScopeId,
}

impl FrameIds {
    fn resolve(scope: &ScopeSpace) -> Self {
        Self {
            view_projection: scope.resolve("matrix_viewProjection"),
            view_position: scope.resolve("view_position"),
            view3: scope.resolve("matrix_view3"),
            model: scope.resolve("matrix_model"),
            normal: scope.resolve("matrix_normal"),
            pose: scope.resolve("matrix_pose"),
            light_radius: scope.resolve("light_radius"),
        }
    }
}

/// Uniforms of one light slot of the lit shader.
struct LightIds {
    color: ScopeId,
    direction: ScopeId,
    position: ScopeId,
    radius: ScopeId,
    inner_cone: ScopeId,
    outer_cone: ScopeId,
    shadow_map: ScopeId,
    shadow_matrix: ScopeId,
    shadow_params: ScopeId,
    shadow_matrix_vs: ScopeId,
    shadow_params_vs: ScopeId,
    direction_vs: ScopeId,
    position_vs: ScopeId,
}

impl LightIds {
    fn resolve(scope: &ScopeSpace, slot: usize) -> Self {
        let id = |suffix: &str| scope.resolve(&format!("light{slot}_{suffix}"));
        Self {
            color: id("color"),
            direction: id("direction"),
            position: id("position"),
            radius: id("radius"),
            inner_cone: id("spotInnerCone"),
            outer_cone: id("spotOuterCone"),
            shadow_map: id("shadowMap"),
            shadow_matrix: id("shadowMatrix"),
            shadow_params: id("shadowParams"),
            shadow_matrix_vs: id("shadowMatrixVS"),
            shadow_params_vs: id("shadowParamsVS"),
            direction_vs: id("directionVS"),
            position_vs: id("positionVS"),
        }
    }
}

/// Indices of the enabled lights in shader slot order: directional, then
/// point, then spot, keeping scene order within a type.
fn dispatch_order(lights: &[Light]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lights.len()).filter(|&i| lights[i].enabled).collect();
    order.sort_by_key(|&i| lights[i].light_type);
    order
}

/// Set the vertex and index streams of `instance` and draw it.
fn submit(device: &mut GraphicsDevice, instance: &MeshInstance) -> Result<(), GraphicsError> {
    let mesh = &instance.mesh;
    let instances = instance.instances.as_ref().filter(|data| data.count > 0);
    device.set_vertex_buffer(Some(&mesh.vertex_buffer), 0)?;
    device.set_vertex_buffer(instances.map(|data| &data.buffer), 1)?;
    device.set_index_buffer(mesh.index_buffer.as_ref())?;
    device.draw(&mesh.primitive, instances.map_or(0, |data| data.count))
}

// =============================================================================
// ForwardRenderer
// =============================================================================

/// Draws a [`Scene`] from a [`Camera`] with one lit pass per mesh.
pub struct ForwardRenderer {
    config: RendererConfig,
    state: RendererState,
    stats: RendererStats,
    device_id: u32,
    ids: FrameIds,
    light_ids: Vec<LightIds>,
    entries: Vec<SortEntry>,
}

impl ForwardRenderer {
    pub fn new(device: &GraphicsDevice, config: RendererConfig) -> Self {
        log::debug!("Creating forward renderer for device {}", device.id());
        Self {
            config,
            state: RendererState::Idle,
            stats: RendererStats::default(),
            device_id: device.id(),
            ids: FrameIds::resolve(device.scope()),
            light_ids: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Counters of the last rendered frame.
    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Render one frame of `scene` seen from `camera`.
    ///
    /// A lost context aborts the frame with [`GraphicsError::ContextLost`];
    /// the next call after the context comes back rebuilds every GPU
    /// resource lazily. Draws that fail for any other reason are skipped and
    /// counted in [`RendererStats::skipped`].
    pub fn render(
        &mut self,
        device: &mut GraphicsDevice,
        scene: &mut Scene,
        camera: &mut Camera,
    ) -> Result<RendererStats, GraphicsError> {
        profile_scope!("forward_render");

        if device.id() != self.device_id {
            log::debug!(
                "Forward renderer moved from device {} to {}",
                self.device_id,
                device.id()
            );
            self.device_id = device.id();
            self.ids = FrameIds::resolve(device.scope());
            self.light_ids.clear();
        }

        self.stats = RendererStats::default();
        let compiled_before = device.programs().compiled_total();
        let result = self.render_frame(device, scene, camera);
        self.state = RendererState::Idle;
        self.stats.shader_compiles = device
            .programs()
            .compiled_total()
            .saturating_sub(compiled_before);
        frame_mark!();

        match result {
            Ok(()) => Ok(self.stats),
            Err(err) => {
                log::warn!("Frame aborted: {err}");
                Err(err)
            }
        }
    }

    fn render_frame(
        &mut self,
        device: &mut GraphicsDevice,
        scene: &mut Scene,
        camera: &mut Camera,
    ) -> Result<(), GraphicsError> {
        device.update_begin()?;

        // Camera
        self.state = RendererState::CameraSetup;
        let (width, height) = match &camera.render_target {
            Some(target) => (target.width(), target.height()),
            None => device.backbuffer_size(),
        };
        let aspect = camera.aspect_for(width, height);
        let view = camera.view_matrix();
        let view_projection = camera.projection_matrix(aspect) * view;
        camera.update_frustum(&view_projection);
        Self::bind_camera_target(device, camera, width, height)?;
        device.clear(&camera.clear);

        let settings = scene.shader_settings();
        let gamma = settings.gamma != GammaMode::None;
        scene.bind_parameters(device.scope());
        let (lights, draw_calls, _) = scene.parts_mut();

        let order = dispatch_order(lights);
        let keys: Vec<LightKey> = order
            .iter()
            .map(|&i| lights[i].key(device.capabilities()))
            .collect();

        // Shadows
        for (index, light) in lights.iter_mut().enumerate() {
            if !light.casts_shadows() {
                if light.shadow_map().is_some() {
                    light.release_shadow_map(device);
                }
                continue;
            }
            shadow::ensure_shadow_map(device, light)?;
            if !light.needs_shadow_update() {
                continue;
            }
            self.state = RendererState::ShadowPass(index);
            self.render_shadow_pass(device, light, draw_calls, camera, aspect)?;
            if light.shadow_update_mode == ShadowUpdateMode::Once {
                light.shadow_update_mode = ShadowUpdateMode::Never;
            }
        }

        // Main pass
        self.state = RendererState::MainPass;
        profile_scope!("main_pass");
        Self::bind_camera_target(device, camera, width, height)?;
        let camera_position = camera.position();
        self.ids.view_projection.set(view_projection);
        self.ids.view_position.set(camera_position);
        self.ids.view3.set(Mat3::from_mat4(view));

        // Instances that opt out of shadows get the same lights without
        // shadow sampling.
        let unshadowed: Vec<LightKey> = keys
            .iter()
            .map(|key| {
                LightKey {
                    casts_shadow: false,
                    ..*key
                }
                .canonical()
            })
            .collect();
        let shadowed_key = ShaderKey::compute("forward", &(settings, &keys));
        let unshadowed_key = ShaderKey::compute("forward", &(settings, &unshadowed));

        let mut entries = std::mem::take(&mut self.entries);
        entries.clear();
        for (index, call) in draw_calls.iter().enumerate() {
            let distance = match call {
                DrawCall::Mesh(instance) => {
                    if !instance.visible {
                        continue;
                    }
                    let bounds = instance.world_bounds();
                    if self.config.frustum_culling
                        && instance.cull
                        && !camera.frustum().contains_sphere(bounds.center, bounds.radius)
                    {
                        self.stats.culled += 1;
                        continue;
                    }
                    if instance.material.blend().is_blended() {
                        bounds.center.distance_squared(camera_position)
                    } else {
                        0.0
                    }
                }
                DrawCall::Command(_) => 0.0,
            };
            entries.push(SortEntry {
                index,
                key: draw_call_key(call),
                distance,
            });
        }
        sort_entries(&mut entries);

        let result = self.draw_entries(
            device,
            &entries,
            draw_calls,
            lights,
            &order,
            (keys.as_slice(), shadowed_key),
            (unshadowed.as_slice(), unshadowed_key),
            settings,
            gamma,
        );
        self.entries = entries;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_entries(
        &mut self,
        device: &mut GraphicsDevice,
        entries: &[SortEntry],
        draw_calls: &mut [DrawCall],
        lights: &[Light],
        order: &[usize],
        shadowed: (&[LightKey], ShaderKey),
        unshadowed: (&[LightKey], ShaderKey),
        settings: SceneShaderSettings,
        gamma: bool,
    ) -> Result<(), GraphicsError> {
        let mut current_material: Option<u32> = None;
        for entry in entries {
            let instance = match &mut draw_calls[entry.index] {
                DrawCall::Command(command) => {
                    (command.callback)(device);
                    self.stats.commands += 1;
                    // The callback may have changed any state.
                    current_material = None;
                    continue;
                }
                DrawCall::Mesh(instance) => &*instance,
            };

            let skin = instance.is_skinned();
            let instancing = instance.is_instanced();
            let (light_keys, environment) = if instance.receive_shadow {
                shadowed
            } else {
                unshadowed
            };
            let key = VariantKey {
                pass: ShaderPass::Forward,
                environment,
                skin,
                instancing,
            };
            let shader = instance.material.resolve_shader(device, key, |material| {
                let options = material.forward_options(&settings, light_keys, skin, instancing);
                ("standard", options.into())
            });
            let Some(shader) = shader else {
                self.stats.skipped += 1;
                continue;
            };

            let state = instance.material.render_state();
            if current_material != Some(instance.material.id()) {
                current_material = Some(instance.material.id());
                self.stats.material_changes += 1;
                device.set_blend_mode(state.blend);
                device.set_depth_test(state.depth_test);
                device.set_depth_write(state.depth_write);
                instance.material.bind_parameters(device.scope(), gamma);
                self.dispatch_lights(
                    device.scope(),
                    lights,
                    order,
                    shadowed.0,
                    shader.light_count(),
                    gamma,
                );
            }
            let cull = if instance.transform.determinant() < 0.0 {
                state.cull.flipped()
            } else {
                state.cull
            };
            device.set_cull_mode(cull);

            if self.draw_instance(device, instance, &shader)? {
                self.stats.draw_calls += 1;
            } else {
                self.stats.skipped += 1;
            }
        }
        Ok(())
    }

    /// Publish the uniforms of up to `count` lights in slot order.
    fn dispatch_lights(
        &mut self,
        scope: &ScopeSpace,
        lights: &[Light],
        order: &[usize],
        keys: &[LightKey],
        count: usize,
        gamma: bool,
    ) {
        let main = main_shadow_light(keys);
        while self.light_ids.len() < count.min(order.len()) {
            let slot = self.light_ids.len();
            self.light_ids.push(LightIds::resolve(scope, slot));
        }

        for (slot, &index) in order.iter().enumerate().take(count) {
            let light = &lights[index];
            let ids = &self.light_ids[slot];
            ids.color.set(light.final_color(gamma));
            match light.light_type {
                LightType::Directional => ids.direction.set(light.direction()),
                LightType::Point => {
                    ids.position.set(light.position());
                    ids.radius.set(light.range);
                }
                LightType::Spot => {
                    ids.direction.set(light.direction());
                    ids.position.set(light.position());
                    ids.radius.set(light.range);
                    ids.inner_cone
                        .set(light.inner_cone_angle.to_radians().cos());
                    ids.outer_cone
                        .set(light.outer_cone_angle.to_radians().cos());
                }
            }

            if !keys[slot].casts_shadow {
                continue;
            }
            let Some(map) = light.shadow_map() else {
                continue;
            };
            ids.shadow_map.set(map.texture().clone());
            let params = light.shadow_params();
            let matrix = light.shadow_matrix();
            match light.light_type {
                LightType::Directional => ids.shadow_params.set(params.truncate()),
                _ => ids.shadow_params.set(params),
            }
            if light.light_type != LightType::Point {
                ids.shadow_matrix.set(matrix);
            }
            if main == Some(slot) {
                ids.shadow_matrix_vs.set(matrix);
                match light.light_type {
                    LightType::Directional => {
                        ids.shadow_params_vs.set(params.truncate());
                        ids.direction_vs.set(light.direction());
                    }
                    _ => {
                        ids.shadow_params_vs.set(params);
                        ids.position_vs.set(light.position());
                    }
                }
            }
        }
    }

    /// Draw one instance with `shader`. Returns false if the draw was skipped.
    fn draw_instance(
        &mut self,
        device: &mut GraphicsDevice,
        instance: &MeshInstance,
        shader: &Arc<Shader>,
    ) -> Result<bool, GraphicsError> {
        device.set_shader(Some(shader));
        self.ids.model.set(instance.transform);
        self.ids
            .normal
            .set(Mat3::from_mat4(instance.transform).inverse().transpose());
        if let Some(pose) = instance.pose.as_ref().filter(|_| instance.is_skinned()) {
            let flat: Vec<f32> = pose.iter().flat_map(Mat4::to_cols_array).collect();
            self.ids.pose.set(flat);
        }

        match submit(device, instance) {
            Ok(()) => Ok(true),
            Err(GraphicsError::ContextLost) => Err(GraphicsError::ContextLost),
            Err(err) => {
                log::warn!("Skipping draw of '{}': {err}", instance.material.name());
                Ok(false)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Passes
    // -------------------------------------------------------------------------

    fn bind_camera_target(
        device: &mut GraphicsDevice,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        device.set_render_target(camera.render_target.as_ref())?;
        device.set_viewport(camera.viewport(width, height));
        device.set_scissor(camera.scissor(width, height));
        Ok(())
    }

    /// Render the casters of `light` into its shadow map and store the
    /// matrix and params the lit shader samples it with.
    fn render_shadow_pass(
        &mut self,
        device: &mut GraphicsDevice,
        light: &mut Light,
        draw_calls: &[DrawCall],
        camera: &Camera,
        aspect: f32,
    ) -> Result<(), GraphicsError> {
        profile_scope!("shadow_pass");

        let Some(map) = light.shadow_map().cloned() else {
            return Ok(());
        };
        let point = light.light_type == LightType::Point;
        let pass = ShaderPass::Shadow {
            storage: map.storage(),
            filter: map.filter(),
            point,
        };
        match light.light_type {
            LightType::Directional => shadow::fit_directional(light, camera, aspect),
            LightType::Spot => shadow::setup_spot(light),
            LightType::Point => {}
        }

        self.stats.shadow_passes += 1;
        device.set_blend_mode(BlendMode::None);
        device.set_depth_test(true);
        device.set_depth_write(true);
        device.set_color_write(ColorWrites::ALL);
        device.set_cull_mode(CullMode::Back);
        if point {
            self.ids.view_position.set(light.position());
            self.ids.light_radius.set(light.range);
        }

        let resolution = map.resolution();
        let rect = Rect::new(0, 0, resolution, resolution);
        for (face, target) in map.targets().iter().enumerate() {
            if point {
                shadow::setup_point_face(light, face);
            }
            let view_projection = shadow::view_projection(light.shadow_camera());
            device.set_render_target(Some(target))?;
            device.set_viewport(rect);
            device.set_scissor(rect);
            device.clear(&ClearOptions::new(self.config.shadow_clear_color));
            self.ids.view_projection.set(view_projection);

            let frustum = Frustum::from_matrix(&view_projection);
            for call in draw_calls {
                let DrawCall::Mesh(instance) = call else {
                    continue;
                };
                if !instance.visible || !instance.cast_shadow {
                    continue;
                }
                if self.config.frustum_culling && instance.cull {
                    let bounds = instance.world_bounds();
                    if !frustum.contains_sphere(bounds.center, bounds.radius) {
                        continue;
                    }
                }

                let skin = instance.is_skinned();
                let instancing = instance.is_instanced();
                let key = VariantKey {
                    pass,
                    environment: ShaderKey(0),
                    skin,
                    instancing,
                };
                let shader = instance.material.resolve_shader(device, key, |material| {
                    let options =
                        material.depth_options(map.storage(), map.filter(), point, skin, instancing);
                    ("depth", options.into())
                });
                let Some(shader) = shader else {
                    self.stats.skipped += 1;
                    continue;
                };
                if self.draw_instance(device, instance, &shader)? {
                    self.stats.shadow_draw_calls += 1;
                } else {
                    self.stats.skipped += 1;
                }
            }
        }

        let matrix = if point {
            Mat4::IDENTITY
        } else {
            shadow::shadow_matrix(shadow::view_projection(light.shadow_camera()))
        };
        let mut params = shadow::shadow_params(light, light.shadow_camera().far_clip);
        params.z = params.z.min(self.config.max_shadow_bias);
        light.set_shadow_projection(matrix, params);
        log::trace!(
            "Rendered {:?} shadow map ({} faces)",
            light.light_type,
            map.targets().len()
        );
        Ok(())
    }
}

impl std::fmt::Debug for ForwardRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardRenderer")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(ForwardRenderer: Send, Sync);
