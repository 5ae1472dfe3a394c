//! Light bias engine: per-vertex illumination from a bounded set of
//! point sources, with per-surface cached affect sets and a change
//! tracker so only surfaces touched by a changed light recompute.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::constants::bias::{
    DEFAULT_LIGHT_SPEED, MAX_BIAS_AFFECTED, MAX_BIAS_LIGHTS, MAX_BIAS_TRACKED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub usize);

#[derive(Debug, Clone)]
pub struct BiasSource {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub last_update_time: u32,
}

/// Bitmap over source indices.
#[derive(Debug, Clone, Default)]
pub struct BiasTracker {
    changes: [u32; MAX_BIAS_TRACKED / 32],
}

impl BiasTracker {
    pub fn mark(&mut self, index: usize) {
        self.changes[index >> 5] |= 1 << (index & 0x1f);
    }

    pub fn check(&self, index: usize) -> bool {
        self.changes[index >> 5] & (1 << (index & 0x1f)) != 0
    }

    pub fn apply(&mut self, other: &BiasTracker) {
        for (dest, src) in self.changes.iter_mut().zip(other.changes.iter()) {
            *dest |= src;
        }
    }

    pub fn clear_all(&mut self) {
        self.changes = [0; MAX_BIAS_TRACKED / 32];
    }

    pub fn any(&self) -> bool {
        self.changes.iter().any(|&w| w != 0)
    }
}

/// Light contributed to one vertex by one source, cached between frames.
#[derive(Debug, Clone, Copy)]
struct CastedLight {
    source: i32,
    color: Vec3,
}

impl Default for CastedLight {
    fn default() -> Self {
        CastedLight {
            source: -1,
            color: Vec3::ZERO,
        }
    }
}

/// Per-vertex illumination state.
#[derive(Debug, Clone)]
pub struct VertexIllum {
    color: Vec3,
    dest: Vec3,
    casted: [CastedLight; MAX_BIAS_AFFECTED],
    update_time: u32,
    still_unseen: bool,
    lerping: bool,
}

impl Default for VertexIllum {
    fn default() -> Self {
        VertexIllum {
            color: Vec3::ZERO,
            dest: Vec3::ZERO,
            casted: [CastedLight::default(); MAX_BIAS_AFFECTED],
            update_time: 0,
            still_unseen: true,
            lerping: false,
        }
    }
}

/// One entry of a surface's cached affect set.
#[derive(Debug, Clone, Copy)]
pub struct Affection {
    pub source: i32,
    pub intensity: f32,
}

impl Default for Affection {
    fn default() -> Self {
        Affection {
            source: -1,
            intensity: 0.0,
        }
    }
}

/// A lit surface: one illumination record per vertex plus the cached set
/// of sources that can matter to it.
#[derive(Debug, Clone)]
pub struct BiasSurface {
    pub illum: Vec<VertexIllum>,
    pub affected: [Affection; MAX_BIAS_AFFECTED],
    updated_frame: u32,
}

impl BiasSurface {
    pub fn new(vertex_count: usize) -> BiasSurface {
        BiasSurface {
            illum: vec![VertexIllum::default(); vertex_count],
            affected: [Affection::default(); MAX_BIAS_AFFECTED],
            updated_frame: u32::MAX,
        }
    }

    /// Forget cached lighting, e.g. after the surface moved.
    pub fn surface_moved(&mut self, engine: &mut BiasEngine) {
        for aff in self.affected.iter().filter(|a| a.source >= 0) {
            engine.mark_changed(aff.source as usize);
        }
        for illum in &mut self.illum {
            illum.still_unseen = true;
        }
        self.updated_frame = u32::MAX;
    }
}

/// Ambient lighting sampled from a sparse grid with a base term.
#[derive(Debug, Clone)]
pub struct AmbientGrid {
    pub base: Vec3,
    pub cell_size: f32,
    cells: FxHashMap<(i32, i32), Vec3>,
}

impl AmbientGrid {
    pub fn new(base: Vec3) -> AmbientGrid {
        AmbientGrid {
            base,
            cell_size: 64.0,
            cells: FxHashMap::default(),
        }
    }

    pub fn set_cell(&mut self, x: i32, y: i32, color: Vec3) {
        self.cells.insert((x, y), color);
    }

    pub fn sample(&self, point: Vec3) -> Vec3 {
        let cx = (point.x / self.cell_size).floor() as i32;
        let cy = (point.y / self.cell_size).floor() as i32;
        self.cells.get(&(cx, cy)).copied().unwrap_or(self.base)
    }
}

/// Line-of-sight test callback: true when the path is clear.
pub type SightCheck<'a> = &'a dyn Fn(Vec3, Vec3) -> bool;

pub struct BiasEngine {
    sources: Vec<Option<BiasSource>>,
    /// Changes accumulated since the previous frame.
    accumulated: BiasTracker,
    /// Changes visible during the current frame.
    frame_tracker: BiasTracker,
    time: u32,
    frame: u32,
    last_change_frame: u32,
    pub light_speed: u32,
    pub ignore_limit: f32,
    pub use_sight_check: bool,
    pub ambient: AmbientGrid,
}

impl BiasEngine {
    pub fn new() -> BiasEngine {
        BiasEngine {
            sources: Vec::new(),
            accumulated: BiasTracker::default(),
            frame_tracker: BiasTracker::default(),
            time: 0,
            frame: 0,
            last_change_frame: u32::MAX,
            light_speed: DEFAULT_LIGHT_SPEED,
            ignore_limit: 0.005,
            use_sight_check: false,
            ambient: AmbientGrid::new(Vec3::ZERO),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    /// Register a new source, or None when the table is full.
    pub fn add_source(&mut self, origin: Vec3, intensity: f32, color: Vec3) -> Option<SourceId> {
        let index = match self.sources.iter().position(|s| s.is_none()) {
            Some(i) => i,
            None => {
                if self.sources.len() >= MAX_BIAS_LIGHTS {
                    log::warn!("[BiasEngine::add_source] Source table full");
                    return None;
                }
                self.sources.push(None);
                self.sources.len() - 1
            }
        };

        self.sources[index] = Some(BiasSource {
            origin,
            color,
            intensity,
            last_update_time: self.time,
        });
        self.mark_changed(index);
        Some(SourceId(index))
    }

    pub fn update_source(
        &mut self,
        id: SourceId,
        origin: Vec3,
        intensity: f32,
        color: Vec3,
    ) {
        let time = self.time;
        if let Some(Some(source)) = self.sources.get_mut(id.0) {
            source.origin = origin;
            source.intensity = intensity;
            source.color = color;
            source.last_update_time = time;
            self.mark_changed(id.0);
        }
    }

    pub fn delete_source(&mut self, id: SourceId) {
        if let Some(slot) = self.sources.get_mut(id.0) {
            if slot.take().is_some() {
                self.mark_changed(id.0);
            }
        }
    }

    fn mark_changed(&mut self, index: usize) {
        if index < MAX_BIAS_TRACKED {
            self.accumulated.mark(index);
        }
    }

    /// Advance one tick of illumination interpolation time.
    pub fn advance_time(&mut self) {
        self.time += 1;
    }

    /// Publish accumulated source changes for the coming frame.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.frame_tracker = self.accumulated.clone();
        if self.frame_tracker.any() {
            self.last_change_frame = self.frame;
        }
        self.accumulated.clear_all();
    }

    /// Recompute a surface's affect set if any source changed since its
    /// last update. Sources that face away or fall below the ignore
    /// limit are dropped; overflow evicts the weakest.
    pub fn update_affected(
        &mut self,
        surface: &mut BiasSurface,
        vertices: &[Vec3],
        point: Vec3,
        normal: Vec3,
    ) {
        if surface.updated_frame == self.last_change_frame {
            return; // Already up to date.
        }
        surface.updated_frame = self.last_change_frame;
        surface.affected = [Affection::default(); MAX_BIAS_AFFECTED];
        let mut found = 0usize;

        for (k, source) in self.sources.iter().enumerate() {
            let Some(source) = source else { continue };
            if source.intensity <= 0.0 {
                continue;
            }

            // Minimum 2D distance to the surface footprint.
            let mut distance = f32::MAX;
            for v in vertices {
                let d = (Vec3::new(v.x, v.y, 0.0)
                    - Vec3::new(source.origin.x, source.origin.y, 0.0))
                .length();
                distance = distance.min(d);
            }
            distance = distance.max(1.0);

            let dot = (source.origin - point).normalize_or_zero().dot(normal);
            if dot <= 0.0 {
                continue; // Facing away.
            }

            let intensity = source.intensity / distance;
            if intensity < self.ignore_limit {
                continue;
            }

            if found < MAX_BIAS_AFFECTED {
                surface.affected[found] = Affection {
                    source: k as i32,
                    intensity,
                };
                found += 1;
            } else {
                // Drop the weakest.
                let mut worst = 0;
                for i in 1..MAX_BIAS_AFFECTED {
                    if surface.affected[i].intensity < surface.affected[worst].intensity {
                        worst = i;
                    }
                }
                if surface.affected[worst].intensity < intensity {
                    surface.affected[worst] = Affection {
                        source: k as i32,
                        intensity,
                    };
                }
            }
        }
    }

    /// Evaluate the light reaching one vertex. Per-source contributions
    /// are cached; only sources flagged changed this frame recompute.
    /// The ambient grid sample is always added on top.
    pub fn eval_point(
        &self,
        surface: &mut BiasSurface,
        vertex: usize,
        point: Vec3,
        normal: Vec3,
        sight: Option<SightCheck>,
    ) -> Vec3 {
        let affected = surface.affected;
        let illum = &mut surface.illum[vertex];

        let mut changed = illum.still_unseen;
        let first_seen = illum.still_unseen;
        illum.still_unseen = false;

        // Did any affecting source change this frame?
        for aff in affected.iter().filter(|a| a.source >= 0) {
            if self.frame_tracker.check(aff.source as usize) {
                changed = true;
            }
        }

        if !changed {
            let mut light = self.lerp_illumination(illum);
            light += self.ambient.sample(point);
            return light.min(Vec3::ONE);
        }

        // Recompute contributions from the affecting sources.
        for aff in affected.iter().filter(|a| a.source >= 0) {
            let idx = aff.source as usize;
            if !first_seen && !self.frame_tracker.check(idx) {
                continue; // Previous casted value still good.
            }
            let Some(Some(source)) = self.sources.get(idx) else {
                continue;
            };

            let casted = Self::casted_slot(illum, idx as i32, &affected);

            // Sight check against a point nudged off the surface.
            let toward = (source.origin - point) / 100.0;
            if self.use_sight_check {
                if let Some(sight) = sight {
                    if !sight(source.origin, point + toward) {
                        illum.casted[casted].color = Vec3::ZERO;
                        continue;
                    }
                }
            }

            let delta = source.origin - point;
            let distance = delta.length().max(1.0);
            let dot = (delta / distance).dot(normal);
            if dot <= 0.0 {
                illum.casted[casted].color = Vec3::ZERO;
                continue;
            }

            let level = (dot * source.intensity / distance).min(1.0);
            illum.casted[casted].color = source.color * level;
        }

        // Combine what every affecting source casts.
        let mut dest = Vec3::ZERO;
        for casted in illum.casted.iter().filter(|c| c.source >= 0) {
            dest += casted.color;
        }
        dest = dest.min(Vec3::ONE);

        if first_seen || self.light_speed == 0 {
            // Snap: no previous value worth interpolating from.
            illum.color = dest;
            illum.dest = dest;
            illum.lerping = false;
        } else {
            illum.dest = dest;
            illum.update_time = self.time;
            illum.lerping = true;
        }

        let mut light = self.lerp_illumination(illum);
        light += self.ambient.sample(point);
        light.min(Vec3::ONE)
    }

    /// Interpolate between current and destination color over the
    /// configured light speed.
    fn lerp_illumination(&self, illum: &mut VertexIllum) -> Vec3 {
        if !illum.lerping {
            return illum.color;
        }
        let elapsed = self.time.saturating_sub(illum.update_time);
        if self.light_speed == 0 || elapsed > self.light_speed {
            illum.lerping = false;
            illum.color = illum.dest;
            return illum.color;
        }
        let inter = elapsed as f32 / self.light_speed as f32;
        illum.color + (illum.dest - illum.color) * inter
    }

    /// Find (or claim) the casted-light slot of a source in a vertex's
    /// cache, preferring slots not used by the current affect set.
    fn casted_slot(illum: &mut VertexIllum, source: i32, affected: &[Affection]) -> usize {
        if let Some(i) = illum.casted.iter().position(|c| c.source == source) {
            return i;
        }
        for i in 0..MAX_BIAS_AFFECTED {
            let in_use = affected
                .iter()
                .any(|a| a.source >= 0 && a.source == illum.casted[i].source);
            if !in_use {
                illum.casted[i] = CastedLight {
                    source,
                    color: Vec3::ZERO,
                };
                return i;
            }
        }
        // Affect set and casted cache are the same size, so a free slot
        // always exists; fall back defensively anyway.
        illum.casted[0] = CastedLight {
            source,
            color: Vec3::ZERO,
        };
        0
    }
}

impl Default for BiasEngine {
    fn default() -> Self {
        BiasEngine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_surface() -> (BiasSurface, Vec<Vec3>, Vec3, Vec3) {
        // A single upward-facing vertex at the origin.
        let surface = BiasSurface::new(1);
        let vertices = vec![Vec3::ZERO];
        let point = Vec3::ZERO;
        let normal = Vec3::Z;
        (surface, vertices, point, normal)
    }

    #[test]
    fn test_zero_sources_yields_ambient() {
        let mut engine = BiasEngine::new();
        engine.ambient.base = Vec3::new(0.25, 0.5, 0.125);
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let light = engine.eval_point(&mut surface, 0, point, normal, None);
        assert_eq!(light, Vec3::new(0.25, 0.5, 0.125));
    }

    #[test]
    fn test_single_source_contribution() {
        let mut engine = BiasEngine::new();
        engine.ambient.base = Vec3::splat(0.1);
        // Source straight above at distance 10, intensity 5, pure red.
        let intensity = 5.0;
        let distance = 10.0;
        engine
            .add_source(Vec3::new(0.0, 0.0, distance), intensity, Vec3::X)
            .unwrap();
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let light = engine.eval_point(&mut surface, 0, point, normal, None);

        // Normal collinear with the light direction: I/d * color + ambient.
        let expected = intensity / distance;
        assert!((light.x - (expected + 0.1)).abs() < 1e-5);
        assert!((light.y - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_backfacing_source_ignored() {
        let mut engine = BiasEngine::new();
        engine
            .add_source(Vec3::new(0.0, 0.0, -10.0), 5.0, Vec3::X)
            .unwrap();
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        assert!(surface.affected.iter().all(|a| a.source < 0));
        let light = engine.eval_point(&mut surface, 0, point, normal, None);
        assert_eq!(light, Vec3::ZERO);
    }

    #[test]
    fn test_weak_sources_dropped_by_ignore_limit() {
        let mut engine = BiasEngine::new();
        engine.ignore_limit = 0.5;
        engine
            .add_source(Vec3::new(0.0, 0.0, 100.0), 1.0, Vec3::ONE)
            .unwrap();
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        assert!(surface.affected.iter().all(|a| a.source < 0));
    }

    #[test]
    fn test_affect_set_evicts_weakest_on_overflow() {
        let mut engine = BiasEngine::new();
        // Fill beyond capacity with increasingly strong sources.
        for i in 0..MAX_BIAS_AFFECTED + 2 {
            engine
                .add_source(
                    Vec3::new(0.0, 0.0, 50.0),
                    1.0 + i as f32,
                    Vec3::ONE,
                )
                .unwrap();
        }
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);

        let kept: Vec<i32> = surface
            .affected
            .iter()
            .filter(|a| a.source >= 0)
            .map(|a| a.source)
            .collect();
        assert_eq!(kept.len(), MAX_BIAS_AFFECTED);
        // The two weakest (indices 0 and 1) were evicted.
        assert!(!kept.contains(&0));
        assert!(!kept.contains(&1));
    }

    #[test]
    fn test_unchanged_surface_skips_recompute() {
        let mut engine = BiasEngine::new();
        let id = engine
            .add_source(Vec3::new(0.0, 0.0, 10.0), 5.0, Vec3::X)
            .unwrap();
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let first = engine.eval_point(&mut surface, 0, point, normal, None);

        // No changes: the next frame reuses cached illumination.
        engine.begin_frame();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let second = engine.eval_point(&mut surface, 0, point, normal, None);
        assert_eq!(first, second);

        // A source update forces a change.
        engine.update_source(id, Vec3::new(0.0, 0.0, 5.0), 5.0, Vec3::X);
        engine.begin_frame();
        engine.update_affected(&mut surface, &vertices, point, normal);
        assert!(engine.frame_tracker.check(id.0));
    }

    #[test]
    fn test_sight_check_blocks_light() {
        let mut engine = BiasEngine::new();
        engine.use_sight_check = true;
        engine
            .add_source(Vec3::new(0.0, 0.0, 10.0), 5.0, Vec3::X)
            .unwrap();
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let blocked: SightCheck = &|_, _| false;
        let light = engine.eval_point(&mut surface, 0, point, normal, Some(blocked));
        assert_eq!(light, Vec3::ZERO);
    }

    #[test]
    fn test_lerp_reaches_destination() {
        let mut engine = BiasEngine::new();
        engine.light_speed = 4;
        let id = engine
            .add_source(Vec3::new(0.0, 0.0, 10.0), 5.0, Vec3::X)
            .unwrap();
        engine.begin_frame();

        let (mut surface, vertices, point, normal) = flat_surface();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let settled = engine.eval_point(&mut surface, 0, point, normal, None);

        // Double the intensity; the new value is approached over
        // light_speed ticks, not instantly.
        engine.update_source(id, Vec3::new(0.0, 0.0, 10.0), 10.0, Vec3::X);
        engine.begin_frame();
        engine.update_affected(&mut surface, &vertices, point, normal);
        let stepped = engine.eval_point(&mut surface, 0, point, normal, None);
        assert!(stepped.x <= settled.x + 1e-6);

        // After enough ticks the destination is reached.
        for _ in 0..10 {
            engine.advance_time();
        }
        engine.begin_frame();
        let done = engine.eval_point(&mut surface, 0, point, normal, None);
        assert!((done.x - 1.0).abs() < 1e-5); // level clamps at 1
    }
}
