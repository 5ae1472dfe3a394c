//! Sector light thinkers: flash, strobe and glow.

use crate::rng::GameRng;
use crate::world::map::{Map, SectorId};
use crate::world::thinker::ThinkOutcome;

#[derive(Debug, Clone)]
pub struct FlashLight {
    pub sector: SectorId,
    pub count: i32,
    pub max_light: f32,
    pub min_light: f32,
    pub max_time: i32,
    pub min_time: i32,
}

pub fn flash_think(flash: &mut FlashLight, map: &mut Map, rng: &mut GameRng) -> ThinkOutcome {
    flash.count -= 1;
    if flash.count > 0 {
        return ThinkOutcome::Keep;
    }

    let sector = map.sector_mut(flash.sector);
    if (sector.light_level - flash.max_light).abs() < f32::EPSILON {
        sector.light_level = flash.min_light;
        flash.count = (rng.rand_byte() as i32 & flash.min_time.max(1)) + 1;
    } else {
        sector.light_level = flash.max_light;
        flash.count = (rng.rand_byte() as i32 & flash.max_time.max(1)) + 1;
    }
    ThinkOutcome::Keep
}

#[derive(Debug, Clone)]
pub struct StrobeLight {
    pub sector: SectorId,
    pub count: i32,
    pub min_light: f32,
    pub max_light: f32,
    pub dark_time: i32,
    pub bright_time: i32,
}

pub fn strobe_think(strobe: &mut StrobeLight, map: &mut Map) -> ThinkOutcome {
    strobe.count -= 1;
    if strobe.count > 0 {
        return ThinkOutcome::Keep;
    }

    let sector = map.sector_mut(strobe.sector);
    if (sector.light_level - strobe.min_light).abs() < f32::EPSILON {
        sector.light_level = strobe.max_light;
        strobe.count = strobe.bright_time;
    } else {
        sector.light_level = strobe.min_light;
        strobe.count = strobe.dark_time;
    }
    ThinkOutcome::Keep
}

const GLOW_SPEED: f32 = 1.0 / 32.0;

#[derive(Debug, Clone)]
pub struct GlowLight {
    pub sector: SectorId,
    pub min_light: f32,
    pub max_light: f32,
    /// 1 brightening, -1 dimming.
    pub direction: i32,
}

pub fn glow_think(glow: &mut GlowLight, map: &mut Map) -> ThinkOutcome {
    let sector = map.sector_mut(glow.sector);
    if glow.direction > 0 {
        sector.light_level += GLOW_SPEED;
        if sector.light_level >= glow.max_light {
            sector.light_level = glow.max_light;
            glow.direction = -1;
        }
    } else {
        sector.light_level -= GLOW_SPEED;
        if sector.light_level <= glow.min_light {
            sector.light_level = glow.min_light;
            glow.direction = 1;
        }
    }
    ThinkOutcome::Keep
}
