//! Session configuration, loaded from TOML.

use serde::{Deserialize, Serialize};

use crate::world::player::AutoSwitch;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Illumination interpolation time in ticks.
    pub light_speed: u32,
    /// Sources weaker than this (intensity/distance) are ignored.
    pub ignore_limit: f32,
    pub sight_check: bool,
}

impl Default for BiasConfig {
    fn default() -> Self {
        BiasConfig {
            light_speed: crate::constants::bias::DEFAULT_LIGHT_SPEED,
            ignore_limit: 0.005,
            sight_check: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub game_id: String,
    pub password: String,
    /// Client coordinate discrepancy that forces a position fix.
    pub warp_limit: f64,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            game_id: "ember".to_string(),
            password: String::new(),
            warp_limit: crate::constants::net::WARP_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Archives loaded at startup; IWADs are detected and loaded first.
    pub files: Vec<String>,
    /// Fallback IWADs tried when none of `files` is one.
    pub iwad_search: Vec<String>,
    /// Global particle spawn rate multiplier.
    pub particle_rate: f32,
    pub bias: BiasConfig,
    pub net: NetConfig,
    /// Bindings config file.
    pub bindings_path: String,
    pub weapon_auto_switch: AutoSwitch,
    pub ammo_auto_switch: AutoSwitch,
    pub no_weapon_auto_switch_if_firing: bool,
    /// Seed for the session RNG; fixed seeds reproduce runs.
    pub rng_seed: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            files: Vec::new(),
            iwad_search: Vec::new(),
            particle_rate: 1.0,
            bias: BiasConfig::default(),
            net: NetConfig::default(),
            bindings_path: "bindings.cfg".to_string(),
            weapon_auto_switch: AutoSwitch::IfBetter,
            ammo_auto_switch: AutoSwitch::IfBetter,
            no_weapon_auto_switch_if_firing: false,
            rng_seed: 0,
        }
    }
}

impl GameConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<GameConfig> {
        let config: GameConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> anyhow::Result<GameConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.particle_rate < 0.0 || self.particle_rate > 5.0 {
            return Err(anyhow::anyhow!(
                "GameConfig: particle_rate {} out of range 0..=5",
                self.particle_rate
            ));
        }
        if self.net.warp_limit <= 0.0 {
            return Err(anyhow::anyhow!("GameConfig: warp_limit must be positive"));
        }
        if self.net.game_id.is_empty() || self.net.game_id.len() > 16 {
            return Err(anyhow::anyhow!(
                "GameConfig: game_id must be 1..=16 characters"
            ));
        }
        log::debug!("[GameConfig::validate] Configuration validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        GameConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = GameConfig::from_toml(
            r#"
            files = ["base.wad", "extras.pk3"]
            particle_rate = 2.0

            [net]
            game_id = "ember-coop"
            "#,
        )
        .unwrap();
        assert_eq!(config.files.len(), 2);
        assert_eq!(config.particle_rate, 2.0);
        assert_eq!(config.net.game_id, "ember-coop");
        // Untouched sections keep their defaults.
        assert_eq!(config.bias.light_speed, 130);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(GameConfig::from_toml("particle_rate = 99.0").is_err());
        assert!(GameConfig::from_toml("[net]\ngame_id = \"\"").is_err());
    }
}
