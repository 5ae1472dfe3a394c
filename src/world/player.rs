//! Per-player state and the weapon auto-change policy.

use crate::fixed::Angle;
use crate::world::thinker::ThinkerId;

pub const NUM_WEAPON_TYPES: usize = 9;
pub const NUM_AMMO_TYPES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponType(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmmoType(pub u8);

/// What a weapon shoots and how much of it, per trigger pull.
#[derive(Debug, Clone, Copy)]
pub struct WeaponInfo {
    pub ammo_type: Option<AmmoType>,
    pub per_shot: i32,
    /// Present in the current game mode at all.
    pub available: bool,
}

impl Default for WeaponInfo {
    fn default() -> Self {
        WeaponInfo {
            ammo_type: None,
            per_shot: 0,
            available: true,
        }
    }
}

/// Selection policy for one auto-change event class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AutoSwitch {
    Never,
    IfBetter,
    Always,
}

/// User weapon preferences consulted by every auto-change event.
#[derive(Debug, Clone)]
pub struct WeaponPrefs {
    /// Most preferred first.
    pub order: Vec<WeaponType>,
    pub weapon_switch: AutoSwitch,
    pub ammo_switch: AutoSwitch,
    pub no_switch_while_firing: bool,
}

impl Default for WeaponPrefs {
    fn default() -> Self {
        WeaponPrefs {
            order: (0..NUM_WEAPON_TYPES as u8).map(WeaponType).collect(),
            weapon_switch: AutoSwitch::IfBetter,
            ammo_switch: AutoSwitch::IfBetter,
            no_switch_while_firing: false,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlayerFlags: u32 {
        /// Authoritative angle override pending client ack.
        const FIX_ANGLES = 0x0001;
        /// Authoritative position override pending client ack.
        const FIX_ORIGIN = 0x0002;
        /// Authoritative momentum override pending client ack.
        const FIX_MOM    = 0x0004;
        const DEAD       = 0x0008;
        const CAMERA     = 0x0010;
        /// Local (non-network) player.
        const LOCAL      = 0x0020;
    }
}

/// Per-axis forced-correction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixCounters {
    pub angles: i32,
    pub origin: i32,
    pub mom: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ammo {
    pub owned: i32,
    pub max: i32,
}

/// One player console. Slot 0 is the server itself.
#[derive(Debug, Clone)]
pub struct Player {
    pub in_game: bool,
    pub name: String,
    /// Client-chosen identifier, 0 when the slot is free.
    pub id: u32,
    pub mobj: Option<ThinkerId>,
    pub forward_move: f32,
    pub side_move: f32,
    pub look_dir: f32,
    /// Angle snapshot from the last sharp tick.
    pub last_angle: Angle,
    pub flags: PlayerFlags,
    pub fix_counter: FixCounters,
    pub fix_acked: FixCounters,
    pub weapons_owned: [bool; NUM_WEAPON_TYPES],
    pub ammo: [Ammo; NUM_AMMO_TYPES],
    pub ready_weapon: WeaponType,
    pub pending_weapon: Option<WeaponType>,
    /// Fire button held; gates auto-switching when configured.
    pub attack_down: bool,
}

impl Default for Player {
    fn default() -> Self {
        Player {
            in_game: false,
            name: String::new(),
            id: 0,
            mobj: None,
            forward_move: 0.0,
            side_move: 0.0,
            look_dir: 0.0,
            last_angle: 0,
            flags: PlayerFlags::empty(),
            fix_counter: FixCounters::default(),
            fix_acked: FixCounters::default(),
            weapons_owned: [false; NUM_WEAPON_TYPES],
            ammo: [Ammo::default(); NUM_AMMO_TYPES],
            ready_weapon: WeaponType(0),
            pending_weapon: None,
            attack_down: false,
        }
    }
}

impl Player {
    pub fn has_intent(&self) -> bool {
        self.forward_move != 0.0 || self.side_move != 0.0
    }

    fn enough_ammo_for(&self, info: &WeaponInfo) -> bool {
        match info.ammo_type {
            None => true,
            Some(ammo) => self.ammo[ammo.0 as usize].owned >= info.per_shot,
        }
    }
}

/// Consult the preference order after an out-of-ammo, weapon-pickup or
/// ammo-pickup event. Returns the weapon to change to, if any; also
/// records it as the player's pending weapon.
///
/// `weapon`/`ammo` describe what was just given: both `None` means the
/// current weapon ran dry.
pub fn maybe_change_weapon(
    player: &mut Player,
    weapon_info: &[WeaponInfo; NUM_WEAPON_TYPES],
    prefs: &WeaponPrefs,
    weapon: Option<WeaponType>,
    ammo: Option<AmmoType>,
    force: bool,
) -> Option<WeaponType> {
    let mut chosen: Option<WeaponType> = None;

    match (weapon, ammo) {
        (None, None) => {
            // Out of ammo: best owned, shootable candidate wins.
            for &candidate in &prefs.order {
                let info = &weapon_info[candidate.0 as usize];
                if !info.available || !player.weapons_owned[candidate.0 as usize] {
                    continue;
                }
                if player.enough_ammo_for(info) {
                    chosen = Some(candidate);
                    break;
                }
            }
        }
        (Some(new_weapon), _) => {
            // Picked up a weapon.
            if force {
                chosen = Some(new_weapon);
            } else if !(player.attack_down && prefs.no_switch_while_firing) {
                match prefs.weapon_switch {
                    AutoSwitch::Always => chosen = Some(new_weapon),
                    AutoSwitch::IfBetter => {
                        for &candidate in &prefs.order {
                            if !weapon_info[candidate.0 as usize].available {
                                continue;
                            }
                            if candidate == new_weapon {
                                // New weapon outranks the ready one.
                                chosen = Some(new_weapon);
                                break;
                            }
                            if candidate == player.ready_weapon {
                                // Ready weapon outranks it; keep it.
                                break;
                            }
                        }
                    }
                    AutoSwitch::Never => {}
                }
            }
        }
        (None, Some(new_ammo)) => {
            // Picked up ammo we were out of.
            let was_empty = player.ammo[new_ammo.0 as usize].owned <= 0;
            if (was_empty && prefs.ammo_switch != AutoSwitch::Never) || force {
                for &candidate in &prefs.order {
                    let info = &weapon_info[candidate.0 as usize];
                    if !info.available || !player.weapons_owned[candidate.0 as usize] {
                        continue;
                    }
                    if info.ammo_type != Some(new_ammo) {
                        continue;
                    }
                    match prefs.ammo_switch {
                        AutoSwitch::Always => {
                            chosen = Some(candidate);
                            break;
                        }
                        AutoSwitch::IfBetter => {
                            if candidate == player.ready_weapon {
                                // Ready weapon still outranks everything
                                // this ammo feeds.
                                break;
                            }
                            chosen = Some(candidate);
                            break;
                        }
                        AutoSwitch::Never => break,
                    }
                }
            }
        }
    }

    // Never "change" to the weapon already up.
    if chosen == Some(player.ready_weapon) {
        chosen = None;
    }
    if let Some(weapon) = chosen {
        player.pending_weapon = Some(weapon);
        log::debug!(
            "[player::maybe_change_weapon] Changing to weapon {}",
            weapon.0
        );
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loadout() -> ([WeaponInfo; NUM_WEAPON_TYPES], WeaponPrefs, Player) {
        let mut info = [WeaponInfo::default(); NUM_WEAPON_TYPES];
        // Weapon 1 eats ammo type 0, weapon 2 eats ammo type 1.
        info[1].ammo_type = Some(AmmoType(0));
        info[1].per_shot = 1;
        info[2].ammo_type = Some(AmmoType(1));
        info[2].per_shot = 1;

        let prefs = WeaponPrefs {
            // Most preferred first: 2, then 1, then fists (0).
            order: vec![WeaponType(2), WeaponType(1), WeaponType(0)],
            ..WeaponPrefs::default()
        };

        let mut player = Player::default();
        player.weapons_owned[0] = true;
        player.weapons_owned[1] = true;
        (info, prefs, player)
    }

    #[test]
    fn test_out_of_ammo_falls_back_by_preference() {
        let (info, prefs, mut player) = loadout();
        player.ready_weapon = WeaponType(1);
        player.ammo[0].owned = 0; // dry

        let chosen = maybe_change_weapon(&mut player, &info, &prefs, None, None, false);
        // Weapon 2 not owned, weapon 1 dry: fists win.
        assert_eq!(chosen, Some(WeaponType(0)));
        assert_eq!(player.pending_weapon, Some(WeaponType(0)));
    }

    #[test]
    fn test_pickup_better_weapon_switches_if_better() {
        let (info, prefs, mut player) = loadout();
        player.ready_weapon = WeaponType(1);
        player.weapons_owned[2] = true;
        player.ammo[1].owned = 10;

        let chosen =
            maybe_change_weapon(&mut player, &info, &prefs, Some(WeaponType(2)), None, false);
        assert_eq!(chosen, Some(WeaponType(2)));
    }

    #[test]
    fn test_pickup_worse_weapon_keeps_ready() {
        let (info, prefs, mut player) = loadout();
        player.ready_weapon = WeaponType(2);
        player.weapons_owned[2] = true;

        let chosen =
            maybe_change_weapon(&mut player, &info, &prefs, Some(WeaponType(1)), None, false);
        assert_eq!(chosen, None);
        assert_eq!(player.pending_weapon, None);
    }

    #[test]
    fn test_never_policy_blocks_switch() {
        let (info, mut prefs, mut player) = loadout();
        prefs.weapon_switch = AutoSwitch::Never;
        player.ready_weapon = WeaponType(0);
        player.weapons_owned[2] = true;

        let chosen =
            maybe_change_weapon(&mut player, &info, &prefs, Some(WeaponType(2)), None, false);
        assert_eq!(chosen, None);
    }

    #[test]
    fn test_ammo_pickup_when_dry_selects_user_preference() {
        let (info, prefs, mut player) = loadout();
        player.ready_weapon = WeaponType(0);
        player.ammo[0].owned = 0;

        let chosen =
            maybe_change_weapon(&mut player, &info, &prefs, None, Some(AmmoType(0)), false);
        assert_eq!(chosen, Some(WeaponType(1)));
    }

    #[test]
    fn test_firing_gate_blocks_autoswitch() {
        let (info, mut prefs, mut player) = loadout();
        prefs.no_switch_while_firing = true;
        player.attack_down = true;
        player.weapons_owned[2] = true;

        let chosen =
            maybe_change_weapon(&mut player, &info, &prefs, Some(WeaponType(2)), None, false);
        assert_eq!(chosen, None);
    }
}
