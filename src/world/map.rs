//! Static map geometry: sectors, lines, sides and BSP subspaces, plus
//! the material dictionary shared with clients.

use rustc_hash::FxHashMap;

use crate::fixed::Fixed;
use crate::world::thinker::ThinkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubspaceId(pub u32);

/// Interned material reference. Id 0 is the missing material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialId(pub u16);

/// Name <-> id dictionary for materials. Ids are dense and stable for
/// the session; the server ships the whole table during the handshake.
#[derive(Debug, Default, Clone)]
pub struct MaterialDict {
    names: Vec<String>,
    by_name: FxHashMap<String, MaterialId>,
}

impl MaterialDict {
    pub fn new() -> MaterialDict {
        let mut dict = MaterialDict {
            names: Vec::new(),
            by_name: FxHashMap::default(),
        };
        dict.intern("-"); // Id 0: no material.
        dict
    }

    pub fn intern(&mut self, name: &str) -> MaterialId {
        let key = name.to_ascii_uppercase();
        if let Some(&id) = self.by_name.get(&key) {
            return id;
        }
        let id = MaterialId(self.names.len() as u16);
        self.names.push(key.clone());
        self.by_name.insert(key, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn name_of(&self, id: MaterialId) -> Option<&str> {
        self.names.get(id.0 as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Sector {
    pub floor_height: Fixed,
    pub ceiling_height: Fixed,
    pub floor_material: MaterialId,
    pub ceiling_material: MaterialId,
    /// 0..=1 sector brightness.
    pub light_level: f32,
    pub special: i16,
    pub tag: i16,
    /// The active plane mover, at most one per sector.
    pub special_data: Option<ThinkerId>,
    pub floor_sky: bool,
    pub ceiling_sky: bool,
}

impl Sector {
    pub fn new(floor: f64, ceiling: f64) -> Sector {
        Sector {
            floor_height: Fixed::from_float(floor),
            ceiling_height: Fixed::from_float(ceiling),
            floor_material: MaterialId(0),
            ceiling_material: MaterialId(0),
            light_level: 1.0,
            special: 0,
            tag: 0,
            special_data: None,
            floor_sky: false,
            ceiling_sky: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Side {
    pub top_material: MaterialId,
    pub middle_material: MaterialId,
    pub bottom_material: MaterialId,
    pub offset_x: f32,
    pub offset_y: f32,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineFlags: u32 {
        const BLOCKING = 0x0001;
        const TWO_SIDED = 0x0004;
        const DONT_PEG_TOP = 0x0008;
        const DONT_PEG_BOTTOM = 0x0010;
        const SECRET = 0x0020;
    }
}

#[derive(Debug, Clone)]
pub struct Line {
    pub v1: (Fixed, Fixed),
    pub v2: (Fixed, Fixed),
    pub front_sector: SectorId,
    pub back_sector: Option<SectorId>,
    pub front_side: Side,
    pub back_side: Option<Side>,
    pub flags: LineFlags,
    pub special: i16,
    pub tag: i16,
    /// Script-settable special arguments.
    pub args: [u8; 5],
}

impl Line {
    pub fn direction(&self) -> (Fixed, Fixed) {
        (self.v2.0 - self.v1.0, self.v2.1 - self.v1.1)
    }

    pub fn bounds(&self) -> (Fixed, Fixed, Fixed, Fixed) {
        (
            self.v1.0.min(self.v2.0),
            self.v1.1.min(self.v2.1),
            self.v1.0.max(self.v2.0),
            self.v1.1.max(self.v2.1),
        )
    }

    /// Which side of the line the point is on: false = front (left of
    /// the direction vector), true = back.
    pub fn point_on_side(&self, x: Fixed, y: Fixed) -> bool {
        let (dx, dy) = self.direction();
        let px = x - self.v1.0;
        let py = y - self.v1.1;
        // Cross product sign in float to dodge fixed overflow.
        dx.to_float() * py.to_float() - dy.to_float() * px.to_float() < 0.0
    }

    pub fn is_one_sided(&self) -> bool {
        self.back_sector.is_none()
    }
}

/// A convex BSP leaf. Subspaces without geometry exist in degenerate
/// maps; particles refuse to live in them.
#[derive(Debug, Clone)]
pub struct Subspace {
    pub sector: SectorId,
    /// World-space bounds (min_x, min_y, max_x, max_y).
    pub bounds: (f32, f32, f32, f32),
    pub has_geometry: bool,
}

impl Subspace {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.bounds.0 && x <= self.bounds.2 && y >= self.bounds.1 && y <= self.bounds.3
    }
}

/// The loaded map: geometry only; live state is in the thinker arena.
pub struct Map {
    pub sectors: Vec<Sector>,
    pub lines: Vec<Line>,
    pub subspaces: Vec<Subspace>,
    pub materials: MaterialDict,
    /// World gravity in map units per tick squared.
    pub gravity: Fixed,
    /// Identity of the loaded map, e.g. `E1M1` or `MAP01`.
    pub id: String,
}

impl Map {
    pub fn empty(id: &str) -> Map {
        Map {
            sectors: Vec::new(),
            lines: Vec::new(),
            subspaces: Vec::new(),
            materials: MaterialDict::new(),
            gravity: Fixed::from_float(crate::constants::physics::GRAVITY),
            id: id.to_string(),
        }
    }

    pub fn sector(&self, id: SectorId) -> &Sector {
        &self.sectors[id.0 as usize]
    }

    pub fn sector_mut(&mut self, id: SectorId) -> &mut Sector {
        &mut self.sectors[id.0 as usize]
    }

    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id.0 as usize]
    }

    pub fn line_mut(&mut self, id: LineId) -> &mut Line {
        &mut self.lines[id.0 as usize]
    }

    /// The convex leaf containing a point, if any.
    pub fn subspace_at(&self, x: Fixed, y: Fixed) -> Option<SubspaceId> {
        let (fx, fy) = (x.to_float() as f32, y.to_float() as f32);
        self.subspaces
            .iter()
            .position(|s| s.contains(fx, fy))
            .map(|i| SubspaceId(i as u32))
    }

    pub fn sector_at(&self, x: Fixed, y: Fixed) -> Option<SectorId> {
        self.subspace_at(x, y)
            .map(|s| self.subspaces[s.0 as usize].sector)
    }

    /// Line ids whose bounds intersect the given box.
    pub fn lines_in_box(
        &self,
        min_x: Fixed,
        min_y: Fixed,
        max_x: Fixed,
        max_y: Fixed,
    ) -> Vec<LineId> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                let (lx1, ly1, lx2, ly2) = line.bounds();
                !(max_x <= lx1 || min_x >= lx2 || max_y <= ly1 || min_y >= ly2)
            })
            .map(|(i, _)| LineId(i as u32))
            .collect()
    }

    pub fn sectors_with_tag(&self, tag: i16) -> Vec<SectorId> {
        self.sectors
            .iter()
            .enumerate()
            .filter(|(_, s)| s.tag == tag)
            .map(|(i, _)| SectorId(i as u32))
            .collect()
    }

    pub fn lines_with_tag(&self, tag: i16) -> Vec<LineId> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.tag == tag)
            .map(|(i, _)| LineId(i as u32))
            .collect()
    }

    /// Crude world bounds of a sector, from the lines that front it.
    pub fn sector_bounds(&self, id: SectorId) -> Option<(f32, f32, f32, f32)> {
        let mut bounds: Option<(Fixed, Fixed, Fixed, Fixed)> = None;
        for line in self.lines.iter().filter(|l| {
            l.front_sector == id || l.back_sector == Some(id)
        }) {
            let (lx1, ly1, lx2, ly2) = line.bounds();
            bounds = Some(match bounds {
                None => (lx1, ly1, lx2, ly2),
                Some((ax1, ay1, ax2, ay2)) => {
                    (ax1.min(lx1), ay1.min(ly1), ax2.max(lx2), ay2.max(ly2))
                }
            });
        }
        bounds.map(|(a, b, c, d)| {
            (
                a.to_float() as f32,
                b.to_float() as f32,
                c.to_float() as f32,
                d.to_float() as f32,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_along_y(x: f64) -> Line {
        Line {
            v1: (Fixed::from_float(x), Fixed::from_int(-128)),
            v2: (Fixed::from_float(x), Fixed::from_int(128)),
            front_sector: SectorId(0),
            back_sector: None,
            front_side: Side::default(),
            back_side: None,
            flags: LineFlags::BLOCKING,
            special: 0,
            tag: 0,
            args: [0; 5],
        }
    }

    #[test]
    fn test_point_on_side_flips_across_line() {
        let line = line_along_y(105.0);
        let left = line.point_on_side(Fixed::from_int(100), Fixed::from_int(0));
        let right = line.point_on_side(Fixed::from_int(110), Fixed::from_int(0));
        assert_ne!(left, right);
    }

    #[test]
    fn test_lines_in_box_filters_by_bounds() {
        let mut map = Map::empty("TEST");
        map.lines.push(line_along_y(105.0));
        map.lines.push(line_along_y(500.0));

        let hits = map.lines_in_box(
            Fixed::from_int(90),
            Fixed::from_int(-10),
            Fixed::from_int(120),
            Fixed::from_int(10),
        );
        assert_eq!(hits, vec![LineId(0)]);
    }

    #[test]
    fn test_material_dict_interning() {
        let mut dict = MaterialDict::new();
        let a = dict.intern("FLOOR4_8");
        let b = dict.intern("floor4_8");
        assert_eq!(a, b);
        assert_eq!(dict.name_of(a), Some("FLOOR4_8"));
        assert!(dict.lookup("missing").is_none());
    }

    #[test]
    fn test_sector_and_subspace_lookup() {
        let mut map = Map::empty("TEST");
        map.sectors.push(Sector::new(0.0, 128.0));
        map.subspaces.push(Subspace {
            sector: SectorId(0),
            bounds: (0.0, 0.0, 256.0, 256.0),
            has_geometry: true,
        });

        assert_eq!(
            map.sector_at(Fixed::from_int(10), Fixed::from_int(10)),
            Some(SectorId(0))
        );
        assert_eq!(map.sector_at(Fixed::from_int(-10), Fixed::from_int(10)), None);
    }
}
