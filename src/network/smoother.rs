//! Client position smoothing: a small buffer of timestamped coordinates
//! consumed as the server-side representation of a client advances.

const SMOOTHER_POINTS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct SmootherPoint {
    pub time: f32,
    pub pos: [f64; 3],
    pub on_floor: bool,
}

/// Ring of recent client-reported positions, tagged with the client's
/// game time.
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    points: Vec<SmootherPoint>,
    /// Server-side playhead along the client timeline.
    now: f32,
}

impl Smoother {
    pub fn new() -> Smoother {
        Smoother::default()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.now = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Admit a client-reported position. Out-of-order times are dropped.
    pub fn add_pos(&mut self, time: f32, x: f64, y: f64, z: f64, on_floor: bool) {
        if let Some(last) = self.points.last() {
            if time <= last.time {
                return;
            }
        }
        if self.points.len() == SMOOTHER_POINTS {
            self.points.remove(0);
        }
        self.points.push(SmootherPoint {
            time,
            pos: [x, y, z],
            on_floor,
        });
    }

    /// Advance the playhead and return the interpolated position.
    pub fn advance(&mut self, delta: f32) -> Option<SmootherPoint> {
        let last = *self.points.last()?;
        if self.points.len() == 1 {
            self.now = last.time;
            return Some(last);
        }

        self.now = (self.now + delta).clamp(self.points[0].time, last.time);

        let mut prev = self.points[0];
        for &point in &self.points[1..] {
            if self.now <= point.time {
                let span = point.time - prev.time;
                let t = if span > 0.0 {
                    (self.now - prev.time) / span
                } else {
                    1.0
                };
                let lerp = |a: f64, b: f64| a + (b - a) * t as f64;
                return Some(SmootherPoint {
                    time: self.now,
                    pos: [
                        lerp(prev.pos[0], point.pos[0]),
                        lerp(prev.pos[1], point.pos[1]),
                        lerp(prev.pos[2], point.pos[2]),
                    ],
                    on_floor: point.on_floor,
                });
            }
            prev = point;
        }
        Some(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_points_dropped() {
        let mut s = Smoother::new();
        s.add_pos(2.0, 0.0, 0.0, 0.0, true);
        s.add_pos(1.0, 9.0, 9.0, 9.0, true);
        assert_eq!(s.points.len(), 1);
    }

    #[test]
    fn test_interpolates_between_points() {
        let mut s = Smoother::new();
        s.add_pos(0.0, 0.0, 0.0, 0.0, true);
        s.add_pos(1.0, 10.0, 0.0, 0.0, true);
        s.now = 0.0;
        let p = s.advance(0.5).unwrap();
        assert!((p.pos[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamps_at_latest() {
        let mut s = Smoother::new();
        s.add_pos(0.0, 0.0, 0.0, 0.0, true);
        s.add_pos(1.0, 10.0, 0.0, 0.0, true);
        let p = s.advance(100.0).unwrap();
        assert_eq!(p.pos[0], 10.0);
    }
}
