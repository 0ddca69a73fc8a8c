use crate::geo::LatLon;

pub const DEFAULT_MIN_SEPARATION_M: f64 = 1.5;

/// Breadcrumb trail of the vehicle during one mission run.
///
/// Points closer than `min_separation_m` to the previous point are GPS jitter
/// and never grow the path.
#[derive(Debug, Clone)]
pub struct MissionPathTracker {
    min_separation_m: f64,
    active: bool,
    points: Vec<LatLon>,
}

impl Default for MissionPathTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SEPARATION_M)
    }
}

impl MissionPathTracker {
    pub fn new(min_separation_m: f64) -> Self {
        Self { min_separation_m, active: false, points: Vec::new() }
    }

    pub fn on_mission_start(&mut self) {
        self.points.clear();
        self.active = true;
    }

    /// Stops accumulating; the finished path stays readable until the next start.
    pub fn on_mission_end(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true when the position was appended.
    pub fn on_position(&mut self, lat: f64, lon: f64) -> bool {
        if !self.active {
            return false;
        }
        let p = LatLon::new(lat, lon);
        if !p.is_valid() {
            return false;
        }
        match self.points.last() {
            Some(last) if last.distance_m(&p) < self.min_separation_m => false,
            _ => {
                self.points.push(p);
                true
            }
        }
    }

    pub fn points(&self) -> &[LatLon] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ~1.11 m per 1e-5 degree of latitude
    const STEP_1M: f64 = 0.9e-5;
    const STEP_2M: f64 = 1.8e-5;

    #[test]
    fn inactive_tracker_ignores_positions() {
        let mut t = MissionPathTracker::default();
        for i in 0..10 {
            assert!(!t.on_position(37.0 + i as f64 * 0.001, -122.0));
        }
        assert!(t.points().is_empty());
    }

    #[test]
    fn drops_jitter_and_keeps_order() {
        let mut t = MissionPathTracker::default();
        t.on_mission_start();

        assert!(t.on_position(37.0, -122.0));
        assert!(!t.on_position(37.0 + STEP_1M, -122.0));
        assert!(t.on_position(37.0 + STEP_2M, -122.0));
        assert!(!t.on_position(37.0 + STEP_2M + STEP_1M, -122.0));
        assert!(t.on_position(37.0 + 2.0 * STEP_2M, -122.0));

        let lats: Vec<f64> = t.points().iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![37.0, 37.0 + STEP_2M, 37.0 + 2.0 * STEP_2M]);
        for pair in t.points().windows(2) {
            assert!(pair[0].distance_m(&pair[1]) >= DEFAULT_MIN_SEPARATION_M);
        }
    }

    #[test]
    fn restart_clears_and_end_freezes() {
        let mut t = MissionPathTracker::default();
        t.on_mission_start();
        t.on_position(37.0, -122.0);
        t.on_mission_end();
        assert!(!t.on_position(38.0, -122.0));
        assert_eq!(t.points().len(), 1);

        t.on_mission_start();
        assert!(t.points().is_empty());
        assert!(t.is_active());
    }

    #[test]
    fn ignores_non_finite_positions() {
        let mut t = MissionPathTracker::default();
        t.on_mission_start();
        assert!(!t.on_position(f64::NAN, -122.0));
        assert!(t.points().is_empty());
    }
}
