use gcs_nav::LatLon;

/// Operator-drawn shapes. Each kind holds at most one shape; drawing a new one
/// replaces the previous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometrySelection {
    point: Option<LatLon>,
    polygon: Option<Vec<Vec<LatLon>>>,
    polyline: Option<Vec<LatLon>>,
}

impl GeometrySelection {
    pub fn set_point(&mut self, p: LatLon) {
        self.point = Some(p);
    }

    /// A polygon as a list of rings; only the outer (first) ring is flown.
    pub fn set_polygon(&mut self, rings: Vec<Vec<LatLon>>) {
        self.polygon = Some(rings);
    }

    pub fn set_polyline(&mut self, vertices: Vec<LatLon>) {
        self.polyline = Some(vertices);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn point(&self) -> Option<LatLon> {
        self.point
    }

    pub fn polygon_ring(&self) -> Option<&[LatLon]> {
        self.polygon.as_ref().and_then(|rings| rings.first()).map(Vec::as_slice)
    }

    pub fn polyline(&self) -> Option<&[LatLon]> {
        self.polyline.as_deref()
    }
}
