//! Proximity index over vehicle positions
//!
//! Points are bucketed into a fixed latitude/longitude grid. A radius query
//! visits only the cells covered by the circle's bounding box and confirms
//! every candidate with the Haversine distance.

use crate::config::GeoConfig;
use crate::domain::types::{GeoPoint, VehicleId};
use std::collections::HashMap;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}

type Cell = (i32, i32);

#[derive(Debug, Clone)]
pub struct GeoIndex {
    cell_size: f64,
    positions: HashMap<VehicleId, GeoPoint>,
    cells: HashMap<Cell, Vec<VehicleId>>,
}

impl GeoIndex {
    pub fn new(config: &GeoConfig) -> Self {
        Self {
            cell_size: config.cell_size_degrees,
            positions: HashMap::new(),
            cells: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, id: &VehicleId) -> Option<GeoPoint> {
        self.positions.get(id).copied()
    }

    /// Insert or move a vehicle.
    pub fn insert(&mut self, id: VehicleId, point: GeoPoint) {
        self.remove(&id);
        let cell = self.cell_of(point);
        self.cells.entry(cell).or_default().push(id);
        self.positions.insert(id, point);
    }

    pub fn remove(&mut self, id: &VehicleId) -> Option<GeoPoint> {
        let point = self.positions.remove(id)?;
        let cell = self.cell_of(point);
        if let Some(members) = self.cells.get_mut(&cell) {
            members.retain(|member| member != id);
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
        Some(point)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.cells.clear();
    }

    /// Vehicles within `radius_km` of `center` (inclusive), nearest first.
    pub fn within(&self, center: GeoPoint, radius_km: f64) -> Vec<(VehicleId, f64)> {
        let mut hits: Vec<(VehicleId, f64)> = match self.candidate_cells(center, radius_km) {
            Some(cells) => cells
                .iter()
                .filter_map(|cell| self.cells.get(cell))
                .flatten()
                .filter_map(|id| self.positions.get(id).map(|p| (*id, *p)))
                .map(|(id, p)| (id, haversine_km(center, p)))
                .filter(|(_, distance)| *distance <= radius_km)
                .collect(),
            None => self
                .positions
                .iter()
                .map(|(id, p)| (*id, haversine_km(center, *p)))
                .filter(|(_, distance)| *distance <= radius_km)
                .collect(),
        };

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        hits
    }

    fn lat_index(&self, latitude: f64) -> i32 {
        let max = (180.0 / self.cell_size).floor() as i32;
        (((latitude + 90.0) / self.cell_size).floor() as i32).clamp(0, max)
    }

    fn lon_index(&self, longitude: f64) -> i32 {
        let max = (360.0 / self.cell_size).floor() as i32;
        (((longitude + 180.0) / self.cell_size).floor() as i32).clamp(0, max)
    }

    fn cell_of(&self, point: GeoPoint) -> Cell {
        (self.lat_index(point.latitude), self.lon_index(point.longitude))
    }

    /// Cells overlapping the query's bounding box, or `None` when a full
    /// scan is cheaper or the box cannot be expressed (a pole inside the
    /// circle, or a circle spanning every longitude).
    fn candidate_cells(&self, center: GeoPoint, radius_km: f64) -> Option<Vec<Cell>> {
        let angular = radius_km / EARTH_RADIUS_KM;
        let d_lat = angular.to_degrees();
        let lat_min = center.latitude - d_lat;
        let lat_max = center.latitude + d_lat;
        if lat_min <= -90.0 || lat_max >= 90.0 {
            return None;
        }

        let d_lon = (angular.sin() / center.latitude.to_radians().cos())
            .asin()
            .to_degrees();
        if !d_lon.is_finite() || d_lon >= 180.0 {
            return None;
        }

        let lon_min = center.longitude - d_lon;
        let lon_max = center.longitude + d_lon;
        let lon_ranges = if lon_min < -180.0 {
            vec![(lon_min + 360.0, 180.0), (-180.0, lon_max)]
        } else if lon_max > 180.0 {
            vec![(lon_min, 180.0), (-180.0, lon_max - 360.0)]
        } else {
            vec![(lon_min, lon_max)]
        };

        let lat_span = self.lat_index(lat_min)..=self.lat_index(lat_max);
        let lon_spans: Vec<_> = lon_ranges
            .iter()
            .map(|(lo, hi)| self.lon_index(*lo)..=self.lon_index(*hi))
            .collect();

        let cell_count = lon_spans
            .iter()
            .map(|span| span.clone().count())
            .sum::<usize>()
            * lat_span.clone().count();
        if cell_count > self.cells.len().max(1) * 4 {
            return None;
        }

        let mut cells = Vec::with_capacity(cell_count);
        for lat in lat_span {
            for span in &lon_spans {
                for lon in span.clone() {
                    cells.push((lat, lon));
                }
            }
        }
        cells.sort_unstable();
        cells.dedup();
        Some(cells)
    }
}
