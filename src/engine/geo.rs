use crate::models::{GeoPoint, NearbyLot, ParkingLot};

const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DEFAULT_NEARBY_LIMIT: usize = 5;
pub const MAX_NEARBY_LIMIT: usize = 50;

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn nearest(origin: GeoPoint, lots: Vec<ParkingLot>, limit: usize) -> Vec<NearbyLot> {
    let mut ranked: Vec<NearbyLot> = lots
        .into_iter()
        .map(|lot| NearbyLot {
            distance_km: distance_km(origin, lot.location),
            lot,
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(limit);
    ranked
}
