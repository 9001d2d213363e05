use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lot_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParkingLot {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    #[sqlx(flatten)]
    pub location: GeoPoint,
    pub total_spots: i32,
    pub available_spots: i32,
    pub hourly_price: Decimal,
    pub owner_id: String,
    /// Upper-cased plates of vehicles currently parked.
    pub active_vehicles: Vec<String>,
    pub staff_ids: Vec<String>,
    pub bank_id: Option<String>,
    pub bank_account: Option<String>,
    pub image_urls: Vec<String>,
    pub status: LotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParkingLot {
    pub fn occupied_spots(&self) -> i32 {
        self.total_spots - self.available_spots
    }

    pub fn is_staffed_by(&self, identity: &str) -> bool {
        self.owner_id == identity || self.staff_ids.iter().any(|s| s == identity)
    }
}

/// Registration payload sent by a lot owner.
#[derive(Debug, Clone, Deserialize)]
pub struct NewParkingLot {
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub total_spots: i32,
    pub hourly_price: Decimal,
    pub bank_id: Option<String>,
    pub bank_account: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Partial edit of a lot. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub location: Option<GeoPoint>,
    pub total_spots: Option<i32>,
    pub hourly_price: Option<Decimal>,
    pub bank_id: Option<String>,
    pub bank_account: Option<String>,
    pub image_urls: Option<Vec<String>>,
}

impl LotUpdate {
    /// Applies every present field except `total_spots`, which needs the
    /// active ticket count and is handled by the store.
    pub fn apply_details(&self, lot: &mut ParkingLot) {
        if let Some(name) = &self.name {
            lot.name = name.clone();
        }
        if let Some(address) = &self.address {
            lot.address = address.clone();
        }
        if let Some(description) = &self.description {
            lot.description = Some(description.clone());
        }
        if let Some(location) = self.location {
            lot.location = location;
        }
        if let Some(price) = self.hourly_price {
            lot.hourly_price = price;
        }
        if let Some(bank_id) = &self.bank_id {
            lot.bank_id = Some(bank_id.clone());
        }
        if let Some(bank_account) = &self.bank_account {
            lot.bank_account = Some(bank_account.clone());
        }
        if let Some(urls) = &self.image_urls {
            lot.image_urls = urls.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Occupancy {
    pub lot_id: Uuid,
    pub total_spots: i32,
    pub available_spots: i32,
    pub occupied_spots: i32,
    pub active_vehicles: Vec<String>,
}

impl From<&ParkingLot> for Occupancy {
    fn from(lot: &ParkingLot) -> Self {
        Self {
            lot_id: lot.id,
            total_spots: lot.total_spots,
            available_spots: lot.available_spots,
            occupied_spots: lot.occupied_spots(),
            active_vehicles: lot.active_vehicles.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyLot {
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub distance_km: f64,
}
