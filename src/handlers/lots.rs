use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::identity::ActingUser;
use crate::models::{GeoPoint, LotStatus, LotUpdate, NewParkingLot};
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LotListQuery {
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: LotStatus,
}

#[derive(Debug, Deserialize)]
pub struct StaffAssignment {
    pub staff_id: String,
}

pub async fn register_lot(
    State(state): State<AppState>,
    ActingUser(owner): ActingUser,
    Json(payload): Json<NewParkingLot>,
) -> Result<Response, AppError> {
    let lot = state.engine.register_lot(&owner, payload).await?;
    Ok(created(lot, "Parking lot registered"))
}

pub async fn list_lots(
    State(state): State<AppState>,
    Query(query): Query<LotListQuery>,
) -> Result<Response, AppError> {
    let lots = state.engine.list_lots(query.owner_id.as_deref()).await?;
    Ok(success(lots, "Parking lots retrieved"))
}

pub async fn nearby_lots(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Response, AppError> {
    if query.limit == Some(0) {
        return Err(AppError::ValidationError(
            "limit must be at least 1".to_string(),
        ));
    }
    let origin = GeoPoint {
        latitude: query.lat,
        longitude: query.lng,
    };
    let lots = state.engine.nearest_lots(origin, query.limit).await?;
    Ok(success(lots, "Nearby parking lots retrieved"))
}

pub async fn get_lot(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let lot = state.engine.get_lot(lot_id).await?;
    Ok(success(lot, "Parking lot retrieved"))
}

pub async fn update_lot(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(lot_id): Path<Uuid>,
    Json(update): Json<LotUpdate>,
) -> Result<Response, AppError> {
    let lot = state.engine.update_lot(lot_id, &actor, update).await?;
    Ok(success(lot, "Parking lot updated"))
}

pub async fn delete_lot(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(lot_id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.engine.delete_lot(lot_id, &actor).await?;
    Ok(empty_success("Parking lot deleted"))
}

pub async fn set_lot_status(
    State(state): State<AppState>,
    ActingUser(_actor): ActingUser,
    Path(lot_id): Path<Uuid>,
    Json(change): Json<StatusChange>,
) -> Result<Response, AppError> {
    let lot = state.engine.set_lot_status(lot_id, change.status).await?;
    Ok(success(lot, "Parking lot status updated"))
}

pub async fn occupancy(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let occupancy = state.engine.occupancy(lot_id).await?;
    Ok(success(occupancy, "Occupancy retrieved"))
}

pub async fn assign_staff(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(lot_id): Path<Uuid>,
    Json(assignment): Json<StaffAssignment>,
) -> Result<Response, AppError> {
    let lot = state
        .engine
        .assign_staff(lot_id, &actor, &assignment.staff_id)
        .await?;
    Ok(success(lot, "Staff assigned"))
}

pub async fn remove_staff(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path((lot_id, staff_id)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let lot = state.engine.remove_staff(lot_id, &actor, &staff_id).await?;
    Ok(success(lot, "Staff removed"))
}

pub async fn my_staff_lot(
    State(state): State<AppState>,
    ActingUser(staff): ActingUser,
) -> Result<Response, AppError> {
    let lot = state
        .engine
        .lot_for_staff(&staff)
        .await?
        .ok_or_else(|| AppError::NotFound("You are not assigned to any parking lot".to_string()))?;
    Ok(success(lot, "Assigned parking lot retrieved"))
}

pub async fn reconcile_lot(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(lot_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let report = state.engine.reconcile_owned_lot(lot_id, &actor).await?;
    Ok(success(report, "Parking lot reconciled"))
}
