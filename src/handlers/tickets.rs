use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use super::identity::ActingUser;
use crate::models::{OpenTicketRequest, TicketQuery};
use crate::utils::error::AppError;
use crate::utils::response::{created, success};
use crate::AppState;

pub async fn open_ticket(
    State(state): State<AppState>,
    ActingUser(staff): ActingUser,
    Path(lot_id): Path<Uuid>,
    Json(request): Json<OpenTicketRequest>,
) -> Result<Response, AppError> {
    let ticket = state
        .engine
        .open_ticket(lot_id, &request.license_plate, &staff, request.customer_id)
        .await?;
    Ok(created(ticket, "Ticket opened"))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<TicketQuery>,
) -> Result<Response, AppError> {
    let tickets = state.engine.list_tickets(lot_id, &query).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path((lot_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let ticket = state.engine.get_ticket(lot_id, ticket_id).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn estimate(
    State(state): State<AppState>,
    Path((lot_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let estimate = state.engine.estimate(lot_id, ticket_id).await?;
    Ok(success(estimate, "Fee estimated"))
}

pub async fn checkout(
    State(state): State<AppState>,
    ActingUser(staff): ActingUser,
    Path((lot_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let ticket = state.engine.checkout(lot_id, ticket_id, &staff).await?;
    Ok(success(ticket, "Vehicle checked out"))
}

pub async fn plate_status(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> Result<Response, AppError> {
    let status = state.engine.plate_status(&plate).await?;
    Ok(success(status, "Parking status retrieved"))
}
