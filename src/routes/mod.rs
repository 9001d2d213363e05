use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers};
use crate::handlers::{health_check, lots, tickets};
use crate::AppState;

pub fn create_routes(state: AppState) -> Router {
    let lot_routes = Router::new()
        .route("/lots", post(lots::register_lot).get(lots::list_lots))
        .route(
            "/lots/:lot_id",
            get(lots::get_lot)
                .patch(lots::update_lot)
                .delete(lots::delete_lot),
        )
        .route("/lots/:lot_id/status", put(lots::set_lot_status))
        .route("/lots/:lot_id/occupancy", get(lots::occupancy))
        .route("/lots/:lot_id/reconcile", post(lots::reconcile_lot))
        .route("/lots/:lot_id/staff", post(lots::assign_staff))
        .route(
            "/lots/:lot_id/staff/:staff_id",
            delete(lots::remove_staff),
        )
        .route("/nearby", get(lots::nearby_lots))
        .route("/staff/me/lot", get(lots::my_staff_lot));

    let ticket_routes = Router::new()
        .route(
            "/lots/:lot_id/tickets",
            post(tickets::open_ticket).get(tickets::list_tickets),
        )
        .route("/lots/:lot_id/tickets/:ticket_id", get(tickets::get_ticket))
        .route(
            "/lots/:lot_id/tickets/:ticket_id/estimate",
            get(tickets::estimate),
        )
        .route(
            "/lots/:lot_id/tickets/:ticket_id/checkout",
            post(tickets::checkout),
        )
        .route("/plates/:plate/status", get(tickets::plate_status));

    let router = Router::new()
        .route("/health", get(health_check))
        .merge(lot_routes)
        .merge(ticket_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    create_security_headers()
        .apply(router)
        .layer(create_cors_layer())
}
