pub mod lot;
pub mod ticket;

pub use lot::{GeoPoint, LotStatus, LotUpdate, NearbyLot, NewParkingLot, Occupancy, ParkingLot};
pub use ticket::{
    ActiveParking, NewTicket, OpenTicketRequest, ParkingHistoryEntry, PlateStatus, Ticket,
    TicketEstimate, TicketQuery, TicketStatus,
};
