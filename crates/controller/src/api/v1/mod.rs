//! REST API v1
//!
//! Current Endpoints. See their respective function:
//! - `/events` ([GET](events::get_events), [POST](events::new_event))
//! - `/events/{event_id}` ([GET](events::get_event), [PATCH](events::patch_event))
//! - `/events/{event_id}/registrations` ([GET](events::get_registrations),
//!   [POST](events::register), [DELETE](events::delete_registrations))

pub use request::PagePaginationQuery;
pub use response::{ApiResponse, DefaultApiResult};

pub mod events;
mod request;
pub mod response;
