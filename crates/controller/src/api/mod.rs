//! The REST API of the controller
pub mod v1;
