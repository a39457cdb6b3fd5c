//! Storage layer of the JUG site backend
//!
//! Contains the database entities of the event registration core and the
//! embedded database migrations.

#[macro_use]
extern crate diesel;

#[macro_use]
mod macros;

mod schema;

pub mod events;
pub mod migrations;
pub mod registrations;
