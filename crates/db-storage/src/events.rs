//! Event entity of the community site
//!
//! An event is a talk or a meetup the JUG hosts. Guests can register for an
//! event as long as it requires a registration and is still open.
use crate::schema::events;
use chrono::{DateTime, Utc};
use database::{DbConnection, Paginate, Result};
use diesel::prelude::*;

diesel_newtype! {
    #[derive(Copy)] EventId(i32) => diesel::sql_types::Integer
}

sql_enum! {
    /// The kind of an event
    EventKind, {
        Talk => "talk",
        Meetup => "meetup",
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Talk
    }
}

sql_enum! {
    /// Lifecycle state of the registration window
    ///
    /// Closing an event stops further registrations regardless of its date.
    EventStatus, {
        Open => "open",
        Closed => "closed",
    }
}

impl Default for EventStatus {
    fn default() -> Self {
        Self::Open
    }
}

/// Diesel event struct
///
/// Represents an event in the database
#[derive(Debug, Clone, Identifiable, Queryable)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: EventId,
    pub held_on: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub needs_registration: bool,
    pub kind: EventKind,
    pub duration: Option<i32>,
    pub speaker: Option<String>,
    pub location: Option<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether a guest may register for this event at the instant `now`
    ///
    /// An event accepts registrations while it is open and lies in the
    /// future. The caller provides `now`, the result is never cached.
    pub fn is_open_for_registration(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Open && self.held_on > now
    }

    /// Returns the event with the given id
    #[tracing::instrument(err, skip_all)]
    pub fn get(conn: &mut DbConnection, event_id: EventId) -> Result<Event> {
        let event = events::table
            .filter(events::id.eq(event_id))
            .get_result(conn)?;

        Ok(event)
    }

    /// Returns a page of all events, newest first
    #[tracing::instrument(err, skip_all)]
    pub fn get_all_paginated(
        conn: &mut DbConnection,
        limit: i64,
        page: i64,
    ) -> Result<(Vec<Event>, i64)> {
        let query = events::table
            .order(events::held_on.desc())
            .then_order_by(events::id.desc())
            .paginate_by(limit, page);

        let events_with_total = query.load_and_count(conn)?;

        Ok(events_with_total)
    }
}

/// Diesel insertable event struct
///
/// Represents fields that have to be provided on event insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub held_on: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub needs_registration: bool,
    pub kind: EventKind,
    pub duration: Option<i32>,
    pub speaker: Option<String>,
    pub location: Option<String>,
    pub status: EventStatus,
}

impl NewEvent {
    /// Tries to insert the event into the database
    ///
    /// Events are unique over their date and name. When yielding a unique
    /// key violation, None is returned.
    #[tracing::instrument(err, skip_all)]
    pub fn try_insert(self, conn: &mut DbConnection) -> Result<Option<Event>> {
        let query = self.insert_into(events::table);

        let result = query.get_result(conn);

        match result {
            Ok(event) => Ok(Some(event)),
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                ..,
            )) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Diesel event struct for updates
///
/// Is used in update queries. None fields will be ignored on update queries.
/// The event's date and name stay immutable once created.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = events)]
pub struct UpdateEvent {
    pub description: Option<String>,
    pub needs_registration: Option<bool>,
    pub kind: Option<EventKind>,
    pub duration: Option<Option<i32>>,
    pub speaker: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub status: Option<EventStatus>,
}

impl UpdateEvent {
    /// Applies the update to the given event and returns the updated event
    #[tracing::instrument(err, skip_all)]
    pub fn apply(self, conn: &mut DbConnection, event_id: EventId) -> Result<Event> {
        let target = events::table.filter(events::id.eq(event_id));
        let event = diesel::update(target).set(self).get_result(conn)?;

        Ok(event)
    }
}
