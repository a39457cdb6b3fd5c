//! Registration entity of the community site
//!
//! A registration is the intent of a guest to attend a single event. There is
//! at most one registration per event and e-mail address, enforced by a
//! unique constraint over `(event_id, email)`. The e-mail address is stored
//! lower-cased by the registration service.
use crate::events::{Event, EventId};
use crate::schema::{events, registrations};
use chrono::{DateTime, Utc};
use database::{DbConnection, Paginate, Result};
use diesel::prelude::*;

diesel_newtype! {
    #[derive(Copy)] RegistrationId(i32) => diesel::sql_types::Integer
}

/// Diesel registration struct
///
/// Represents a registration in the database
#[derive(Debug, Clone, Associations, Identifiable, Queryable)]
#[diesel(table_name = registrations, belongs_to(Event))]
pub struct Registration {
    pub id: RegistrationId,
    pub event_id: EventId,
    pub email: String,
    pub name: String,
    pub first_name: Option<String>,
    pub subscribe_to_newsletter: bool,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// Returns the registration of `email` for the given event
    #[tracing::instrument(err, skip_all)]
    pub fn get_for_event_and_email(
        conn: &mut DbConnection,
        event_id: EventId,
        email: &str,
    ) -> Result<Registration> {
        let registration = registrations::table
            .filter(
                registrations::event_id
                    .eq(event_id)
                    .and(registrations::email.eq(email)),
            )
            .get_result(conn)?;

        Ok(registration)
    }

    /// Returns a page of the registrations for the given event
    #[tracing::instrument(err, skip_all)]
    pub fn get_for_event_paginated(
        conn: &mut DbConnection,
        event_id: EventId,
        limit: i64,
        page: i64,
    ) -> Result<(Vec<Registration>, i64)> {
        let query = registrations::table
            .filter(registrations::event_id.eq(event_id))
            .order(registrations::created_at.desc())
            .then_order_by(registrations::email.desc())
            .paginate_by(limit, page);

        let registrations_with_total = query.load_and_count(conn)?;

        Ok(registrations_with_total)
    }

    /// Counts the registrations that exist for the given event
    #[tracing::instrument(err, skip_all)]
    pub fn count_for_event(conn: &mut DbConnection, event_id: EventId) -> Result<i64> {
        let count = registrations::table
            .filter(registrations::event_id.eq(event_id))
            .count()
            .get_result(conn)?;

        Ok(count)
    }

    /// Deletes all registrations of the given event
    #[tracing::instrument(err, skip_all)]
    pub fn delete_for_event(conn: &mut DbConnection, event_id: EventId) -> Result<usize> {
        let affected =
            diesel::delete(registrations::table.filter(registrations::event_id.eq(event_id)))
                .execute(conn)?;

        Ok(affected)
    }

    /// Deletes the registrations of all events that were held before `now`
    ///
    /// A single bulk statement, the expiry job runs this once a day.
    #[tracing::instrument(err, skip_all)]
    pub fn delete_from_expired_events(conn: &mut DbConnection, now: DateTime<Utc>) -> Result<usize> {
        let expired_events = events::table
            .filter(events::held_on.lt(now))
            .select(events::id);

        let affected = diesel::delete(
            registrations::table.filter(registrations::event_id.eq_any(expired_events)),
        )
        .execute(conn)?;

        Ok(affected)
    }
}

/// Diesel insertable registration struct
///
/// Represents fields that have to be provided on registration insertion
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = registrations)]
pub struct NewRegistration {
    pub event_id: EventId,
    pub email: String,
    pub name: String,
    pub first_name: Option<String>,
    pub subscribe_to_newsletter: bool,
}

impl NewRegistration {
    /// Tries to insert the registration into the database
    ///
    /// When yielding a unique key violation, None is returned. The caller
    /// treats that as a concurrent duplicate submission.
    #[tracing::instrument(err, skip_all)]
    pub fn try_insert(self, conn: &mut DbConnection) -> Result<Option<Registration>> {
        let query = self.insert_into(registrations::table);

        let result = query.get_result(conn);

        match result {
            Ok(registration) => Ok(Some(registration)),
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                ..,
            )) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
