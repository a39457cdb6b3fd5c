//! Event related API structs and Endpoints
//!
//! The defined structs are exposed to the REST API and will be serialized/deserialized. Similar
//! structs are defined in the Database module [`db_storage`] for database operations.
use super::request::PagePaginationQuery;
use super::response::{ApiError, ApiResponse, DefaultApiResult, NoContent};
use crate::services::{MailService, NewGuestRegistration, RegistrationService, DEFAULT_LANGUAGE};
use actix_web::http::{header, StatusCode};
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, patch, post, HttpRequest};
use chrono::{DateTime, Utc};
use database::Db;
use db_storage::events::{Event, EventId, EventKind, EventStatus, NewEvent, UpdateEvent};
use db_storage::registrations::{Registration, RegistrationId};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Public representation of an event
#[derive(Debug, Serialize)]
pub struct EventResource {
    pub id: EventId,
    pub held_on: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub needs_registration: bool,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    /// Only set on single-event responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_count: Option<i64>,
}

impl EventResource {
    fn from_event(event: Event, registration_count: Option<i64>) -> Self {
        Self {
            id: event.id,
            held_on: event.held_on,
            name: event.name,
            description: event.description,
            needs_registration: event.needs_registration,
            kind: event.kind,
            duration: event.duration,
            speaker: event.speaker,
            location: event.location,
            status: event.status,
            created_at: event.created_at,
            registration_count,
        }
    }
}

/// Public representation of a registration
#[derive(Debug, Serialize)]
pub struct RegistrationResource {
    pub id: RegistrationId,
    pub event_id: EventId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    pub subscribe_to_newsletter: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Registration> for RegistrationResource {
    fn from(registration: Registration) -> Self {
        Self {
            id: registration.id,
            event_id: registration.event_id,
            email: registration.email,
            name: registration.name,
            first_name: registration.first_name,
            subscribe_to_newsletter: registration.subscribe_to_newsletter,
            created_at: registration.created_at,
        }
    }
}

/// Body of a *POST /events* request
#[derive(Debug, Deserialize, Validate)]
pub struct NewEventBody {
    pub held_on: DateTime<Utc>,
    #[validate(length(min = 1, max = 512))]
    pub name: String,
    #[validate(length(min = 1, max = 2048))]
    pub description: String,
    #[serde(default)]
    pub needs_registration: bool,
    #[serde(default)]
    pub kind: EventKind,
    pub duration: Option<i32>,
    #[validate(length(max = 512))]
    pub speaker: Option<String>,
    #[validate(length(max = 2048))]
    pub location: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
}

/// API Endpoint *POST /events*
///
/// Creates a new event. Events are unique over their date and name, a
/// duplicate yields a 409.
#[post("/events")]
pub async fn new_event(
    db: Data<Db>,
    body: Json<NewEventBody>,
) -> DefaultApiResult<EventResource> {
    let body = body.into_inner();
    body.validate()?;

    let new_event = NewEvent {
        held_on: body.held_on,
        name: body.name,
        description: body.description,
        needs_registration: body.needs_registration,
        kind: body.kind,
        duration: body.duration,
        speaker: body.speaker,
        location: body.location,
        status: body.status,
    };

    let event = crate::block(move || -> database::Result<Option<Event>> {
        let mut conn = db.get_conn()?;

        new_event.try_insert(&mut conn)
    })
    .await??
    .ok_or_else(|| {
        ApiError::conflict().with_message("An event with this name already exists on this date")
    })?;

    Ok(ApiResponse::new(EventResource::from_event(event, Some(0))).with_status(StatusCode::CREATED))
}

/// API Endpoint *GET /events*
///
/// Returns a page of all events, newest first. Page hints are included in
/// the Link header.
#[get("/events")]
pub async fn get_events(
    db: Data<Db>,
    pagination: Query<PagePaginationQuery>,
) -> DefaultApiResult<Vec<EventResource>> {
    let PagePaginationQuery { per_page, page } = pagination.into_inner();
    let per_page = per_page as i64;
    let page = page as i64;

    let (events, total) = crate::block(move || -> database::Result<_> {
        let mut conn = db.get_conn()?;

        Event::get_all_paginated(&mut conn, per_page, page)
    })
    .await??;

    let events = events
        .into_iter()
        .map(|event| EventResource::from_event(event, None))
        .collect();

    Ok(ApiResponse::new(events).with_page_pagination(per_page, page, total))
}

/// API Endpoint *GET /events/{event_id}*
///
/// Returns the event including its current registration count.
#[get("/events/{event_id}")]
pub async fn get_event(db: Data<Db>, event_id: Path<EventId>) -> DefaultApiResult<EventResource> {
    let event_id = event_id.into_inner();

    let (event, registration_count) = crate::block(move || -> database::Result<_> {
        let mut conn = db.get_conn()?;

        let event = Event::get(&mut conn, event_id)?;
        let registration_count = Registration::count_for_event(&mut conn, event_id)?;

        Ok((event, registration_count))
    })
    .await??;

    Ok(ApiResponse::new(EventResource::from_event(
        event,
        Some(registration_count),
    )))
}

/// Body of a *PATCH /events/{event_id}* request
///
/// The event's date and name are immutable, create a new event instead.
#[derive(Debug, Deserialize, Validate)]
pub struct PatchEventBody {
    #[validate(length(min = 1, max = 2048))]
    pub description: Option<String>,
    pub needs_registration: Option<bool>,
    pub kind: Option<EventKind>,
    pub duration: Option<i32>,
    #[validate(length(max = 512))]
    pub speaker: Option<String>,
    #[validate(length(max = 2048))]
    pub location: Option<String>,
    pub status: Option<EventStatus>,
}

impl PatchEventBody {
    fn is_empty(&self) -> bool {
        let PatchEventBody {
            description,
            needs_registration,
            kind,
            duration,
            speaker,
            location,
            status,
        } = self;

        description.is_none()
            && needs_registration.is_none()
            && kind.is_none()
            && duration.is_none()
            && speaker.is_none()
            && location.is_none()
            && status.is_none()
    }
}

/// API Endpoint *PATCH /events/{event_id}*
///
/// Partially updates the mutable fields of an event. Closing an event
/// (`"status": "closed"`) stops further registrations.
#[patch("/events/{event_id}")]
pub async fn patch_event(
    db: Data<Db>,
    event_id: Path<EventId>,
    body: Json<PatchEventBody>,
) -> DefaultApiResult<EventResource> {
    let event_id = event_id.into_inner();
    let body = body.into_inner();
    body.validate()?;

    let event = crate::block(move || -> database::Result<Event> {
        let mut conn = db.get_conn()?;

        if body.is_empty() {
            return Event::get(&mut conn, event_id);
        }

        let update = UpdateEvent {
            description: body.description,
            needs_registration: body.needs_registration,
            kind: body.kind,
            duration: body.duration.map(Some),
            speaker: body.speaker.map(Some),
            location: body.location.map(Some),
            status: body.status,
        };

        update.apply(&mut conn, event_id)
    })
    .await??;

    Ok(ApiResponse::new(EventResource::from_event(event, None)))
}

/// Body of a *POST /events/{event_id}/registrations* request
#[derive(Debug, Deserialize, Validate)]
pub struct RegistrationBody {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 512))]
    pub name: String,
    #[validate(length(max = 512))]
    pub first_name: Option<String>,
    #[serde(default)]
    pub subscribe_to_newsletter: bool,
}

/// API Endpoint *POST /events/{event_id}/registrations*
///
/// Registers a guest for an event. Rejections carry the stable reason code
/// of the registration service in the error body, an unknown event responds
/// with 404, everything else with 409.
///
/// The confirmation mail is queued on a background task after the
/// registration is stored, a mail failure never fails the registration.
#[post("/events/{event_id}/registrations")]
pub async fn register(
    db: Data<Db>,
    registration_service: Data<RegistrationService>,
    mail_service: Data<MailService>,
    event_id: Path<EventId>,
    body: Json<RegistrationBody>,
    request: HttpRequest,
) -> DefaultApiResult<RegistrationResource> {
    let event_id = event_id.into_inner();
    let body = body.into_inner();
    body.validate()?;

    let language = preferred_language(
        request
            .headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok()),
    );

    let submission = NewGuestRegistration {
        email: body.email,
        name: body.name,
        first_name: body.first_name,
        subscribe_to_newsletter: body.subscribe_to_newsletter,
    };

    let (event, registration) = crate::block(move || {
        let registration = registration_service.register(event_id, submission)?;

        let mut conn = db.get_conn()?;
        let event = Event::get(&mut conn, event_id)?;

        Ok::<_, crate::services::RegistrationError>((event, registration))
    })
    .await??;

    let resource = RegistrationResource::from(registration.clone());

    let mail_service = mail_service.into_inner();
    actix_rt::spawn(async move {
        let email = registration.email.clone();

        if let Err(e) = mail_service
            .send_registration_confirmation(event, registration, &language)
            .await
        {
            log::warn!("Could not queue a confirmation mail for '{}': {:?}", email, e);
        }
    });

    Ok(ApiResponse::new(resource).with_status(StatusCode::CREATED))
}

/// API Endpoint *GET /events/{event_id}/registrations*
///
/// Returns a page of the registrations of one event, newest first.
#[get("/events/{event_id}/registrations")]
pub async fn get_registrations(
    db: Data<Db>,
    event_id: Path<EventId>,
    pagination: Query<PagePaginationQuery>,
) -> DefaultApiResult<Vec<RegistrationResource>> {
    let event_id = event_id.into_inner();
    let PagePaginationQuery { per_page, page } = pagination.into_inner();
    let per_page = per_page as i64;
    let page = page as i64;

    let (registrations, total) = crate::block(move || -> database::Result<_> {
        let mut conn = db.get_conn()?;

        // 404 for unknown events instead of an empty page
        Event::get(&mut conn, event_id)?;

        Registration::get_for_event_paginated(&mut conn, event_id, per_page, page)
    })
    .await??;

    let registrations = registrations
        .into_iter()
        .map(RegistrationResource::from)
        .collect();

    Ok(ApiResponse::new(registrations).with_page_pagination(per_page, page, total))
}

/// API Endpoint *DELETE /events/{event_id}/registrations*
///
/// Drops all registrations of one event.
#[delete("/events/{event_id}/registrations")]
pub async fn delete_registrations(
    db: Data<Db>,
    event_id: Path<EventId>,
) -> Result<NoContent, ApiError> {
    let event_id = event_id.into_inner();

    crate::block(move || -> database::Result<_> {
        let mut conn = db.get_conn()?;

        Event::get(&mut conn, event_id)?;

        Registration::delete_for_event(&mut conn, event_id)
    })
    .await??;

    Ok(NoContent)
}

/// Picks the mail language from an Accept-Language header value
///
/// Only the primary language subtag of the most preferred entry is
/// considered. Everything except English falls back to German, the
/// language of the site.
fn preferred_language(accept_language: Option<&str>) -> String {
    let primary = accept_language
        .and_then(|value| value.split(',').next())
        .map(|entry| entry.split(';').next().unwrap_or(entry))
        .map(|tag| tag.trim())
        .and_then(|tag| tag.split('-').next())
        .map(|primary| primary.to_lowercase());

    match primary.as_deref() {
        Some("en") => "en".to_owned(),
        _ => DEFAULT_LANGUAGE.to_owned(),
    }
}
