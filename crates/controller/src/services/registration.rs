//! Registration service
//!
//! Guards every guest registration with the same ordered checks the public
//! site always had: the event must exist, must take registrations at all and
//! must still be open. The unique constraint on `(event_id, email)` backs up
//! the duplicate check for concurrent submissions.
use chrono::{DateTime, Utc};
use database::{DatabaseError, Db, OptionalExt};
use db_storage::events::{Event, EventId};
use db_storage::registrations::{NewRegistration, Registration};
use std::sync::Arc;

/// Time source of the registration core
///
/// Production code uses [`SystemClock`], tests inject a fixed instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Read access to events as the registration service needs it
pub trait EventRepository: Send + Sync {
    fn find_event(&self, event_id: EventId) -> database::Result<Option<Event>>;
}

/// Access to the registration records
pub trait RegistrationRepository: Send + Sync {
    fn find_by_event_and_email(
        &self,
        event_id: EventId,
        email: &str,
    ) -> database::Result<Option<Registration>>;

    /// Inserts the registration, returns None when it lost a race against a
    /// concurrent duplicate submission
    fn try_insert(&self, new: NewRegistration) -> database::Result<Option<Registration>>;

    /// Bulk-deletes all registrations whose event was held before `now`
    fn delete_from_expired_events(&self, now: DateTime<Utc>) -> database::Result<usize>;
}

impl EventRepository for Db {
    fn find_event(&self, event_id: EventId) -> database::Result<Option<Event>> {
        let mut conn = self.get_conn()?;

        Event::get(&mut conn, event_id).optional()
    }
}

impl RegistrationRepository for Db {
    fn find_by_event_and_email(
        &self,
        event_id: EventId,
        email: &str,
    ) -> database::Result<Option<Registration>> {
        let mut conn = self.get_conn()?;

        Registration::get_for_event_and_email(&mut conn, event_id, email).optional()
    }

    fn try_insert(&self, new: NewRegistration) -> database::Result<Option<Registration>> {
        let mut conn = self.get_conn()?;

        new.try_insert(&mut conn)
    }

    fn delete_from_expired_events(&self, now: DateTime<Utc>) -> database::Result<usize> {
        let mut conn = self.get_conn()?;

        Registration::delete_from_expired_events(&mut conn, now)
    }
}

/// A registration as the guest submitted it
#[derive(Debug, Clone)]
pub struct NewGuestRegistration {
    pub email: String,
    pub name: String,
    pub first_name: Option<String>,
    pub subscribe_to_newsletter: bool,
}

/// The ways a registration attempt can be rejected
///
/// Every non-database variant carries a stable reason code next to its
/// human readable message. The codes double as localization keys on the
/// website and must not change.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("There is no event with the id {0}")]
    InvalidEvent(EventId),
    #[error("The event {0} does not require a registration")]
    EventNeedsNoRegistration(EventId),
    #[error("The event {0} is not open for registration")]
    EventNotOpen(EventId),
    #[error("'{email}' is already registered for the event {event_id}")]
    AlreadyRegistered { event_id: EventId, email: String },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl RegistrationError {
    /// Stable machine readable reason of the rejection
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidEvent(_) => Some("invalidEvent"),
            Self::EventNeedsNoRegistration(_) => Some("eventNeedNoRegistration"),
            Self::EventNotOpen(_) => Some("eventNotOpen"),
            Self::AlreadyRegistered { .. } => Some("alreadyRegistered"),
            Self::Database(_) => None,
        }
    }
}

pub struct RegistrationService {
    events: Arc<dyn EventRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    clock: Arc<dyn Clock>,
}

impl RegistrationService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            registrations,
            clock,
        }
    }

    /// Registers a guest for the given event
    ///
    /// The checks run in a fixed order so a request that fails for several
    /// reasons is always rejected with the same one. The e-mail address is
    /// lower-cased before it is compared or stored, registrations are unique
    /// per event and e-mail address regardless of case.
    #[tracing::instrument(err, skip_all, fields(%event_id))]
    pub fn register(
        &self,
        event_id: EventId,
        submission: NewGuestRegistration,
    ) -> Result<Registration, RegistrationError> {
        let event = self
            .events
            .find_event(event_id)?
            .ok_or(RegistrationError::InvalidEvent(event_id))?;

        if !event.needs_registration {
            return Err(RegistrationError::EventNeedsNoRegistration(event_id));
        }

        if !event.is_open_for_registration(self.clock.now()) {
            return Err(RegistrationError::EventNotOpen(event_id));
        }

        let email = submission.email.to_lowercase();

        if self
            .registrations
            .find_by_event_and_email(event_id, &email)?
            .is_some()
        {
            return Err(RegistrationError::AlreadyRegistered { event_id, email });
        }

        let inserted = self.registrations.try_insert(NewRegistration {
            event_id,
            email: email.clone(),
            name: submission.name,
            first_name: submission.first_name,
            subscribe_to_newsletter: submission.subscribe_to_newsletter,
        })?;

        // A concurrent submission may have won the race between the duplicate
        // check above and the insert. The unique constraint catches that.
        inserted.ok_or(RegistrationError::AlreadyRegistered { event_id, email })
    }

    /// Removes the registrations of all events that already took place
    ///
    /// Runs unattended from the expiry job, failures are logged and
    /// swallowed. Running it twice in a row is a no-op.
    pub fn cleanup_old_registrations(&self) {
        match self
            .registrations
            .delete_from_expired_events(self.clock.now())
        {
            Ok(0) => log::debug!("No registrations of past events to remove"),
            Ok(count) => log::info!("Removed {} registrations of past events", count),
            Err(e) => log::error!("Failed to remove registrations of past events, {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use db_storage::events::{EventKind, EventStatus};
    use db_storage::registrations::RegistrationId;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 8, 12, 0, 0).unwrap()
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn event(id: i32, held_on: DateTime<Utc>, needs_registration: bool, status: EventStatus) -> Event {
        Event {
            id: EventId::from(id),
            held_on,
            name: format!("Event {id}"),
            description: "A test event".into(),
            needs_registration,
            kind: EventKind::Talk,
            duration: None,
            speaker: None,
            location: None,
            status,
            created_at: now() - Duration::days(30),
        }
    }

    #[derive(Default)]
    struct InMemoryEvents(HashMap<i32, Event>);

    impl InMemoryEvents {
        fn with(events: Vec<Event>) -> Arc<Self> {
            Arc::new(Self(
                events.into_iter().map(|e| (*e.id.inner(), e)).collect(),
            ))
        }
    }

    impl EventRepository for InMemoryEvents {
        fn find_event(&self, event_id: EventId) -> database::Result<Option<Event>> {
            Ok(self.0.get(event_id.inner()).cloned())
        }
    }

    #[derive(Default)]
    struct InMemoryRegistrations {
        records: Mutex<Vec<Registration>>,
        next_id: Mutex<i32>,
    }

    impl InMemoryRegistrations {
        fn records(&self) -> Vec<Registration> {
            self.records.lock().unwrap().clone()
        }
    }

    impl RegistrationRepository for InMemoryRegistrations {
        fn find_by_event_and_email(
            &self,
            event_id: EventId,
            email: &str,
        ) -> database::Result<Option<Registration>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.event_id == event_id && r.email == email)
                .cloned())
        }

        fn try_insert(&self, new: NewRegistration) -> database::Result<Option<Registration>> {
            let mut records = self.records.lock().unwrap();

            // same uniqueness rule as the registrations_uk constraint
            if records
                .iter()
                .any(|r| r.event_id == new.event_id && r.email == new.email)
            {
                return Ok(None);
            }

            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;

            let registration = Registration {
                id: RegistrationId::from(*next_id),
                event_id: new.event_id,
                email: new.email,
                name: new.name,
                first_name: new.first_name,
                subscribe_to_newsletter: new.subscribe_to_newsletter,
                created_at: now(),
            };

            records.push(registration.clone());

            Ok(Some(registration))
        }

        fn delete_from_expired_events(&self, _now: DateTime<Utc>) -> database::Result<usize> {
            unimplemented!("not used by the registration tests")
        }
    }

    fn submission(email: &str) -> NewGuestRegistration {
        NewGuestRegistration {
            email: email.into(),
            name: "Doe".into(),
            first_name: Some("Jane".into()),
            subscribe_to_newsletter: false,
        }
    }

    fn service_with(
        events: Arc<InMemoryEvents>,
        registrations: Arc<InMemoryRegistrations>,
    ) -> RegistrationService {
        RegistrationService::new(events, registrations, Arc::new(FixedClock(now())))
    }

    fn open_event() -> Event {
        event(1, now() + Duration::days(7), true, EventStatus::Open)
    }

    #[test]
    fn registers_a_guest_for_an_open_event() {
        let events = InMemoryEvents::with(vec![open_event()]);
        let registrations = Arc::new(InMemoryRegistrations::default());
        let service = service_with(events, registrations.clone());

        let registration = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap();

        assert_eq!(registration.event_id, EventId::from(1));
        assert_eq!(registration.email, "jane.doe@example.org");
        assert_eq!(registrations.records().len(), 1);
    }

    #[test]
    fn rejects_unknown_events() {
        let events = InMemoryEvents::with(vec![]);
        let service = service_with(events, Arc::new(InMemoryRegistrations::default()));

        let err = service
            .register(EventId::from(42), submission("jane.doe@example.org"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidEvent(_)));
        assert_eq!(err.reason_code(), Some("invalidEvent"));
    }

    #[test]
    fn rejects_events_without_registration() {
        let events = InMemoryEvents::with(vec![event(
            1,
            now() + Duration::days(7),
            false,
            EventStatus::Open,
        )]);
        let service = service_with(events, Arc::new(InMemoryRegistrations::default()));

        let err = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::EventNeedsNoRegistration(_)));
        assert_eq!(err.reason_code(), Some("eventNeedNoRegistration"));
    }

    #[test]
    fn rejects_closed_events_even_when_they_are_in_the_future() {
        let events = InMemoryEvents::with(vec![event(
            1,
            now() + Duration::days(7),
            true,
            EventStatus::Closed,
        )]);
        let service = service_with(events, Arc::new(InMemoryRegistrations::default()));

        let err = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::EventNotOpen(_)));
        assert_eq!(err.reason_code(), Some("eventNotOpen"));
    }

    #[test]
    fn rejects_past_events() {
        let events = InMemoryEvents::with(vec![event(
            1,
            now() - Duration::hours(2),
            true,
            EventStatus::Open,
        )]);
        let service = service_with(events, Arc::new(InMemoryRegistrations::default()));

        let err = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::EventNotOpen(_)));
    }

    #[test]
    fn needs_no_registration_takes_precedence_over_not_open() {
        // an event in the past that also takes no registrations
        let events = InMemoryEvents::with(vec![event(
            1,
            now() - Duration::days(1),
            false,
            EventStatus::Open,
        )]);
        let service = service_with(events, Arc::new(InMemoryRegistrations::default()));

        let err = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap_err();

        assert_eq!(err.reason_code(), Some("eventNeedNoRegistration"));
    }

    #[test]
    fn rejects_duplicate_registrations() {
        let events = InMemoryEvents::with(vec![open_event()]);
        let registrations = Arc::new(InMemoryRegistrations::default());
        let service = service_with(events, registrations.clone());

        service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap();

        let err = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::AlreadyRegistered { .. }));
        assert_eq!(err.reason_code(), Some("alreadyRegistered"));
        assert_eq!(registrations.records().len(), 1);
    }

    #[test]
    fn email_comparison_ignores_case_and_stores_lowercase() {
        let events = InMemoryEvents::with(vec![open_event()]);
        let registrations = Arc::new(InMemoryRegistrations::default());
        let service = service_with(events, registrations.clone());

        let registration = service
            .register(EventId::from(1), submission("Jane.Doe@Example.ORG"))
            .unwrap();

        assert_eq!(registration.email, "jane.doe@example.org");

        let err = service
            .register(EventId::from(1), submission("JANE.DOE@EXAMPLE.ORG"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::AlreadyRegistered { .. }));
    }

    #[test]
    fn same_email_may_register_for_another_event() {
        let events = InMemoryEvents::with(vec![
            open_event(),
            event(2, now() + Duration::days(14), true, EventStatus::Open),
        ]);
        let registrations = Arc::new(InMemoryRegistrations::default());
        let service = service_with(events, registrations.clone());

        service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap();
        service
            .register(EventId::from(2), submission("jane.doe@example.org"))
            .unwrap();

        assert_eq!(registrations.records().len(), 2);
    }

    /// Store where the duplicate pre-check misses but the insert reports the
    /// unique violation, like a submission racing a concurrent duplicate
    struct RacingRegistrations;

    impl RegistrationRepository for RacingRegistrations {
        fn find_by_event_and_email(
            &self,
            _event_id: EventId,
            _email: &str,
        ) -> database::Result<Option<Registration>> {
            Ok(None)
        }

        fn try_insert(&self, _new: NewRegistration) -> database::Result<Option<Registration>> {
            Ok(None)
        }

        fn delete_from_expired_events(&self, _now: DateTime<Utc>) -> database::Result<usize> {
            unimplemented!()
        }
    }

    #[test]
    fn lost_insert_race_is_reported_as_already_registered() {
        let events = InMemoryEvents::with(vec![open_event()]);
        let service = RegistrationService::new(
            events,
            Arc::new(RacingRegistrations),
            Arc::new(FixedClock(now())),
        );

        let err = service
            .register(EventId::from(1), submission("jane.doe@example.org"))
            .unwrap_err();

        assert!(matches!(err, RegistrationError::AlreadyRegistered { .. }));
    }

    /// Store for the cleanup tests, holds registrations with their event date
    #[derive(Default)]
    struct ExpiringRegistrations {
        entries: Mutex<Vec<(DateTime<Utc>, String)>>,
    }

    impl RegistrationRepository for ExpiringRegistrations {
        fn find_by_event_and_email(
            &self,
            _event_id: EventId,
            _email: &str,
        ) -> database::Result<Option<Registration>> {
            unimplemented!()
        }

        fn try_insert(&self, _new: NewRegistration) -> database::Result<Option<Registration>> {
            unimplemented!()
        }

        fn delete_from_expired_events(&self, now: DateTime<Utc>) -> database::Result<usize> {
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|(held_on, _)| *held_on >= now);
            Ok(before - entries.len())
        }
    }

    #[test]
    fn cleanup_removes_only_registrations_of_past_events() {
        let registrations = Arc::new(ExpiringRegistrations::default());
        registrations.entries.lock().unwrap().extend([
            (now() - Duration::days(1), "old@example.org".to_owned()),
            (now() + Duration::days(1), "new@example.org".to_owned()),
        ]);

        let service = RegistrationService::new(
            InMemoryEvents::with(vec![]),
            registrations.clone(),
            Arc::new(FixedClock(now())),
        );

        service.cleanup_old_registrations();

        let remaining = registrations.entries.lock().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1, "new@example.org");
    }

    #[test]
    fn cleanup_is_idempotent() {
        let registrations = Arc::new(ExpiringRegistrations::default());
        registrations
            .entries
            .lock()
            .unwrap()
            .push((now() - Duration::days(1), "old@example.org".to_owned()));

        let service = RegistrationService::new(
            InMemoryEvents::with(vec![]),
            registrations.clone(),
            Arc::new(FixedClock(now())),
        );

        service.cleanup_old_registrations();
        service.cleanup_old_registrations();

        assert!(registrations.entries.lock().unwrap().is_empty());
    }
}
