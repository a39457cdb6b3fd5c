//! MailService
//!
//! Renders the confirmation mails of the registration flow and hands them to
//! the mail worker through RabbitMQ. The worker does the actual delivery.
use crate::settings::SharedSettings;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use db_storage::events::Event;
use db_storage::registrations::Registration;
use mail_worker_proto::MailTask;
use std::sync::Arc;

/// The languages the mail templates exist in, everything else falls back to German
pub const DEFAULT_LANGUAGE: &str = "de";

#[derive(Clone)]
pub struct MailService {
    settings: SharedSettings,
    rabbit_mq_channel: Arc<lapin::Channel>,
}

impl MailService {
    pub fn new(settings: SharedSettings, rabbit_mq_channel: Arc<lapin::Channel>) -> Self {
        Self {
            settings,
            rabbit_mq_channel,
        }
    }

    async fn send_to_rabbitmq(&self, mail_task: MailTask) -> Result<()> {
        if let Some(queue_name) = &self.settings.load().rabbit_mq.mail_task_queue {
            self.rabbit_mq_channel
                .basic_publish(
                    "",
                    queue_name,
                    Default::default(),
                    &serde_json::to_vec(&mail_task).context("Failed to serialize mail_task")?,
                    Default::default(),
                )
                .await?;
        } else {
            log::debug!(
                "No mail task queue configured, discarding {} mail task",
                mail_task.as_kind_str()
            );
        }

        Ok(())
    }

    /// Sends a registration confirmation mail task to the rabbit mq queue, if configured.
    pub async fn send_registration_confirmation(
        &self,
        event: Event,
        registration: Registration,
        language: &str,
    ) -> Result<()> {
        // dates in mails are presented in the site's local timezone
        let timezone = self.settings.load().registration_cleanup.timezone;

        let subject = confirmation_subject(language, &event.name);
        let body = confirmation_body(language, &event, &registration, timezone);

        let event_name = event.name.clone();
        let email = registration.email.clone();

        let mail_task = MailTask::registration_confirmation(
            registration,
            event,
            language.to_owned(),
            subject,
            body,
        );

        self.send_to_rabbitmq(mail_task).await?;

        log::info!(
            "Queued a registration confirmation for '{}' to '{}'",
            event_name,
            email
        );

        Ok(())
    }
}

fn confirmation_subject(language: &str, event_name: &str) -> String {
    match language {
        "en" => format!("Registration for '{event_name}'"),
        _ => format!("Anmeldung zu '{event_name}'"),
    }
}

fn confirmation_body(
    language: &str,
    event: &Event,
    registration: &Registration,
    timezone: Tz,
) -> String {
    let greeting_name = registration
        .first_name
        .as_deref()
        .unwrap_or(&registration.name);
    let held_on = event.held_on.with_timezone(&timezone).format("%d.%m.%Y %H:%M %Z");

    let mut body = match language {
        "en" => format!(
            "Hello {greeting_name},\n\n\
             thank you for registering for '{}' on {held_on}.",
            event.name
        ),
        _ => format!(
            "Hallo {greeting_name},\n\n\
             vielen Dank für Deine Anmeldung zu '{}' am {held_on}.",
            event.name
        ),
    };

    if let Some(location) = &event.location {
        match language {
            "en" => body.push_str(&format!("\n\nThe event takes place at: {location}")),
            _ => body.push_str(&format!("\n\nDie Veranstaltung findet statt: {location}")),
        }
    }

    match language {
        "en" => body.push_str("\n\nSee you there!\nYour JUG team"),
        _ => body.push_str("\n\nBis bald!\nDein JUG-Team"),
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use db_storage::events::{EventId, EventKind, EventStatus};
    use db_storage::registrations::RegistrationId;
    use pretty_assertions::assert_eq;

    fn event() -> Event {
        Event {
            id: EventId::from(1),
            held_on: chrono::Utc.with_ymd_and_hms(2023, 6, 14, 18, 0, 0).unwrap(),
            name: "Java 21 in production".into(),
            description: "What the new LTS brings".into(),
            needs_registration: true,
            kind: EventKind::Talk,
            duration: Some(90),
            speaker: Some("Jane Doe".into()),
            location: Some("Aachen".into()),
            status: EventStatus::Open,
            created_at: chrono::Utc.with_ymd_and_hms(2023, 1, 1, 8, 0, 0).unwrap(),
        }
    }

    fn registration(first_name: Option<&str>) -> Registration {
        Registration {
            id: RegistrationId::from(1),
            event_id: EventId::from(1),
            email: "jane.doe@example.org".into(),
            name: "Doe".into(),
            first_name: first_name.map(Into::into),
            subscribe_to_newsletter: false,
            created_at: chrono::Utc.with_ymd_and_hms(2023, 6, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn german_subject_is_the_default() {
        assert_eq!(
            confirmation_subject("de", "Java 21 in production"),
            "Anmeldung zu 'Java 21 in production'"
        );
        assert_eq!(
            confirmation_subject("fr", "Java 21 in production"),
            "Anmeldung zu 'Java 21 in production'"
        );
    }

    #[test]
    fn english_subject() {
        assert_eq!(
            confirmation_subject("en", "Java 21 in production"),
            "Registration for 'Java 21 in production'"
        );
    }

    #[test]
    fn body_greets_with_the_first_name_when_present() {
        let body = confirmation_body(
            "de",
            &event(),
            &registration(Some("Jane")),
            chrono_tz::Europe::Berlin,
        );

        assert!(body.starts_with("Hallo Jane,"));
        assert!(body.contains("Java 21 in production"));
        assert!(body.contains("Die Veranstaltung findet statt: Aachen"));
    }

    #[test]
    fn body_falls_back_to_the_last_name() {
        let body = confirmation_body("en", &event(), &registration(None), chrono_tz::Europe::Berlin);

        assert!(body.starts_with("Hello Doe,"));
        assert!(body.contains("thank you for registering for 'Java 21 in production'"));
    }

    #[test]
    fn body_shows_the_event_time_in_local_time() {
        // 18:00 UTC is 20:00 in Berlin during summer time
        let body = confirmation_body(
            "de",
            &event(),
            &registration(Some("Jane")),
            chrono_tz::Europe::Berlin,
        );

        assert!(body.contains("14.06.2023 20:00 CEST"));
        assert!(!body.contains("18:00"));
    }

    #[test]
    fn body_omits_the_location_when_unset() {
        let mut event = event();
        event.location = None;

        let body = confirmation_body(
            "de",
            &event,
            &registration(Some("Jane")),
            chrono_tz::Europe::Berlin,
        );

        assert!(!body.contains("findet statt"));
    }
}
