use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

#[derive(Deserialize, Serialize, PartialEq, Debug)]
pub struct Email(String);

impl Email {
    pub fn new(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Email {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Email {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The guest a confirmation mail is addressed to
#[derive(Deserialize, Serialize, PartialEq, Debug)]
pub struct Registrant {
    pub email: Email,
    pub name: String,
    pub first_name: Option<String>,
}

/// The event the mail is about
#[derive(Deserialize, Serialize, PartialEq, Debug)]
pub struct Event {
    pub id: i32,
    pub name: String,
    pub held_on: chrono::DateTime<Utc>,
    pub location: Option<String>,
}

/// A mail sent to a guest after a successful event registration
///
/// Subject and body are already rendered in the registrant's language, the
/// worker only wraps them into a mail and delivers it.
#[derive(Deserialize, Serialize, PartialEq, Debug)]
pub struct RegistrationConfirmation {
    pub registrant: Registrant,
    pub event: Event,
    pub language: String,
    pub subject: String,
    pub body: String,
}

/// The different kinds of MailTasks that are currently supported
#[derive(Deserialize, PartialEq, Debug)]
#[cfg_attr(any(test, feature = "client"), derive(Serialize))]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum Message {
    /// A mail confirming an event registration
    RegistrationConfirmation(RegistrationConfirmation),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MailTask;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_format() {
        let confirmation = MailTask::V1(Message::RegistrationConfirmation(
            RegistrationConfirmation {
                registrant: Registrant {
                    email: "jane.doe@example.org".into(),
                    name: "Doe".into(),
                    first_name: Some("Jane".into()),
                },
                event: Event {
                    id: 23,
                    name: "Java 21 in production".into(),
                    held_on: chrono::DateTime::<FixedOffset>::parse_from_rfc3339(
                        "2023-06-14T18:00:00+02:00",
                    )
                    .unwrap()
                    .into(),
                    location: Some("Aachen".into()),
                },
                language: "de".into(),
                subject: "Anmeldung zu 'Java 21 in production'".into(),
                body: "Hallo Jane, ...".into(),
            },
        ));

        assert_eq!(
            confirmation,
            serde_json::from_value(serde_json::json!({
                "version": "1",
                "message": "registration_confirmation",
                "registrant": {
                    "email": "jane.doe@example.org",
                    "name": "Doe",
                    "first_name": "Jane"
                },
                "event": {
                    "id": 23,
                    "name": "Java 21 in production",
                    "held_on": "2023-06-14T18:00:00+02:00",
                    "location": "Aachen"
                },
                "language": "de",
                "subject": "Anmeldung zu 'Java 21 in production'",
                "body": "Hallo Jane, ..."
            }))
            .unwrap()
        );
    }

    #[test]
    fn test_no_optional_fields() {
        let confirmation = MailTask::V1(Message::RegistrationConfirmation(
            RegistrationConfirmation {
                registrant: Registrant {
                    email: "jane.doe@example.org".into(),
                    name: "Doe".into(),
                    first_name: None,
                },
                event: Event {
                    id: 23,
                    name: "Java 21 in production".into(),
                    held_on: chrono::DateTime::<FixedOffset>::parse_from_rfc3339(
                        "2023-06-14T18:00:00+02:00",
                    )
                    .unwrap()
                    .into(),
                    location: None,
                },
                language: "en".into(),
                subject: "Registration for 'Java 21 in production'".into(),
                body: "Hello Doe, ...".into(),
            },
        ));

        assert_eq!(
            confirmation,
            serde_json::from_value(serde_json::json!({
                "version": "1",
                "message": "registration_confirmation",
                "registrant": {
                    "email": "jane.doe@example.org",
                    "name": "Doe",
                    "first_name": null
                },
                "event": {
                    "id": 23,
                    "name": "Java 21 in production",
                    "held_on": "2023-06-14T18:00:00+02:00",
                    "location": null
                },
                "language": "en",
                "subject": "Registration for 'Java 21 in production'",
                "body": "Hello Doe, ..."
            }))
            .unwrap()
        );
    }
}
