//! Wire protocol between the controller and the mail worker
//!
//! The controller publishes [`MailTask`]s to a RabbitMQ queue, a separate
//! mail worker consumes them and delivers the actual e-mails.
use serde::Deserialize;
#[cfg(any(test, feature = "client"))]
use serde::Serialize;
pub mod v1;

/// Versioned Mail Task Protocol
#[derive(Deserialize, PartialEq, Debug)]
#[cfg_attr(any(test, feature = "client"), derive(Serialize))]
#[serde(tag = "version")]
pub enum MailTask {
    #[serde(rename = "1")]
    V1(v1::Message),
}

#[cfg(feature = "client")]
impl MailTask {
    /// Creates a MailTask confirming the registration of a guest for an event
    pub fn registration_confirmation<R, E>(
        registrant: R,
        event: E,
        language: String,
        subject: String,
        body: String,
    ) -> MailTask
    where
        R: Into<v1::Registrant>,
        E: Into<v1::Event>,
    {
        Self::V1(v1::Message::RegistrationConfirmation(
            v1::RegistrationConfirmation {
                registrant: registrant.into(),
                event: event.into(),
                language,
                subject,
                body,
            },
        ))
    }

    pub fn as_kind_str(&self) -> &'static str {
        match self {
            MailTask::V1(message) => match message {
                v1::Message::RegistrationConfirmation(_) => "registration_confirmation",
            },
        }
    }
}

#[cfg(feature = "client")]
impl From<db_storage::registrations::Registration> for v1::Registrant {
    fn from(val: db_storage::registrations::Registration) -> Self {
        Self {
            email: val.email.into(),
            name: val.name,
            first_name: val.first_name,
        }
    }
}

#[cfg(feature = "client")]
impl From<db_storage::events::Event> for v1::Event {
    fn from(val: db_storage::events::Event) -> Self {
        Self {
            id: val.id.into_inner(),
            name: val.name,
            held_on: val.held_on,
            location: val.location,
        }
    }
}
