mod mail;
mod registration;

pub use mail::{MailService, DEFAULT_LANGUAGE};
pub use registration::{
    Clock, EventRepository, NewGuestRegistration, RegistrationError, RegistrationRepository,
    RegistrationService, SystemClock,
};
