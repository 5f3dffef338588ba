//! Signup, pilot-group and activation forms.
//!
//! Request bodies are validated before any lookup or outbound call; the services then check
//! them against the directory and hand the resulting rows to a [`crate::grist::RecordSink`].

pub mod activation;
pub mod registration;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use activation::{
    email_domain, AccountRequest, ActivatedUser, ActivationRequest, ActivationStep,
};
pub use registration::{
    Contact, Membership, PilotGroupRegistration, PilotGroupRequest, SignupRegistration,
    SignupRequest,
};
pub use router::{
    forms_router, FormLimiters, ACTIVATE_PATH, INVALID_BODY_MESSAGE, PILOT_GROUP_PATH,
    REGISTRATION_SUCCESS_MESSAGE, SIGNUP_PATH,
};
pub use service::{
    Activation, ActivationError, ActivationService, RegistrationError, RegistrationService,
};
pub use validation::{
    check_postal_code, strong_password, valid_email_prefix, ValidationError, MAX_FIELD_LENGTH,
};
