//! Domain library behind La Suite territoriale: the organization directory, the onboarding
//! case resolver, compliance statistics, validated form inputs and the collaborators the HTTP
//! service wires together.

pub mod config;
pub mod directory;
pub mod error;
pub mod forms;
pub mod grist;
pub mod onboarding;
pub mod ratelimit;
pub mod signups;
pub mod stats;
pub mod telemetry;
