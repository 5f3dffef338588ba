use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use super::activation::{email_domain, ActivatedUser, ActivationRequest, ActivationStep};
use super::registration::{PilotGroupRequest, SignupRequest};
use super::validation::{check_postal_code, ValidationError};
use crate::directory::{Commune, DirectoryError, OrganizationDirectory};
use crate::grist::{GristError, RecordFields, RecordSink, PILOT_GROUP_TABLE, SIGNUP_TABLE};
use crate::signups::{SignupStore, SignupStoreError};
use crate::telemetry::{ErrorReporter, ReportLevel};

pub const UNKNOWN_ORGANIZATION_MESSAGE: &str = "Collectivité non trouvée pour le SIRET fourni.";
pub const INVALID_CODE_MESSAGE: &str =
    "Code de sécurité invalide ou expiré (codes valides pendant 15 jours).";
pub const INTERNAL_ERROR_MESSAGE: &str = "Erreur interne du serveur.";

/// Service validating registration forms against the directory and forwarding them to
/// their record sink.
pub struct RegistrationService<D: ?Sized, S: ?Sized> {
    directory: Arc<D>,
    signup_sink: Arc<S>,
    pilot_sink: Arc<S>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<D, S> RegistrationService<D, S>
where
    D: OrganizationDirectory + ?Sized + 'static,
    S: RecordSink + ?Sized + 'static,
{
    pub fn new(
        directory: Arc<D>,
        signup_sink: Arc<S>,
        pilot_sink: Arc<S>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            directory,
            signup_sink,
            pilot_sink,
            reporter,
        }
    }

    /// Registers a commune for the pilot group, returning the created row id.
    pub async fn register_pilot(
        &self,
        request: PilotGroupRequest,
        client_ip: &str,
    ) -> Result<u64, RegistrationError> {
        let registration = request.validate()?;
        let contact = &registration.contact;
        let commune = self.commune(&contact.siret, "pilot group registration")?;

        let structure = match contact.structure_id.as_deref() {
            Some(id) => {
                let found = self.directory.find_structure(id)?;
                if found.is_none() {
                    self.reporter.capture_message(
                        ReportLevel::Warning,
                        "Mutualization structure not found during pilot group registration",
                        &json!({ "structureId": id, "siret": contact.siret }),
                    );
                }
                found
            }
            None => None,
        };

        check_postal_code(&commune.organization, &contact.postal_code)?;

        let record = registration.record(&commune, structure.as_ref(), client_ip);
        let row_id = self.store(self.pilot_sink.as_ref(), PILOT_GROUP_TABLE, &record).await?;
        tracing::info!(siret = %contact.siret, row_id, "pilot group registration stored");
        Ok(row_id)
    }

    /// Records a signup, returning the created row id.
    pub async fn sign_up(
        &self,
        request: SignupRequest,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, RegistrationError> {
        let registration = request.validate()?;
        let contact = &registration.contact;
        let commune = self.commune(&contact.siret, "signup")?;

        check_postal_code(&commune.organization, &contact.postal_code)?;

        let record = registration.record(&commune, client_ip, now);
        let row_id = self.store(self.signup_sink.as_ref(), SIGNUP_TABLE, &record).await?;
        tracing::info!(siret = %contact.siret, row_id, "signup stored");
        Ok(row_id)
    }

    fn commune(&self, siret: &str, context: &str) -> Result<Commune, RegistrationError> {
        match self.directory.find_with_structures(siret)? {
            Some(commune) => Ok(commune),
            None => {
                self.reporter.capture_message(
                    ReportLevel::Warning,
                    &format!("Commune not found during {context}"),
                    &json!({ "siret": siret }),
                );
                Err(RegistrationError::UnknownOrganization)
            }
        }
    }

    async fn store(
        &self,
        sink: &S,
        table: &'static str,
        record: &RecordFields,
    ) -> Result<u64, RegistrationError> {
        sink.add_record(table, record).await.map_err(|source| {
            self.reporter
                .capture_error(&source, &json!({ "table": table, "record": record }));
            RegistrationError::Sink { table, source }
        })
    }
}

/// Error raised by the registration service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{}", UNKNOWN_ORGANIZATION_MESSAGE)]
    UnknownOrganization,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("record sink failure on {table}: {source}")]
    Sink {
        table: &'static str,
        #[source]
        source: GristError,
    },
}

impl RegistrationError {
    /// Message returned to the person submitting the form.
    pub fn user_message(&self) -> String {
        match self {
            RegistrationError::Validation(err) => err.to_string(),
            RegistrationError::UnknownOrganization => UNKNOWN_ORGANIZATION_MESSAGE.to_string(),
            RegistrationError::Directory(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            RegistrationError::Sink { table, source } => source.user_message(table),
        }
    }
}

/// Outcome of one activation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    CodeValidated {
        user: ActivatedUser,
        email_domain: String,
    },
    AccountCreated {
        user: ActivatedUser,
    },
}

impl Activation {
    pub fn message(&self) -> &'static str {
        match self {
            Activation::CodeValidated { .. } => "Code validé avec succès.",
            Activation::AccountCreated { .. } => "Compte créé avec succès.",
        }
    }
}

/// Service driving the two-step activation of a signed-up organization.
pub struct ActivationService<St: ?Sized> {
    signups: Arc<St>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<St> ActivationService<St>
where
    St: SignupStore + ?Sized + 'static,
{
    pub fn new(signups: Arc<St>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { signups, reporter }
    }

    /// Runs one activation step. The pending signup must exist and be less than fifteen days
    /// old; the submitted code itself is not compared.
    pub fn activate(
        &self,
        request: &ActivationRequest,
        now: DateTime<Utc>,
    ) -> Result<Activation, ActivationError> {
        request.check()?;
        let siret = request.siret();

        let signup = self
            .signups
            .latest_for(siret, now)
            .map_err(|err| {
                self.reporter
                    .capture_error(&err, &json!({ "siret": siret, "step": request.step }));
                err
            })?
            .ok_or(ActivationError::InvalidCode)?;

        match request.step()? {
            ActivationStep::ValidateCode => Ok(Activation::CodeValidated {
                email_domain: email_domain(&signup),
                user: ActivatedUser {
                    first_name: signup.first_name,
                    last_name: signup.last_name,
                    job_title: signup.job_title,
                    email: signup.email,
                },
            }),
            ActivationStep::CreateAccount => {
                let account = request.account()?;
                let email = format!("{}@{}", account.email_prefix, email_domain(&signup));
                tracing::info!(%siret, %email, "account activated");
                Ok(Activation::AccountCreated {
                    user: ActivatedUser {
                        first_name: account.first_name,
                        last_name: account.last_name,
                        job_title: Some(account.job_title),
                        email,
                    },
                })
            }
        }
    }
}

/// Error raised by the activation service.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{}", INVALID_CODE_MESSAGE)]
    InvalidCode,
    #[error(transparent)]
    Store(#[from] SignupStoreError),
}

impl ActivationError {
    pub fn user_message(&self) -> String {
        match self {
            ActivationError::Store(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
