use serde::{Deserialize, Serialize};

use super::validation::{present, strong_password, too_long, valid_email_prefix, ValidationError};
use crate::signups::SignupRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStep {
    ValidateCode,
    CreateAccount,
}

impl ActivationStep {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validate_code" => Some(Self::ValidateCode),
            "create_account" => Some(Self::CreateAccount),
            _ => None,
        }
    }
}

/// Body of the two-step account activation form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivationRequest {
    pub step: Option<String>,
    pub siret: Option<String>,
    pub secret_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub email_prefix: Option<String>,
    pub password: Option<String>,
}

impl ActivationRequest {
    /// Checks the parameters common to both steps. The step itself is only interpreted
    /// once a pending signup has been found.
    pub fn check(&self) -> Result<(), ValidationError> {
        if [&self.step, &self.siret, &self.secret_code]
            .into_iter()
            .any(|value| present(value).is_none())
        {
            return Err(ValidationError::MissingActivationParameters);
        }

        let over_limit = [
            &self.siret,
            &self.secret_code,
            &self.first_name,
            &self.last_name,
            &self.job_title,
            &self.email_prefix,
            &self.password,
        ]
        .into_iter()
        .any(too_long);
        if over_limit {
            return Err(ValidationError::ActivationFieldTooLong);
        }
        Ok(())
    }

    pub fn siret(&self) -> &str {
        present(&self.siret).unwrap_or_default()
    }

    pub fn step(&self) -> Result<ActivationStep, ValidationError> {
        present(&self.step)
            .and_then(ActivationStep::parse)
            .ok_or(ValidationError::UnknownStep)
    }

    /// Validates the account fields of the `create_account` step.
    pub fn account(&self) -> Result<AccountRequest, ValidationError> {
        let (Some(first_name), Some(last_name), Some(job_title), Some(email_prefix), Some(password)) = (
            present(&self.first_name),
            present(&self.last_name),
            present(&self.job_title),
            present(&self.email_prefix),
            present(&self.password),
        ) else {
            return Err(ValidationError::MissingAccountFields);
        };

        if !valid_email_prefix(email_prefix) {
            return Err(ValidationError::InvalidEmailPrefix);
        }
        if !strong_password(password) {
            return Err(ValidationError::WeakPassword);
        }

        Ok(AccountRequest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            job_title: job_title.to_string(),
            email_prefix: email_prefix.to_string(),
        })
    }
}

/// Validated account fields. The password is checked and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRequest {
    pub first_name: String,
    pub last_name: String,
    pub job_title: String,
    pub email_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivatedUser {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    pub email: String,
}

/// Mail domain offered to the new account: the organization's own domain when it meets
/// criteria 1.1 and 1.2, the shared `collectivite.fr` zone otherwise.
pub fn email_domain(signup: &SignupRecord) -> String {
    let compliant = ["1.1", "1.2"]
        .iter()
        .all(|code| signup.rcpnt.iter().any(|met| met == code));
    match signup.website_domain.as_deref() {
        Some(domain) if compliant && !domain.is_empty() => domain.to_string(),
        _ => format!("{}.collectivite.fr", signup.commune_slug),
    }
}
