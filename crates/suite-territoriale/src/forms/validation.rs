use crate::directory::{Organization, OrganizationKind};

/// Upper bound on the length of any free-text field, in characters.
pub const MAX_FIELD_LENGTH: usize = 1024;

/// Input rejected before any lookup or outbound call. Messages are shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Champs obligatoires manquants: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Vous devez accepter les Conditions Générales d'Utilisation.")]
    TermsNotAccepted,
    #[error(
        "Le champ {field} dépasse la longueur maximale autorisée de {max} caractères.",
        max = MAX_FIELD_LENGTH
    )]
    FieldTooLong { field: &'static str },
    #[error("Valeur invalide pour le champ {field}.")]
    InvalidChoice { field: &'static str },
    #[error("Le code postal ne correspond pas à celui de la collectivité.")]
    PostalCodeMismatch,
    #[error("Le département ne correspond pas à celui de l'EPCI.")]
    DepartmentMismatch,
    #[error("Paramètres obligatoires manquants.")]
    MissingActivationParameters,
    #[error("Un des champs dépasse la longueur maximale autorisée.")]
    ActivationFieldTooLong,
    #[error("Étape non reconnue.")]
    UnknownStep,
    #[error("Tous les champs sont requis pour la création du compte.")]
    MissingAccountFields,
    #[error("Le préfixe email doit contenir uniquement des lettres minuscules, chiffres, points et tirets.")]
    InvalidEmailPrefix,
    #[error("Le mot de passe doit contenir au moins 8 caractères, une majuscule, une minuscule et un chiffre.")]
    WeakPassword,
}

/// A value counts as present when it is set and not empty.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

pub(crate) fn missing_fields(fields: &[(&'static str, &Option<String>)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| *name)
        .collect()
}

pub(crate) fn too_long(value: &Option<String>) -> bool {
    value
        .as_deref()
        .is_some_and(|value| value.chars().count() > MAX_FIELD_LENGTH)
}

pub(crate) fn check_lengths(
    fields: &[(&'static str, &Option<String>)],
) -> Result<(), ValidationError> {
    match fields.iter().find(|(_, value)| too_long(value)) {
        Some((field, _)) => Err(ValidationError::FieldTooLong { field: *field }),
        None => Ok(()),
    }
}

/// Communes are checked against their postal code, EPCIs against their department.
pub fn check_postal_code(
    organization: &Organization,
    postal_code: &str,
) -> Result<(), ValidationError> {
    match organization.kind {
        OrganizationKind::Commune if organization.zipcode.as_deref() != Some(postal_code) => {
            Err(ValidationError::PostalCodeMismatch)
        }
        OrganizationKind::Epci if organization.insee_dep.as_deref() != Some(postal_code) => {
            Err(ValidationError::DepartmentMismatch)
        }
        _ => Ok(()),
    }
}

/// Lowercase letters, digits, dots and dashes; 1 to 50 characters.
pub fn valid_email_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= 50
        && prefix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
}

/// At least 8 characters with one uppercase letter, one lowercase letter and one digit.
pub fn strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}
