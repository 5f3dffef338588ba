use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::validation::{check_lengths, missing_fields, present, ValidationError};
use crate::directory::{Commune, MutualizationStructure};
use crate::grist::RecordFields;

/// Declared membership of the partner structure the request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Yes,
    No,
    Unknown,
}

impl Membership {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Membership::Yes => "yes",
            Membership::No => "no",
            Membership::Unknown => "unknown",
        }
    }

    /// Label used in the partner-structure membership column.
    pub const fn record_label(self) -> &'static str {
        match self {
            Membership::Yes => "Oui",
            Membership::No => "Non",
            Membership::Unknown => "?",
        }
    }
}

/// Body of the pilot-group registration form, as posted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PilotGroupRequest {
    pub siret: Option<String>,
    pub postal_code: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_adherent: Option<String>,
    pub precisions: Option<String>,
    pub cgu_accepted: Option<String>,
    #[serde(rename = "structureId")]
    pub structure_id: Option<String>,
}

/// Contact details shared by both registration forms once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub siret: String,
    pub postal_code: String,
    pub name: String,
    pub role: String,
    pub email: String,
    pub phone: String,
    pub precisions: String,
    pub structure_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PilotGroupRegistration {
    pub contact: Contact,
    pub membership: Option<Membership>,
}

impl PilotGroupRequest {
    pub fn validate(self) -> Result<PilotGroupRegistration, ValidationError> {
        let missing = missing_fields(&[
            ("siret", &self.siret),
            ("postal_code", &self.postal_code),
            ("name", &self.name),
            ("role", &self.role),
            ("email", &self.email),
            ("phone", &self.phone),
            ("cgu_accepted", &self.cgu_accepted),
        ]);
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }
        if present(&self.cgu_accepted) != Some("yes") {
            return Err(ValidationError::TermsNotAccepted);
        }
        check_lengths(&[
            ("siret", &self.siret),
            ("postal_code", &self.postal_code),
            ("name", &self.name),
            ("role", &self.role),
            ("email", &self.email),
            ("phone", &self.phone),
            ("precisions", &self.precisions),
            ("structureId", &self.structure_id),
        ])?;

        let membership = parse_membership(&self.is_adherent)?;
        Ok(PilotGroupRegistration {
            contact: contact(
                self.siret,
                self.postal_code,
                self.name,
                self.role,
                self.email,
                self.phone,
                self.precisions,
                self.structure_id,
            ),
            membership,
        })
    }
}

impl PilotGroupRegistration {
    /// Row for the pilot-group table. The structure columns stay empty unless the
    /// requested structure was found.
    pub fn record(
        &self,
        commune: &Commune,
        structure: Option<&MutualizationStructure>,
        client_ip: &str,
    ) -> RecordFields {
        let (opsn, membership) = match structure {
            Some(structure) => (
                structure.display_name().to_string(),
                self.membership
                    .map(Membership::record_label)
                    .unwrap_or_default()
                    .to_string(),
            ),
            None => (String::new(), String::new()),
        };

        let contact = &self.contact;
        fields([
            ("Nom", contact.name.clone()),
            ("Mail", contact.email.clone()),
            ("Fonction", contact.role.clone()),
            ("Structure", commune.organization.name.clone()),
            ("Telephone", contact.phone.clone()),
            ("CP", contact.postal_code.clone()),
            ("SIRET", commune.organization.siret.clone()),
            ("OPSN", opsn),
            ("Membre_OPSN", membership),
            ("Precisions", contact.precisions.clone()),
            ("IP", client_ip.to_string()),
        ])
    }
}

/// Body of the signup form, as posted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    pub siret: Option<String>,
    pub postal_code: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_adherent: Option<String>,
    pub precisions: Option<String>,
    pub contact_preferences_details: Option<String>,
    pub cgu_accepted: Option<String>,
    #[serde(rename = "structureId")]
    pub structure_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupRegistration {
    pub contact: Contact,
    pub membership: Membership,
    pub detailed_contact_preferences: bool,
}

impl SignupRequest {
    pub fn validate(self) -> Result<SignupRegistration, ValidationError> {
        let missing = missing_fields(&[
            ("siret", &self.siret),
            ("postal_code", &self.postal_code),
            ("name", &self.name),
            ("role", &self.role),
            ("email", &self.email),
            ("phone", &self.phone),
            ("is_adherent", &self.is_adherent),
            ("cgu_accepted", &self.cgu_accepted),
        ]);
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }
        if present(&self.cgu_accepted) != Some("yes") {
            return Err(ValidationError::TermsNotAccepted);
        }
        check_lengths(&[
            ("siret", &self.siret),
            ("postal_code", &self.postal_code),
            ("name", &self.name),
            ("role", &self.role),
            ("email", &self.email),
            ("phone", &self.phone),
            ("precisions", &self.precisions),
            ("structureId", &self.structure_id),
        ])?;

        let membership =
            parse_membership(&self.is_adherent)?.ok_or(ValidationError::InvalidChoice {
                field: "is_adherent",
            })?;
        let detailed_contact_preferences =
            present(&self.contact_preferences_details) == Some("yes");

        Ok(SignupRegistration {
            contact: contact(
                self.siret,
                self.postal_code,
                self.name,
                self.role,
                self.email,
                self.phone,
                self.precisions,
                self.structure_id,
            ),
            membership,
            detailed_contact_preferences,
        })
    }
}

impl SignupRegistration {
    pub fn record(&self, commune: &Commune, client_ip: &str, now: DateTime<Utc>) -> RecordFields {
        let contact = &self.contact;
        fields([
            ("SIRET", contact.siret.clone()),
            ("Nom_Collectivite", commune.organization.name.clone()),
            ("Code_Postal_Verification", contact.postal_code.clone()),
            ("Nom_Prenom_Contact", contact.name.clone()),
            ("Fonction_Contact", contact.role.clone()),
            ("Email_Contact", contact.email.clone()),
            ("Telephone_Contact", contact.phone.clone()),
            ("Deja_Adherent", self.membership.as_str().to_string()),
            ("Precisions", contact.precisions.clone()),
            (
                "Preferences_Contact_Detaillees",
                yes_no(self.detailed_contact_preferences),
            ),
            ("CGU_Acceptees", yes_no(true)),
            (
                "Structure_ID",
                contact.structure_id.clone().unwrap_or_default(),
            ),
            (
                "Date_Inscription",
                now.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("Adresse_IP", client_ip.to_string()),
        ])
    }
}

fn parse_membership(value: &Option<String>) -> Result<Option<Membership>, ValidationError> {
    match present(value) {
        None => Ok(None),
        Some(raw) => Membership::parse(raw)
            .map(Some)
            .ok_or(ValidationError::InvalidChoice {
                field: "is_adherent",
            }),
    }
}

#[allow(clippy::too_many_arguments)]
fn contact(
    siret: Option<String>,
    postal_code: Option<String>,
    name: Option<String>,
    role: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    precisions: Option<String>,
    structure_id: Option<String>,
) -> Contact {
    Contact {
        siret: siret.unwrap_or_default(),
        postal_code: postal_code.unwrap_or_default(),
        name: name.unwrap_or_default(),
        role: role.unwrap_or_default(),
        email: email.unwrap_or_default(),
        phone: phone.unwrap_or_default(),
        precisions: precisions.unwrap_or_default(),
        structure_id: structure_id.filter(|id| !id.is_empty()),
    }
}

fn yes_no(value: bool) -> String {
    if value { "Oui" } else { "Non" }.to_string()
}

fn fields<const N: usize>(columns: [(&str, String); N]) -> RecordFields {
    columns
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Organization, OrganizationKind};
    use chrono::TimeZone;

    fn pilot_request() -> PilotGroupRequest {
        PilotGroupRequest {
            siret: Some("21010001600013".to_string()),
            postal_code: Some("01400".to_string()),
            name: Some("Camille Martin".to_string()),
            role: Some("Secrétaire de mairie".to_string()),
            email: Some("mairie@abergement.fr".to_string()),
            phone: Some("0474000000".to_string()),
            is_adherent: Some("yes".to_string()),
            precisions: None,
            cgu_accepted: Some("yes".to_string()),
            structure_id: Some("131".to_string()),
        }
    }

    fn commune() -> Commune {
        Commune {
            organization: Organization {
                siret: "21010001600013".to_string(),
                siren: "210100016".to_string(),
                kind: OrganizationKind::Commune,
                name: "L'Abergement-Clémenciat".to_string(),
                slug: "l-abergement-clemenciat".to_string(),
                insee_geo: None,
                insee_dep: Some("01".to_string()),
                insee_reg: None,
                zipcode: Some("01400".to_string()),
                population: 859,
                website_url: None,
                website_domain: None,
                rcpnt: Vec::new(),
                email_official: None,
                st_eligible: true,
                st_active: false,
                service_public_url: None,
            },
            structures: Vec::new(),
        }
    }

    fn siea() -> MutualizationStructure {
        MutualizationStructure {
            id: "131".to_string(),
            name: "Syndicat intercommunal d'énergie et de e-communication de l'Ain".to_string(),
            shortname: Some("SIEA".to_string()),
            kind: "Syndicat mixte".to_string(),
            website: None,
        }
    }

    #[test]
    fn pilot_request_lists_missing_fields() {
        let request = PilotGroupRequest {
            siret: None,
            phone: Some(String::new()),
            ..pilot_request()
        };
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingFields(vec!["siret", "phone"]))
        );
    }

    #[test]
    fn pilot_request_requires_terms() {
        let request = PilotGroupRequest {
            cgu_accepted: Some("no".to_string()),
            ..pilot_request()
        };
        assert_eq!(request.validate(), Err(ValidationError::TermsNotAccepted));
    }

    #[test]
    fn pilot_record_includes_structure_only_when_found() {
        let registration = pilot_request().validate().expect("valid request");
        let commune = commune();

        let with_structure = registration.record(&commune, Some(&siea()), "203.0.113.7");
        assert_eq!(with_structure["OPSN"], "SIEA");
        assert_eq!(with_structure["Membre_OPSN"], "Oui");
        assert_eq!(with_structure["Structure"], "L'Abergement-Clémenciat");
        assert_eq!(with_structure["IP"], "203.0.113.7");
        assert_eq!(with_structure["Precisions"], "");

        let without = registration.record(&commune, None, "203.0.113.7");
        assert_eq!(without["OPSN"], "");
        assert_eq!(without["Membre_OPSN"], "");
    }

    #[test]
    fn signup_requires_membership_answer() {
        let request = SignupRequest {
            siret: Some("21010001600013".to_string()),
            postal_code: Some("01400".to_string()),
            name: Some("Camille Martin".to_string()),
            role: Some("Maire".to_string()),
            email: Some("maire@abergement.fr".to_string()),
            phone: Some("0474000000".to_string()),
            is_adherent: Some("maybe".to_string()),
            cgu_accepted: Some("yes".to_string()),
            ..SignupRequest::default()
        };
        assert_eq!(
            request.clone().validate(),
            Err(ValidationError::InvalidChoice {
                field: "is_adherent"
            })
        );

        let valid = SignupRequest {
            is_adherent: Some("unknown".to_string()),
            contact_preferences_details: Some("yes".to_string()),
            ..request
        }
        .validate()
        .expect("valid signup");

        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let record = valid.record(&commune(), "unknown", now);
        assert_eq!(record["Deja_Adherent"], "unknown");
        assert_eq!(record["Preferences_Contact_Detaillees"], "Oui");
        assert_eq!(record["CGU_Acceptees"], "Oui");
        assert_eq!(record["Structure_ID"], "");
        assert_eq!(record["Date_Inscription"], "2025-03-14T09:30:00.000Z");
    }
}
