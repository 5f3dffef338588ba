use serde::{Deserialize, Serialize};

use super::case::OnboardingCase;
use crate::directory::{Commune, COMMUNE_THRESHOLD};

pub const DEFAULT_ERROR: &str = "Commune introuvable";
pub const UNKNOWN_STRUCTURE_ERROR: &str = "Structure introuvable";

/// Onboarding switches carried by the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingOptions {
    #[serde(default)]
    pub direct: Option<bool>,
    #[serde(default)]
    pub structure_id: Option<String>,
    #[serde(default)]
    pub is_existing_member: Option<bool>,
    #[serde(default)]
    pub coming_soon: Option<bool>,
}

/// Selected case plus the fields its view needs. Fields irrelevant to the case stay `None`
/// and are left out of the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingOutcome {
    pub onboarding_case: OnboardingCase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_existing_member: Option<bool>,
}

impl OnboardingOutcome {
    pub fn case(onboarding_case: OnboardingCase) -> Self {
        Self {
            onboarding_case,
            error: None,
            population: None,
            structure_id: None,
            is_existing_member: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::case(OnboardingCase::Error)
        }
    }

    fn direct(population: u32) -> Self {
        let onboarding_case = if population <= COMMUNE_THRESHOLD {
            OnboardingCase::UniqueCodeRequest
        } else {
            OnboardingCase::ContactUs
        };
        Self {
            population: Some(population),
            ..Self::case(onboarding_case)
        }
    }
}

/// Classifies a request into exactly one onboarding case. First matching rule wins:
///
/// 1. upstream error or missing commune
/// 2. `coming_soon`
/// 3. commune already active in the Régie
/// 4. `direct` or no partner structure: unique code up to 3,500 inhabitants, contact otherwise
/// 5. pre-selected structure (an empty id counts as none), which must belong to the commune
/// 6. structure choice
///
/// `is_existing_member` is forwarded as given; membership is not checked here.
pub fn determine_onboarding_case(
    commune: Option<&Commune>,
    options: &OnboardingOptions,
    error: Option<&str>,
) -> OnboardingOutcome {
    let error = error.filter(|message| !message.is_empty());
    let commune = match (error, commune) {
        (Some(message), _) => return OnboardingOutcome::error(message),
        (None, None) => return OnboardingOutcome::error(DEFAULT_ERROR),
        (None, Some(commune)) => commune,
    };

    if options.coming_soon == Some(true) {
        return OnboardingOutcome::case(OnboardingCase::ComingSoon);
    }

    if commune.organization.st_active {
        return OnboardingOutcome::case(OnboardingCase::ActiveInRegie);
    }

    if options.direct == Some(true) || commune.structures.is_empty() {
        return OnboardingOutcome::direct(commune.organization.population);
    }

    let selected = options.structure_id.as_deref().filter(|id| !id.is_empty());
    if let Some(structure_id) = selected {
        return match commune.structure(structure_id) {
            Some(structure) => OnboardingOutcome {
                structure_id: Some(structure.id.clone()),
                is_existing_member: options.is_existing_member,
                ..OnboardingOutcome::case(OnboardingCase::ContactUs)
            },
            None => OnboardingOutcome::error(UNKNOWN_STRUCTURE_ERROR),
        };
    }

    OnboardingOutcome::case(OnboardingCase::OpsnChoice)
}
