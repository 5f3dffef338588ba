use serde::{Deserialize, Serialize};

use super::case::OnboardingCase;
use super::resolver::{determine_onboarding_case, OnboardingOptions, OnboardingOutcome};
use crate::directory::{Commune, OrganizationDirectory};

pub const INVALID_SIRET_ERROR: &str = "Identifiant de collectivité invalide";

/// Raw query parameters of the welcome page (`/bienvenue/{siret}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingQuery {
    pub direct: Option<String>,
    pub structure_id: Option<String>,
    pub is_existing_member: Option<String>,
    pub futur: Option<String>,
}

impl OnboardingOptions {
    /// Derives options from URL parameters. While the onboarding is closed every request
    /// lands on the coming-soon view unless `futur=1` previews the live flow.
    pub fn from_query(query: &OnboardingQuery, onboarding_open: bool) -> Self {
        let preview = query.futur.as_deref() == Some("1");
        Self {
            direct: Some(query.direct.as_deref() == Some("1")),
            structure_id: query
                .structure_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            is_existing_member: Some(query.is_existing_member.as_deref() == Some("true")),
            coming_soon: Some(!onboarding_open && !preview),
        }
    }
}

/// Everything the welcome page renders: the commune snapshot (when found), the selected
/// view and the resolver output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune: Option<Commune>,
    pub view: &'static str,
    #[serde(flatten)]
    pub outcome: OnboardingOutcome,
}

impl OnboardingPage {
    fn new(commune: Option<Commune>, outcome: OnboardingOutcome) -> Self {
        Self {
            commune,
            view: outcome.onboarding_case.view(),
            outcome,
        }
    }

    pub fn onboarding_case(&self) -> OnboardingCase {
        self.outcome.onboarding_case
    }
}

/// Looks the commune up and resolves its onboarding case. Lookup failures surface as the
/// `ERROR` case rather than as an error value.
pub fn onboarding_page<D>(
    directory: &D,
    siret: &str,
    query: &OnboardingQuery,
    onboarding_open: bool,
) -> OnboardingPage
where
    D: OrganizationDirectory + ?Sized,
{
    let siret = siret.trim();
    let no_options = OnboardingOptions::default();

    if siret.is_empty() {
        let outcome = determine_onboarding_case(None, &no_options, Some(INVALID_SIRET_ERROR));
        return OnboardingPage::new(None, outcome);
    }

    let commune = match directory.find_with_structures(siret) {
        Ok(Some(commune)) => commune,
        Ok(None) => {
            let message = format!(
                "La Suite territoriale n'est disponible que pour les communes françaises. \
                 Le SIRET {siret} ne correspond à aucune d'entre elles."
            );
            let outcome = determine_onboarding_case(None, &no_options, Some(&message));
            return OnboardingPage::new(None, outcome);
        }
        Err(err) => {
            tracing::error!(%siret, error = %err, "commune lookup failed");
            let message = err.to_string();
            let outcome = determine_onboarding_case(None, &no_options, Some(&message));
            return OnboardingPage::new(None, outcome);
        }
    };

    let options = OnboardingOptions::from_query(query, onboarding_open);
    let outcome = determine_onboarding_case(Some(&commune), &options, None);
    tracing::debug!(%siret, case = outcome.onboarding_case.label(), "onboarding case resolved");
    OnboardingPage::new(Some(commune), outcome)
}
