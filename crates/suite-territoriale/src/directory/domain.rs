use serde::{Deserialize, Serialize};

/// Population ceiling under which a municipality may request a unique activation code.
pub const COMMUNE_THRESHOLD: u32 = 3_500;
/// Population ceiling applied to inter-municipal bodies.
pub const EPCI_THRESHOLD: u32 = 15_000;

/// Class of local authority held in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationKind {
    Commune,
    Epci,
}

impl OrganizationKind {
    pub const fn eligibility_threshold(self) -> u32 {
        match self {
            OrganizationKind::Commune => COMMUNE_THRESHOLD,
            OrganizationKind::Epci => EPCI_THRESHOLD,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "commune" => Some(Self::Commune),
            "epci" => Some(Self::Epci),
            _ => None,
        }
    }
}

/// A municipality or inter-municipal body, keyed by its SIRET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub siret: String,
    pub siren: String,
    #[serde(rename = "type")]
    pub kind: OrganizationKind,
    pub name: String,
    pub slug: String,
    pub insee_geo: Option<String>,
    pub insee_dep: Option<String>,
    pub insee_reg: Option<String>,
    pub zipcode: Option<String>,
    pub population: u32,
    pub website_url: Option<String>,
    pub website_domain: Option<String>,
    #[serde(default)]
    pub rcpnt: Vec<String>,
    pub email_official: Option<String>,
    pub st_eligible: bool,
    pub st_active: bool,
    pub service_public_url: Option<String>,
}

/// Regional intermediary able to sponsor an organization's onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualizationStructure {
    pub id: String,
    pub name: String,
    pub shortname: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub website: Option<String>,
}

impl MutualizationStructure {
    pub fn display_name(&self) -> &str {
        match self.shortname.as_deref() {
            Some(short) if !short.trim().is_empty() => short,
            _ => &self.name,
        }
    }
}

/// Point-in-time snapshot of an organization with the structures it can join through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commune {
    #[serde(flatten)]
    pub organization: Organization,
    pub structures: Vec<MutualizationStructure>,
}

impl Commune {
    pub fn structure(&self, id: &str) -> Option<&MutualizationStructure> {
        self.structures.iter().find(|structure| structure.id == id)
    }
}

/// Search hit returned by the autocomplete endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationSummary {
    pub siret: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OrganizationKind,
    pub zipcode: Option<String>,
    pub insee_geo: Option<String>,
    pub insee_dep: Option<String>,
    pub population: u32,
}

impl From<&Organization> for OrganizationSummary {
    fn from(organization: &Organization) -> Self {
        Self {
            siret: organization.siret.clone(),
            name: organization.name.clone(),
            kind: organization.kind,
            zipcode: organization.zipcode.clone(),
            insee_geo: organization.insee_geo.clone(),
            insee_dep: organization.insee_dep.clone(),
            population: organization.population,
        }
    }
}
