//! Compliance statistics computed from the directory snapshot: per-department organization
//! lists and per-scope counts of the criteria (`rcpnt`) codes organizations meet.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::directory::{DirectoryError, InMemoryDirectory, Organization, OrganizationKind};

/// Criteria reported when the caller does not pick any.
pub const DEFAULT_REFS: &str = "1.a,2.a";
/// Group key of the scopes that are not split.
pub const GLOBAL_SCOPE_ID: &str = "global";

const POPULATION_BOUNDS: [u32; 10] = [
    200, 500, 1_000, 2_000, 3_500, 5_000, 10_000, 20_000, 50_000, 100_000,
];

/// Grouping applied before counting criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope {
    /// Every commune in one group.
    Global,
    /// Every EPCI in one group.
    GlobalEpci,
    Department,
    Region,
    PopulationRange,
}

impl StatsScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(Self::Global),
            "global-epci" => Some(Self::GlobalEpci),
            "dep" => Some(Self::Department),
            "reg" => Some(Self::Region),
            "pop" => Some(Self::PopulationRange),
            _ => None,
        }
    }

    fn kind(self) -> OrganizationKind {
        match self {
            StatsScope::GlobalEpci => OrganizationKind::Epci,
            _ => OrganizationKind::Commune,
        }
    }

    fn group_of(self, organization: &Organization) -> Option<String> {
        let group = match self {
            StatsScope::Global | StatsScope::GlobalEpci => Some(GLOBAL_SCOPE_ID.to_string()),
            StatsScope::Department => organization.insee_dep.clone(),
            StatsScope::Region => organization.insee_reg.clone(),
            StatsScope::PopulationRange => Some(population_range(organization.population)),
        };
        group.filter(|group| !group.is_empty())
    }
}

/// Bucket label such as `"500-1000"`; the upper bound is inclusive and the last bucket is `"100000-"`.
pub fn population_range(population: u32) -> String {
    let mut lower = 0;
    for upper in POPULATION_BOUNDS {
        if population <= upper {
            return format!("{lower}-{upper}");
        }
        lower = upper;
    }
    format!("{lower}-")
}

/// Splits a comma-separated criteria list, dropping blanks and duplicates.
pub fn parse_refs(refs: &str) -> Vec<String> {
    refs.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// How many organizations of a group meet one criterion, by count and by population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionStats {
    #[serde(rename = "ref")]
    pub code: String,
    pub valid: u32,
    pub total: u32,
    pub valid_pop: u64,
    pub total_pop: u64,
}

/// Criteria counts keyed by group (department code, region code, population range or
/// [`GLOBAL_SCOPE_ID`]).
pub type CriteriaStats = BTreeMap<String, Vec<CriterionStats>>;

/// Row of the per-department organization list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentEntry {
    pub siret: String,
    pub name: String,
    pub insee_geo: Option<String>,
    pub pop: u32,
    pub rcpnt: Vec<String>,
}

impl From<&Organization> for DepartmentEntry {
    fn from(organization: &Organization) -> Self {
        Self {
            siret: organization.siret.clone(),
            name: organization.name.clone(),
            insee_geo: organization.insee_geo.clone(),
            pop: organization.population,
            rcpnt: organization.rcpnt.clone(),
        }
    }
}

/// Counts each criterion in `refs` over the groups of `scope`.
pub fn criteria_stats<'a, I>(organizations: I, scope: StatsScope, refs: &[String]) -> CriteriaStats
where
    I: IntoIterator<Item = &'a Organization>,
{
    let mut groups: BTreeMap<String, Vec<&Organization>> = BTreeMap::new();
    for organization in organizations {
        if organization.kind != scope.kind() {
            continue;
        }
        if let Some(group) = scope.group_of(organization) {
            groups.entry(group).or_default().push(organization);
        }
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let total = members.len() as u32;
            let total_pop = members.iter().map(|org| u64::from(org.population)).sum();
            let stats = refs
                .iter()
                .map(|code| {
                    let valid: Vec<_> = members
                        .iter()
                        .filter(|org| org.rcpnt.iter().any(|held| held == code))
                        .collect();
                    CriterionStats {
                        code: code.clone(),
                        valid: valid.len() as u32,
                        total,
                        valid_pop: valid.iter().map(|org| u64::from(org.population)).sum(),
                        total_pop,
                    }
                })
                .collect();
            (group, stats)
        })
        .collect()
}

/// Organizations of `kind` located in department `dep`, ordered by name.
pub fn department_list<'a, I>(
    organizations: I,
    kind: OrganizationKind,
    dep: &str,
) -> Vec<DepartmentEntry>
where
    I: IntoIterator<Item = &'a Organization>,
{
    let mut entries: Vec<DepartmentEntry> = organizations
        .into_iter()
        .filter(|org| org.kind == kind && org.insee_dep.as_deref() == Some(dep))
        .map(DepartmentEntry::from)
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.siret.cmp(&b.siret)));
    entries
}

/// Statistics read access, kept apart from lookups so handlers can be exercised in isolation.
pub trait OrganizationStatistics: Send + Sync {
    fn department_list(
        &self,
        kind: OrganizationKind,
        dep: &str,
    ) -> Result<Vec<DepartmentEntry>, DirectoryError>;
    fn criteria_stats(
        &self,
        scope: StatsScope,
        refs: &[String],
    ) -> Result<CriteriaStats, DirectoryError>;
}

impl OrganizationStatistics for InMemoryDirectory {
    fn department_list(
        &self,
        kind: OrganizationKind,
        dep: &str,
    ) -> Result<Vec<DepartmentEntry>, DirectoryError> {
        Ok(department_list(self.organizations(), kind, dep))
    }

    fn criteria_stats(
        &self,
        scope: StatsScope,
        refs: &[String],
    ) -> Result<CriteriaStats, DirectoryError> {
        Ok(criteria_stats(self.organizations(), scope, refs))
    }
}
