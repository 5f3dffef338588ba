use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::domain::{Organization, OrganizationKind, OrganizationSummary};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Restricts a search to one kind of organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchFilter {
    #[default]
    All,
    Kind(OrganizationKind),
}

impl SearchFilter {
    /// `"all"`, an empty value or an unknown kind search everything.
    pub fn parse(value: Option<&str>) -> Self {
        value
            .and_then(OrganizationKind::parse)
            .map(Self::Kind)
            .unwrap_or(Self::All)
    }

    fn accepts(self, organization: &Organization) -> bool {
        match self {
            SearchFilter::All => true,
            SearchFilter::Kind(kind) => organization.kind == kind,
        }
    }
}

/// Folds a name for accent-insensitive comparisons.
///
/// Only the first standalone lowercase `st` becomes `saint`, and the match runs before
/// lowercasing: `st-etienne` folds to `saint etienne` while `St-Étienne` stays `st etienne`.
pub fn unaccent(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    expand_saint(&stripped).to_lowercase().trim().to_string()
}

fn expand_saint(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find("st") {
        let at = start + offset;
        let end = at + 2;
        let left_ok = at == 0 || !bytes[at - 1].is_ascii_alphanumeric();
        let right_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if left_ok && right_ok {
            return format!("{}saint{}", &text[..at], &text[end..]);
        }
        start = at + 1;
    }
    text.to_string()
}

/// Runs the four matching passes over `organizations` and merges the hits.
///
/// Each pass is ordered by population (largest first) and capped at `limit`; the
/// merged list keeps the first occurrence of every SIRET.
pub fn search_organizations<'a, I>(
    organizations: I,
    query: &str,
    filter: SearchFilter,
    limit: usize,
) -> Vec<OrganizationSummary>
where
    I: IntoIterator<Item = &'a Organization>,
{
    let query = query.trim();
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<(&Organization, String)> = organizations
        .into_iter()
        .filter(|organization| filter.accepts(organization))
        .map(|organization| (organization, unaccent(&organization.name)))
        .collect();
    candidates.sort_by(|(a, _), (b, _)| b.population.cmp(&a.population));

    let folded = unaccent(query);
    let words: Vec<&str> = folded.split_whitespace().collect();

    let query = Query {
        raw: query,
        folded: &folded,
        words: &words,
    };

    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    for pass in MatchPass::ORDER {
        candidates
            .iter()
            .filter(|(organization, name)| pass.matches(organization, name, &query))
            .take(limit)
            .for_each(|(organization, _)| {
                if seen.insert(organization.siret.as_str()) {
                    hits.push(OrganizationSummary::from(*organization));
                }
            });
    }
    hits
}

struct Query<'q> {
    raw: &'q str,
    folded: &'q str,
    words: &'q [&'q str],
}

#[derive(Debug, Clone, Copy)]
enum MatchPass {
    ZipcodePrefix,
    NamePrefix,
    NameContains,
    AllWords,
}

impl MatchPass {
    const ORDER: [MatchPass; 4] = [
        MatchPass::ZipcodePrefix,
        MatchPass::NamePrefix,
        MatchPass::NameContains,
        MatchPass::AllWords,
    ];

    fn matches(self, organization: &Organization, name: &str, query: &Query<'_>) -> bool {
        match self {
            MatchPass::ZipcodePrefix => organization
                .zipcode
                .as_deref()
                .is_some_and(|zipcode| zipcode.starts_with(query.raw)),
            MatchPass::NamePrefix => !query.folded.is_empty() && name.starts_with(query.folded),
            MatchPass::NameContains => !query.folded.is_empty() && name.contains(query.folded),
            MatchPass::AllWords => {
                !query.words.is_empty()
                    && query
                        .words
                        .iter()
                        .all(|word| name.split_whitespace().any(|part| part == *word))
            }
        }
    }
}
