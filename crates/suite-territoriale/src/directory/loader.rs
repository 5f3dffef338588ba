use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use super::domain::{MutualizationStructure, Organization, OrganizationKind};
use super::repository::{InMemoryDirectory, UnknownLink};

pub const ORGANIZATIONS_FILE: &str = "organizations.csv";
pub const STRUCTURES_FILE: &str = "structures.csv";
pub const LINKS_FILE: &str = "organizations_to_structures.csv";

/// Error raised while ingesting a directory dump.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed row in {file}: {source}")]
    Csv {
        file: &'static str,
        source: csv::Error,
    },
    #[error("unknown organization type '{value}' for {siret}")]
    UnknownKind { siret: String, value: String },
    #[error(transparent)]
    DanglingLink(#[from] UnknownLink),
}

/// Loads the three CSV dumps found in `dir` into an in-memory directory.
pub fn load_directory(dir: &Path) -> Result<InMemoryDirectory, LoadError> {
    let organizations = open(dir, ORGANIZATIONS_FILE)?;
    let structures = open(dir, STRUCTURES_FILE)?;
    let links = open(dir, LINKS_FILE)?;
    load_from_readers(organizations, structures, links)
}

fn open(dir: &Path, file: &str) -> Result<File, LoadError> {
    open_path(dir.join(file))
}

pub(crate) fn open_path(path: PathBuf) -> Result<File, LoadError> {
    File::open(&path).map_err(|source| LoadError::Open { path, source })
}

pub fn load_from_readers<O, S, L>(
    organizations: O,
    structures: S,
    links: L,
) -> Result<InMemoryDirectory, LoadError>
where
    O: Read,
    S: Read,
    L: Read,
{
    let mut builder = InMemoryDirectory::builder();

    for row in rows::<OrganizationRow, _>(organizations, ORGANIZATIONS_FILE)? {
        builder = builder.organization(row.into_organization()?);
    }

    for row in rows::<StructureRow, _>(structures, STRUCTURES_FILE)? {
        builder = builder.structure(row.into());
    }

    for row in rows::<LinkRow, _>(links, LINKS_FILE)? {
        builder = builder.link(&row.organization_siret, &row.structure_id)?;
    }

    let directory = builder.build();
    tracing::info!(
        organizations = directory.organization_count(),
        structures = directory.structure_count(),
        "directory snapshot loaded"
    );
    Ok(directory)
}

pub(crate) fn rows<T, R>(reader: R, file: &'static str) -> Result<Vec<T>, LoadError>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize::<T>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LoadError::Csv { file, source })
}

#[derive(Debug, Deserialize)]
struct OrganizationRow {
    siret: String,
    siren: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    slug: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    insee_geo: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    insee_dep: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    insee_reg: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    zipcode: Option<String>,
    population: u32,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    website_url: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    website_domain: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rcpnt: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    email_official: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    st_eligible: bool,
    #[serde(default, deserialize_with = "flag")]
    st_active: bool,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    service_public_url: Option<String>,
}

impl OrganizationRow {
    fn into_organization(self) -> Result<Organization, LoadError> {
        let kind = OrganizationKind::parse(&self.kind).ok_or_else(|| LoadError::UnknownKind {
            siret: self.siret.clone(),
            value: self.kind.clone(),
        })?;

        let rcpnt = split_codes(self.rcpnt.as_deref());

        Ok(Organization {
            siret: self.siret,
            siren: self.siren,
            kind,
            name: self.name,
            slug: self.slug,
            insee_geo: self.insee_geo,
            insee_dep: self.insee_dep,
            insee_reg: self.insee_reg,
            zipcode: self.zipcode,
            population: self.population,
            website_url: self.website_url,
            website_domain: self.website_domain,
            rcpnt,
            email_official: self.email_official,
            st_eligible: self.st_eligible,
            st_active: self.st_active,
            service_public_url: self.service_public_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StructureRow {
    id: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    shortname: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    website: Option<String>,
}

impl From<StructureRow> for MutualizationStructure {
    fn from(row: StructureRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            shortname: row.shortname,
            kind: row.kind,
            website: row.website,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LinkRow {
    organization_siret: String,
    structure_id: String,
}

/// `;`-separated criteria codes, blanks dropped.
pub(crate) fn split_codes(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(';')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub(crate) fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Boolean cell as written by spreadsheet and Postgres exports. An empty cell is `false`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "f" | "0" | "no" => Ok(false),
        "true" | "t" | "1" | "yes" => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean flag '{other}'"
        ))),
    }
}
