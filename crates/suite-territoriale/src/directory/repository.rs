use std::collections::{BTreeSet, HashMap};

use super::domain::{Commune, MutualizationStructure, Organization, OrganizationSummary};
use super::search::{search_organizations, SearchFilter};

/// Read access to the organization directory so handlers can be exercised in isolation.
pub trait OrganizationDirectory: Send + Sync {
    fn find_with_structures(&self, siret: &str) -> Result<Option<Commune>, DirectoryError>;
    fn find_structure(&self, id: &str) -> Result<Option<MutualizationStructure>, DirectoryError>;
    fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<OrganizationSummary>, DirectoryError>;
}

/// Error enumeration for directory failures.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Immutable in-process directory built from an ingested snapshot.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    organizations: HashMap<String, Organization>,
    structures: HashMap<String, MutualizationStructure>,
    links: HashMap<String, BTreeSet<String>>,
}

impl InMemoryDirectory {
    pub fn builder() -> InMemoryDirectoryBuilder {
        InMemoryDirectoryBuilder::default()
    }

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    pub fn organizations(&self) -> impl Iterator<Item = &Organization> {
        self.organizations.values()
    }
}

impl OrganizationDirectory for InMemoryDirectory {
    fn find_with_structures(&self, siret: &str) -> Result<Option<Commune>, DirectoryError> {
        let Some(organization) = self.organizations.get(siret) else {
            return Ok(None);
        };

        let structures = self
            .links
            .get(siret)
            .into_iter()
            .flatten()
            .filter_map(|id| self.structures.get(id))
            .cloned()
            .collect();

        Ok(Some(Commune {
            organization: organization.clone(),
            structures,
        }))
    }

    fn find_structure(&self, id: &str) -> Result<Option<MutualizationStructure>, DirectoryError> {
        Ok(self.structures.get(id).cloned())
    }

    fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<OrganizationSummary>, DirectoryError> {
        Ok(search_organizations(
            self.organizations.values(),
            query,
            filter,
            limit,
        ))
    }
}

/// Collects organizations, structures and their links before freezing them.
#[derive(Debug, Default)]
pub struct InMemoryDirectoryBuilder {
    directory: InMemoryDirectory,
}

impl InMemoryDirectoryBuilder {
    pub fn organization(mut self, organization: Organization) -> Self {
        self.directory
            .organizations
            .insert(organization.siret.clone(), organization);
        self
    }

    pub fn structure(mut self, structure: MutualizationStructure) -> Self {
        self.directory
            .structures
            .insert(structure.id.clone(), structure);
        self
    }

    /// Links an organization to a structure. Both must already be registered.
    pub fn link(mut self, siret: &str, structure_id: &str) -> Result<Self, UnknownLink> {
        if !self.directory.organizations.contains_key(siret)
            || !self.directory.structures.contains_key(structure_id)
        {
            return Err(UnknownLink {
                siret: siret.to_string(),
                structure_id: structure_id.to_string(),
            });
        }

        self.directory
            .links
            .entry(siret.to_string())
            .or_default()
            .insert(structure_id.to_string());
        Ok(self)
    }

    pub fn build(self) -> InMemoryDirectory {
        self.directory
    }
}

/// Link referencing an organization or structure missing from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("link {siret} -> {structure_id} references an unknown organization or structure")]
pub struct UnknownLink {
    pub siret: String,
    pub structure_id: String,
}
