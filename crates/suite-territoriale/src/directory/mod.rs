//! Organizations, partner structures and the read-only directory serving them.

pub mod domain;
pub mod loader;
pub mod repository;
pub mod search;

pub use domain::{
    Commune, MutualizationStructure, Organization, OrganizationKind, OrganizationSummary,
    COMMUNE_THRESHOLD, EPCI_THRESHOLD,
};
pub use loader::{load_directory, LoadError};
pub use repository::{
    DirectoryError, InMemoryDirectory, InMemoryDirectoryBuilder, OrganizationDirectory,
    UnknownLink,
};
pub use search::{search_organizations, unaccent, SearchFilter, DEFAULT_SEARCH_LIMIT};
