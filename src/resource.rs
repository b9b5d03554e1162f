//! Resource descriptors and the profile/region keys that bind them to a
//! provider backend.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};

/// One candidate for deletion, as produced by the listing tool or CLI args.
///
/// An empty `profile` means "use ambient credentials" and is left to the
/// credential layer to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub resource_type: String,
    pub id: String,
    pub profile: String,
    pub region: String,
}

impl Resource {
    pub fn key(&self) -> BackendKey {
        BackendKey {
            profile: self.profile.clone(),
            region: self.region.clone(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resource_type, self.id)
    }
}

/// Identifies one provider backend. Many resources share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey {
    pub profile: String,
    pub region: String,
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profile = if self.profile.is_empty() {
            "<ambient>"
        } else {
            &self.profile
        };
        let region = if self.region.is_empty() {
            "<ambient>"
        } else {
            &self.region
        };
        write!(f, "{profile}/{region}")
    }
}

/// Prefix a bare resource type with `aws_` so that `vpc` and `aws_vpc`
/// both address the same provider type.
pub fn prefix_resource_type(rtype: &str) -> String {
    if rtype.starts_with("aws_") {
        rtype.to_string()
    } else {
        format!("aws_{rtype}")
    }
}

/// The distinct backend keys referenced by the given resources,
/// in first-seen order.
pub fn backend_keys(resources: &[Resource]) -> Vec<BackendKey> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for resource in resources {
        let key = resource.key();
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

/// Predicate deciding which resource types this tool is willing to touch.
///
/// `Catalog` carries the type table of the companion listing tool;
/// `WellFormed` is the fallback when no table is available and accepts any
/// canonicalized `aws_*` identifier.
#[derive(Debug, Clone)]
pub enum TypeFilter {
    Catalog(HashSet<String>),
    WellFormed,
}

impl TypeFilter {
    /// Load a catalog from the listing tool's type table: one type per line,
    /// bare entries canonicalized, blank lines ignored.
    pub fn from_table_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table = std::fs::read_to_string(path).with_context(|| {
            format!("failed to read resource type table {}", path.display())
        })?;
        Ok(Self::from_table(&table))
    }

    fn from_table(table: &str) -> Self {
        TypeFilter::Catalog(
            table
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(prefix_resource_type)
                .collect(),
        )
    }

    pub fn is_supported(&self, rtype: &str) -> bool {
        match self {
            TypeFilter::Catalog(catalog) => catalog.contains(rtype),
            TypeFilter::WellFormed => rtype.strip_prefix("aws_").is_some_and(|rest| {
                !rest.is_empty()
                    && rest
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }),
        }
    }
}
