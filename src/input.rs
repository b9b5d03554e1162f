//! Input ingestion: resources arrive either as CLI arguments or piped in
//! line-by-line from a companion listing tool.

use std::io::BufRead;

use thiserror::Error;
use tracing::debug;

use crate::resource::{BackendKey, Resource, TypeFilter, prefix_resource_type};

/// Profile column value the listing tool emits when no named profile applies.
pub const NO_PROFILE_SENTINEL: &str = r"N\A";

/// Listing tool output starts with a header line of column names.
const HEADER_MARKER: &str = "TYPE";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("not enough arguments given: <resource_type> <resource_id>...")]
    NotEnoughArguments,
    #[error("no resource type found: {0}")]
    UnsupportedType(String),
    #[error("input must be of form: <resource_type> <resource_id> <profile> <region>")]
    MalformedRecord,
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Split argument-mode input into a canonicalized resource type and ids.
pub fn parse_type_and_ids(
    args: &[String],
    filter: &TypeFilter,
) -> Result<(String, Vec<String>), InputError> {
    let [rtype, ids @ ..] = args else {
        return Err(InputError::NotEnoughArguments);
    };
    if ids.is_empty() {
        return Err(InputError::NotEnoughArguments);
    }

    let rtype = prefix_resource_type(rtype);
    if !filter.is_supported(&rtype) {
        return Err(InputError::UnsupportedType(rtype));
    }

    Ok((rtype, ids.to_vec()))
}

/// Profiles for argument-mode scope resolution: an explicit flag wins,
/// otherwise the ambient `AWS_PROFILE` value, otherwise none (empty profile,
/// credential layer decides).
pub fn profiles_from(flag: Option<&str>, env_profile: Option<String>) -> Vec<String> {
    if let Some(profile) = flag {
        vec![profile.to_string()]
    } else if let Some(profile) = env_profile.filter(|p| !p.is_empty()) {
        vec![profile]
    } else {
        Vec::new()
    }
}

/// Cross product of ids and resolved scopes: one descriptor per id per scope.
pub fn descriptors(rtype: &str, ids: &[String], keys: &[BackendKey]) -> Vec<Resource> {
    let mut resources = Vec::with_capacity(ids.len() * keys.len());
    for key in keys {
        for id in ids {
            resources.push(Resource {
                resource_type: rtype.to_string(),
                id: id.clone(),
                profile: key.profile.clone(),
                region: key.region.clone(),
            });
        }
    }
    resources
}

/// Read newline-delimited `<type> <id> <profile> <region>` records until EOF.
///
/// Blank lines and the listing tool's header line are skipped. A single
/// malformed or unsupported record fails the whole read.
pub fn read_from_pipe<R: BufRead>(
    reader: R,
    filter: &TypeFilter,
) -> Result<Vec<Resource>, InputError> {
    let mut resources = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with(HEADER_MARKER) {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(InputError::MalformedRecord);
        }

        let rtype = prefix_resource_type(fields[0]);
        if !filter.is_supported(&rtype) {
            return Err(InputError::UnsupportedType(rtype));
        }

        let profile = if fields[2] == NO_PROFILE_SENTINEL {
            ""
        } else {
            fields[2]
        };

        resources.push(Resource {
            resource_type: rtype,
            id: fields[1].to_string(),
            profile: profile.to_string(),
            region: fields[3].to_string(),
        });
    }

    debug!(count = resources.len(), "read resources from pipe");
    Ok(resources)
}
