//! Progress reporting shared by every pipeline stage.

use tracing::{info, warn};

use crate::resource::Resource;

/// Log an uppercase section header separating pipeline phases.
pub fn title(text: &str) {
    info!("{}", text.to_uppercase());
}

/// A resource that no longer exists remotely.
pub fn absent(resource: &Resource) {
    info!(
        id = %resource.id,
        profile = %resource.profile,
        region = %resource.region,
        "{}", resource.resource_type,
    );
}

/// A resource that would be (or is about to be) deleted.
pub fn pending_deletion(resource: &Resource) {
    warn!(
        id = %resource.id,
        profile = %resource.profile,
        region = %resource.region,
        "{}", resource.resource_type,
    );
}

/// A resource that was successfully deleted.
pub fn deleted(resource: &Resource) {
    info!(
        id = %resource.id,
        profile = %resource.profile,
        region = %resource.region,
        "deleted {}", resource.resource_type,
    );
}
