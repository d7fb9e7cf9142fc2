//! Chooses which of the two fleet credential sets a camera answers to.

use crate::config::{CredentialSet, Credentials};
use crate::inventory::{CameraRecord, CameraType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialClass {
    Analytics,
    Default,
}

/// A "surveillance" analytics descriptor wins over the camera type; otherwise analytics
/// cameras use the analytics set and everything else the default set.
pub fn classify(camera_type: CameraType, analytics: &str) -> CredentialClass {
    if analytics.to_lowercase().contains("surveillance") || camera_type == CameraType::Analytics {
        CredentialClass::Analytics
    } else {
        CredentialClass::Default
    }
}

pub fn resolve_credentials<'a>(record: &CameraRecord, credentials: &'a Credentials) -> &'a CredentialSet {
    match record.credential_class() {
        CredentialClass::Analytics => &credentials.analytics,
        CredentialClass::Default => &credentials.default,
    }
}
