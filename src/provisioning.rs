//! Account provisioning as seen by the wider admin system. Only the
//! contract lives here; the identity backend implements it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role stamped on every provisioned profile.
pub const PROVISIONED_ROLE: &str = "teacher";

/// An authenticated administrator, scoped to one school.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminScope {
    pub admin_id: String,
    pub school_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedAccount {
    pub uid: String,
    pub temporary_password: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("an account already exists for {0}")]
    AlreadyExists(String),
    #[error("invalid account request: {0}")]
    Invalid(String),
    #[error("provisioning backend failed: {0}")]
    Backend(String),
}

impl NewAccount {
    /// Trimmed name, lower-cased email, rejecting obviously bad input.
    pub fn normalized(&self) -> Result<NewAccount, ProvisioningError> {
        let full_name = self.full_name.trim().to_string();
        let email = self.email.trim().to_ascii_lowercase();
        if full_name.is_empty() {
            return Err(ProvisioningError::Invalid("fullName is required".into()));
        }
        let valid_email = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid_email {
            return Err(ProvisioningError::Invalid(format!("bad email: {email}")));
        }
        Ok(NewAccount { full_name, email })
    }
}

/// Creates an identity and a profile tagged with the caller's school and
/// [`PROVISIONED_ROLE`], issues a one-time credential reset and records an
/// audit entry. Fails with `AlreadyExists` when the email is taken.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    async fn provision(
        &self,
        scope: &AdminScope,
        request: NewAccount,
    ) -> Result<ProvisionedAccount, ProvisioningError>;
}
