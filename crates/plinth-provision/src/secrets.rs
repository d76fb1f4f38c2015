//! Get-or-create secret flows
//!
//! Every secret is keyed by an owner identity and created exactly once:
//! the store is consulted before any generation occurs, and an existing
//! record is returned byte-identical. "Secret exists" is never an error.

use tracing::debug;

use plinth_cloud::SecretStore;
use plinth_common::secret::{generate_password, Credential, DatabaseSecret};
use plinth_common::{Error, Result};

/// Inputs for deriving a fresh database secret. Only used when no record
/// exists for the owner yet.
#[derive(Debug)]
pub struct DatabaseSecretSeed<'a> {
    /// Master username from the spec
    pub username: &'a str,
    /// Provisioned instance address
    pub host: &'a str,
    /// Provisioned instance port
    pub port: u16,
    /// Name of the initial database
    pub db_name: &'a str,
}

/// Secret material service over a [`SecretStore`]
pub struct SecretService<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> SecretService<'a> {
    /// Create a service over the given store
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    /// Ensure an access credential exists for `owner`, generating the
    /// secret key material exactly once.
    ///
    /// Returns the credential and the stored secret name (the reference
    /// handed to callers instead of the value).
    pub async fn ensure_credential(
        &self,
        owner: &str,
        proposed_name: &str,
        principal: &str,
        access_key_id: &str,
    ) -> Result<(Credential, String)> {
        if let Some(record) = self.store.get(owner).await? {
            debug!(owner = %owner, "reusing previously issued credential");
            let credential: Credential = serde_json::from_str(&record.value).map_err(|e| {
                Error::serialization(format!("stored credential for {owner} is unreadable: {e}"))
            })?;
            return Ok((credential, record.name));
        }

        let credential = Credential {
            principal: principal.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_value: generate_password(),
        };
        let record = self
            .store
            .put(owner, proposed_name, &serde_json::to_string(&credential)?)
            .await?;
        Ok((credential, record.name))
    }

    /// Ensure a database connection secret exists for `owner`.
    ///
    /// The password is generated on first derivation only; the age of an
    /// existing record is a signal, never a trigger to regenerate.
    pub async fn ensure_database_secret(
        &self,
        owner: &str,
        proposed_name: &str,
        seed: DatabaseSecretSeed<'_>,
    ) -> Result<(DatabaseSecret, String)> {
        if let Some(record) = self.store.get(owner).await? {
            debug!(owner = %owner, "reusing previously derived database secret");
            let secret: DatabaseSecret = serde_json::from_str(&record.value).map_err(|e| {
                Error::serialization(format!("stored secret for {owner} is unreadable: {e}"))
            })?;
            return Ok((secret, record.name));
        }

        let secret = DatabaseSecret {
            username: seed.username.to_string(),
            password: generate_password(),
            host: seed.host.to_string(),
            port: seed.port,
            db_name: seed.db_name.to_string(),
        };
        let record = self
            .store
            .put(owner, proposed_name, &serde_json::to_string(&secret)?)
            .await?;
        Ok((secret, record.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_cloud::StatePlane;

    #[tokio::test]
    async fn database_secret_is_derived_once_per_owner() {
        let plane = StatePlane::in_memory();
        let service = SecretService::new(&plane);
        let seed = || DatabaseSecretSeed {
            username: "appuser",
            host: "todo-db.xyz.us-east-1.rds.amazonaws.com",
            port: 5432,
            db_name: "appdb",
        };

        let (first, name) = service
            .ensure_database_secret("todo/database/secret", "todo-db-secret-a1b2c3", seed())
            .await
            .unwrap();
        // second derivation proposes a different name; the stored record
        // and its original name win
        let (second, name_again) = service
            .ensure_database_secret("todo/database/secret", "todo-db-secret-zzzzzz", seed())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(name, "todo-db-secret-a1b2c3");
        assert_eq!(name_again, name);
    }

    #[tokio::test]
    async fn credential_material_survives_reapply() {
        let plane = StatePlane::in_memory();
        let service = SecretService::new(&plane);

        let (first, _) = service
            .ensure_credential("site1/access/credential", "site1-cred", "site1-deployer", "AKIAAAAA")
            .await
            .unwrap();
        let (second, _) = service
            .ensure_credential("site1/access/credential", "site1-cred", "site1-deployer", "AKIAAAAA")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.secret_value.len(), plinth_common::secret::PASSWORD_LEN);
    }
}
