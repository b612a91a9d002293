//! Credential vault.
//!
//! Encrypts per-user provider secrets with a key derived from the
//! process-wide master key and the user id; the derived key is never stored
//! beside the blob. Decrypted secrets only exist inside the scope of a
//! single connector call. A blob that fails authentication is treated as a
//! disconnected integration: the record is dropped and the caller gets a
//! `Crypto` error, never corrupted plaintext and never a silent skip.

use std::sync::Arc;

use calbridge_common::EncryptionService;
use calbridge_core::ports::CredentialStore;
use calbridge_core::Connector;
use calbridge_domain::{
    CalbridgeError, ProviderAccess, ProviderCredential, ProviderKind, Result,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

const KEY_CONTEXT: &str = "calbridge credential vault v1";

/// Vault over the encrypted credential store.
pub struct CredentialVault {
    master_key: Vec<u8>,
    store: Arc<dyn CredentialStore>,
}

impl CredentialVault {
    pub fn new(master_key: Vec<u8>, store: Arc<dyn CredentialStore>) -> Result<Self> {
        if master_key.len() < 32 {
            return Err(CalbridgeError::Config(
                "vault master key must be at least 32 bytes".into(),
            ));
        }
        Ok(Self { master_key, store })
    }

    /// Build a vault from the hex-encoded master key carried by the
    /// configuration.
    pub fn from_hex_key(master_key_hex: &str, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let master_key = hex::decode(master_key_hex.trim())
            .map_err(|e| CalbridgeError::Config(format!("master key is not valid hex: {e}")))?;
        Self::new(master_key, store)
    }

    fn cipher_for(&self, user_id: &str) -> Result<EncryptionService> {
        EncryptionService::derive(KEY_CONTEXT, &self.master_key, user_id)
            .map_err(|e| CalbridgeError::Crypto(e.to_string()))
    }

    /// Encrypt and persist a freshly obtained credential.
    pub async fn connect(
        &self,
        user_id: &str,
        provider: ProviderKind,
        access: &ProviderAccess,
        expires_at: Option<DateTime<Utc>>,
        refreshable: bool,
    ) -> Result<ProviderCredential> {
        let blob = self.encrypt_access(user_id, access)?;
        let credential = ProviderCredential {
            user_id: user_id.to_string(),
            provider,
            blob,
            expires_at,
            refreshable,
        };
        self.store.upsert_credential(&credential).await?;
        info!(user = %user_id, %provider, "provider connected");
        Ok(credential)
    }

    /// Decrypt the stored credential for one connector call.
    ///
    /// Fails closed: an undecryptable blob disconnects the integration.
    pub async fn access(&self, user_id: &str, provider: ProviderKind) -> Result<ProviderAccess> {
        let credential = self
            .store
            .get_credential(user_id, provider)
            .await?
            .ok_or_else(|| CalbridgeError::NotFound(format!("no {provider} credential")))?;

        match self.decrypt_access(user_id, &credential.blob) {
            Ok(access) => Ok(access),
            Err(err) => {
                warn!(
                    user = %user_id,
                    %provider,
                    error = %err,
                    "credential blob failed authentication; disconnecting integration"
                );
                self.store.delete_credential(user_id, provider).await?;
                Err(CalbridgeError::Crypto(format!(
                    "{provider} credential could not be decrypted; integration disconnected"
                )))
            }
        }
    }

    /// Remove the credential entirely.
    pub async fn disconnect(&self, user_id: &str, provider: ProviderKind) -> Result<()> {
        self.store.delete_credential(user_id, provider).await?;
        info!(user = %user_id, %provider, "provider disconnected");
        Ok(())
    }

    /// Refresh the provider token and re-encrypt the result.
    pub async fn refresh(
        &self,
        user_id: &str,
        connector: &dyn Connector,
    ) -> Result<ProviderCredential> {
        let provider = connector.provider();
        if !connector.supports_refresh() {
            return Err(CalbridgeError::InvalidInput(format!(
                "{provider} credentials do not support refresh"
            )));
        }

        let access = self.access(user_id, provider).await?;
        let refreshed = connector.refresh_credentials(&access).await?;

        let new_access = match access {
            ProviderAccess::OAuth { refresh_token, .. } => ProviderAccess::OAuth {
                access_token: refreshed.access_token,
                refresh_token,
            },
            ProviderAccess::AppPassword { .. } => {
                return Err(CalbridgeError::InvalidInput(
                    "app-password credentials do not refresh".into(),
                ))
            }
        };

        let expires_at = Utc::now() + Duration::seconds(refreshed.expires_in);
        let credential = self
            .connect(user_id, provider, &new_access, Some(expires_at), true)
            .await?;
        info!(user = %user_id, %provider, "credential refreshed");
        Ok(credential)
    }

    fn encrypt_access(&self, user_id: &str, access: &ProviderAccess) -> Result<String> {
        let cipher = self.cipher_for(user_id)?;
        let plaintext = serde_json::to_vec(access)
            .map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        cipher
            .encrypt_to_string(&plaintext)
            .map_err(|e| CalbridgeError::Crypto(e.to_string()))
    }

    fn decrypt_access(&self, user_id: &str, blob: &str) -> Result<ProviderAccess> {
        let cipher = self.cipher_for(user_id)?;
        let plaintext = cipher
            .decrypt_from_string(blob)
            .map_err(|e| CalbridgeError::Crypto(e.to_string()))?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CalbridgeError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use calbridge_domain::CalendarHandle;

    use super::*;

    #[derive(Default)]
    struct InMemoryCredentials {
        credentials: Mutex<HashMap<(String, String), ProviderCredential>>,
    }

    #[async_trait]
    impl CredentialStore for InMemoryCredentials {
        async fn upsert_credential(&self, credential: &ProviderCredential) -> Result<()> {
            self.credentials.lock().unwrap().insert(
                (credential.user_id.clone(), credential.provider.as_str().into()),
                credential.clone(),
            );
            Ok(())
        }

        async fn get_credential(
            &self,
            user_id: &str,
            provider: ProviderKind,
        ) -> Result<Option<ProviderCredential>> {
            Ok(self
                .credentials
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), provider.as_str().into()))
                .cloned())
        }

        async fn delete_credential(&self, user_id: &str, provider: ProviderKind) -> Result<()> {
            self.credentials
                .lock()
                .unwrap()
                .remove(&(user_id.to_string(), provider.as_str().into()));
            Ok(())
        }

        async fn list_expiring(&self, _before: DateTime<Utc>) -> Result<Vec<ProviderCredential>> {
            Ok(Vec::new())
        }

        async fn upsert_handle(&self, _user_id: &str, _handle: &CalendarHandle) -> Result<()> {
            Ok(())
        }

        async fn list_handles(&self, _user_id: &str) -> Result<Vec<CalendarHandle>> {
            Ok(Vec::new())
        }

        async fn set_primary(
            &self,
            _user_id: &str,
            _provider: ProviderKind,
            _external_id: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn vault(store: Arc<InMemoryCredentials>) -> CredentialVault {
        CredentialVault::new(vec![7u8; 32], store).unwrap()
    }

    fn oauth_access() -> ProviderAccess {
        ProviderAccess::OAuth {
            access_token: "token-1".into(),
            refresh_token: Some("refresh-1".into()),
        }
    }

    #[tokio::test]
    async fn connect_then_access_round_trips() {
        let store = Arc::new(InMemoryCredentials::default());
        let vault = vault(store);

        vault
            .connect("u1", ProviderKind::GoogleCalendar, &oauth_access(), None, true)
            .await
            .unwrap();
        let access = vault.access("u1", ProviderKind::GoogleCalendar).await.unwrap();
        assert_eq!(access, oauth_access());
    }

    #[tokio::test]
    async fn blobs_are_scoped_per_user() {
        let store = Arc::new(InMemoryCredentials::default());
        let vault = vault(store.clone());

        let blob = vault.encrypt_access("u1", &oauth_access()).unwrap();
        assert!(vault.decrypt_access("u2", &blob).is_err());
        assert!(vault.decrypt_access("u1", &blob).is_ok());
    }

    #[tokio::test]
    async fn tampered_blob_disconnects_integration() {
        let store = Arc::new(InMemoryCredentials::default());
        let vault = vault(store.clone());

        let mut credential = vault
            .connect("u1", ProviderKind::GoogleCalendar, &oauth_access(), None, true)
            .await
            .unwrap();
        credential.blob.replace_range(10..12, "!!");
        store.upsert_credential(&credential).await.unwrap();

        let err = vault.access("u1", ProviderKind::GoogleCalendar).await.unwrap_err();
        assert!(matches!(err, CalbridgeError::Crypto(_)));

        // The integration now reads as disconnected.
        let err = vault.access("u1", ProviderKind::GoogleCalendar).await.unwrap_err();
        assert!(matches!(err, CalbridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn short_master_key_is_rejected() {
        let store = Arc::new(InMemoryCredentials::default());
        assert!(CredentialVault::new(vec![0u8; 16], store).is_err());
    }
}
