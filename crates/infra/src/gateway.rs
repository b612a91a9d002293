//! Live calendar gateway: resolves a handle to busy intervals through the
//! connector registry, with vault-scoped credential acquisition.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ports::CalendarGateway;
use calbridge_domain::{BusyInterval, CalbridgeError, CalendarHandle, Result, TimeRange};

use crate::connectors::ConnectorRegistry;
use crate::vault::CredentialVault;

/// Gateway backed by real connectors and the credential vault.
pub struct LiveCalendarGateway {
    registry: Arc<ConnectorRegistry>,
    vault: Arc<CredentialVault>,
}

impl LiveCalendarGateway {
    pub fn new(registry: Arc<ConnectorRegistry>, vault: Arc<CredentialVault>) -> Self {
        Self { registry, vault }
    }
}

#[async_trait]
impl CalendarGateway for LiveCalendarGateway {
    async fn busy_intervals(
        &self,
        user_id: &str,
        handle: &CalendarHandle,
        range: &TimeRange,
    ) -> Result<Vec<BusyInterval>> {
        let connector = self.registry.calendar(handle.provider).ok_or_else(|| {
            CalbridgeError::Config(format!("no calendar connector for {}", handle.provider))
        })?;

        // Decrypted credentials live only for the duration of this call.
        let access = self.vault.access(user_id, handle.provider).await?;
        connector.busy_intervals(&access, &handle.external_id, range).await
    }
}
