use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::channel::{NotificationChannel, UpsertChannel};
use crate::models::notification::ChannelKind;
use crate::store::Store;

/// Per-tenant channel configuration store. Resolves "the channel to use"
/// for a (tenant, kind) pair; `None` from `active_channel` signals fallback
/// to environment-level defaults. Never calls a provider.
#[derive(Clone)]
pub struct ChannelRegistry {
    store: Arc<dyn Store>,
}

impl ChannelRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Idempotent create-or-update keyed by (tenant, name, kind).
    pub async fn upsert_channel(
        &self,
        tenant_id: Uuid,
        upsert: UpsertChannel,
    ) -> Result<NotificationChannel, DispatchError> {
        let channel = self.store.upsert_channel(tenant_id, upsert).await?;

        info!(
            tenant_id = %tenant_id,
            channel_id = %channel.id,
            kind = %channel.kind,
            provider = %channel.provider,
            "Channel configuration stored"
        );

        Ok(channel)
    }

    pub async fn active_channels(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationChannel>, DispatchError> {
        self.store.active_channels(tenant_id).await
    }

    /// Highest-priority active channel for the kind, or None when the tenant
    /// has no configured row and the caller must use global defaults.
    pub async fn active_channel(
        &self,
        tenant_id: Uuid,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, DispatchError> {
        self.store.active_channel(tenant_id, kind).await
    }

    /// A specific channel pinned by the caller; must belong to the tenant.
    pub async fn channel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationChannel, DispatchError> {
        self.store.channel(tenant_id, id).await
    }

    pub async fn deactivate_channel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<(), DispatchError> {
        self.store.deactivate_channel(tenant_id, id).await?;
        info!(tenant_id = %tenant_id, channel_id = %id, "Channel deactivated");
        Ok(())
    }

    pub async fn delete_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError> {
        self.store.delete_channel(tenant_id, id).await?;
        info!(tenant_id = %tenant_id, channel_id = %id, "Channel deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn sms_channel(name: &str, priority: i32, is_active: bool) -> UpsertChannel {
        UpsertChannel {
            name: name.to_string(),
            kind: ChannelKind::Sms,
            provider: "zenziva".to_string(),
            config: json!({ "user_key": "uk", "pass_key": "pk" }),
            is_active,
            is_default: false,
            priority,
            description: None,
        }
    }

    #[tokio::test]
    async fn resolution_picks_highest_priority_active_channel() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStore::new()));
        let tenant = Uuid::new_v4();

        registry
            .upsert_channel(tenant, sms_channel("primary", 5, true))
            .await
            .unwrap();
        registry
            .upsert_channel(tenant, sms_channel("secondary", 10, true))
            .await
            .unwrap();

        let resolved = registry
            .active_channel(tenant, ChannelKind::Sms)
            .await
            .unwrap()
            .expect("channel configured");

        assert_eq!(resolved.name, "secondary");
        assert_eq!(resolved.priority, 10);
    }

    #[tokio::test]
    async fn resolution_is_deterministic_across_calls() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStore::new()));
        let tenant = Uuid::new_v4();

        registry
            .upsert_channel(tenant, sms_channel("a", 3, true))
            .await
            .unwrap();
        registry
            .upsert_channel(tenant, sms_channel("b", 3, true))
            .await
            .unwrap();

        let first = registry
            .active_channel(tenant, ChannelKind::Sms)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..5 {
            let again = registry
                .active_channel(tenant, ChannelKind::Sms)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(again.id, first.id);
        }
    }

    #[tokio::test]
    async fn inactive_channel_priority_does_not_shadow_active_one() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStore::new()));
        let tenant = Uuid::new_v4();

        registry
            .upsert_channel(tenant, sms_channel("active", 5, true))
            .await
            .unwrap();
        registry
            .upsert_channel(tenant, sms_channel("dormant", 100, false))
            .await
            .unwrap();

        let resolved = registry
            .active_channel(tenant, ChannelKind::Sms)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.name, "active");

        // Activating the dormant row flips the result.
        registry
            .upsert_channel(tenant, sms_channel("dormant", 100, true))
            .await
            .unwrap();
        let resolved = registry
            .active_channel(tenant, ChannelKind::Sms)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.name, "dormant");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_tenant_name_kind() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStore::new()));
        let tenant = Uuid::new_v4();

        let first = registry
            .upsert_channel(tenant, sms_channel("gateway", 1, true))
            .await
            .unwrap();
        let second = registry
            .upsert_channel(tenant, sms_channel("gateway", 7, true))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.priority, 7);
        assert_eq!(registry.active_channels(tenant).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn channel_operations_are_tenant_scoped() {
        let registry = ChannelRegistry::new(Arc::new(MemoryStore::new()));
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let channel = registry
            .upsert_channel(owner, sms_channel("gateway", 1, true))
            .await
            .unwrap();

        assert!(matches!(
            registry.delete_channel(stranger, channel.id).await,
            Err(DispatchError::NotFound(_))
        ));
        assert!(registry.delete_channel(owner, channel.id).await.is_ok());
    }
}
