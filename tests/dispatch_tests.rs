use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_service::config::Config;
use notification_service::dispatch::{Orchestrator, SmsOptions, WhatsAppOptions};
use notification_service::error::DispatchError;
use notification_service::gateway::{GatewayDispatcher, GatewayEvent};
use notification_service::models::channel::UpsertChannel;
use notification_service::models::notification::{
    ChannelKind, NotificationFilter, NotificationStatus,
};
use notification_service::models::template::CreateTemplate;
use notification_service::registry::ChannelRegistry;
use notification_service::store::{MemoryStore, Store};

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: "test-secret".to_string(),
        server_port: 0,
        provider_timeout_seconds: 5,
        smtp_host: None,
        smtp_port: 587,
        smtp_username: None,
        smtp_password: None,
        smtp_from: None,
        fcm_project_id: None,
        sms_fallback_provider: None,
        sms_fallback_config: None,
        whatsapp_fallback_provider: None,
        whatsapp_fallback_config: None,
    }
}

struct Harness {
    store: Arc<dyn Store>,
    registry: ChannelRegistry,
    gateway: GatewayDispatcher,
    orchestrator: Orchestrator,
}

fn harness_with(config: Config) -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = ChannelRegistry::new(store.clone());
    let gateway = GatewayDispatcher::new();
    let orchestrator =
        Orchestrator::new(store.clone(), registry.clone(), gateway.clone(), config);

    Harness {
        store,
        registry,
        gateway,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn zenziva_channel(mock_url: &str, priority: i32) -> UpsertChannel {
    UpsertChannel {
        name: format!("zenziva-{}", priority),
        kind: ChannelKind::Sms,
        provider: "zenziva".to_string(),
        config: json!({
            "base_url": mock_url,
            "user_key": "uk",
            "pass_key": "pk",
        }),
        is_active: true,
        is_default: false,
        priority,
        description: None,
    }
}

/// Test: with no tenant SMS channel and no global fallback the send fails
/// before any record is created
#[tokio::test]
async fn sms_without_any_configuration_is_a_configuration_error() -> Result<()> {
    let h = harness();
    let tenant = Uuid::new_v4();

    let result = h
        .orchestrator
        .send_sms(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "hello".to_string(),
            SmsOptions::default(),
        )
        .await;

    assert!(matches!(result, Err(DispatchError::Configuration(_))));

    let notifications = h
        .store
        .notifications(tenant, NotificationFilter::default())
        .await?;
    assert!(
        notifications.is_empty(),
        "No notification row may exist after a pre-persist configuration error"
    );

    Ok(())
}

/// Test: a successful SMS send finalizes the record as sent and writes
/// exactly one log entry carrying the provider message id
#[tokio::test]
async fn sms_success_finalizes_record_and_logs_once() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reguler/api/sendsms/"))
        .and(body_string_contains("userkey=uk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messageId": "zv-123",
            "status": "1",
            "text": "Success"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness();
    let tenant = Uuid::new_v4();
    h.registry
        .upsert_channel(tenant, zenziva_channel(&mock_server.uri(), 5))
        .await?;

    let notification = h
        .orchestrator
        .send_sms(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "exam results are out".to_string(),
            SmsOptions::default(),
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Sent);
    assert!(notification.sent_at.is_some());
    assert_eq!(
        notification.metadata.get("provider_message_id"),
        Some(&json!("zv-123"))
    );
    assert_eq!(notification.metadata.get("provider"), Some(&json!("zenziva")));

    let logs = h.store.logs_by_notification(notification.id).await?;
    assert_eq!(logs.len(), 1, "Exactly one log entry per attempt");
    assert_eq!(logs[0].status, NotificationStatus::Sent);
    assert_eq!(logs[0].provider_message_id.as_deref(), Some("zv-123"));

    Ok(())
}

/// Test: a provider rejection is returned as a failed notification, not an
/// error, and the failure is logged
#[tokio::test]
async fn sms_provider_rejection_is_a_failed_outcome_not_an_error() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reguler/api/sendsms/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "text": "Insufficient credit"
        })))
        .mount(&mock_server)
        .await;

    let h = harness();
    let tenant = Uuid::new_v4();
    h.registry
        .upsert_channel(tenant, zenziva_channel(&mock_server.uri(), 5))
        .await?;

    let notification = h
        .orchestrator
        .send_sms(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "hello".to_string(),
            SmsOptions::default(),
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Failed);
    assert_eq!(
        notification.error_message.as_deref(),
        Some("Insufficient credit")
    );

    let logs = h.store.logs_by_notification(notification.id).await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, NotificationStatus::Failed);
    assert_eq!(logs[0].error_message.as_deref(), Some("Insufficient credit"));

    Ok(())
}

/// Test: the environment-level fallback carries an SMS send when the tenant
/// has no configured channel
#[tokio::test]
async fn sms_falls_back_to_global_provider_configuration() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reguler/api/sendsms/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messageId": "zv-9",
            "status": "1",
            "text": "Success"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.sms_fallback_provider = Some("zenziva".to_string());
    config.sms_fallback_config = Some(
        json!({
            "base_url": mock_server.uri(),
            "user_key": "uk",
            "pass_key": "pk",
        })
        .to_string(),
    );

    let h = harness_with(config);

    let notification = h
        .orchestrator
        .send_sms(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "fallback path".to_string(),
            SmsOptions::default(),
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Sent);
    // Fallback sends carry no channel id in metadata.
    assert!(notification.metadata.get("channel_id").is_none());

    Ok(())
}

/// Test: a pinned channel id wins over priority resolution
#[tokio::test]
async fn pinned_channel_overrides_priority_resolution() -> Result<()> {
    let pinned_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reguler/api/sendsms/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messageId": "pinned",
            "status": "1",
            "text": "Success"
        })))
        .expect(1)
        .mount(&pinned_server)
        .await;

    let other_server = MockServer::start().await;

    let h = harness();
    let tenant = Uuid::new_v4();

    let low = h
        .registry
        .upsert_channel(tenant, zenziva_channel(&pinned_server.uri(), 1))
        .await?;
    h.registry
        .upsert_channel(tenant, zenziva_channel(&other_server.uri(), 99))
        .await?;

    let notification = h
        .orchestrator
        .send_sms(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "pin me".to_string(),
            SmsOptions {
                template_id: None,
                channel_id: Some(low.id),
            },
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Sent);
    assert_eq!(notification.metadata.get("channel_id"), Some(&json!(low.id)));
    assert_eq!(other_server.received_requests().await.unwrap().len(), 0);

    Ok(())
}

/// Test: pinning a channel of another kind is a configuration error and
/// never reaches the vendor
#[tokio::test]
async fn pinned_channel_of_wrong_kind_is_rejected() -> Result<()> {
    let mock_server = MockServer::start().await;

    let h = harness();
    let tenant = Uuid::new_v4();

    let sms_channel = h
        .registry
        .upsert_channel(tenant, zenziva_channel(&mock_server.uri(), 5))
        .await?;

    let result = h
        .orchestrator
        .send_whatsapp(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "wrong lane".to_string(),
            WhatsAppOptions {
                channel_id: Some(sms_channel.id),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(DispatchError::Configuration(_))));

    let notifications = h
        .store
        .notifications(tenant, NotificationFilter::default())
        .await?;
    assert!(notifications.is_empty());
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 0);

    Ok(())
}

/// Test: a timed-out provider call is finalized as failed, never left pending
#[tokio::test]
async fn provider_timeout_finalizes_as_failed() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reguler/api/sendsms/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "1" }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.provider_timeout_seconds = 1;
    let h = harness_with(config);

    let tenant = Uuid::new_v4();
    h.registry
        .upsert_channel(tenant, zenziva_channel(&mock_server.uri(), 5))
        .await?;

    let notification = h
        .orchestrator
        .send_sms(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "slow provider".to_string(),
            SmsOptions::default(),
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Failed);
    assert!(
        notification
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("timeout")
    );

    let logs = h.store.logs_by_notification(notification.id).await?;
    assert_eq!(logs.len(), 1);

    Ok(())
}

/// Test: a WhatsApp send with template name and params goes through the
/// vendor's template path, not the plain-message path
#[tokio::test]
async fn whatsapp_template_send_uses_template_path() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v17.0/628999/messages"))
        .and(body_partial_json(json!({
            "type": "template",
            "template": { "name": "report_ready" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "wamid.X1" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness();
    let tenant = Uuid::new_v4();

    h.registry
        .upsert_channel(
            tenant,
            UpsertChannel {
                name: "meta".to_string(),
                kind: ChannelKind::Whatsapp,
                provider: "meta_cloud".to_string(),
                config: json!({
                    "base_url": mock_server.uri(),
                    "phone_number_id": "628999",
                    "access_token": "tok",
                }),
                is_active: true,
                is_default: true,
                priority: 10,
                description: None,
            },
        )
        .await?;

    let notification = h
        .orchestrator
        .send_whatsapp(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "unused for template sends".to_string(),
            WhatsAppOptions {
                template_name: Some("report_ready".to_string()),
                template_params: vec!["Ann".to_string(), "2026".to_string()],
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Sent);
    assert_eq!(
        notification.metadata.get("provider_message_id"),
        Some(&json!("wamid.X1"))
    );

    Ok(())
}

/// Test: in-app sends are immediately sent, logged once, and pushed to the
/// recipient's live sessions
#[tokio::test]
async fn in_app_send_is_immediate_and_reaches_live_sessions() -> Result<()> {
    let h = harness();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let (_conn, mut rx) = h.gateway.register(user, tenant).await;

    let notification = h
        .orchestrator
        .send_in_app(
            tenant,
            user,
            "Grade posted".to_string(),
            "Mathematics grade is available".to_string(),
            None,
        )
        .await?;

    assert_eq!(notification.status, NotificationStatus::Sent);
    assert!(notification.read_at.is_none());

    let logs = h.store.logs_by_notification(notification.id).await?;
    assert_eq!(logs.len(), 1);

    match rx.recv().await {
        Some(GatewayEvent::Notification { notification: pushed }) => {
            assert_eq!(pushed.id, notification.id);
        }
        other => panic!("expected a live notification push, got {:?}", other.is_some()),
    }

    Ok(())
}

/// Test: template sends substitute declared variables and leave unbound
/// placeholders verbatim
#[tokio::test]
async fn template_send_substitutes_declared_variables() -> Result<()> {
    let h = harness();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let template = h
        .store
        .create_template(
            tenant,
            CreateTemplate {
                name: "greeting".to_string(),
                kind: ChannelKind::InApp,
                subject: "Hi {{name}}".to_string(),
                content: "Welcome back, {{name}}. Class: {{class}}".to_string(),
                variables: vec!["name".to_string(), "class".to_string()],
            },
        )
        .await?;

    let mut variables = HashMap::new();
    variables.insert("name".to_string(), json!("Ann"));

    let notification = h
        .orchestrator
        .send_from_template(tenant, user, template.id, user.to_string(), variables)
        .await?;

    assert_eq!(notification.title, "Hi Ann");
    assert_eq!(notification.content, "Welcome back, Ann. Class: {{class}}");
    assert_eq!(notification.template_id, Some(template.id));

    Ok(())
}

/// Test: template sends dispatch through the channel matching the template
/// kind
#[tokio::test]
async fn template_send_routes_by_template_kind() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reguler/api/sendsms/"))
        .and(body_string_contains("Ujian+dimulai+pukul+8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messageId": "zv-tpl",
            "status": "1",
            "text": "Success"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness();
    let tenant = Uuid::new_v4();
    h.registry
        .upsert_channel(tenant, zenziva_channel(&mock_server.uri(), 5))
        .await?;

    let template = h
        .store
        .create_template(
            tenant,
            CreateTemplate {
                name: "exam-reminder".to_string(),
                kind: ChannelKind::Sms,
                subject: "Exam".to_string(),
                content: "Ujian dimulai pukul {{time}}".to_string(),
                variables: vec!["time".to_string()],
            },
        )
        .await?;

    let mut variables = HashMap::new();
    variables.insert("time".to_string(), json!("8"));

    let notification = h
        .orchestrator
        .send_from_template(
            tenant,
            Uuid::new_v4(),
            template.id,
            "+6281200000001".to_string(),
            variables,
        )
        .await?;

    assert_eq!(notification.kind, ChannelKind::Sms);
    assert_eq!(notification.status, NotificationStatus::Sent);

    Ok(())
}

/// Test: sending from an unknown template is a not-found error
#[tokio::test]
async fn template_send_with_unknown_template_is_not_found() -> Result<()> {
    let h = harness();

    let result = h
        .orchestrator
        .send_from_template(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a@b.com".to_string(),
            HashMap::new(),
        )
        .await;

    assert!(matches!(result, Err(DispatchError::NotFound(_))));

    Ok(())
}

/// Test: no send ever leaves a record pending once the call returns
#[tokio::test]
async fn no_record_is_pending_after_a_send_returns() -> Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let h = harness();
    let tenant = Uuid::new_v4();
    h.registry
        .upsert_channel(tenant, zenziva_channel(&mock_server.uri(), 5))
        .await?;

    let _ = h
        .orchestrator
        .send_sms(
            tenant,
            Uuid::new_v4(),
            "+6281200000001".to_string(),
            "broken vendor".to_string(),
            SmsOptions::default(),
        )
        .await?;

    let pending = h
        .store
        .notifications(
            tenant,
            NotificationFilter {
                status: Some(NotificationStatus::Pending),
                ..Default::default()
            },
        )
        .await?;
    assert!(pending.is_empty());

    Ok(())
}

/// Test: statistics aggregate sent/failed counts per kind within the window
#[tokio::test]
async fn statistics_group_attempts_by_outcome_and_kind() -> Result<()> {
    let h = harness();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    h.orchestrator
        .send_in_app(tenant, user, "a".to_string(), "a".to_string(), None)
        .await?;
    h.orchestrator
        .send_in_app(tenant, user, "b".to_string(), "b".to_string(), None)
        .await?;

    let result = h
        .orchestrator
        .send_sms(
            tenant,
            user,
            "+62812".to_string(),
            "no channel".to_string(),
            SmsOptions::default(),
        )
        .await;
    assert!(result.is_err());

    let stats = h.store.statistics(tenant, None, None).await?;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.by_kind.get("in_app"), Some(&2));

    Ok(())
}
