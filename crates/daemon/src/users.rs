// Users module: a minimal bounded context showing the full event flow
//
// register_user writes the user row and its UserCreated outbox row in one
// transaction. The relay later publishes the event; the welcome-email
// handler turns it into a background job, the storage handler provisions
// per-user storage.

use async_trait::async_trait;
use modulith_core::application::{EventRegistry, InMemoryEventBus};
use modulith_core::domain::{IntegrationEvent, IntegrationPayload, JobArgs, TaskFn, TaskResult};
use modulith_core::error::Result;
use modulith_core::port::{
    EnqueueOptions, EventHandler, HandlerError, JobService, OutboxTransaction, TaskOptions,
    Transaction,
};
use modulith_infra_sqlite::{map_sqlx_error, SqliteOutboxRepository};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const WELCOME_EMAIL_TASK: &str = "send_welcome_email";
const EMAIL_QUEUE: &str = "emails";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: Uuid,
    pub email: String,
}

impl IntegrationPayload for UserCreated {
    const EVENT_TYPE: &'static str = "UserCreated";
}

pub type UserCreatedEvent = IntegrationEvent<UserCreated>;

/// Create the module's own table
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

/// Insert a user and its UserCreated outbox row atomically
pub async fn register_user(
    repo: &SqliteOutboxRepository,
    email: &str,
    outbox_max_retries: u32,
) -> Result<Uuid> {
    let user_id = Uuid::new_v4();
    let event = UserCreatedEvent::new(
        user_id,
        "User",
        UserCreated {
            user_id,
            email: email.to_string(),
        },
    );
    let record = event.to_record()?.with_max_retries(outbox_max_retries);

    let mut tx = repo.begin_transaction().await?;
    sqlx::query("INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)")
        .bind(user_id.to_string())
        .bind(email)
        .bind(event.metadata.occurred_at.timestamp_millis())
        .execute(tx.connection())
        .await
        .map_err(map_sqlx_error)?;
    tx.append(&record).await?;
    Box::new(tx).commit().await?;

    info!(%user_id, event_id = %record.id, "User registered");
    Ok(user_id)
}

/// Enqueues the welcome email for every new user
pub struct WelcomeEmailHandler {
    jobs: Arc<dyn JobService>,
}

impl WelcomeEmailHandler {
    pub fn new(jobs: Arc<dyn JobService>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl EventHandler<UserCreatedEvent> for WelcomeEmailHandler {
    async fn handle(&self, event: &UserCreatedEvent) -> std::result::Result<(), HandlerError> {
        let args = JobArgs::new()
            .kwarg("user_id", event.payload.user_id.to_string())
            .kwarg("email", event.payload.email.clone())
            .kwarg("correlation_id", event.metadata.correlation_id.to_string());

        let job_id = self
            .jobs
            .enqueue(WELCOME_EMAIL_TASK, args, EnqueueOptions::default())
            .await?;
        info!(%job_id, user_id = %event.payload.user_id, "Welcome email queued");
        Ok(())
    }

    fn name(&self) -> &str {
        "welcome_email"
    }
}

/// Provisions per-user storage; redeliveries of the same event are skipped
#[derive(Default)]
pub struct StorageProvisioningHandler {
    provisioned: Mutex<HashSet<Uuid>>,
}

impl StorageProvisioningHandler {
    pub fn is_provisioned(&self, user_id: Uuid) -> bool {
        self.provisioned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&user_id)
    }
}

#[async_trait]
impl EventHandler<UserCreatedEvent> for StorageProvisioningHandler {
    async fn handle(&self, event: &UserCreatedEvent) -> std::result::Result<(), HandlerError> {
        let user_id = event.payload.user_id;
        let inserted = self
            .provisioned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id);
        if inserted {
            info!(%user_id, "User storage provisioned");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "storage_provisioning"
    }
}

fn send_welcome_email(args: JobArgs) -> TaskResult {
    let email: String = args.keyword("email")?;
    let user_id: String = args.keyword("user_id")?;
    // Delivery goes through the mail provider; here it is only logged
    info!(%email, %user_id, "Sending welcome email");
    Ok(serde_json::json!({ "sent_to": email }))
}

/// Register the module's tasks, event types and handlers
pub fn install(
    bus: &InMemoryEventBus,
    jobs: Arc<dyn JobService>,
    registry: &mut EventRegistry,
) -> Arc<StorageProvisioningHandler> {
    jobs.register_task(
        WELCOME_EMAIL_TASK,
        TaskFn::blocking(send_welcome_email),
        TaskOptions::default()
            .queue(EMAIL_QUEUE)
            .max_retries(3)
            .timeout(Duration::from_secs(30)),
    );

    registry.register::<UserCreated>();

    bus.subscribe::<UserCreatedEvent, _>(Arc::new(WelcomeEmailHandler::new(jobs)));
    let storage = Arc::new(StorageProvisioningHandler::default());
    bus.subscribe::<UserCreatedEvent, _>(Arc::clone(&storage));
    storage
}
