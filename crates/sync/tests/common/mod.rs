#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use erpsync_core::adjustment::StockChangeNotification;
use erpsync_core::duplicate_detection::CatalogEntry;
use erpsync_core::entity::EntityType;
use erpsync_core::retry::RemoteError;
use erpsync_db::models::customer::CreateCustomer;
use erpsync_db::models::document_line::DocumentLine;
use erpsync_db::models::invoice::CreateInvoice;
use erpsync_db::models::order::{CreateOrder, OrderKind};
use erpsync_events::EventBus;
use erpsync_sync::job::SyncJobRunner;
use erpsync_sync::store::MemoryStore;
use erpsync_sync::{AccountingApi, JobSettings, RemoteAck, SyncOrchestrator, SyncStore};
use tokio::sync::Semaphore;

type FailurePredicate = Box<dyn Fn(EntityType, &serde_json::Value) -> Option<RemoteError> + Send + Sync>;

/// Scriptable stand-in for the external accounting platform.
#[derive(Default)]
pub struct FakeAccountingApi {
    creates: AtomicUsize,
    updates: AtomicUsize,
    started: AtomicUsize,
    fail_when: Mutex<Option<FailurePredicate>>,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    catalog: Mutex<Vec<CatalogEntry>>,
}

impl FakeAccountingApi {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Calls that have begun, including ones still blocked or sleeping.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn fail_when(
        &self,
        predicate: impl Fn(EntityType, &serde_json::Value) -> Option<RemoteError> + Send + Sync + 'static,
    ) {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    pub fn succeed_always(&self) {
        *self.fail_when.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Block every call until permits are added to the returned semaphore.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_catalog(&self, entries: Vec<CatalogEntry>) {
        *self.catalog.lock().unwrap() = entries;
    }

    async fn call(
        &self,
        entity: EntityType,
        external_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self
            .fail_when
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|predicate| predicate(entity, payload))
        {
            return Err(err);
        }

        let external_id = match external_id {
            Some(id) => {
                self.updates.fetch_add(1, Ordering::SeqCst);
                id.to_string()
            }
            None => {
                let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
                format!("EXT-{entity}-{n}")
            }
        };
        Ok(RemoteAck {
            external_id,
            external_code: payload["account_code"].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
impl AccountingApi for FakeAccountingApi {
    async fn create(
        &self,
        entity: EntityType,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError> {
        self.call(entity, None, payload).await
    }

    async fn update(
        &self,
        entity: EntityType,
        external_id: &str,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError> {
        self.call(entity, Some(external_id), payload).await
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogEntry>, RemoteError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.catalog.lock().unwrap().clone())
    }
}

/// Store, fake API, event bus and orchestrator wired together.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub api: Arc<FakeAccountingApi>,
    pub events: Arc<EventBus>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

pub fn harness() -> Harness {
    harness_with(JobSettings::default())
}

pub fn harness_with(settings: JobSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let api = Arc::new(FakeAccountingApi::default());
    let events = Arc::new(EventBus::default());
    let runner = SyncJobRunner::new(
        store.clone() as Arc<dyn SyncStore>,
        api.clone() as Arc<dyn AccountingApi>,
        settings,
        events.clone(),
    );
    Harness {
        store,
        api,
        events,
        orchestrator: Arc::new(SyncOrchestrator::new(runner)),
    }
}

/// Poll until the fake API has seen `n` calls begin.
pub async fn wait_for_calls(api: &FakeAccountingApi, n: usize) {
    for _ in 0..500 {
        if api.started() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {n} remote calls to start, saw {}", api.started());
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn customer(code: &str, name: &str) -> CreateCustomer {
    CreateCustomer {
        code: code.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn line(sku: &str) -> DocumentLine {
    DocumentLine {
        sku: sku.to_string(),
        quantity: 1.0,
        unit_code: None,
        unit_price_minor: 10_000,
        tax_rate_percent: 20,
    }
}

pub fn invoice(number: &str, customer_code: &str, lines: Vec<DocumentLine>) -> CreateInvoice {
    CreateInvoice {
        invoice_number: number.to_string(),
        customer_code: customer_code.to_string(),
        issued_at: Utc::now(),
        currency: "TRY".to_string(),
        warehouse_code: None,
        lines,
    }
}

pub fn order(kind: OrderKind, number: &str, counterparty: &str, lines: Vec<DocumentLine>) -> CreateOrder {
    CreateOrder {
        kind,
        order_number: number.to_string(),
        counterparty_code: counterparty.to_string(),
        ordered_at: Utc::now(),
        warehouse_code: "MAIN".to_string(),
        currency: "TRY".to_string(),
        lines,
    }
}

pub fn notification(order_id: &str, delta: i32, token: Option<&str>) -> StockChangeNotification {
    StockChangeNotification {
        external_order_id: order_id.to_string(),
        product_id: 123,
        sku: Some("SKU-ABC-001".to_string()),
        quantity_delta: delta,
        timestamp: None,
        event: Some("stock.updated".to_string()),
        authenticity_token: token.map(str::to_string),
    }
}
