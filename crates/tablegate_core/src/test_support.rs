//! In-memory doubles for drivers and tunnels used across the test suite.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TableGateError};
use crate::models::{ConnectionDescriptor, Row};
use crate::services::driver::{Driver, ExecResult};
use crate::services::tunnel::{
    EstablishedTunnel, PortAllocator, TunnelError, TunnelHandle, TunnelProvider,
};

/// One statement seen by a [`MockDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct MockDriverState {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<Vec<(String, Vec<Row>)>>,
    failures: Mutex<Vec<(String, String)>>,
    last_insert_id: Mutex<Option<u64>>,
    closed: AtomicBool,
}

/// Driver that records statements and answers from scripted responses.
///
/// Responses and failures match when the SQL contains the registered
/// fragment; the most recently registered match wins. Unmatched queries
/// return no rows.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockDriverState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `fragment` with `rows`.
    pub fn respond(&self, fragment: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.state.responses.lock().push((fragment.into(), rows));
        self
    }

    /// Fail statements containing `fragment` with a query error.
    pub fn fail_on(&self, fragment: impl Into<String>, message: impl Into<String>) -> &Self {
        self.state.failures.lock().push((fragment.into(), message.into()));
        self
    }

    /// Generated id reported by `execute`, as a real connection would.
    pub fn report_insert_id(&self, id: u64) -> &Self {
        *self.state.last_insert_id.lock() = Some(id);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    /// Recorded calls whose SQL contains `fragment`.
    pub fn calls_matching(&self, fragment: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|call| call.sql.contains(fragment)).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str, params: &[Value]) -> Result<()> {
        let call = RecordedCall { sql: sql.to_string(), params: params.to_vec() };
        self.state.calls.lock().push(call);

        let failures = self.state.failures.lock();
        match failures.iter().rev().find(|(fragment, _)| sql.contains(fragment.as_str())) {
            Some((_, message)) => Err(TableGateError::query(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, params)?;
        let responses = self.state.responses.lock();
        Ok(responses
            .iter()
            .rev()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.record(sql, params)?;
        let last_insert_id = *self.state.last_insert_id.lock();
        Ok(ExecResult { affected_rows: 1, last_insert_id })
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Build a JSON object row from a `json!` literal.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Raw catalog column row with upper-case keys, as MySQL 8 returns them.
pub fn catalog_column(
    name: &str,
    data_type: &str,
    column_type: &str,
    nullable: bool,
    extra: &str,
) -> Row {
    row(serde_json::json!({
        "COLUMN_NAME": name,
        "COLUMN_DEFAULT": null,
        "DATA_TYPE": data_type,
        "COLUMN_TYPE": column_type,
        "IS_NULLABLE": if nullable { "YES" } else { "NO" },
        "EXTRA": extra,
        "CHARACTER_MAXIMUM_LENGTH": null,
    }))
}

/// Raw catalog primary-key row.
pub fn catalog_primary_key(name: &str, data_type: &str) -> Row {
    row(serde_json::json!({"COLUMN_NAME": name, "DATA_TYPE": data_type}))
}

/// Wrap a mock driver in an established tunnel on `port`.
pub fn established(driver: MockDriver, port: u16) -> EstablishedTunnel {
    EstablishedTunnel {
        driver: Arc::new(driver),
        tunnel: TunnelHandle::new(port, CancellationToken::new()),
    }
}

/// Port allocator that always hands out the same port.
pub struct FixedPortAllocator(pub u16);

impl PortAllocator for FixedPortAllocator {
    fn acquire_port(&self) -> std::io::Result<u16> {
        Ok(self.0)
    }
}

/// Tunnel provider that counts establishments and hands out mock drivers.
pub struct MockTunnel {
    driver: MockDriver,
    failure: Option<String>,
    delay: Option<Duration>,
    establish_count: AtomicUsize,
    last_port: Mutex<Option<u16>>,
}

impl MockTunnel {
    /// Every establishment succeeds with a handle to `driver`.
    pub fn new(driver: MockDriver) -> Self {
        Self {
            driver,
            failure: None,
            delay: None,
            establish_count: AtomicUsize::new(0),
            last_port: Mutex::new(None),
        }
    }

    /// Every establishment fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::new(MockDriver::new()) }
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn establish_count(&self) -> usize {
        self.establish_count.load(Ordering::SeqCst)
    }

    pub fn last_port(&self) -> Option<u16> {
        *self.last_port.lock()
    }
}

#[async_trait]
impl TunnelProvider for MockTunnel {
    async fn establish(
        &self,
        _descriptor: &ConnectionDescriptor,
        local_port: u16,
    ) -> std::result::Result<EstablishedTunnel, TunnelError> {
        self.establish_count.fetch_add(1, Ordering::SeqCst);
        *self.last_port.lock() = Some(local_port);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Some(message) => Err(message.clone().into()),
            None => Ok(established(self.driver.clone(), local_port)),
        }
    }
}
