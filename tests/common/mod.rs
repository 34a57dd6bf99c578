//! Shared test fixtures: device builders and a fully wired in-memory stack.

// Each integration test binary compiles this module; not every binary uses
// every fixture.
#![allow(dead_code)]

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use fieldsrv::config::{CircuitConfig, PollingConfig, ReconnectConfig, TimeoutConfig};
use fieldsrv::connection::{
    ActorContext, BackoffPolicy, CircuitBreaker, ConnectionRegistry, ReconnectScheduler,
};
use fieldsrv::control::{BarrierController, EventDeduper, ThresholdEngine};
use fieldsrv::sinks::{MemoryEventSink, MemoryPublisher, MemorySink};
use fieldsrv::{Device, DeviceTable, MessageDispatcher, ProtocolFamily};

pub fn gauge(id: u32, name: &str, port: u16) -> Device {
    Device {
        id,
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port,
        family: ProtocolFamily::Modbus,
        credentials: None,
        threshold: Some(100.0),
        unit_id: 1,
        level_register: Some(40001),
        flood_register: Some(40002),
        barrier_register: Some(40003),
        auto_control: false,
        linked_billboards: Vec::new(),
    }
}

pub fn billboard(id: u32, name: &str, port: u16, family: ProtocolFamily) -> Device {
    Device {
        id,
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port,
        family,
        credentials: None,
        threshold: None,
        unit_id: 1,
        level_register: None,
        flood_register: None,
        barrier_register: None,
        auto_control: false,
        linked_billboards: Vec::new(),
    }
}

/// Fully wired service stack over in-memory sinks
pub struct Stack {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub engine: Arc<ThresholdEngine>,
    pub persistence: Arc<MemorySink>,
    pub events: Arc<MemoryEventSink>,
    pub publisher: Arc<MemoryPublisher>,
}

pub fn stack(devices: Vec<Device>, polling: PollingConfig, pulse: Duration) -> Stack {
    let persistence = Arc::new(MemorySink::default());
    let events = Arc::new(MemoryEventSink::default());
    let publisher = Arc::new(MemoryPublisher::default());

    let breaker = Arc::new(CircuitBreaker::new(&CircuitConfig::default()));
    let statuses = Arc::new(DashMap::new());
    let scheduler = Arc::new(ReconnectScheduler::new(
        BackoffPolicy::new(&ReconnectConfig::default()),
        Arc::clone(&breaker),
        Arc::clone(&statuses),
    ));
    let ctx = Arc::new(ActorContext {
        breaker,
        scheduler,
        statuses,
        persistence: persistence.clone(),
        publisher: publisher.clone(),
        timeouts: TimeoutConfig::default(),
    });

    let table = Arc::new(DeviceTable::new(devices));
    let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&table), ctx));
    let dispatcher = Arc::new(MessageDispatcher::new(Arc::clone(&registry)));
    let barrier = Arc::new(BarrierController::new(Arc::clone(&dispatcher), pulse));
    let engine = Arc::new(ThresholdEngine::new(
        table,
        Arc::clone(&dispatcher),
        barrier,
        Arc::new(EventDeduper::new()),
        persistence.clone(),
        events.clone(),
        publisher.clone(),
        polling,
    ));

    Stack {
        registry,
        dispatcher,
        engine,
        persistence,
        events,
        publisher,
    }
}
