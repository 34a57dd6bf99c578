//! End-to-end flood scenario: a gauge reports a rising water level while its
//! flood register trips, and the engine answers with one deduplicated alarm,
//! an automatic barrier pulse, and a billboard warning.

mod common;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use fieldsrv::codec::modbus::{BARRIER_BIT_RUN, MbapHeader, MBAP_HEADER_LEN};
use fieldsrv::config::PollingConfig;
use fieldsrv::control::{EVENT_TYPE_CONTROL, EVENT_TYPE_FLOOD};
use fieldsrv::sinks::Severity;
use fieldsrv::ProtocolFamily;

/// Modbus slave stub: offset 0 walks the level sequence (holding the last
/// value), offset 1 reports the flood flag, offset 2 records barrier writes.
struct GaugeStub {
    levels: Mutex<Vec<u16>>,
    flood: u16,
    barrier_writes: Arc<Mutex<Vec<u16>>>,
}

impl GaugeStub {
    fn new(levels: Vec<u16>, flood: u16) -> Arc<Self> {
        let mut levels = levels;
        levels.reverse(); // pop() from the front of the original order
        Arc::new(Self {
            levels: Mutex::new(levels),
            flood,
            barrier_writes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn next_level(&self) -> u16 {
        let mut levels = self.levels.lock();
        if levels.len() > 1 {
            levels.pop().unwrap_or(0)
        } else {
            levels.first().copied().unwrap_or(0)
        }
    }

    async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let stub = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    let mut header_buf = [0u8; MBAP_HEADER_LEN];
                    if stream.read_exact(&mut header_buf).await.is_err() {
                        return;
                    }
                    let header = MbapHeader::decode(&header_buf).expect("header");
                    let mut pdu = vec![0u8; header.remaining().expect("length")];
                    if stream.read_exact(&mut pdu).await.is_err() {
                        return;
                    }

                    let response_pdu = match pdu[0] {
                        0x03 => {
                            let offset = u16::from_be_bytes([pdu[1], pdu[2]]);
                            let value = match offset {
                                0 => stub.next_level(),
                                1 => stub.flood,
                                _ => 0,
                            };
                            let mut out = vec![0x03, 0x02];
                            out.extend_from_slice(&value.to_be_bytes());
                            out
                        }
                        0x10 => {
                            let offset = u16::from_be_bytes([pdu[1], pdu[2]]);
                            let value = u16::from_be_bytes([pdu[6], pdu[7]]);
                            if offset == 2 {
                                stub.barrier_writes.lock().push(value);
                            }
                            vec![0x10, pdu[1], pdu[2], pdu[3], pdu[4]]
                        }
                        other => vec![other | 0x80, 0x01],
                    };

                    let mut response = Vec::with_capacity(MBAP_HEADER_LEN + response_pdu.len());
                    response.extend_from_slice(&header_buf[..4]);
                    response.extend_from_slice(&((response_pdu.len() + 1) as u16).to_be_bytes());
                    response.push(header.unit_id);
                    response.extend_from_slice(&response_pdu);
                    if stream.write_all(&response).await.is_err() {
                        return;
                    }
                }
            });
        }
    }
}

#[tokio::test]
async fn rising_flood_triggers_alarm_and_control() {
    let gauge_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind gauge");
    let gauge_port = gauge_listener.local_addr().expect("addr").port();
    let stub = GaugeStub::new(vec![40, 72, 91, 101], 1);
    let barrier_writes = Arc::clone(&stub.barrier_writes);
    let gauge_server = tokio::spawn(Arc::clone(&stub).serve(gauge_listener));

    let sign_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind sign");
    let sign_port = sign_listener.local_addr().expect("addr").port();
    let sign_bytes = Arc::new(Mutex::new(Vec::new()));
    let sign_capture = Arc::clone(&sign_bytes);
    let sign_server = tokio::spawn(async move {
        let (mut stream, _) = sign_listener.accept().await.expect("accept sign");
        let mut buf = [0u8; 512];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sign_capture.lock().extend_from_slice(&buf[..n]),
            }
        }
    });

    let mut gauge = common::gauge(1, "WL-NORTH-1", gauge_port);
    gauge.auto_control = true;
    gauge.linked_billboards = vec![21];
    let sign = common::billboard(21, "VMS-NORTH", sign_port, ProtocolFamily::BillboardVms);

    let polling = PollingConfig {
        interval_secs: 1,
        flush_interval_secs: 2,
    };
    let stack = common::stack(vec![gauge, sign], polling, Duration::from_millis(100));
    stack.registry.connect_all().await.expect("connect all");

    let shutdown = CancellationToken::new();
    let engine_task = Arc::clone(&stack.engine).start(shutdown.clone());

    // Four poll cycles walk the level sequence 40 -> 72 -> 91 -> 101
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    shutdown.cancel();
    engine_task.await.expect("engine task");

    // Exactly one flood record, raised at the first warning-band reading
    let emitted = stack.events.events.lock().clone();
    let floods: Vec<_> = emitted
        .iter()
        .filter(|e| e.event_type == EVENT_TYPE_FLOOD)
        .collect();
    assert_eq!(floods.len(), 1);
    assert_eq!(floods[0].severity, Severity::Warning);
    assert_eq!(floods[0].dedup_key.1, "WL-NORTH-1");

    // The outstanding record was upgraded as the level kept climbing
    let outstanding = stack.engine.outstanding_events();
    let flood = outstanding
        .iter()
        .find(|e| e.event_type == EVENT_TYPE_FLOOD)
        .expect("outstanding flood record");
    assert_eq!(flood.severity, Severity::CriticalEvacuate);

    // Automatic control fired once: run pulse asserted, then cleared
    let control_count = emitted
        .iter()
        .filter(|e| e.event_type == EVENT_TYPE_CONTROL)
        .count();
    assert_eq!(control_count, 1);
    let writes = barrier_writes.lock().clone();
    assert_eq!(writes, vec![BARRIER_BIT_RUN, 0]);

    // The linked billboard got the warning frame
    assert!(!sign_bytes.lock().is_empty());

    // Readings were batch-flushed, clamped values included
    let readings = stack.persistence.readings.lock().clone();
    assert!(readings.iter().any(|r| r.value == 40.0));
    assert!(readings.iter().any(|r| r.value == 101.0));

    stack.registry.shutdown().await;
    gauge_server.abort();
    sign_server.abort();
}
