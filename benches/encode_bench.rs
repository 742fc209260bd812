use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use parking_lot::Mutex;
use sshaudit::geoip::StaticGeoIp;
use sshaudit::message::*;
use sshaudit::recording::binary::BinaryEncoder;
use sshaudit::recording::decoder::BinaryDecoder;
use sshaudit::recording::{collect, Decoder, Encoder};
use sshaudit::storage::StorageWriter;
use std::hint::black_box;
use std::io::{self, Cursor, Write};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

struct VecSink(Arc<Mutex<Vec<u8>>>);

impl Write for VecSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageWriter for VecSink {
    fn set_metadata(&mut self, _: i64, _: &str, _: &str, _: Option<&str>) {}

    fn close(self: Box<Self>) -> sshaudit::Result<()> {
        Ok(())
    }
}

fn session(io_events: usize) -> Vec<Event> {
    let id = ConnectionId::new(vec![0x42; 16]);
    let mut events = vec![Event {
        connection_id: id.clone(),
        timestamp: 1,
        event_type: EventType::Connect,
        payload: Some(Payload::Connect(PayloadConnect {
            remote_addr: "192.0.2.1".to_string(),
            country: "XX".to_string(),
        })),
        channel_id: None,
    }];
    for i in 0..io_events {
        events.push(Event {
            connection_id: id.clone(),
            timestamp: 2 + i as i64,
            event_type: EventType::Io,
            payload: Some(Payload::Io(PayloadIo {
                stream: Stream::Stdout,
                data: format!("line {} of terminal output\r\n", i).into_bytes(),
            })),
            channel_id: Some(ChannelId(0)),
        });
    }
    events.push(Event {
        connection_id: id,
        timestamp: 2 + io_events as i64,
        event_type: EventType::Disconnect,
        payload: None,
        channel_id: None,
    });
    events
}

fn encode(rt: &Runtime, events: &[Event]) -> Vec<u8> {
    let output = Arc::new(Mutex::new(Vec::new()));
    let encoder = BinaryEncoder::new(Arc::new(StaticGeoIp::new()));
    let sink = Box::new(VecSink(output.clone()));

    rt.block_on(async {
        let (tx, rx) = mpsc::channel(events.len());
        for event in events {
            tx.send(event.clone()).await.unwrap();
        }
        drop(tx);
        encoder.encode(rx, sink).await.unwrap();
    });

    let data = output.lock().clone();
    data
}

fn benchmark_binary_encode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("binary_encode");
    let events = session(10_000);
    group.throughput(Throughput::Elements(events.len() as u64));

    group.bench_function("encode_10k_io_events", |b| {
        b.iter(|| black_box(encode(&rt, black_box(&events))));
    });

    group.finish();
}

fn benchmark_binary_decode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("binary_decode");
    let events = session(10_000);
    let encoded = encode(&rt, &events);
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("decode_10k_io_events", |b| {
        b.iter(|| {
            let (decoded, errors) = rt.block_on(async {
                let (events, errors) =
                    BinaryDecoder::new().decode(Box::new(Cursor::new(encoded.clone())));
                collect(events, errors).await
            });
            assert!(errors.is_empty());
            black_box(decoded);
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_binary_encode, benchmark_binary_decode);
criterion_main!(benches);
