//! Tests for capture assembly and event transports

mod common;

use std::sync::Arc;

use common::{FakeRuntime, Value};
use xpcscope_core::capture::pcap::{PCAP_HEADER_LEN, PCAP_MAGIC_NANOS, PCAP_RECORD_HEADER_LEN};
use xpcscope_core::capture::{event_channel, CaptureAssembler, EventMessage, PcapSink, ProxyCall};
use xpcscope_core::types::{Direction, Endpoint, EventKind};

fn runtime_with(value: Value) -> (FakeRuntime, common::Handle)
{
    let mut runtime = FakeRuntime::new();
    let root = runtime.add(value);
    (runtime, root)
}

fn message() -> Value
{
    Value::Dict(vec![("op", Value::string("ping")), ("blob", Value::Data(vec![0xde, 0xad]))])
}

fn local() -> Endpoint
{
    Endpoint::new("Mail", 77)
}

fn no_backtrace() -> Vec<String>
{
    panic!("backtrace requested while disabled")
}

#[test]
fn test_outbound_message_reaches_channel()
{
    let (runtime, root) = runtime_with(message());
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);
    assembler.session().start();

    let peer = Endpoint::new("com.apple.example", 123);
    assert!(assembler.on_message(Direction::Outbound, Some(&peer), root, no_backtrace));

    let captured = receiver.try_recv().unwrap();
    assert_eq!(captured.event.event, EventKind::Sent);
    assert_eq!(captured.event.name.as_deref(), Some("com.apple.example"));
    assert_eq!(captured.event.peer, Some(123));
    assert_eq!(captured.event.local, local());
    assert_eq!(captured.data, vec![0xde, 0xad]);
    assert!(captured.event.backtrace.is_none());

    let json = serde_json::to_value(&captured.event).unwrap();
    assert_eq!(json["event"], "sent");
    assert_eq!(json["direction"], "outbound");
    assert_eq!(json["message"]["type"], "dictionary");
    assert_eq!(json["message"]["values"][1]["length"], 2);
    assert!(json.get("backtrace").is_none());
}

#[test]
fn test_stopped_session_emits_nothing()
{
    let (runtime, root) = runtime_with(message());
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);

    assert!(!assembler.on_message(Direction::Outbound, None, root, no_backtrace));
    assembler.session().start();
    assembler.session().stop();
    assert!(!assembler.on_message(Direction::Inbound, None, root, no_backtrace));
    assert!(receiver.try_recv().is_err());
}

#[test]
fn test_inbound_non_dictionary_is_ignored()
{
    let (runtime, root) = runtime_with(Value::Other("error"));
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);
    assembler.session().start();

    assert!(!assembler.on_message(Direction::Inbound, None, root, no_backtrace));
    assert!(receiver.try_recv().is_err());
}

#[test]
fn test_outbound_non_dictionary_is_captured()
{
    let (runtime, root) = runtime_with(Value::string("odd"));
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);
    assembler.session().start();

    assert!(assembler.on_message(Direction::Outbound, None, root, no_backtrace));
    let captured = receiver.try_recv().unwrap();
    assert!(captured.event.name.is_none());
    assert!(captured.event.peer.is_none());
}

#[test]
fn test_backtrace_attached_when_enabled()
{
    let (runtime, root) = runtime_with(message());
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), true);
    assembler.session().start();

    assert!(assembler.on_message(Direction::Inbound, None, root, || vec!["frame0".to_string(), "frame1".to_string()]));

    let captured = receiver.try_recv().unwrap();
    assert_eq!(captured.event.event, EventKind::Received);
    assert_eq!(captured.event.backtrace, Some(vec!["frame0".to_string(), "frame1".to_string()]));
}

#[test]
fn test_encoding_failure_drops_event()
{
    let (runtime, root) = runtime_with(Value::Dict(vec![("bad", Value::Broken)]));
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);
    assembler.session().start();

    assert!(!assembler.on_message(Direction::Outbound, None, root, no_backtrace));
    assert!(receiver.try_recv().is_err());
}

#[test]
fn test_dropped_receiver_does_not_propagate()
{
    let (runtime, root) = runtime_with(message());
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    drop(receiver);
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);
    assembler.session().start();

    assert!(!assembler.on_message(Direction::Outbound, None, root, no_backtrace));
}

#[test]
fn test_proxy_call_event()
{
    let runtime = FakeRuntime::new();
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = CaptureAssembler::new(runtime, registry, sink, local(), false);
    assembler.session().start();

    let call = ProxyCall::remote("NSXPCConnectionProxy", "fetchWithReply:", vec!["1f".to_string()]);
    assert!(assembler.on_proxy_call(Direction::Outbound, None, call.clone(), no_backtrace));

    let captured = receiver.try_recv().unwrap();
    assert_eq!(captured.event.message, EventMessage::Proxy(call));
    assert!(captured.data.is_empty());

    let json = serde_json::to_value(&captured.event).unwrap();
    assert_eq!(json["message"]["type"], "nsxpc");
    assert_eq!(json["message"]["sel"], "fetchWithReply:");
    assert_eq!(json["message"]["description"], "NSXPCConnectionProxy fetchWithReply:");
}

#[test]
fn test_events_from_many_threads()
{
    let mut runtime = FakeRuntime::new();
    let roots: Vec<_> = (0..4u64)
        .map(|i| runtime.add(Value::Dict(vec![("id", Value::UInt64(i))])))
        .collect();
    let registry = runtime.registry();
    let (sink, receiver) = event_channel();
    let assembler = Arc::new(CaptureAssembler::new(runtime, registry, sink, local(), false));
    assembler.session().start();

    let handles: Vec<_> = roots
        .into_iter()
        .map(|root| {
            let assembler = Arc::clone(&assembler);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    assert!(assembler.on_message(Direction::Outbound, None, root, no_backtrace));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(receiver.try_iter().count(), 100);
}

#[test]
fn test_pcap_sink_end_to_end()
{
    let (runtime, root) = runtime_with(message());
    let registry = runtime.registry();
    let sink = PcapSink::new(Vec::new()).unwrap();
    let assembler = CaptureAssembler::new(runtime, registry, &sink, local(), false);
    assembler.session().start();

    assert!(assembler.on_message(Direction::Outbound, None, root, no_backtrace));
    assert!(assembler.on_message(Direction::Outbound, None, root, no_backtrace));
    drop(assembler);

    let bytes = sink.into_inner();
    assert_eq!(&bytes[..4], &PCAP_MAGIC_NANOS.to_ne_bytes());

    let mut cursor = PCAP_HEADER_LEN;
    let mut records = 0;
    while cursor < bytes.len() {
        let field = |at: usize| u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
        let caplen = field(cursor + 8);
        let orig_len = field(cursor + 12);
        assert_eq!(orig_len, caplen + 2);

        let payload = &bytes[cursor + PCAP_RECORD_HEADER_LEN..cursor + PCAP_RECORD_HEADER_LEN + caplen];
        let (metadata, data) = payload.split_at(caplen - 2);
        let json: serde_json::Value = serde_json::from_slice(metadata).unwrap();
        assert_eq!(json["event"], "sent");
        assert_eq!(data, &[0xde, 0xad]);

        cursor += PCAP_RECORD_HEADER_LEN + caplen;
        records += 1;
    }
    assert_eq!(records, 2);
}
