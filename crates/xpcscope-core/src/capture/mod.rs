//! # Capture
//!
//! Turns observed calls into capture events.
//!
//! The interception layer calls [`CaptureAssembler::on_message`] (XPC) or
//! [`CaptureAssembler::on_proxy_call`] (NSXPC) on the thread that made the
//! observed call. The assembler encodes the message, attaches the endpoints,
//! direction and optionally a call stack, and hands the result to an
//! [`EventSink`]. Failures are logged and the event is dropped; nothing ever
//! propagates back into the observed call.
//!
//! ## Event shape
//!
//! Every event is a pair: JSON-serializable [`CaptureEvent`] metadata plus the
//! side-buffer bytes. The bytes never appear inside the metadata.
//!
//! ```json
//! {"event": "sent", "name": "com.apple.foo", "peer": 123, "direction": "outbound",
//!  "local": {"name": "Mail", "pid": 77}, "message": {"description": "...", "type": "dictionary", ...}}
//! ```

pub mod pcap;
pub mod proxy;
pub mod sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{trace, warn};

pub use self::pcap::PcapWriter;
pub use self::proxy::{raw_arguments, simple_send_arity, ProxyCall};
pub use self::sink::{event_channel, CapturedEvent, ChannelSink, EventSink, PcapSink};
use crate::message::{serialize, MessageNode, MessageRuntime, TypeRegistry};
use crate::types::{Direction, Endpoint, EventKind};

/// Start/stop switch shared between the assembler and its controller.
#[derive(Debug, Default)]
pub struct CaptureSession
{
    capturing: AtomicBool,
}

impl CaptureSession
{
    /// A stopped session.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn start(&self)
    {
        self.capturing.store(true, Ordering::Release);
    }

    pub fn stop(&self)
    {
        self.capturing.store(false, Ordering::Release);
    }

    pub fn is_capturing(&self) -> bool
    {
        self.capturing.load(Ordering::Acquire)
    }
}

/// Payload of a capture event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventMessage
{
    /// An XPC message tree.
    Xpc(MessageNode),
    /// An NSXPC method call.
    Proxy(ProxyCall),
}

/// Structured half of a capture event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureEvent
{
    pub event: EventKind,
    /// Remote service name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remote pid, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<i32>,
    pub direction: Direction,
    /// The instrumented process.
    pub local: Endpoint,
    pub message: EventMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<Vec<String>>,
}

/// Builds capture events and forwards them to a sink.
///
/// One assembler serves every thread of the instrumented process; each call
/// encodes into its own buffers.
pub struct CaptureAssembler<R, S>
{
    runtime: R,
    registry: TypeRegistry,
    sink: S,
    local: Endpoint,
    session: Arc<CaptureSession>,
    capture_backtraces: bool,
}

impl<R, S> CaptureAssembler<R, S>
where
    R: MessageRuntime,
    S: EventSink,
{
    pub fn new(runtime: R, registry: TypeRegistry, sink: S, local: Endpoint, capture_backtraces: bool) -> Self
    {
        Self {
            runtime,
            registry,
            sink,
            local,
            session: Arc::new(CaptureSession::new()),
            capture_backtraces,
        }
    }

    /// The session switch; capture is off until [`CaptureSession::start`].
    pub fn session(&self) -> &Arc<CaptureSession>
    {
        &self.session
    }

    pub fn runtime(&self) -> &R
    {
        &self.runtime
    }

    pub fn registry(&self) -> &TypeRegistry
    {
        &self.registry
    }

    pub fn sink(&self) -> &S
    {
        &self.sink
    }

    /// Capture one XPC message.
    ///
    /// `remote` is the connection's peer, `message` the value passed to the
    /// observed call and `backtrace` is only invoked when call stacks are
    /// enabled. Inbound values that are not dictionaries (connection errors)
    /// are ignored.
    ///
    /// Returns whether an event was delivered.
    pub fn on_message(
        &self,
        direction: Direction,
        remote: Option<&Endpoint>,
        message: R::Handle,
        backtrace: impl FnOnce() -> Vec<String>,
    ) -> bool
    {
        if !self.session.is_capturing() {
            return false;
        }
        if direction == Direction::Inbound && self.runtime.type_of(message) != Some(self.registry.dictionary()) {
            trace!("ignoring inbound non-dictionary value");
            return false;
        }

        let encoded = match serialize(&self.runtime, &self.registry, message) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, ?direction, "dropping message that could not be encoded");
                return false;
            }
        };

        let event = self.event(direction, remote, EventMessage::Xpc(encoded.root), backtrace);
        self.deliver(&event, &encoded.side_buffer)
    }

    /// Capture one NSXPC proxy call. Proxy calls carry no side buffer.
    ///
    /// Returns whether an event was delivered.
    pub fn on_proxy_call(
        &self,
        direction: Direction,
        remote: Option<&Endpoint>,
        call: ProxyCall,
        backtrace: impl FnOnce() -> Vec<String>,
    ) -> bool
    {
        if !self.session.is_capturing() {
            return false;
        }
        let event = self.event(direction, remote, EventMessage::Proxy(call), backtrace);
        self.deliver(&event, &[])
    }

    fn event(
        &self,
        direction: Direction,
        remote: Option<&Endpoint>,
        message: EventMessage,
        backtrace: impl FnOnce() -> Vec<String>,
    ) -> CaptureEvent
    {
        CaptureEvent {
            event: direction.event_kind(),
            name: remote.map(|peer| peer.name.clone()),
            peer: remote.map(|peer| peer.pid),
            direction,
            local: self.local.clone(),
            message,
            backtrace: self.capture_backtraces.then(backtrace),
        }
    }

    fn deliver(&self, event: &CaptureEvent, data: &[u8]) -> bool
    {
        match self.sink.deliver(event, data) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "dropping event the sink refused");
                false
            }
        }
    }
}
