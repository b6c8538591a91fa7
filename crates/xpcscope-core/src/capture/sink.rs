//! Event transports.
//!
//! - [`ChannelSink`] hands events to an in-process consumer over `mpsc`.
//! - [`PcapSink`] streams them as pcap records for the Wireshark dissector.

use std::io::Write;
use std::sync::{mpsc, Mutex};

use tracing::trace;

use super::pcap::PcapWriter;
use super::CaptureEvent;
use crate::error::{ScopeError, ScopeResult};

/// Destination of capture events.
///
/// Called synchronously on the thread that made the observed call, possibly
/// from several threads at once.
pub trait EventSink: Send + Sync
{
    /// Deliver one event and its side-buffer bytes.
    ///
    /// ## Errors
    ///
    /// `Transport` when the consumer is gone, `Io`/`Json` for encoding or
    /// write failures.
    fn deliver(&self, event: &CaptureEvent, data: &[u8]) -> ScopeResult<()>;
}

impl<T: EventSink + ?Sized> EventSink for &T
{
    fn deliver(&self, event: &CaptureEvent, data: &[u8]) -> ScopeResult<()>
    {
        (**self).deliver(event, data)
    }
}

/// An event paired with its side-buffer bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent
{
    pub event: CaptureEvent,
    pub data: Vec<u8>,
}

/// Receiver side of the capture channel.
pub type CapturedEventReceiver = mpsc::Receiver<CapturedEvent>;

/// Create a channel sink and its receiver.
#[must_use]
pub fn event_channel() -> (ChannelSink, CapturedEventReceiver)
{
    let (sender, receiver) = mpsc::channel();
    (ChannelSink { sender }, receiver)
}

/// Sends events to an `mpsc` receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink
{
    sender: mpsc::Sender<CapturedEvent>,
}

impl EventSink for ChannelSink
{
    fn deliver(&self, event: &CaptureEvent, data: &[u8]) -> ScopeResult<()>
    {
        self.sender
            .send(CapturedEvent {
                event: event.clone(),
                data: data.to_vec(),
            })
            .map_err(|_| ScopeError::Transport("capture receiver dropped".to_string()))
    }
}

/// Writes events as pcap records.
///
/// Each record is the JSON metadata immediately followed by the side-buffer
/// bytes. Writers are serialised so records never interleave.
pub struct PcapSink<W: Write>
{
    writer: Mutex<PcapWriter<W>>,
}

impl<W: Write + Send> PcapSink<W>
{
    /// Write the pcap header and return the sink.
    ///
    /// ## Errors
    ///
    /// See [`PcapWriter::write_header`].
    pub fn new(output: W) -> ScopeResult<Self>
    {
        let mut writer = PcapWriter::new(output);
        writer.write_header()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W
    {
        match self.writer.into_inner() {
            Ok(writer) => writer.into_inner(),
            Err(poisoned) => poisoned.into_inner().into_inner(),
        }
    }
}

impl<W: Write + Send> EventSink for PcapSink<W>
{
    fn deliver(&self, event: &CaptureEvent, data: &[u8]) -> ScopeResult<()>
    {
        let mut packet = serde_json::to_vec(event)?;
        packet.extend_from_slice(data);

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ScopeError::Transport("pcap writer poisoned".to_string()))?;
        writer.write_packet(&packet, data.len())?;
        trace!(bytes = packet.len(), "pcap record written");
        Ok(())
    }
}
