//! # Pcap Output
//!
//! Classic pcap with nanosecond timestamps, link type `DLT_USER0`, all fields
//! in native byte order (the reader detects it from the magic).
//!
//! ## Record payload
//!
//! The payload is the JSON metadata followed by the side-buffer bytes.
//! `caplen` is the payload length and `orig_len` exceeds it by the data
//! length; the dissector takes the difference to find where metadata ends.

use std::io::{self, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ScopeError, ScopeResult};

/// Magic of a nanosecond-resolution pcap file.
pub const PCAP_MAGIC_NANOS: u32 = 0xA1B2_3C4D;
pub const PCAP_VERSION_MAJOR: u16 = 2;
pub const PCAP_VERSION_MINOR: u16 = 4;
pub const PCAP_SNAPLEN: u32 = 65535;
/// `DLT_USER0`.
pub const LINKTYPE_USER0: u32 = 147;

pub const PCAP_HEADER_LEN: usize = 24;
pub const PCAP_RECORD_HEADER_LEN: usize = 16;

/// Pcap stream writer.
#[derive(Debug)]
pub struct PcapWriter<W>
{
    output: W,
}

impl<W: Write> PcapWriter<W>
{
    pub fn new(output: W) -> Self
    {
        Self { output }
    }

    pub fn into_inner(self) -> W
    {
        self.output
    }

    /// Write the global header.
    ///
    /// ## Errors
    ///
    /// `Transport` on a broken pipe, `Io` otherwise.
    pub fn write_header(&mut self) -> ScopeResult<()>
    {
        let mut header = Vec::with_capacity(PCAP_HEADER_LEN);
        header.extend_from_slice(&PCAP_MAGIC_NANOS.to_ne_bytes());
        header.extend_from_slice(&PCAP_VERSION_MAJOR.to_ne_bytes());
        header.extend_from_slice(&PCAP_VERSION_MINOR.to_ne_bytes());
        header.extend_from_slice(&0i32.to_ne_bytes()); // thiszone
        header.extend_from_slice(&0u32.to_ne_bytes()); // sigfigs
        header.extend_from_slice(&PCAP_SNAPLEN.to_ne_bytes());
        header.extend_from_slice(&LINKTYPE_USER0.to_ne_bytes());

        self.output.write_all(&header).map_err(transport_error)?;
        self.output.flush().map_err(transport_error)
    }

    /// Write one record stamped with the current time.
    ///
    /// ## Errors
    ///
    /// See [`PcapWriter::write_packet_at`].
    pub fn write_packet(&mut self, payload: &[u8], data_len: usize) -> ScopeResult<()>
    {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        self.write_packet_at(now, payload, data_len)
    }

    /// Write one record: `payload` is metadata plus data, the last
    /// `data_len` bytes of it being data.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if a length does not fit the 32-bit record fields,
    /// `Transport` on a broken pipe, `Io` otherwise.
    pub fn write_packet_at(&mut self, timestamp: Duration, payload: &[u8], data_len: usize) -> ScopeResult<()>
    {
        let caplen = u32::try_from(payload.len())
            .map_err(|_| ScopeError::InvalidArgument(format!("packet of {} bytes is too large", payload.len())))?;
        let orig_len = u32::try_from(payload.len() + data_len)
            .map_err(|_| ScopeError::InvalidArgument("packet length overflows 32 bits".to_string()))?;

        let mut record = Vec::with_capacity(PCAP_RECORD_HEADER_LEN);
        record.extend_from_slice(&(timestamp.as_secs() as u32).to_ne_bytes());
        record.extend_from_slice(&timestamp.subsec_nanos().to_ne_bytes());
        record.extend_from_slice(&caplen.to_ne_bytes());
        record.extend_from_slice(&orig_len.to_ne_bytes());

        self.output.write_all(&record).map_err(transport_error)?;
        self.output.write_all(payload).map_err(transport_error)?;
        self.output.flush().map_err(transport_error)
    }
}

fn transport_error(err: io::Error) -> ScopeError
{
    if err.kind() == io::ErrorKind::BrokenPipe {
        ScopeError::Transport("pcap reader went away (broken pipe)".to_string())
    } else {
        ScopeError::Io(err)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe
    {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize>
        {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()>
        {
            Ok(())
        }
    }

    #[test]
    fn test_header_layout()
    {
        let mut writer = PcapWriter::new(Vec::new());
        writer.write_header().unwrap();
        let header = writer.into_inner();

        assert_eq!(header.len(), PCAP_HEADER_LEN);
        assert_eq!(u32::from_ne_bytes(header[0..4].try_into().unwrap()), 0xA1B2_3C4D);
        assert_eq!(u16::from_ne_bytes(header[4..6].try_into().unwrap()), 2);
        assert_eq!(u16::from_ne_bytes(header[6..8].try_into().unwrap()), 4);
        assert_eq!(&header[8..16], &[0u8; 8]);
        assert_eq!(u32::from_ne_bytes(header[16..20].try_into().unwrap()), 65535);
        assert_eq!(u32::from_ne_bytes(header[20..24].try_into().unwrap()), 147);
    }

    #[test]
    fn test_record_lengths()
    {
        let mut writer = PcapWriter::new(Vec::new());
        writer
            .write_packet_at(Duration::new(1_700_000_000, 123), b"{}\x01\x02\x03", 3)
            .unwrap();
        let record = writer.into_inner();

        assert_eq!(record.len(), PCAP_RECORD_HEADER_LEN + 5);
        assert_eq!(u32::from_ne_bytes(record[0..4].try_into().unwrap()), 1_700_000_000);
        assert_eq!(u32::from_ne_bytes(record[4..8].try_into().unwrap()), 123);
        assert_eq!(u32::from_ne_bytes(record[8..12].try_into().unwrap()), 5);
        assert_eq!(u32::from_ne_bytes(record[12..16].try_into().unwrap()), 8);
        assert_eq!(&record[16..], b"{}\x01\x02\x03");
    }

    #[test]
    fn test_broken_pipe_is_transport_error()
    {
        let mut writer = PcapWriter::new(ClosedPipe);
        assert!(matches!(writer.write_header(), Err(ScopeError::Transport(_))));
    }
}
