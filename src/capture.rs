//! Frame sources feeding a session, and the pcapng trace writer.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Chain, Cursor, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
use pcap_file::pcapng::blocks::interface_description::{
    InterfaceDescriptionBlock, InterfaceDescriptionOption,
};
use pcap_file::pcapng::{Block, PcapNgReader, PcapNgWriter};
use pcap_file::{DataLink, PcapError};

use crate::rawsocks;
use crate::session::Frame;
use crate::util::slice_to_hex_string;

/// Largest frame read from a live socket.
const LIVE_BUFFER_LEN: usize = 6000;

const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
const PCAP_MAGICS: [[u8; 4]; 4] = [
    [0xd4, 0xc3, 0xb2, 0xa1],
    [0xa1, 0xb2, 0xc3, 0xd4],
    [0x4d, 0x3c, 0xb2, 0xa1],
    [0xa1, 0xb2, 0x3c, 0x4d],
];

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Capture file error: {0}")]
    Pcap(#[from] PcapError),
    #[error("Not a pcap or pcapng file (magic {0})")]
    UnknownFormat(String),
    #[error("Link type {0:?} is not IEEE 802.11 with radiotap")]
    UnsupportedLinkType(DataLink),
    #[error("Packet refers to undeclared interface {0}")]
    UnknownInterface(u32),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Ready(Frame),
    /// Nothing available right now; ask again later.
    Idle,
    /// The source is exhausted.
    Finished,
}

/// Supplies frames in arrival order.
pub trait FrameSource {
    fn poll_frame(&mut self) -> CaptureResult<Poll>;
}

fn require_radiotap(linktype: DataLink) -> CaptureResult<()> {
    if linktype == DataLink::IEEE802_11_RADIOTAP {
        Ok(())
    } else {
        Err(CaptureError::UnsupportedLinkType(linktype))
    }
}

type Sniffed<R> = Chain<Cursor<[u8; 4]>, R>;

/// A pcap or pcapng capture file, told apart by its magic number.
pub enum OfflineSource<R: Read> {
    Pcap(PcapReader<Sniffed<R>>),
    PcapNg {
        reader: PcapNgReader<Sniffed<R>>,
        linktypes: Vec<DataLink>,
    },
}

impl OfflineSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> CaptureResult<Self> {
        let file = File::open(path.as_ref())?;
        info!("Reading {}", path.as_ref().display());
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read> OfflineSource<R> {
    pub fn from_reader(mut reader: R) -> CaptureResult<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let sniffed = Cursor::new(magic).chain(reader);

        if magic == PCAPNG_MAGIC {
            debug!("pcapng capture");
            let reader = PcapNgReader::new(sniffed)?;
            Ok(OfflineSource::PcapNg {
                reader,
                linktypes: Vec::new(),
            })
        } else if PCAP_MAGICS.contains(&magic) {
            let reader = PcapReader::new(sniffed)?;
            debug!("pcap capture, link type {:?}", reader.header().datalink);
            require_radiotap(reader.header().datalink)?;
            Ok(OfflineSource::Pcap(reader))
        } else {
            Err(CaptureError::UnknownFormat(slice_to_hex_string(&magic)))
        }
    }
}

impl<R: Read> FrameSource for OfflineSource<R> {
    fn poll_frame(&mut self) -> CaptureResult<Poll> {
        match self {
            OfflineSource::Pcap(reader) => match reader.next_packet() {
                None => Ok(Poll::Finished),
                Some(packet) => {
                    let packet = packet?;
                    Ok(Poll::Ready(Frame {
                        timestamp: packet.timestamp,
                        original_len: packet.orig_len,
                        data: packet.data.into_owned(),
                    }))
                }
            },
            OfflineSource::PcapNg { reader, linktypes } => loop {
                let block = match reader.next_block() {
                    None => return Ok(Poll::Finished),
                    Some(block) => block?,
                };
                match block {
                    Block::SectionHeader(_) => linktypes.clear(),
                    Block::InterfaceDescription(interface) => {
                        debug!("pcapng interface, link type {:?}", interface.linktype);
                        linktypes.push(interface.linktype);
                    }
                    Block::EnhancedPacket(packet) => {
                        let linktype = linktypes
                            .get(packet.interface_id as usize)
                            .copied()
                            .ok_or(CaptureError::UnknownInterface(packet.interface_id))?;
                        require_radiotap(linktype)?;
                        return Ok(Poll::Ready(Frame {
                            timestamp: packet.timestamp,
                            original_len: packet.original_len,
                            data: packet.data.into_owned(),
                        }));
                    }
                    Block::SimplePacket(packet) => {
                        // Simple packets always belong to the first interface and carry no time.
                        let linktype = linktypes
                            .first()
                            .copied()
                            .ok_or(CaptureError::UnknownInterface(0))?;
                        require_radiotap(linktype)?;
                        return Ok(Poll::Ready(Frame {
                            timestamp: Default::default(),
                            original_len: packet.original_len,
                            data: packet.data.into_owned(),
                        }));
                    }
                    _ => {}
                }
            },
        }
    }
}

/// A read that fills the whole buffer may have lost the end of the frame.
fn fills_buffer(packet_len: usize) -> bool {
    packet_len >= LIVE_BUFFER_LEN
}

/// Frames read straight off a monitor-mode interface.
pub struct LiveSource {
    socket: OwnedFd,
    buffer: Vec<u8>,
}

impl LiveSource {
    pub fn open(interface: &str) -> CaptureResult<Self> {
        let socket = rawsocks::open_interface(interface)?;
        info!("Capturing on {}", interface);
        Ok(LiveSource {
            socket,
            buffer: vec![0u8; LIVE_BUFFER_LEN],
        })
    }
}

impl FrameSource for LiveSource {
    fn poll_frame(&mut self) -> CaptureResult<Poll> {
        let packet_len = unsafe {
            libc::read(
                self.socket.as_raw_fd(),
                self.buffer.as_mut_ptr() as *mut libc::c_void,
                self.buffer.len(),
            )
        };

        if packet_len < 0 {
            let error = io::Error::last_os_error();
            return match error.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(Poll::Idle),
                _ => Err(error.into()),
            };
        }
        if packet_len == 0 {
            return Ok(Poll::Idle);
        }

        let packet_len = packet_len as usize;
        if fills_buffer(packet_len) {
            debug!(
                "Frame filled the {}-byte capture buffer and may be truncated",
                LIVE_BUFFER_LEN
            );
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Poll::Ready(Frame::new(
            timestamp,
            self.buffer[..packet_len].to_vec(),
        )))
    }
}

/// Saves frames as a pcapng trace with a single radiotap interface.
pub struct TraceWriter<W: Write> {
    writer: PcapNgWriter<W>,
    written: u64,
}

impl TraceWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, interface_name: Option<&str>) -> CaptureResult<Self> {
        let file = File::create(path.as_ref())?;
        info!("Writing frames to {}", path.as_ref().display());
        Self::new(BufWriter::new(file), interface_name)
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(writer: W, interface_name: Option<&str>) -> CaptureResult<Self> {
        let mut pcap_writer = PcapNgWriter::new(writer)?;

        let mut options = Vec::new();
        if let Some(name) = interface_name {
            options.push(InterfaceDescriptionOption::IfName(Cow::from(name.to_string())));
        }
        let interface = InterfaceDescriptionBlock {
            linktype: DataLink::IEEE802_11_RADIOTAP,
            snaplen: 0x0000,
            options,
        };
        pcap_writer.write_pcapng_block(interface)?;

        Ok(TraceWriter {
            writer: pcap_writer,
            written: 0,
        })
    }

    pub fn write(&mut self, frame: &Frame) -> CaptureResult<()> {
        let packet = EnhancedPacketBlock {
            interface_id: 0,
            timestamp: frame.timestamp,
            original_len: frame.original_len,
            data: Cow::Borrowed(&frame.data),
            options: vec![],
        };
        self.writer.write_pcapng_block(packet)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(self) -> CaptureResult<W> {
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radiotap::{FieldValue, RadiotapBuilder};
    use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
    use std::time::Duration;

    fn frames() -> Vec<Frame> {
        (0..3u8)
            .map(|i| {
                let data = RadiotapBuilder::new()
                    .field(FieldValue::Rate(2 * (i + 1)))
                    .build(&[i; 20]);
                Frame::new(Duration::from_millis(1_700_000_000_000 + i as u64), data)
            })
            .collect()
    }

    fn drain<S: FrameSource>(source: &mut S) -> Vec<Frame> {
        let mut out = Vec::new();
        loop {
            match source.poll_frame().unwrap() {
                Poll::Ready(frame) => out.push(frame),
                Poll::Idle => continue,
                Poll::Finished => return out,
            }
        }
    }

    #[test]
    fn pcapng_trace_reads_back() {
        let mut writer = TraceWriter::new(Vec::new(), Some("wlan0mon")).unwrap();
        for frame in frames() {
            writer.write(&frame).unwrap();
        }
        assert_eq!(writer.written(), 3);
        let bytes = writer.finish().unwrap();

        let mut source = OfflineSource::from_reader(Cursor::new(bytes)).unwrap();
        assert!(matches!(source, OfflineSource::PcapNg { .. }));
        assert_eq!(drain(&mut source), frames());
    }

    #[test]
    fn pcap_file_is_read() {
        let header = PcapHeader {
            datalink: DataLink::IEEE802_11_RADIOTAP,
            ..Default::default()
        };
        let mut writer = PcapWriter::with_header(Vec::new(), header).unwrap();
        for frame in frames() {
            writer
                .write_packet(&PcapPacket::new(
                    frame.timestamp,
                    frame.original_len,
                    &frame.data,
                ))
                .unwrap();
        }
        let bytes = writer.into_writer();

        let mut source = OfflineSource::from_reader(Cursor::new(bytes)).unwrap();
        let read = drain(&mut source);
        assert_eq!(read.len(), 3);
        assert_eq!(read[2].data, frames()[2].data);
        assert_eq!(read[2].original_len, frames()[2].original_len);
    }

    #[test]
    fn wrong_link_type_is_rejected() {
        let header = PcapHeader {
            datalink: DataLink::ETHERNET,
            ..Default::default()
        };
        let bytes = PcapWriter::with_header(Vec::new(), header)
            .unwrap()
            .into_writer();
        assert!(matches!(
            OfflineSource::from_reader(Cursor::new(bytes)),
            Err(CaptureError::UnsupportedLinkType(DataLink::ETHERNET))
        ));
    }

    #[test]
    fn full_live_reads_are_flagged() {
        assert!(!fills_buffer(1500));
        assert!(!fills_buffer(LIVE_BUFFER_LEN - 1));
        assert!(fills_buffer(LIVE_BUFFER_LEN));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        match OfflineSource::from_reader(Cursor::new(b"GIF89a".to_vec())) {
            Err(CaptureError::UnknownFormat(magic)) => assert_eq!(magic, "47494638"),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("GIF accepted as a capture"),
        }
    }
}
