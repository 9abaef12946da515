//! Radiotap header walking.
//!
//! A radiotap header is a little-endian `u8` version, `u8` pad, `u16` total
//! length and one or more `u32` presence words, followed by one field per set
//! presence bit in ascending bit order. Every field is aligned to its natural
//! size relative to the start of the header.

use byteorder::{ByteOrder, LE};
use log::trace;
use strum_macros::Display;

use crate::error::{Error, Result};
use crate::util::{get_bit, slice_to_hex_string};

/// Version, pad, length and the first presence word.
pub const HEADER_LEN: usize = 8;

const PRESENT_RADIOTAP_NAMESPACE: u32 = 29;
const PRESENT_VENDOR_NAMESPACE: u32 = 30;
const PRESENT_EXT: u32 = 31;

/// Bits of the `Flags` field.
pub mod flags {
    pub const CFP: u8 = 0x01;
    pub const SHORT_PREAMBLE: u8 = 0x02;
    pub const WEP: u8 = 0x04;
    pub const FRAGMENTATION: u8 = 0x08;
    pub const FCS_AT_END: u8 = 0x10;
    pub const DATA_PAD: u8 = 0x20;
    pub const BAD_FCS: u8 = 0x40;
    pub const SHORT_GI: u8 = 0x80;
}

/// Bits of the channel flags bitmask.
pub mod channel_flags {
    pub const TURBO: u16 = 0x0010;
    pub const CCK: u16 = 0x0020;
    pub const OFDM: u16 = 0x0040;
    pub const GHZ2: u16 = 0x0080;
    pub const GHZ5: u16 = 0x0100;
    pub const PASSIVE: u16 = 0x0200;
    pub const DYN: u16 = 0x0400;
    pub const GFSK: u16 = 0x0800;
    pub const GSM: u16 = 0x1000;
    pub const STATIC_TURBO: u16 = 0x2000;
    pub const HALF_RATE: u16 = 0x4000;
    pub const QUARTER_RATE: u16 = 0x8000;
}

/// `known` and `flags` bits of the MCS field.
pub mod mcs {
    pub const HAVE_BW: u8 = 0x01;
    pub const HAVE_MCS: u8 = 0x02;
    pub const HAVE_GI: u8 = 0x04;
    pub const HAVE_FMT: u8 = 0x08;
    pub const HAVE_FEC: u8 = 0x10;
    pub const HAVE_STBC: u8 = 0x20;

    pub const BW_MASK: u8 = 0x03;
    pub const SGI: u8 = 0x04;
    pub const FMT_GF: u8 = 0x08;
    pub const FEC_LDPC: u8 = 0x10;
    pub const STBC_MASK: u8 = 0x60;
}

/// `known` and `flags` bits of the VHT field.
pub mod vht {
    pub const KNOWN_STBC: u16 = 0x0001;
    pub const KNOWN_TXOP_PS_NA: u16 = 0x0002;
    pub const KNOWN_GI: u16 = 0x0004;
    pub const KNOWN_SGI_NSYM_DIS: u16 = 0x0008;
    pub const KNOWN_LDPC_EXTRA_OFDM_SYM: u16 = 0x0010;
    pub const KNOWN_BEAMFORMED: u16 = 0x0020;
    pub const KNOWN_BANDWIDTH: u16 = 0x0040;
    pub const KNOWN_GROUP_ID: u16 = 0x0080;
    pub const KNOWN_PARTIAL_AID: u16 = 0x0100;

    pub const FLAG_STBC: u8 = 0x01;
    pub const FLAG_TXOP_PS_NA: u8 = 0x02;
    pub const FLAG_SGI: u8 = 0x04;
    pub const FLAG_SGI_NSYM_M10_9: u8 = 0x08;
    pub const FLAG_LDPC_EXTRA_OFDM_SYM: u8 = 0x10;
    pub const FLAG_BEAMFORMED: u8 = 0x20;

    pub const MCS_MASK: u8 = 0xf0;
    pub const NSS_MASK: u8 = 0x0f;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum FieldKind {
    #[strum(serialize = "TSFT")]
    Tsft,
    Flags,
    Rate,
    Channel,
    #[strum(serialize = "FHSS")]
    Fhss,
    AntennaSignal,
    AntennaNoise,
    LockQuality,
    TxAttenuation,
    TxAttenuationDb,
    TxPower,
    Antenna,
    AntennaSignalDb,
    AntennaNoiseDb,
    RxFlags,
    TxFlags,
    RtsRetries,
    DataRetries,
    XChannel,
    #[strum(serialize = "MCS")]
    Mcs,
    #[strum(serialize = "A-MPDU status")]
    AmpduStatus,
    #[strum(serialize = "VHT")]
    Vht,
    Timestamp,
    #[strum(serialize = "HE")]
    He,
    #[strum(serialize = "HE-MU")]
    HeMu,
    #[strum(serialize = "HE-MU-other-user")]
    HeMuOtherUser,
    ZeroLengthPsdu,
    #[strum(serialize = "L-SIG")]
    LSig,
    VendorNamespace,
    /// Presence bitmap word. Only used to report a truncated bitmap.
    PresenceBitmap,
}

impl FieldKind {
    /// Maps a radiotap-namespace presence bit to its field. `None` for bits
    /// whose layout is not known, which ends the walk.
    pub fn from_index(index: u32) -> Option<FieldKind> {
        let kind = match index {
            0 => FieldKind::Tsft,
            1 => FieldKind::Flags,
            2 => FieldKind::Rate,
            3 => FieldKind::Channel,
            4 => FieldKind::Fhss,
            5 => FieldKind::AntennaSignal,
            6 => FieldKind::AntennaNoise,
            7 => FieldKind::LockQuality,
            8 => FieldKind::TxAttenuation,
            9 => FieldKind::TxAttenuationDb,
            10 => FieldKind::TxPower,
            11 => FieldKind::Antenna,
            12 => FieldKind::AntennaSignalDb,
            13 => FieldKind::AntennaNoiseDb,
            14 => FieldKind::RxFlags,
            15 => FieldKind::TxFlags,
            16 => FieldKind::RtsRetries,
            17 => FieldKind::DataRetries,
            18 => FieldKind::XChannel,
            19 => FieldKind::Mcs,
            20 => FieldKind::AmpduStatus,
            21 => FieldKind::Vht,
            22 => FieldKind::Timestamp,
            23 => FieldKind::He,
            24 => FieldKind::HeMu,
            25 => FieldKind::HeMuOtherUser,
            26 => FieldKind::ZeroLengthPsdu,
            27 => FieldKind::LSig,
            _ => return None,
        };
        Some(kind)
    }

    /// Presence bit of this field in the radiotap namespace.
    pub fn index(&self) -> u32 {
        match self {
            FieldKind::Tsft => 0,
            FieldKind::Flags => 1,
            FieldKind::Rate => 2,
            FieldKind::Channel => 3,
            FieldKind::Fhss => 4,
            FieldKind::AntennaSignal => 5,
            FieldKind::AntennaNoise => 6,
            FieldKind::LockQuality => 7,
            FieldKind::TxAttenuation => 8,
            FieldKind::TxAttenuationDb => 9,
            FieldKind::TxPower => 10,
            FieldKind::Antenna => 11,
            FieldKind::AntennaSignalDb => 12,
            FieldKind::AntennaNoiseDb => 13,
            FieldKind::RxFlags => 14,
            FieldKind::TxFlags => 15,
            FieldKind::RtsRetries => 16,
            FieldKind::DataRetries => 17,
            FieldKind::XChannel => 18,
            FieldKind::Mcs => 19,
            FieldKind::AmpduStatus => 20,
            FieldKind::Vht => 21,
            FieldKind::Timestamp => 22,
            FieldKind::He => 23,
            FieldKind::HeMu => 24,
            FieldKind::HeMuOtherUser => 25,
            FieldKind::ZeroLengthPsdu => 26,
            FieldKind::LSig => 27,
            FieldKind::VendorNamespace => PRESENT_VENDOR_NAMESPACE,
            FieldKind::PresenceBitmap => PRESENT_EXT,
        }
    }

    pub fn align(&self) -> usize {
        match self {
            FieldKind::Tsft | FieldKind::Timestamp => 8,
            FieldKind::XChannel | FieldKind::AmpduStatus | FieldKind::PresenceBitmap => 4,
            FieldKind::Channel
            | FieldKind::Fhss
            | FieldKind::LockQuality
            | FieldKind::TxAttenuation
            | FieldKind::TxAttenuationDb
            | FieldKind::RxFlags
            | FieldKind::TxFlags
            | FieldKind::Vht
            | FieldKind::He
            | FieldKind::HeMu
            | FieldKind::HeMuOtherUser
            | FieldKind::LSig
            | FieldKind::VendorNamespace => 2,
            _ => 1,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            FieldKind::Tsft => 8,
            FieldKind::Flags | FieldKind::Rate => 1,
            FieldKind::Channel => 4,
            FieldKind::Fhss => 2,
            FieldKind::AntennaSignal | FieldKind::AntennaNoise => 1,
            FieldKind::LockQuality | FieldKind::TxAttenuation | FieldKind::TxAttenuationDb => 2,
            FieldKind::TxPower
            | FieldKind::Antenna
            | FieldKind::AntennaSignalDb
            | FieldKind::AntennaNoiseDb => 1,
            FieldKind::RxFlags | FieldKind::TxFlags => 2,
            FieldKind::RtsRetries | FieldKind::DataRetries => 1,
            FieldKind::XChannel => 8,
            FieldKind::Mcs => 3,
            FieldKind::AmpduStatus => 8,
            FieldKind::Vht | FieldKind::Timestamp | FieldKind::He | FieldKind::HeMu => 12,
            FieldKind::HeMuOtherUser | FieldKind::VendorNamespace => 6,
            FieldKind::ZeroLengthPsdu => 1,
            FieldKind::LSig | FieldKind::PresenceBitmap => 4,
        }
    }
}

/// Decoded payload of one radiotap field, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Tsft(u64),
    Flags(u8),
    /// Data rate in 500 kb/s units.
    Rate(u8),
    Channel {
        frequency: u16,
        flags: u16,
    },
    Fhss {
        hop_set: u8,
        hop_pattern: u8,
    },
    AntennaSignal(i8),
    AntennaNoise(i8),
    LockQuality(u16),
    TxAttenuation(u16),
    TxAttenuationDb(u16),
    TxPower(i8),
    Antenna(u8),
    AntennaSignalDb(u8),
    AntennaNoiseDb(u8),
    RxFlags(u16),
    TxFlags(u16),
    RtsRetries(u8),
    DataRetries(u8),
    XChannel {
        flags: u32,
        frequency: u16,
        channel: u8,
        max_power: u8,
    },
    Mcs {
        known: u8,
        flags: u8,
        index: u8,
    },
    AmpduStatus {
        reference: u32,
        flags: u16,
        delimiter_crc: u8,
        reserved: u8,
    },
    Vht {
        known: u16,
        flags: u8,
        bandwidth: u8,
        mcs_nss: [u8; 4],
        coding: u8,
        group_id: u8,
        partial_aid: u16,
    },
    Timestamp {
        timestamp: u64,
        accuracy: u16,
        unit_position: u8,
        flags: u8,
    },
    He([u16; 6]),
    HeMu {
        flags1: u16,
        flags2: u16,
        ru_channel1: [u8; 4],
        ru_channel2: [u8; 4],
    },
    HeMuOtherUser {
        per_user_1: u16,
        per_user_2: u16,
        per_user_position: u8,
        per_user_known: u8,
    },
    ZeroLengthPsdu(u8),
    LSig {
        data1: u16,
        data2: u16,
    },
    VendorNamespace {
        oui: [u8; 3],
        sub_namespace: u8,
        skip_length: u16,
    },
}

impl FieldValue {
    /// Decodes `bytes`, which must be exactly `kind.size()` long.
    fn decode(kind: FieldKind, bytes: &[u8]) -> FieldValue {
        match kind {
            FieldKind::Tsft => FieldValue::Tsft(LE::read_u64(bytes)),
            FieldKind::Flags => FieldValue::Flags(bytes[0]),
            FieldKind::Rate => FieldValue::Rate(bytes[0]),
            FieldKind::Channel => FieldValue::Channel {
                frequency: LE::read_u16(&bytes[0..2]),
                flags: LE::read_u16(&bytes[2..4]),
            },
            FieldKind::Fhss => FieldValue::Fhss {
                hop_set: bytes[0],
                hop_pattern: bytes[1],
            },
            FieldKind::AntennaSignal => FieldValue::AntennaSignal(bytes[0] as i8),
            FieldKind::AntennaNoise => FieldValue::AntennaNoise(bytes[0] as i8),
            FieldKind::LockQuality => FieldValue::LockQuality(LE::read_u16(bytes)),
            FieldKind::TxAttenuation => FieldValue::TxAttenuation(LE::read_u16(bytes)),
            FieldKind::TxAttenuationDb => FieldValue::TxAttenuationDb(LE::read_u16(bytes)),
            FieldKind::TxPower => FieldValue::TxPower(bytes[0] as i8),
            FieldKind::Antenna => FieldValue::Antenna(bytes[0]),
            FieldKind::AntennaSignalDb => FieldValue::AntennaSignalDb(bytes[0]),
            FieldKind::AntennaNoiseDb => FieldValue::AntennaNoiseDb(bytes[0]),
            FieldKind::RxFlags => FieldValue::RxFlags(LE::read_u16(bytes)),
            FieldKind::TxFlags => FieldValue::TxFlags(LE::read_u16(bytes)),
            FieldKind::RtsRetries => FieldValue::RtsRetries(bytes[0]),
            FieldKind::DataRetries => FieldValue::DataRetries(bytes[0]),
            FieldKind::XChannel => FieldValue::XChannel {
                flags: LE::read_u32(&bytes[0..4]),
                frequency: LE::read_u16(&bytes[4..6]),
                channel: bytes[6],
                max_power: bytes[7],
            },
            FieldKind::Mcs => FieldValue::Mcs {
                known: bytes[0],
                flags: bytes[1],
                index: bytes[2],
            },
            FieldKind::AmpduStatus => FieldValue::AmpduStatus {
                reference: LE::read_u32(&bytes[0..4]),
                flags: LE::read_u16(&bytes[4..6]),
                delimiter_crc: bytes[6],
                reserved: bytes[7],
            },
            FieldKind::Vht => FieldValue::Vht {
                known: LE::read_u16(&bytes[0..2]),
                flags: bytes[2],
                bandwidth: bytes[3],
                mcs_nss: [bytes[4], bytes[5], bytes[6], bytes[7]],
                coding: bytes[8],
                group_id: bytes[9],
                partial_aid: LE::read_u16(&bytes[10..12]),
            },
            FieldKind::Timestamp => FieldValue::Timestamp {
                timestamp: LE::read_u64(&bytes[0..8]),
                accuracy: LE::read_u16(&bytes[8..10]),
                unit_position: bytes[10],
                flags: bytes[11],
            },
            FieldKind::He => {
                let mut data = [0u16; 6];
                LE::read_u16_into(bytes, &mut data);
                FieldValue::He(data)
            }
            FieldKind::HeMu => FieldValue::HeMu {
                flags1: LE::read_u16(&bytes[0..2]),
                flags2: LE::read_u16(&bytes[2..4]),
                ru_channel1: [bytes[4], bytes[5], bytes[6], bytes[7]],
                ru_channel2: [bytes[8], bytes[9], bytes[10], bytes[11]],
            },
            FieldKind::HeMuOtherUser => FieldValue::HeMuOtherUser {
                per_user_1: LE::read_u16(&bytes[0..2]),
                per_user_2: LE::read_u16(&bytes[2..4]),
                per_user_position: bytes[4],
                per_user_known: bytes[5],
            },
            FieldKind::ZeroLengthPsdu => FieldValue::ZeroLengthPsdu(bytes[0]),
            FieldKind::LSig => FieldValue::LSig {
                data1: LE::read_u16(&bytes[0..2]),
                data2: LE::read_u16(&bytes[2..4]),
            },
            FieldKind::VendorNamespace => FieldValue::VendorNamespace {
                oui: [bytes[0], bytes[1], bytes[2]],
                sub_namespace: bytes[3],
                skip_length: LE::read_u16(&bytes[4..6]),
            },
            FieldKind::PresenceBitmap => unreachable!("presence words are not fields"),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Tsft(_) => FieldKind::Tsft,
            FieldValue::Flags(_) => FieldKind::Flags,
            FieldValue::Rate(_) => FieldKind::Rate,
            FieldValue::Channel { .. } => FieldKind::Channel,
            FieldValue::Fhss { .. } => FieldKind::Fhss,
            FieldValue::AntennaSignal(_) => FieldKind::AntennaSignal,
            FieldValue::AntennaNoise(_) => FieldKind::AntennaNoise,
            FieldValue::LockQuality(_) => FieldKind::LockQuality,
            FieldValue::TxAttenuation(_) => FieldKind::TxAttenuation,
            FieldValue::TxAttenuationDb(_) => FieldKind::TxAttenuationDb,
            FieldValue::TxPower(_) => FieldKind::TxPower,
            FieldValue::Antenna(_) => FieldKind::Antenna,
            FieldValue::AntennaSignalDb(_) => FieldKind::AntennaSignalDb,
            FieldValue::AntennaNoiseDb(_) => FieldKind::AntennaNoiseDb,
            FieldValue::RxFlags(_) => FieldKind::RxFlags,
            FieldValue::TxFlags(_) => FieldKind::TxFlags,
            FieldValue::RtsRetries(_) => FieldKind::RtsRetries,
            FieldValue::DataRetries(_) => FieldKind::DataRetries,
            FieldValue::XChannel { .. } => FieldKind::XChannel,
            FieldValue::Mcs { .. } => FieldKind::Mcs,
            FieldValue::AmpduStatus { .. } => FieldKind::AmpduStatus,
            FieldValue::Vht { .. } => FieldKind::Vht,
            FieldValue::Timestamp { .. } => FieldKind::Timestamp,
            FieldValue::He(_) => FieldKind::He,
            FieldValue::HeMu { .. } => FieldKind::HeMu,
            FieldValue::HeMuOtherUser { .. } => FieldKind::HeMuOtherUser,
            FieldValue::ZeroLengthPsdu(_) => FieldKind::ZeroLengthPsdu,
            FieldValue::LSig { .. } => FieldKind::LSig,
            FieldValue::VendorNamespace { .. } => FieldKind::VendorNamespace,
        }
    }

    /// Serializes the value in wire (little-endian) order, without alignment padding.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            FieldValue::Tsft(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::Flags(v)
            | FieldValue::Rate(v)
            | FieldValue::Antenna(v)
            | FieldValue::AntennaSignalDb(v)
            | FieldValue::AntennaNoiseDb(v)
            | FieldValue::RtsRetries(v)
            | FieldValue::DataRetries(v)
            | FieldValue::ZeroLengthPsdu(v) => out.push(v),
            FieldValue::AntennaSignal(v) | FieldValue::AntennaNoise(v) | FieldValue::TxPower(v) => {
                out.push(v as u8)
            }
            FieldValue::LockQuality(v)
            | FieldValue::TxAttenuation(v)
            | FieldValue::TxAttenuationDb(v)
            | FieldValue::RxFlags(v)
            | FieldValue::TxFlags(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::Channel { frequency, flags } => {
                out.extend_from_slice(&frequency.to_le_bytes());
                out.extend_from_slice(&flags.to_le_bytes());
            }
            FieldValue::Fhss {
                hop_set,
                hop_pattern,
            } => {
                out.push(hop_set);
                out.push(hop_pattern);
            }
            FieldValue::XChannel {
                flags,
                frequency,
                channel,
                max_power,
            } => {
                out.extend_from_slice(&flags.to_le_bytes());
                out.extend_from_slice(&frequency.to_le_bytes());
                out.push(channel);
                out.push(max_power);
            }
            FieldValue::Mcs {
                known,
                flags,
                index,
            } => out.extend_from_slice(&[known, flags, index]),
            FieldValue::AmpduStatus {
                reference,
                flags,
                delimiter_crc,
                reserved,
            } => {
                out.extend_from_slice(&reference.to_le_bytes());
                out.extend_from_slice(&flags.to_le_bytes());
                out.push(delimiter_crc);
                out.push(reserved);
            }
            FieldValue::Vht {
                known,
                flags,
                bandwidth,
                mcs_nss,
                coding,
                group_id,
                partial_aid,
            } => {
                out.extend_from_slice(&known.to_le_bytes());
                out.push(flags);
                out.push(bandwidth);
                out.extend_from_slice(&mcs_nss);
                out.push(coding);
                out.push(group_id);
                out.extend_from_slice(&partial_aid.to_le_bytes());
            }
            FieldValue::Timestamp {
                timestamp,
                accuracy,
                unit_position,
                flags,
            } => {
                out.extend_from_slice(&timestamp.to_le_bytes());
                out.extend_from_slice(&accuracy.to_le_bytes());
                out.push(unit_position);
                out.push(flags);
            }
            FieldValue::He(data) => {
                for word in data {
                    out.extend_from_slice(&word.to_le_bytes());
                }
            }
            FieldValue::HeMu {
                flags1,
                flags2,
                ru_channel1,
                ru_channel2,
            } => {
                out.extend_from_slice(&flags1.to_le_bytes());
                out.extend_from_slice(&flags2.to_le_bytes());
                out.extend_from_slice(&ru_channel1);
                out.extend_from_slice(&ru_channel2);
            }
            FieldValue::HeMuOtherUser {
                per_user_1,
                per_user_2,
                per_user_position,
                per_user_known,
            } => {
                out.extend_from_slice(&per_user_1.to_le_bytes());
                out.extend_from_slice(&per_user_2.to_le_bytes());
                out.push(per_user_position);
                out.push(per_user_known);
            }
            FieldValue::LSig { data1, data2 } => {
                out.extend_from_slice(&data1.to_le_bytes());
                out.extend_from_slice(&data2.to_le_bytes());
            }
            FieldValue::VendorNamespace {
                oui,
                sub_namespace,
                skip_length,
            } => {
                out.extend_from_slice(&oui);
                out.push(sub_namespace);
                out.extend_from_slice(&skip_length.to_le_bytes());
            }
        }
    }
}

/// One decoded presence-bitmap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadiotapField {
    pub kind: FieldKind,
    /// Byte offset of the field from the start of the radiotap header.
    pub offset: usize,
    pub value: FieldValue,
}

/// A validated radiotap header. Iterating a `&RadiotapReader` walks its fields
/// from the first one every time.
#[derive(Debug, Clone)]
pub struct RadiotapReader<'a> {
    data: &'a [u8],
    version: u8,
    present: Vec<u32>,
}

impl<'a> RadiotapReader<'a> {
    /// Validates the fixed part of the header at the start of `packet` and
    /// collects its presence words.
    pub fn parse(packet: &'a [u8]) -> Result<RadiotapReader<'a>> {
        if packet.len() < HEADER_LEN {
            return Err(Error::InvalidLength {
                needed: HEADER_LEN,
                available: packet.len(),
            });
        }

        let version = packet[0];
        if version != 0 {
            return Err(Error::UnsupportedVersion(version));
        }

        let length = LE::read_u16(&packet[2..4]) as usize;
        if length < HEADER_LEN || length > packet.len() {
            return Err(Error::InvalidLength {
                needed: length.max(HEADER_LEN),
                available: packet.len(),
            });
        }
        let data = &packet[..length];

        let mut present = Vec::with_capacity(1);
        let mut offset = 4;
        loop {
            if offset + 4 > length {
                return Err(Error::TruncatedHeader {
                    kind: FieldKind::PresenceBitmap,
                    offset,
                    header_len: length,
                });
            }
            let word = LE::read_u32(&data[offset..offset + 4]);
            present.push(word);
            offset += 4;
            if !get_bit(word, PRESENT_EXT as u8) {
                break;
            }
        }

        Ok(RadiotapReader {
            data,
            version,
            present,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Declared header length; the 802.11 frame starts at this offset.
    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn present(&self) -> &[u32] {
        &self.present
    }

    pub fn fields(&self) -> Fields<'_> {
        Fields {
            data: self.data,
            present: &self.present,
            offset: 4 + 4 * self.present.len(),
            word: 0,
            bit: 0,
            index_base: 0,
            namespace: Namespace::Radiotap,
            next_namespace: None,
            vendor_skip: 0,
            done: false,
        }
    }
}

impl<'r, 'a> IntoIterator for &'r RadiotapReader<'a> {
    type Item = Result<RadiotapField>;
    type IntoIter = Fields<'r>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Radiotap,
    Vendor,
}

/// Iterator over the fields of one radiotap header.
#[derive(Debug, Clone)]
pub struct Fields<'r> {
    data: &'r [u8],
    present: &'r [u32],
    offset: usize,
    word: usize,
    bit: u32,
    index_base: u32,
    namespace: Namespace,
    next_namespace: Option<Namespace>,
    vendor_skip: usize,
    done: bool,
}

impl<'r> Fields<'r> {
    fn read(&mut self, kind: FieldKind) -> Result<RadiotapField> {
        let align = kind.align();
        let start = (self.offset + align - 1) & !(align - 1);
        let end = start + kind.size();
        if end > self.data.len() {
            self.done = true;
            return Err(Error::TruncatedHeader {
                kind,
                offset: start,
                header_len: self.data.len(),
            });
        }

        let value = FieldValue::decode(kind, &self.data[start..end]);
        self.offset = end;
        trace!("radiotap {} @{}: {:?}", kind, start, value);
        Ok(RadiotapField {
            kind,
            offset: start,
            value,
        })
    }

    /// Moves to the next presence word, applying a pending namespace switch.
    fn next_word(&mut self) -> Result<()> {
        self.word += 1;
        self.bit = 0;
        match self.next_namespace.take() {
            Some(Namespace::Radiotap) => {
                self.namespace = Namespace::Radiotap;
                self.index_base = 0;
            }
            Some(Namespace::Vendor) => {
                // Vendor data is opaque to us; jump over it.
                let end = self.offset + self.vendor_skip;
                if end > self.data.len() {
                    self.done = true;
                    return Err(Error::TruncatedHeader {
                        kind: FieldKind::VendorNamespace,
                        offset: self.offset,
                        header_len: self.data.len(),
                    });
                }
                self.offset = end;
                self.namespace = Namespace::Vendor;
                self.index_base = 0;
            }
            None => self.index_base += 32,
        }
        Ok(())
    }
}

impl<'r> Iterator for Fields<'r> {
    type Item = Result<RadiotapField>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let word = *self.present.get(self.word)?;

            if self.bit > PRESENT_EXT {
                if self.word + 1 >= self.present.len() {
                    self.done = true;
                    return None;
                }
                if let Err(e) = self.next_word() {
                    return Some(Err(e));
                }
                continue;
            }

            let bit = self.bit;
            self.bit += 1;
            if !get_bit(word, bit as u8) {
                continue;
            }

            match bit {
                PRESENT_RADIOTAP_NAMESPACE => {
                    self.next_namespace = Some(Namespace::Radiotap);
                }
                PRESENT_VENDOR_NAMESPACE => {
                    let field = self.read(FieldKind::VendorNamespace);
                    if let Ok(RadiotapField {
                        value: FieldValue::VendorNamespace { oui, skip_length, .. },
                        ..
                    }) = field
                    {
                        trace!(
                            "radiotap: vendor namespace {}, skipping {} bytes",
                            slice_to_hex_string(&oui),
                            skip_length
                        );
                        self.next_namespace = Some(Namespace::Vendor);
                        self.vendor_skip = skip_length as usize;
                    }
                    return Some(field);
                }
                PRESENT_EXT => {}
                _ => match self.namespace {
                    Namespace::Vendor => {}
                    Namespace::Radiotap => match FieldKind::from_index(self.index_base + bit) {
                        Some(kind) => return Some(self.read(kind)),
                        None => {
                            // Unknown layout: nothing after it can be located.
                            trace!("radiotap: stopping at unknown field {}", self.index_base + bit);
                            self.done = true;
                        }
                    },
                },
            }
        }
        None
    }
}

/// Assembles a radiotap header from field values, for synthesizing captures.
#[derive(Debug, Clone, Default)]
pub struct RadiotapBuilder {
    fields: Vec<FieldValue>,
}

impl RadiotapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a radiotap-namespace field. A second value of the same kind replaces the first.
    pub fn field(mut self, value: FieldValue) -> Self {
        self.fields.retain(|f| f.kind() != value.kind());
        self.fields.push(value);
        self
    }

    /// Serializes the header, then appends `payload`.
    pub fn build(mut self, payload: &[u8]) -> Vec<u8> {
        self.fields.retain(|f| f.kind() != FieldKind::VendorNamespace);
        self.fields.sort_by_key(|f| f.kind().index());

        let present = self
            .fields
            .iter()
            .fold(0u32, |acc, f| acc | (1 << f.kind().index()));

        let mut out = vec![0u8, 0, 0, 0];
        out.extend_from_slice(&present.to_le_bytes());
        for field in &self.fields {
            let align = field.kind().align();
            while out.len() % align != 0 {
                out.push(0);
            }
            field.encode(&mut out);
        }

        let length = out.len() as u16;
        LE::write_u16(&mut out[2..4], length);
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Real capture: TSFT, flags, channel, antenna signal/noise, antenna,
    // XChannel, A-MPDU status and VHT.
    const VHT_CAPTURE: [u8; 56] = [
        0, 0, 56, 0, 107, 8, 52, 0, 185, 31, 155, 154, 0, 0, 0, 0, 20, 0, 124, 21, 64, 1, 213,
        166, 1, 0, 0, 0, 64, 1, 1, 0, 124, 21, 100, 34, 249, 1, 0, 0, 0, 0, 0, 0, 255, 1, 80, 4,
        115, 0, 0, 0, 1, 63, 0, 0,
    ];

    fn collect(reader: &RadiotapReader) -> Vec<RadiotapField> {
        reader.fields().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn walks_real_capture() {
        let reader = RadiotapReader::parse(&VHT_CAPTURE).unwrap();
        assert_eq!(reader.length(), 56);
        assert_eq!(reader.present(), &[0x0034_086b]);

        let fields = collect(&reader);
        let kinds: Vec<FieldKind> = fields.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FieldKind::Tsft,
                FieldKind::Flags,
                FieldKind::Channel,
                FieldKind::AntennaSignal,
                FieldKind::AntennaNoise,
                FieldKind::Antenna,
                FieldKind::XChannel,
                FieldKind::AmpduStatus,
                FieldKind::Vht,
            ]
        );

        assert_eq!(fields[0].value, FieldValue::Tsft(0x9a9b_1fb9));
        assert_eq!(fields[1].value, FieldValue::Flags(0x14));
        assert_eq!(fields[2].offset, 18);
        assert_eq!(
            fields[2].value,
            FieldValue::Channel {
                frequency: 5500,
                flags: channel_flags::OFDM | channel_flags::GHZ5,
            }
        );
        assert_eq!(fields[3].value, FieldValue::AntennaSignal(-43));
        assert_eq!(fields[4].value, FieldValue::AntennaNoise(-90));
        assert_eq!(fields[6].offset, 28);
        assert_eq!(
            fields[6].value,
            FieldValue::XChannel {
                flags: 0x0001_0140,
                frequency: 5500,
                channel: 100,
                max_power: 34,
            }
        );
        assert_eq!(
            fields[7].value,
            FieldValue::AmpduStatus {
                reference: 505,
                flags: 0,
                delimiter_crc: 0,
                reserved: 0,
            }
        );
        assert_eq!(
            fields[8].value,
            FieldValue::Vht {
                known: 0x01ff,
                flags: 0x50,
                bandwidth: 4,
                mcs_nss: [115, 0, 0, 0],
                coding: 1,
                group_id: 63,
                partial_aid: 0,
            }
        );
    }

    #[test]
    fn iteration_restarts_from_the_first_field() {
        let reader = RadiotapReader::parse(&VHT_CAPTURE).unwrap();
        let first = collect(&reader);
        let second: Vec<RadiotapField> = (&reader).into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn encode_writes_little_endian() {
        let mut out = Vec::new();
        FieldValue::Channel {
            frequency: 2437,
            flags: channel_flags::OFDM | channel_flags::GHZ2,
        }
        .encode(&mut out);
        FieldValue::AntennaSignal(-40).encode(&mut out);
        FieldValue::AmpduStatus {
            reference: 0x0102_0304,
            flags: 0x0506,
            delimiter_crc: 7,
            reserved: 8,
        }
        .encode(&mut out);
        assert_eq!(
            out,
            vec![0x85, 0x09, 0xc0, 0x00, 0xd8, 4, 3, 2, 1, 6, 5, 7, 8]
        );
    }

    #[test]
    fn builder_output_parses_back() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Mcs {
                known: 0x1f,
                flags: 0x15,
                index: 7,
            })
            .field(FieldValue::Rate(22))
            .field(FieldValue::Tsft(0x0102_0304_0506_0708))
            .field(FieldValue::Channel {
                frequency: 2437,
                flags: channel_flags::CCK | channel_flags::GHZ2,
            })
            .field(FieldValue::AmpduStatus {
                reference: 9,
                flags: 0x0004,
                delimiter_crc: 0xaa,
                reserved: 0,
            })
            .build(&[0xde, 0xad]);

        let reader = RadiotapReader::parse(&packet).unwrap();
        assert_eq!(&packet[reader.length()..], &[0xde, 0xad]);

        let values: Vec<FieldValue> = collect(&reader).into_iter().map(|f| f.value).collect();
        assert_eq!(
            values,
            vec![
                FieldValue::Tsft(0x0102_0304_0506_0708),
                FieldValue::Rate(22),
                FieldValue::Channel {
                    frequency: 2437,
                    flags: channel_flags::CCK | channel_flags::GHZ2,
                },
                FieldValue::Mcs {
                    known: 0x1f,
                    flags: 0x15,
                    index: 7,
                },
                FieldValue::AmpduStatus {
                    reference: 9,
                    flags: 0x0004,
                    delimiter_crc: 0xaa,
                    reserved: 0,
                },
            ]
        );
    }

    #[test]
    fn alignment_padding_is_skipped() {
        // Rate at offset 8, one pad byte, channel at offset 10.
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Rate(4))
            .field(FieldValue::Channel {
                frequency: 2412,
                flags: channel_flags::CCK,
            })
            .build(&[]);
        assert_eq!(packet.len(), 14);
        let fields = collect(&RadiotapReader::parse(&packet).unwrap());
        assert_eq!(fields[0].offset, 8);
        assert_eq!(fields[1].offset, 10);
    }

    #[test]
    fn truncated_field_is_reported() {
        // TSFT and rate flagged present but the declared length only covers TSFT.
        let mut packet = RadiotapBuilder::new()
            .field(FieldValue::Tsft(1))
            .field(FieldValue::Rate(2))
            .build(&[]);
        packet[2] = 16;

        let reader = RadiotapReader::parse(&packet).unwrap();
        let mut fields = reader.fields();
        assert!(matches!(fields.next(), Some(Ok(_))));
        assert_eq!(
            fields.next(),
            Some(Err(Error::TruncatedHeader {
                kind: FieldKind::Rate,
                offset: 16,
                header_len: 16,
            }))
        );
        assert_eq!(fields.next(), None);
    }

    #[test]
    fn header_validation() {
        assert_eq!(
            RadiotapReader::parse(&[0, 0, 8]).unwrap_err(),
            Error::InvalidLength {
                needed: 8,
                available: 3
            }
        );
        assert_eq!(
            RadiotapReader::parse(&[1, 0, 8, 0, 0, 0, 0, 0]).unwrap_err(),
            Error::UnsupportedVersion(1)
        );
        assert_eq!(
            RadiotapReader::parse(&[0, 0, 12, 0, 0, 0, 0, 0]).unwrap_err(),
            Error::InvalidLength {
                needed: 12,
                available: 8
            }
        );
        // Extension bit set but no room for a second presence word.
        assert!(matches!(
            RadiotapReader::parse(&[0, 0, 8, 0, 0, 0, 0, 0x80]).unwrap_err(),
            Error::TruncatedHeader {
                kind: FieldKind::PresenceBitmap,
                ..
            }
        ));
    }

    #[test]
    fn extended_radiotap_namespace_restarts_indices() {
        // Word 0: flags + radiotap namespace + ext. Word 1: antenna signal.
        let packet = [
            0, 0, 14, 0, //
            0x02, 0, 0, 0xa0, //
            0x20, 0, 0, 0, //
            0x10, 0xc4,
        ];
        let fields = collect(&RadiotapReader::parse(&packet).unwrap());
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].value, FieldValue::Flags(0x10));
        assert_eq!(fields[1].value, FieldValue::AntennaSignal(-60));
    }

    #[test]
    fn vendor_namespace_data_is_skipped() {
        // Word 0: rate + vendor namespace + ext. Word 1 (vendor): bit 0 + radiotap ns + ext.
        // Word 2 (radiotap): flags.
        let packet = [
            0, 0, 30, 0, //
            0x04, 0, 0, 0xc0, //
            0x01, 0, 0, 0xa0, //
            0x02, 0, 0, 0, //
            0x0c, // rate
            0,    // pad
            0x00, 0x11, 0x22, 0x01, 0x04, 0x00, // vendor header, skip 4
            0xff, 0xff, 0xff, 0xff, // vendor data
            0x03, // flags
            0,
        ];
        let fields = collect(&RadiotapReader::parse(&packet).unwrap());
        let values: Vec<FieldValue> = fields.iter().map(|f| f.value).collect();
        assert_eq!(
            values,
            vec![
                FieldValue::Rate(12),
                FieldValue::VendorNamespace {
                    oui: [0x00, 0x11, 0x22],
                    sub_namespace: 1,
                    skip_length: 4,
                },
                FieldValue::Flags(3),
            ]
        );
    }

    #[test]
    fn unknown_field_ends_walk() {
        // Bit 28 has no fixed layout; rate before it is still reported.
        let packet = [0, 0, 12, 0, 0x04, 0, 0, 0x10, 0x02, 0, 0, 0];
        let fields = collect(&RadiotapReader::parse(&packet).unwrap());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, FieldValue::Rate(2));
    }

    #[test]
    fn agrees_with_radiotap_crate() {
        let theirs = radiotap::Radiotap::from_bytes(&VHT_CAPTURE).unwrap();
        let reader = RadiotapReader::parse(&VHT_CAPTURE).unwrap();
        assert_eq!(reader.length(), theirs.header.length);

        for field in collect(&reader) {
            match field.value {
                FieldValue::Tsft(value) => assert_eq!(value, theirs.tsft.unwrap().value),
                FieldValue::Channel { frequency, .. } => {
                    assert_eq!(frequency, theirs.channel.unwrap().freq)
                }
                _ => {}
            }
        }
    }
}
