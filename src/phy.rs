//! PHY classification of a radiotap header.

use log::debug;
use strum_macros::{Display, EnumIter};

use crate::error::Result;
use crate::radiotap::{channel_flags, flags, mcs, vht, FieldValue, RadiotapField};
use crate::util::get_sub_value;

/// Extension spatial streams, known bit and flag bit of the MCS field.
const MCS_HAVE_NESS: u8 = 0x40;
const MCS_NESS: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum PhyMode {
    #[strum(serialize = "unknown")]
    Unknown,
    #[strum(serialize = "802.11 FHSS")]
    Fhss,
    #[strum(serialize = "802.11b")]
    B,
    #[strum(serialize = "802.11a")]
    A,
    #[strum(serialize = "802.11g")]
    G,
    #[strum(serialize = "802.11n")]
    N,
    #[strum(serialize = "802.11ac")]
    Ac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FhssInfo {
    pub hop_set: Option<u8>,
    pub hop_pattern: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Info11b {
    pub short_preamble: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Info11a {
    pub turbo: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Info11g {
    pub short_preamble: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HtBandwidth {
    #[strum(serialize = "20 MHz")]
    Bw20,
    #[strum(serialize = "40 MHz")]
    Bw40,
    #[strum(serialize = "20 MHz (lower)")]
    Bw20Lower,
    #[strum(serialize = "20 MHz (upper)")]
    Bw20Upper,
}

impl HtBandwidth {
    pub fn from_bits(bits: u8) -> HtBandwidth {
        match bits & mcs::BW_MASK {
            0 => HtBandwidth::Bw20,
            1 => HtBandwidth::Bw40,
            2 => HtBandwidth::Bw20Lower,
            _ => HtBandwidth::Bw20Upper,
        }
    }

    pub fn is_40mhz(&self) -> bool {
        *self == HtBandwidth::Bw40
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Fec {
    #[strum(serialize = "BCC")]
    Bcc,
    #[strum(serialize = "LDPC")]
    Ldpc,
}

/// 802.11n parameters. `None` means the radiotap header did not mark the value as known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Info11n {
    pub mcs_index: Option<u8>,
    pub bandwidth: Option<HtBandwidth>,
    pub short_gi: Option<bool>,
    pub greenfield: Option<bool>,
    pub fec: Option<Fec>,
    pub stbc_streams: Option<u8>,
    pub ness: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VhtUser {
    pub mcs: u8,
    pub nss: u8,
}

/// 802.11ac parameters. Kept for reporting only; no duration is derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Info11ac {
    pub stbc: Option<bool>,
    pub txop_ps_not_allowed: Option<bool>,
    pub short_gi: Option<bool>,
    pub short_gi_nsym_disambig: Option<bool>,
    pub ldpc_extra_ofdm_symbol: Option<bool>,
    pub beamformed: Option<bool>,
    pub bandwidth: Option<u8>,
    pub group_id: Option<u8>,
    pub partial_aid: Option<u16>,
    pub users: [Option<VhtUser>; 4],
    pub fec: u8,
}

/// Mode-specific PHY parameters; exactly one mode per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhyInfo {
    #[default]
    Unknown,
    Fhss(FhssInfo),
    B(Info11b),
    A(Info11a),
    G(Info11g),
    N(Info11n),
    Ac(Info11ac),
}

impl PhyInfo {
    pub fn mode(&self) -> PhyMode {
        match self {
            PhyInfo::Unknown => PhyMode::Unknown,
            PhyInfo::Fhss(_) => PhyMode::Fhss,
            PhyInfo::B(_) => PhyMode::B,
            PhyInfo::A(_) => PhyMode::A,
            PhyInfo::G(_) => PhyMode::G,
            PhyInfo::N(_) => PhyMode::N,
            PhyInfo::Ac(_) => PhyMode::Ac,
        }
    }

    /// True for the modes that can carry A-MPDUs.
    pub fn is_ht_or_vht(&self) -> bool {
        matches!(self, PhyInfo::N(_) | PhyInfo::Ac(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub frequency: u16,
    pub flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStatus {
    pub reference: u32,
    pub flags: u16,
}

/// Everything the duration math and the aggregate detector need to know about one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhyDescriptor {
    pub phy: PhyInfo,
    /// In 500 kb/s units.
    pub data_rate: Option<u8>,
    pub tsf: Option<u64>,
    pub aggregate: Option<AggregateStatus>,
    pub channel: Option<ChannelInfo>,
    pub signal_dbm: Option<i8>,
    pub noise_dbm: Option<i8>,
    /// The captured frame already ends with its FCS.
    pub fcs_at_end: bool,
}

impl PhyDescriptor {
    pub fn mode(&self) -> PhyMode {
        self.phy.mode()
    }
}

/// Raw observations gathered while walking the header.
#[derive(Debug, Default)]
struct Evidence {
    has_fhss: bool,
    is_cck: bool,
    is_ofdm: bool,
    is_2ghz: bool,
    is_5ghz: bool,
    cck_ofdm: bool,
    turbo: bool,
    radiotap_flags: Option<u8>,
    mcs: Option<(u8, u8, u8)>,
    vht: Option<FieldValue>,
}

fn is_dsss_rate(rate: u8) -> bool {
    matches!(rate, 2 | 4 | 11 | 22)
}

fn is_ofdm_rate(rate: u8) -> bool {
    matches!(rate, 12 | 18 | 24 | 36 | 48 | 72 | 96 | 108)
}

/// Builds the [`PhyDescriptor`] for one frame from its radiotap fields.
///
/// Rules are tried in order: FHSS, 802.11b (CCK channel or DSSS rate),
/// 802.11a (5 GHz OFDM without HT/VHT info), 802.11g (2.4 GHz OFDM without
/// MCS, or an OFDM rate), 802.11n (MCS without VHT), 802.11ac (VHT), and
/// finally unknown.
pub fn classify<I>(fields: I) -> Result<PhyDescriptor>
where
    I: IntoIterator<Item = Result<RadiotapField>>,
{
    let mut descriptor = PhyDescriptor::default();
    let mut evidence = Evidence::default();

    for field in fields {
        match field?.value {
            FieldValue::Tsft(tsf) => {
                descriptor.tsf.get_or_insert(tsf);
            }
            FieldValue::Flags(value) => {
                evidence.radiotap_flags.get_or_insert(value);
            }
            FieldValue::Rate(rate) => {
                descriptor.data_rate.get_or_insert(rate);
            }
            FieldValue::Channel { frequency, flags } => {
                let chan_flags = flags as u32;
                evidence.is_cck = get_sub_value(chan_flags, channel_flags::CCK as u32) == 1;
                evidence.is_ofdm = get_sub_value(chan_flags, channel_flags::OFDM as u32) == 1;
                evidence.is_2ghz = get_sub_value(chan_flags, channel_flags::GHZ2 as u32) == 1;
                evidence.is_5ghz = get_sub_value(chan_flags, channel_flags::GHZ5 as u32) == 1;
                evidence.cck_ofdm = get_sub_value(chan_flags, channel_flags::DYN as u32) == 1;
                evidence.turbo = get_sub_value(chan_flags, channel_flags::TURBO as u32) == 1;
                descriptor.channel = Some(ChannelInfo { frequency, flags });
            }
            FieldValue::Fhss { .. } => evidence.has_fhss = true,
            FieldValue::AntennaSignal(dbm) => {
                descriptor.signal_dbm.get_or_insert(dbm);
            }
            FieldValue::AntennaNoise(dbm) => {
                descriptor.noise_dbm.get_or_insert(dbm);
            }
            FieldValue::Mcs {
                known,
                flags,
                index,
            } => evidence.mcs = Some((known, flags, index)),
            FieldValue::AmpduStatus {
                reference, flags, ..
            } => descriptor.aggregate = Some(AggregateStatus { reference, flags }),
            value @ FieldValue::Vht { .. } => evidence.vht = Some(value),
            _ => {}
        }
    }

    let rate = descriptor.data_rate.unwrap_or(0);
    let short_preamble = evidence
        .radiotap_flags
        .map(|f| get_sub_value(f as u32, flags::SHORT_PREAMBLE as u32) == 1);
    descriptor.fcs_at_end = evidence
        .radiotap_flags
        .map_or(false, |f| get_sub_value(f as u32, flags::FCS_AT_END as u32) == 1);

    descriptor.phy = if evidence.has_fhss {
        PhyInfo::Fhss(FhssInfo::default())
    } else if evidence.is_cck || is_dsss_rate(rate) {
        PhyInfo::B(Info11b { short_preamble })
    } else if evidence.is_5ghz
        && evidence.is_ofdm
        && evidence.mcs.is_none()
        && evidence.vht.is_none()
    {
        PhyInfo::A(Info11a {
            turbo: descriptor.channel.map(|_| evidence.turbo),
        })
    } else if (evidence.is_2ghz
        && (evidence.is_ofdm || evidence.cck_ofdm)
        && evidence.mcs.is_none())
        || is_ofdm_rate(rate)
    {
        PhyInfo::G(Info11g { short_preamble })
    } else if let (Some(mcs), None) = (evidence.mcs, evidence.vht) {
        PhyInfo::N(ht_info(mcs))
    } else if let Some(vht) = evidence.vht {
        PhyInfo::Ac(vht_info(vht))
    } else {
        PhyInfo::Unknown
    };

    debug!(
        "classified {} (rate {:?}, tsf {:?}, fcs at end {})",
        descriptor.mode(),
        descriptor.data_rate,
        descriptor.tsf,
        descriptor.fcs_at_end
    );
    Ok(descriptor)
}

/// Fills only the values the MCS `known` mask vouches for.
fn ht_info((known, mcs_flags, index): (u8, u8, u8)) -> Info11n {
    let known = known as u32;
    let mcs_flags = mcs_flags as u32;
    let is_known = |bit: u8| get_sub_value(known, bit as u32) == 1;

    let mut info = Info11n::default();
    if is_known(mcs::HAVE_MCS) {
        info.mcs_index = Some(index);
    }
    if is_known(mcs::HAVE_BW) {
        info.bandwidth = Some(HtBandwidth::from_bits(
            get_sub_value(mcs_flags, mcs::BW_MASK as u32) as u8,
        ));
    }
    if is_known(mcs::HAVE_GI) {
        info.short_gi = Some(get_sub_value(mcs_flags, mcs::SGI as u32) == 1);
    }
    if is_known(mcs::HAVE_FMT) {
        info.greenfield = Some(get_sub_value(mcs_flags, mcs::FMT_GF as u32) == 1);
    }
    if is_known(mcs::HAVE_FEC) {
        info.fec = Some(if get_sub_value(mcs_flags, mcs::FEC_LDPC as u32) == 1 {
            Fec::Ldpc
        } else {
            Fec::Bcc
        });
    }
    if is_known(mcs::HAVE_STBC) {
        info.stbc_streams = Some(get_sub_value(mcs_flags, mcs::STBC_MASK as u32) as u8);
    }
    if is_known(MCS_HAVE_NESS) {
        info.ness = Some(get_sub_value(mcs_flags, MCS_NESS as u32) as u8);
    }

    debug!(
        "802.11n: mcs {:?} bw {:?} sgi {:?} gf {:?} fec {:?} stbc {:?} ness {:?}",
        info.mcs_index,
        info.bandwidth,
        info.short_gi,
        info.greenfield,
        info.fec,
        info.stbc_streams,
        info.ness
    );
    info
}

fn vht_info(field: FieldValue) -> Info11ac {
    let mut info = Info11ac::default();
    let FieldValue::Vht {
        known,
        flags: vht_flags,
        bandwidth,
        mcs_nss,
        coding,
        group_id,
        partial_aid,
    } = field
    else {
        return info;
    };

    let flag = |known_bit: u16, flag_bit: u8| {
        (known & known_bit != 0).then_some(vht_flags & flag_bit != 0)
    };
    info.stbc = flag(vht::KNOWN_STBC, vht::FLAG_STBC);
    info.txop_ps_not_allowed = flag(vht::KNOWN_TXOP_PS_NA, vht::FLAG_TXOP_PS_NA);
    info.short_gi = flag(vht::KNOWN_GI, vht::FLAG_SGI);
    info.short_gi_nsym_disambig = flag(vht::KNOWN_SGI_NSYM_DIS, vht::FLAG_SGI_NSYM_M10_9);
    info.ldpc_extra_ofdm_symbol =
        flag(vht::KNOWN_LDPC_EXTRA_OFDM_SYM, vht::FLAG_LDPC_EXTRA_OFDM_SYM);
    info.beamformed = flag(vht::KNOWN_BEAMFORMED, vht::FLAG_BEAMFORMED);
    info.bandwidth = (known & vht::KNOWN_BANDWIDTH != 0).then_some(bandwidth);
    info.group_id = (known & vht::KNOWN_GROUP_ID != 0).then_some(group_id);
    info.partial_aid = (known & vht::KNOWN_PARTIAL_AID != 0).then_some(partial_aid);
    info.fec = coding;

    for (slot, &mcs_nss) in info.users.iter_mut().zip(mcs_nss.iter()) {
        let nss = get_sub_value(mcs_nss as u32, vht::NSS_MASK as u32) as u8;
        // NSS of zero marks an absent user.
        if nss != 0 {
            *slot = Some(VhtUser {
                mcs: get_sub_value(mcs_nss as u32, vht::MCS_MASK as u32) as u8,
                nss,
            });
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radiotap::{RadiotapBuilder, RadiotapReader};

    fn classify_packet(packet: &[u8]) -> PhyDescriptor {
        let reader = RadiotapReader::parse(packet).unwrap();
        classify(&reader).unwrap()
    }

    fn channel(frequency: u16, flags: u16) -> FieldValue {
        FieldValue::Channel { frequency, flags }
    }

    #[test]
    fn cck_channel_is_11b() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Flags(flags::SHORT_PREAMBLE | flags::FCS_AT_END))
            .field(FieldValue::Rate(22))
            .field(channel(2437, channel_flags::CCK | channel_flags::GHZ2))
            .build(&[]);
        let phy = classify_packet(&packet);
        assert_eq!(
            phy.phy,
            PhyInfo::B(Info11b {
                short_preamble: Some(true)
            })
        );
        assert_eq!(phy.data_rate, Some(22));
        assert!(phy.fcs_at_end);
    }

    #[test]
    fn dsss_rate_without_channel_is_11b() {
        let packet = RadiotapBuilder::new().field(FieldValue::Rate(4)).build(&[]);
        let phy = classify_packet(&packet);
        assert_eq!(phy.phy, PhyInfo::B(Info11b { short_preamble: None }));
        assert!(!phy.fcs_at_end);
    }

    #[test]
    fn flags_field_present_but_zero_still_reports_preamble() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Flags(0))
            .field(FieldValue::Rate(2))
            .build(&[]);
        assert_eq!(
            classify_packet(&packet).phy,
            PhyInfo::B(Info11b {
                short_preamble: Some(false)
            })
        );
    }

    #[test]
    fn ofdm_5ghz_is_11a() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Rate(12))
            .field(channel(5180, channel_flags::OFDM | channel_flags::GHZ5))
            .build(&[]);
        assert_eq!(classify_packet(&packet).mode(), PhyMode::A);
    }

    #[test]
    fn ofdm_2ghz_is_11g() {
        let packet = RadiotapBuilder::new()
            .field(channel(2412, channel_flags::DYN | channel_flags::GHZ2))
            .build(&[]);
        assert_eq!(classify_packet(&packet).mode(), PhyMode::G);

        let by_rate = RadiotapBuilder::new().field(FieldValue::Rate(108)).build(&[]);
        assert_eq!(classify_packet(&by_rate).mode(), PhyMode::G);
    }

    #[test]
    fn fhss_wins_over_everything() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Rate(2))
            .field(channel(2412, channel_flags::CCK))
            .field(FieldValue::Fhss {
                hop_set: 1,
                hop_pattern: 2,
            })
            .build(&[]);
        assert_eq!(
            classify_packet(&packet).phy,
            PhyInfo::Fhss(FhssInfo::default())
        );
    }

    #[test]
    fn mcs_known_mask_gates_ht_fields() {
        // Bandwidth, MCS and GI known; flags also carry format, FEC and STBC bits
        // that must not leak through.
        let packet = RadiotapBuilder::new()
            .field(channel(5200, channel_flags::OFDM | channel_flags::GHZ5))
            .field(FieldValue::Mcs {
                known: mcs::HAVE_BW | mcs::HAVE_MCS | mcs::HAVE_GI,
                flags: 0x01 | mcs::SGI | mcs::FMT_GF | mcs::FEC_LDPC | 0x20,
                index: 15,
            })
            .build(&[]);
        assert_eq!(
            classify_packet(&packet).phy,
            PhyInfo::N(Info11n {
                mcs_index: Some(15),
                bandwidth: Some(HtBandwidth::Bw40),
                short_gi: Some(true),
                ..Default::default()
            })
        );
    }

    #[test]
    fn all_ht_fields_known() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Mcs {
                known: 0x7f,
                flags: mcs::FMT_GF | mcs::FEC_LDPC | 0x40 | 0x80,
                index: 3,
            })
            .build(&[]);
        assert_eq!(
            classify_packet(&packet).phy,
            PhyInfo::N(Info11n {
                mcs_index: Some(3),
                bandwidth: Some(HtBandwidth::Bw20),
                short_gi: Some(false),
                greenfield: Some(true),
                fec: Some(Fec::Ldpc),
                stbc_streams: Some(2),
                ness: Some(1),
            })
        );
    }

    #[test]
    fn vht_is_11ac() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Tsft(77))
            .field(FieldValue::Vht {
                known: vht::KNOWN_GI | vht::KNOWN_BANDWIDTH,
                flags: vht::FLAG_SGI | vht::FLAG_STBC,
                bandwidth: 4,
                mcs_nss: [0x92, 0, 0, 0],
                coding: 0,
                group_id: 0,
                partial_aid: 0,
            })
            .build(&[]);
        let phy = classify_packet(&packet);
        let PhyInfo::Ac(info) = phy.phy else {
            panic!("expected 802.11ac, got {:?}", phy.phy);
        };
        assert_eq!(info.short_gi, Some(true));
        assert_eq!(info.stbc, None);
        assert_eq!(info.bandwidth, Some(4));
        assert_eq!(info.users[0], Some(VhtUser { mcs: 9, nss: 2 }));
        assert_eq!(info.users[1], None);
        assert_eq!(phy.tsf, Some(77));
    }

    #[test]
    fn nothing_useful_is_unknown() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::AntennaSignal(-40))
            .build(&[]);
        let phy = classify_packet(&packet);
        assert_eq!(phy.mode(), PhyMode::Unknown);
        assert_eq!(phy.signal_dbm, Some(-40));
    }

    #[test]
    fn aggregate_status_is_recorded() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::AmpduStatus {
                reference: 1234,
                flags: 0x0008,
                delimiter_crc: 0,
                reserved: 0,
            })
            .build(&[]);
        assert_eq!(
            classify_packet(&packet).aggregate,
            Some(AggregateStatus {
                reference: 1234,
                flags: 0x0008
            })
        );
    }

    #[test]
    fn classification_is_repeatable() {
        let packet = RadiotapBuilder::new()
            .field(FieldValue::Tsft(5))
            .field(FieldValue::Mcs {
                known: 0x3f,
                flags: 0,
                index: 7,
            })
            .build(&[1, 2, 3]);
        let reader = RadiotapReader::parse(&packet).unwrap();
        assert_eq!(classify(&reader).unwrap(), classify(&reader).unwrap());
    }

    #[test]
    fn truncated_header_fails_classification() {
        let mut packet = RadiotapBuilder::new()
            .field(FieldValue::Tsft(1))
            .field(FieldValue::Rate(2))
            .build(&[]);
        packet[2] = 16;
        let reader = RadiotapReader::parse(&packet).unwrap();
        assert!(classify(&reader).is_err());
    }
}
