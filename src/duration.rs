//! On-air duration of a single frame, per PHY.

use log::debug;

use crate::error::{Error, Result};
use crate::phy::{Info11n, PhyDescriptor, PhyInfo};
use crate::tables;

const LONG_PREAMBLE_US: u32 = 192;
const SHORT_PREAMBLE_US: u32 = 96;

/// L-STF + L-LTF + L-SIG.
const OFDM_PREAMBLE_US: u32 = 20;
const OFDM_SYMBOL_US: u32 = 4;
const OFDM_SERVICE_BITS: u32 = 16;
const OFDM_TAIL_BITS: u32 = 6;

/// L-STF, L-LTF, L-SIG, HT-SIG, HT-STF.
const HT_MIXED_PREAMBLE_US: u32 = 32;
/// HT-GF-STF, HT-LTF1, HT-SIG.
const HT_GREENFIELD_PREAMBLE_US: u32 = 24;

/// Used when a legacy frame carries no rate, in 500 kb/s units.
const DEFAULT_RATE: u64 = 2;

fn ceil_div(value: u64, divisor: u64) -> u64 {
    (value + divisor - 1) / divisor
}

/// Narrows a duration computed in 64 bits, failing for lengths no PHY can carry.
fn to_micros(duration: u64, frame_length: u32) -> Result<u32> {
    u32::try_from(duration).map_err(|_| Error::DurationOverflow { frame_length })
}

fn legacy_rate(phy: &PhyDescriptor) -> u64 {
    match phy.data_rate {
        Some(rate) if rate > 0 => rate as u64,
        _ => DEFAULT_RATE,
    }
}

fn dsss_duration(short_preamble: Option<bool>, rate: u64, frame_length: u32) -> Result<u32> {
    let preamble = if short_preamble.unwrap_or(false) {
        SHORT_PREAMBLE_US
    } else {
        LONG_PREAMBLE_US
    };
    // bits / (rate / 2)
    let data = ceil_div(frame_length as u64 * 8 * 2, rate);
    to_micros(preamble as u64 + data, frame_length)
}

fn ofdm_duration(rate: u64, frame_length: u32) -> Result<u32> {
    let bits = (OFDM_SERVICE_BITS + OFDM_TAIL_BITS) as u64 + 8 * frame_length as u64;
    // 4 us symbols carry (rate / 2) * 4 bits
    let symbols = ceil_div(bits, rate * 2);
    to_micros(
        OFDM_PREAMBLE_US as u64 + symbols * OFDM_SYMBOL_US as u64,
        frame_length,
    )
}

fn ht_preamble(info: &Info11n, mcs_index: usize, stbc_streams: u32) -> Result<u32> {
    let base = if info.greenfield == Some(true) {
        HT_GREENFIELD_PREAMBLE_US
    } else {
        HT_MIXED_PREAMBLE_US
    };
    let ness = info.ness.unwrap_or(0) as usize;
    let nsts = tables::ht_streams(mcs_index)? as usize + stbc_streams as usize;

    let ltf = tables::ht_dltf(nsts)? as u32 + tables::ht_eltf(ness)? as u32;
    Ok(base + 4 * ltf)
}

fn ht_data_field(
    info: &Info11n,
    mcs_index: usize,
    stbc_streams: u32,
    frame_length: u32,
    in_aggregate: bool,
) -> Result<u32> {
    let mut bits = 8 * frame_length as u64;
    if !in_aggregate {
        // A-MPDU subframes carry no service field or tail bits of their own.
        bits += 16 + tables::ht_nes(mcs_index)? as u64 * 6;
    }

    let m_stbc = if stbc_streams > 0 { 2 } else { 1 };
    let mut bits_per_symbol = tables::ht_dbps(mcs_index)? as u64;
    if info.bandwidth.map_or(false, |bw| bw.is_40mhz()) {
        bits_per_symbol *= 2;
    }

    let symbols = ceil_div(bits, bits_per_symbol * m_stbc) * m_stbc;
    let symbol_tenths = if info.short_gi == Some(true) { 36 } else { 40 };
    to_micros((symbols * symbol_tenths + 5) / 10, frame_length)
}

fn ht_duration(
    info: &Info11n,
    frame_length: u32,
    in_aggregate: bool,
    first_of_ppdu: bool,
) -> Result<u32> {
    let mcs_index = info.mcs_index.ok_or(Error::MissingField("MCS index"))? as usize;
    let stbc_streams = info.stbc_streams.unwrap_or(0) as u32;

    let preamble = if first_of_ppdu {
        ht_preamble(info, mcs_index, stbc_streams)?
    } else {
        0
    };
    let data = ht_data_field(info, mcs_index, stbc_streams, frame_length, in_aggregate)?;

    if let Ok(rate) = tables::ht_rate_mbps(
        mcs_index,
        info.bandwidth.map_or(false, |bw| bw.is_40mhz()),
        info.short_gi == Some(true),
    ) {
        debug!(
            "HT mcs {} at {:.1} Mb/s: preamble {}us, data {}us",
            mcs_index, rate, preamble, data
        );
    }
    preamble
        .checked_add(data)
        .ok_or(Error::DurationOverflow { frame_length })
}

/// Duration of one frame in microseconds.
///
/// `frame_length` includes the FCS. `in_aggregate` drops the per-PPDU service
/// and tail bits; `first_of_ppdu` adds the HT preamble, which later subframes
/// of the same A-MPDU share.
pub fn calculate(
    phy: &PhyDescriptor,
    frame_length: u32,
    in_aggregate: bool,
    first_of_ppdu: bool,
) -> Result<u32> {
    match &phy.phy {
        PhyInfo::B(info) => dsss_duration(info.short_preamble, legacy_rate(phy), frame_length),
        PhyInfo::A(_) | PhyInfo::G(_) => ofdm_duration(legacy_rate(phy), frame_length),
        PhyInfo::N(info) => ht_duration(info, frame_length, in_aggregate, first_of_ppdu),
        other => Err(Error::UnsupportedPhy(other.mode())),
    }
}

/// Like [`calculate`], but any failure contributes zero airtime.
pub fn duration_us(
    phy: &PhyDescriptor,
    frame_length: u32,
    in_aggregate: bool,
    first_of_ppdu: bool,
) -> u32 {
    match calculate(phy, frame_length, in_aggregate, first_of_ppdu) {
        Ok(duration) => {
            debug!(
                "{} frame of {} bytes (aggregate {}, first {}): {}us",
                phy.mode(),
                frame_length,
                in_aggregate,
                first_of_ppdu,
                duration
            );
            duration
        }
        Err(e) => {
            debug!("{} frame of {} bytes counts 0us: {}", phy.mode(), frame_length, e);
            0
        }
    }
}
