//! Airtime estimation for 802.11 captures.
//!
//! Every frame is read through its radiotap header, classified by PHY, timed
//! with the matching 802.11 duration model, and added to a running total.
//! A-MPDU subframes are recognised from the TSF pattern of consecutive frames,
//! and the first subframe of each aggregate is recounted once the second one
//! arrives.

pub mod accumulator;
pub mod aggregate;
pub mod capture;
pub mod duration;
pub mod error;
pub mod phy;
pub mod radiotap;
pub mod rawsocks;
pub mod session;
pub mod status;
pub mod tables;
pub mod util;

pub use error::{Error, Result};
pub use session::{AirtimeSession, Frame, FrameReport, Summary};
