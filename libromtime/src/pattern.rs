//! Prediction of ROM contents from the test pattern written before a capture.
use serde::Serialize;
use thiserror::Error;

use crate::channel::{ChannelRole, MAX_BIT_INDEX};
use crate::trace::BusSample;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("A {role} bus of {bits} bits is not supported, the maximum is {}", MAX_BIT_INDEX + 1)]
pub struct BusWidthError {
    pub role: ChannelRole,
    pub bits: u32,
}

/// Width of the address and data bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusWidths {
    pub address_bits: u32,
    pub data_bits: u32,
}

impl BusWidths {
    pub fn new(address_bits: u32, data_bits: u32) -> Result<Self, BusWidthError> {
        for (role, bits) in [
            (ChannelRole::AddressBit, address_bits),
            (ChannelRole::DataBit, data_bits),
        ] {
            if bits > MAX_BIT_INDEX + 1 {
                return Err(BusWidthError { role, bits });
            }
        }
        Ok(Self {
            address_bits,
            data_bits,
        })
    }
}

fn mask(bits: u32) -> u64 {
    u64::MAX.checked_shr(64u32.saturating_sub(bits)).unwrap_or(0)
}

/// The ROM image used for access time measurements.
///
/// Every location holds `(address >> 8) ^ address`, truncated to the data bus, so the value
/// expected after driving an address is known without reading the image back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectationModel {
    address_mask: u64,
    data_mask: u64,
}

impl ExpectationModel {
    #[must_use]
    pub fn new(widths: BusWidths) -> Self {
        Self {
            address_mask: mask(widths.address_bits),
            data_mask: mask(widths.data_bits),
        }
    }

    /// Number of distinct addresses, saturating for a full 64 bit bus.
    #[must_use]
    pub fn address_space_size(&self) -> u64 {
        self.address_mask.saturating_add(1)
    }

    /// Data expected on the bus once `address` has been driven.
    #[must_use]
    pub fn predict(&self, address: u64) -> u64 {
        ((address >> 8) ^ address) & self.data_mask
    }

    /// Drop sampled bits beyond the modelled bus widths.
    #[must_use]
    pub fn truncate(&self, sample: BusSample) -> BusSample {
        BusSample {
            address: sample.address & self.address_mask,
            data: sample.data & self.data_mask,
            ..sample
        }
    }

    /// The address following `address`, wrapping at the end of the address space.
    #[must_use]
    pub fn advance(&self, address: u64) -> u64 {
        address.wrapping_add(1) & self.address_mask
    }
}
