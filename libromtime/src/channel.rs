//! Column roles of a capture and reconstruction of bus values from sampled bits.
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::config::HeaderConfig;

/// Highest bit index a channel may declare, so that bus values fit in a `u64`.
pub const MAX_BIT_INDEX: u32 = 63;

#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    #[display("address")]
    AddressBit,
    #[display("data")]
    DataBit,
    #[display("ignored")]
    Ignored,
}

/// Role of one sample column, built once from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub name: String,
    pub role: ChannelRole,
    pub bit_index: u32,
}

impl ChannelDescriptor {
    /// Classify a header name like `A3` or `D0`.
    ///
    /// A name belongs to a role when it is that role's marker followed only by digits. When both
    /// markers qualify the longer one wins, anything else is ignored.
    #[must_use]
    pub fn from_name(name: &str, markers: &HeaderConfig) -> Self {
        let name = name.trim();
        let classified = [
            (ChannelRole::AddressBit, markers.address_marker.as_str()),
            (ChannelRole::DataBit, markers.data_marker.as_str()),
        ]
        .into_iter()
        .filter(|(_, marker)| !marker.is_empty())
        .filter_map(|(role, marker)| {
            let bit_index = parse_bit_index(name.strip_prefix(marker)?)?;
            Some((marker.len(), role, bit_index))
        })
        .max_by_key(|(marker_len, ..)| *marker_len);

        match classified {
            Some((_, role, bit_index)) => Self {
                name: name.to_string(),
                role,
                bit_index,
            },
            None => Self {
                name: name.to_string(),
                role: ChannelRole::Ignored,
                bit_index: 0,
            },
        }
    }

    #[must_use]
    pub fn weight(&self) -> u64 {
        match self.role {
            ChannelRole::Ignored => 0,
            _ => 1u64 << self.bit_index,
        }
    }
}

fn parse_bit_index(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelMapError {
    #[error(
        "column '{name}' declares {role} bit {bit_index}, the highest supported bit is {max}",
        max = MAX_BIT_INDEX
    )]
    BitOutOfRange {
        name: String,
        role: ChannelRole,
        bit_index: u32,
    },
    #[error("{role} bit {bit_index} is declared by both '{first}' and '{second}'")]
    DuplicateBit {
        role: ChannelRole,
        bit_index: u32,
        first: String,
        second: String,
    },
    #[error("the {role} marker must not be empty")]
    EmptyMarker { role: ChannelRole },
    #[error("address and data columns cannot share the marker '{marker}'")]
    SharedMarker { marker: String },
}

/// All sample columns of a capture (the time column excluded), in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    channels: Vec<ChannelDescriptor>,
}

impl ChannelMap {
    /// Check that the role markers can tell address and data columns apart.
    pub fn check_markers(markers: &HeaderConfig) -> Result<(), ChannelMapError> {
        for (role, marker) in [
            (ChannelRole::AddressBit, &markers.address_marker),
            (ChannelRole::DataBit, &markers.data_marker),
        ] {
            if marker.is_empty() {
                return Err(ChannelMapError::EmptyMarker { role });
            }
        }
        if markers.address_marker == markers.data_marker {
            return Err(ChannelMapError::SharedMarker {
                marker: markers.address_marker.clone(),
            });
        }
        Ok(())
    }

    /// Build the map from the header names following the time column.
    pub fn from_header<'a, I>(names: I, markers: &HeaderConfig) -> Result<Self, ChannelMapError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::check_markers(markers)?;
        let channels = names
            .into_iter()
            .map(|name| ChannelDescriptor::from_name(name, markers))
            .collect::<Vec<_>>();

        for (idx, channel) in channels.iter().enumerate() {
            if channel.role == ChannelRole::Ignored {
                tracing::debug!("Ignoring capture column '{}'", channel.name);
                continue;
            }
            if channel.bit_index > MAX_BIT_INDEX {
                return Err(ChannelMapError::BitOutOfRange {
                    name: channel.name.clone(),
                    role: channel.role,
                    bit_index: channel.bit_index,
                });
            }
            if let Some(previous) = channels[..idx]
                .iter()
                .find(|other| other.role == channel.role && other.bit_index == channel.bit_index)
            {
                return Err(ChannelMapError::DuplicateBit {
                    role: channel.role,
                    bit_index: channel.bit_index,
                    first: previous.name.clone(),
                    second: channel.name.clone(),
                });
            }
        }

        Ok(Self { channels })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.channels.iter()
    }

    /// Column position (excluding the time column) of the channel with this name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.channels.iter().position(|channel| channel.name == name)
    }

    /// Number of bits needed to hold every declared bit of `role`.
    #[must_use]
    pub fn declared_bits(&self, role: ChannelRole) -> u32 {
        self.channels
            .iter()
            .filter(|channel| channel.role == role)
            .map(|channel| channel.bit_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Sum the weights of all high channels into `(address, data)`.
    #[must_use]
    pub fn reconstruct(&self, levels: &[bool]) -> (u64, u64) {
        self.channels
            .iter()
            .zip(levels)
            .filter(|(_, high)| **high)
            .fold((0, 0), |(address, data), (channel, _)| match channel.role {
                ChannelRole::AddressBit => (address | channel.weight(), data),
                ChannelRole::DataBit => (address, data | channel.weight()),
                ChannelRole::Ignored => (address, data),
            })
    }
}
