//! Scan categories and their static frequency tables.
//!
//! The set of categories is closed. Each variant carries the key used for it in the
//! settings file and in the exported JSON, its fixed list of frequencies and the
//! labels attached to messages detected on it.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Returned when a string does not name a known scan category.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("unknown scan category '{0}'")]
pub struct UnknownCategory(pub String);

// Defines the enum from `Variant => "key"` mappings, plus `Display`, `FromStr` and `ALL`.
macro_rules! define_enum_with_str {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $str:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $str)]
                $variant,
            )*
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// Key of this variant in settings files and exported JSON.
            #[must_use]
            pub const fn key(self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $name {
            type Err = UnknownCategory;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($str => Ok($name::$variant),)*
                    other => Err(UnknownCategory(other.to_string())),
                }
            }
        }
    };
}

define_enum_with_str! {
    /// A class of traffic being monitored, each with its own fixed frequency list.
    ///
    /// Declaration order is the order in which enabled categories are concatenated
    /// into a worker's active rotation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum ScanCategory {
        /// HF Global Communications System voice traffic (upper sideband).
        PrimaryVoice => "hfgcs",
        /// JS8 keyboard-to-keyboard digital text.
        DigitalText => "js8",
        /// Mode S / ADS-B aircraft surveillance.
        Adsb => "adsb",
    }
}

const PRIMARY_VOICE_HZ: &[u32] = &[4724000, 6739000, 8992000, 11175000, 13200000, 15016000];
const DIGITAL_TEXT_HZ: &[u32] = &[7078000, 14078000];
const ADSB_HZ: &[u32] = &[1090000000];

impl ScanCategory {
    /// The ordered frequencies (Hz) visited for this category.
    #[must_use]
    pub const fn frequencies(self) -> &'static [u32] {
        match self {
            Self::PrimaryVoice => PRIMARY_VOICE_HZ,
            Self::DigitalText => DIGITAL_TEXT_HZ,
            Self::Adsb => ADSB_HZ,
        }
    }

    /// Demodulation mode recorded with messages from this category.
    #[must_use]
    pub const fn mode(self) -> &'static str {
        match self {
            Self::PrimaryVoice => "USB",
            Self::DigitalText => "JS8",
            Self::Adsb => "ADSB",
        }
    }

    /// Human readable message type shown on the dashboard.
    #[must_use]
    pub const fn message_type(self) -> &'static str {
        match self {
            Self::PrimaryVoice => "HFGCS Voice",
            Self::DigitalText => "S2 GhostNet",
            Self::Adsb => "ADS-B Position",
        }
    }
}
