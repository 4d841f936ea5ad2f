//! A crate to open URLs and call webhooks when NFC tags are presented to PC/SC readers.
//!
//! The reading pipeline is transport agnostic: anything implementing [`terminal::Terminal`]
//! can be driven, and the `pcsc` feature provides the implementation for real readers.

#[cfg(not(feature = "tracing"))]
#[macro_use]
mod trace {
    macro_rules! debug {
        ($($t: tt)*) => {{
            let _ = format_args!($($t)*);
        }};
    }

    macro_rules! info {
        ($($t: tt)*) => {{
            let _ = format_args!($($t)*);
        }};
    }

    macro_rules! warn {
        ($($t: tt)*) => {{
            let _ = format_args!($($t)*);
        }};
    }

    macro_rules! error {
        ($($t: tt)*) => {{
            let _ = format_args!($($t)*);
        }};
    }
}

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod card;
pub mod config;
pub mod dispatch;
pub mod idle;
pub mod lanes;
pub mod monitor;
pub mod ndef;
pub mod nfc;
pub mod tag;
pub mod tap;
pub mod terminal;
pub mod tlv;

#[cfg(test)]
mod testing;

pub use card::Card;
pub use config::RuntimeConfig;
pub use dispatch::{Action, ActionSink, Dispatcher};
pub use lanes::Lanes;
pub use monitor::Monitor;
pub use tap::{TapResult, Uid};
