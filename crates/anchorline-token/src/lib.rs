//! Bearer credential handling for Anchorline.
//!
//! This crate is the leaf of the client stack. It knows how to read a
//! credential, and nothing about where the credential came from:
//!
//! - **Codec** ([`TokenCodec`], [`decode`]): splits the three-segment
//!   credential, decodes its claims and classifies expiry.
//! - **Claims & identity** ([`Claims`], [`Identity`]): what the
//!   credential says about the signed-in subject.
//! - **Clock** ([`Clock`]): the wall-clock source. Every expiry check
//!   takes `now` explicitly so the codec stays a pure function.
//!
//! # Where it sits
//!
//! ```text
//! Session Manager / Resilient Transport (above)  ← ask "is this still good?"
//!     ↕
//! Token layer (this crate)  ← decode + expiry classification, no I/O
//! ```

mod claims;
mod clock;
mod codec;
mod credential;
mod error;

pub use claims::{Claims, Identity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{DEFAULT_SKEW, TokenCodec, TokenStatus, decode};
pub use credential::Credential;
pub use error::DecodeError;
