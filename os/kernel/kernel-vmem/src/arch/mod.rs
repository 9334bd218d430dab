//! Architecture translators.
//!
//! All of them are always compiled; the cargo features only pick which one
//! [`Target`] names.

pub mod armv7;
pub mod flat;
pub mod sv39;

pub use armv7::Armv7;
pub use flat::Flat;
pub use sv39::Sv39;

/// Translator of the configured target.
#[cfg(feature = "flat")]
pub type Target = Flat;

/// Translator of the configured target.
#[cfg(all(feature = "armv7", not(feature = "flat")))]
pub type Target = Armv7;

/// Translator of the configured target.
#[cfg(not(any(feature = "armv7", feature = "flat")))]
pub type Target = Sv39;
