//! RGB indicator interface.
//!
//! The indicator is a visible side effect of data reception. The hardware
//! driver is external; the dispatcher only needs to take control of it, set a
//! colour, and hand control back.

use rand::Rng;

/// An RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Black (off).
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    /// Create a colour.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Draw a pseudo-random colour.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.gen(), rng.gen(), rng.gen())
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// An RGB indicator owned by the system until the application takes control.
///
/// Called from radio event context, so implementations must not block.
pub trait Indicator: Send + Sync {
    /// Take (`true`) or release (`false`) application control of the indicator.
    fn set_control(&self, enabled: bool);

    /// Set the indicator colour. Only visible while under application control.
    fn set_color(&self, color: Rgb);
}
