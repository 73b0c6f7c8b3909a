pub mod delivery;
pub mod otp;

pub use delivery::*;
pub use otp::*;
