mod temp;
pub use temp::*;

mod ports;
pub use ports::*;

#[cfg(feature = "adb")]
mod adb;
#[cfg(feature = "adb")]
pub use adb::*;
