pub mod driver_setting;
pub mod reading;

pub use driver_setting::DriverSetting;
pub use reading::{NewReading, Reading};
