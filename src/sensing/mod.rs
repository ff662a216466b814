pub mod driver;
pub mod drivers;
pub mod platform;
mod registry;

pub use driver::{
    DriverContext, DriverCore, DriverDescriptor, DriverKind, RuntimeState, SensorDriver,
    Subscription,
};
pub use drivers::{standard_drivers, PlatformAdapters};
pub use registry::DriverRegistry;
