mod driver_settings;
mod readings;

pub use readings::ReadingSink;
