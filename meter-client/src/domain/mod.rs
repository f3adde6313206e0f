pub mod meter_directory;
pub mod meter_record;

pub use meter_directory::MeterDirectoryEntry;
pub use meter_record::{MeterDetail, MeterRecord, ParameterEntry, ParameterStatus, ParseStatusError};
