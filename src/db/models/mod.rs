pub mod alert;

pub use alert::{AlertCounts, AlertRecord, AlertRecordStatus, DeliveryStatus};
