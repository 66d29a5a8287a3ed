pub mod map_uuids;
pub mod merge;
pub mod reconcile;
pub mod report;
pub mod upload;
