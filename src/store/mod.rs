mod progress;
mod uuid_map;

pub use progress::{MAX_ERROR_CHARS, ProgressStore, parse_flag, render_flag};
pub use uuid_map::{UuidMap, UuidMapWriter, mapping_age};
