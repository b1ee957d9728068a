pub mod deletion;
pub mod image_record;
pub mod journal_store;

pub use deletion::delete_record;
pub use image_record::*;
pub use journal_store::*;
