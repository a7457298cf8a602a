pub mod db;
pub mod normalize;
pub mod pool;
pub mod read;
pub mod schema;
pub mod vocab;
pub mod write;

pub use db::{Store, StoreOptions};
pub use vocab::VocabCache;
