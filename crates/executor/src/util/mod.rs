pub mod keyed_cache;
pub mod time_source;

pub use keyed_cache::KeyedCache;
pub use time_source::SystemTimeSource;
pub use time_source::TimeSource;
