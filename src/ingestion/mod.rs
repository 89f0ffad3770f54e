pub mod user_stream;

pub use user_stream::{run_user_stream, StreamConfig, StreamStatus};
