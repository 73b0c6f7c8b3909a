pub mod engine;
pub mod queue;
pub mod realtime;
pub mod report;

pub use queue::*;
pub use realtime::*;
pub use report::*;
