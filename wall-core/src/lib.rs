pub mod room;
pub mod room_code;
pub mod scoring;

// Re-export main components
pub use room::*;
pub use room_code::*;
pub use scoring::*;
