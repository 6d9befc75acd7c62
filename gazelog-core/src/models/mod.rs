pub mod sample;
pub mod session;

pub use sample::Sample;
pub use session::{Session, SessionDetail};
