pub mod api;
pub mod countdown;
pub mod session;

pub use api::{ChatApi, HttpApi, LocalApi};
pub use countdown::ResponseWindow;
pub use session::{ChatSession, ThreadEntry};
