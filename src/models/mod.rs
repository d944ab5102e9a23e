pub mod channel;
pub mod log;
pub mod notification;
pub mod response;
pub mod template;
