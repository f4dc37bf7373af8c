pub mod application_proxy;
pub mod codec;
pub mod command_session;
pub mod protocol;
pub mod transport;
