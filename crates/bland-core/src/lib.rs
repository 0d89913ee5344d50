pub mod error;
pub mod link;
pub mod observer;
pub mod phase;
pub mod protocol;
pub mod reconnect;
pub mod resync;
pub mod schedule;
pub mod session;
pub mod timer;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;
