pub mod api;
pub mod poller;
pub mod render;
pub mod review;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;
