pub mod audio;
pub mod classify;
pub mod cli;
pub mod config;
pub mod destination;
pub mod error;
pub mod gdrive;
pub mod global;
pub mod google;
pub mod retry;
pub mod sync;
pub mod token;
pub mod transfer;
pub mod window;
pub mod youtube;
pub mod zoom;

#[cfg(test)]
mod testing;
