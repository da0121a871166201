pub mod access;
pub mod submissions;
