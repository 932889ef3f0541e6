pub mod alerts;
pub mod sessions;
pub mod ws;
