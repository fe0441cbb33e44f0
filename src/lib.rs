pub mod captions;
pub mod clients;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod music;
pub mod output;
pub mod pipeline;
pub mod research;
pub mod retry;
pub mod state;
pub mod topics;
