pub mod autobackup;
pub mod backup;
pub mod data;
pub mod files;
pub mod folders;
pub mod marks;
pub mod models;
pub mod questions;
pub mod responses;
pub mod router;
pub mod state;
pub mod stats;
pub mod storage;
pub mod subjects;
pub mod systems;
pub mod uploads;

pub use responses::{ApiError, ApiMessage, json_error};
pub use state::AppState;
