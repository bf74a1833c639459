pub mod audit;
pub mod health;
pub mod message;
pub mod notification;
pub mod profile;
pub mod response;
pub mod retry;
pub mod status;
pub mod task;
