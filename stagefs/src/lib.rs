pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod job;
pub mod paging;
pub mod storage;
pub mod transfer;
