mod auth;
mod client;
mod model;

pub use auth::AuthResult;
pub use client::{SESSION_EXPIRED, StagingClient, StagingError};
pub use model::{
    Item, ItemKind, ItemPage, Job, JobLink, JobStatus, UploadPart, UploadSession,
};
