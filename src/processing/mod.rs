//! File processing pipeline: upload validation, per-category extraction and workspaces.

mod handlers;
mod service;
pub mod table;
pub mod types;
pub mod workspace;

pub use service::ProcessingService;
pub use table::TableView;
pub use types::{
    FileHandle, FileStatus, LimitNotice, ProcessedFile, ProcessingError, SIGN_IN_MESSAGE, Upload,
    UploadReport,
};
pub use workspace::{Workspace, WorkspaceRegistry};
