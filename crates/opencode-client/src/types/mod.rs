pub mod lenient;
pub mod message;
pub mod part;
pub mod project;
pub mod provider;
pub mod session;

pub use message::{Message, MessageInfo, MessageTime, ModelRef, Role};
pub use part::{Part, PartKind, PartTime, ToolStatus};
pub use project::{Commands, Health, Icon, PathInfo, Project, ProjectTime};
pub use provider::{
    CacheCost, Capabilities, Cost, Limit, MediaSupport, Modalities, Model, ModelApi,
    ModelSelection, ProviderInfo, ProvidersResponse,
};
pub use session::{
    DiffHunk, DiffLine, FileDiff, PermissionRule, RevertInfo, Session, SessionSummary,
    SessionTime, Share,
};
