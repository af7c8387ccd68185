//! 文档偏好模块
//!
//! 负责文件树上的包含/排除判定、文件内符号排除、三步向导门控，
//! 以及与远端偏好文档的乐观写入和服务端为准的合并。
//!
//! 所有路径在存储和比较前都经过 [`path::normalize`]。

pub mod inclusion;
pub mod path;
pub mod plan;
pub mod session;
pub mod symbols;
pub mod tree;
pub mod types;
pub mod wizard;

pub use inclusion::{DirectoryExclusion, DirectoryExclusionUpdate, ExclusionPresets, InclusionResolver};
pub use plan::{AllItemCounts, FunctionClassCounts, ItemCount};
pub use session::{PreferenceSession, SessionError, SessionPhase, SessionSnapshot, StepPayload};
pub use symbols::{PerFileExclusionEntry, SymbolExclusionStore, SymbolKind};
pub use tree::FileTreeNode;
pub(crate) use tree::deserialize_opt_id;
pub use types::{
    Credentials, DocFormat, DocumentationPlan, FileRecord, PreferenceDocument, ProjectSettings,
};
pub use wizard::{StepStatus, WizardStep};
