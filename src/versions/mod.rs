//! 词条版本层
//!
//! 管理同一词条的多个版本（重新查询、编辑），并决定界面默认展示哪个版本。
//!
//! # 模块结构
//!
//! - `types`: 数据模型 (`WordVersion`, `VersionMetadata`, `CacheRecord`)
//! - `key`: 缓存键约定
//! - `registry`: 规范化、合并与活跃版本解析（纯函数）
//! - `reducer`: 记录级别的纯函数更新
//! - `store`: 以 term-key 为键的缓存

pub mod key;
pub mod reducer;
pub mod registry;
pub mod store;
pub mod types;

pub use key::{term_key, Flavor};
pub use reducer::RecordUpdate;
pub use registry::{
    latest_by_created_at, merge_metadata, merge_version_collections, normalize_version,
    normalize_versions, parse_timestamp, resolve_active_version_id, ActiveVersionStrategy,
    LatestTimestampStrategy, ResolutionContext,
};
pub use store::{CacheEvent, VersionCache};
pub use types::{CacheRecord, SetVersionsOptions, VersionMetadata, WordVersion};
