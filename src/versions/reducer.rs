//! 缓存记录的纯函数更新
//!
//! 每个函数接收当前记录，返回下一条记录或删除标记，不涉及存储本身。
//! `VersionCache` 负责在单个临界区内应用这些结果。

use crate::versions::registry::{
    merge_metadata, merge_version_collections, normalize_versions, resolve_active_version_id,
    ActiveVersionStrategy, ResolutionContext,
};
use crate::versions::types::{CacheRecord, SetVersionsOptions, VersionMetadata};
use serde_json::Value;

/// 记录更新结果
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    /// 写入新记录
    Write(CacheRecord),
    /// 删除整条记录
    Delete,
    /// 无变化
    Unchanged,
}

/// 写入（合并）版本
///
/// 规范化后为空时删除整条记录
pub fn set_versions(
    current: Option<&CacheRecord>,
    raw_versions: &[Value],
    options: &SetVersionsOptions,
    strategy: &dyn ActiveVersionStrategy,
) -> RecordUpdate {
    let incoming = normalize_versions(raw_versions);
    if incoming.is_empty() {
        return delete_if_present(current);
    }

    let empty_metadata = VersionMetadata::default();
    let (existing_versions, existing_metadata, current_active) = match current {
        Some(record) => (
            record.versions.as_slice(),
            &record.metadata,
            record.active_version_id.as_deref(),
        ),
        None => (&[][..], &empty_metadata, None),
    };

    let versions = merge_version_collections(existing_versions, &incoming);
    let metadata = merge_metadata(existing_metadata, options.metadata.as_ref());
    let ctx = ResolutionContext::new(&versions, &metadata)
        .preferred(options.active_version_id.as_deref())
        .current(current_active);
    let active_version_id = resolve_active_version_id(strategy, &ctx);

    RecordUpdate::Write(CacheRecord {
        versions,
        metadata,
        active_version_id,
    })
}

/// 切换活跃版本
///
/// 指定的 id 不存在时按剩余优先级重新解析，不会接受无效 id
pub fn set_active_version(
    current: Option<&CacheRecord>,
    version_id: &str,
    strategy: &dyn ActiveVersionStrategy,
) -> RecordUpdate {
    let Some(record) = current else {
        return RecordUpdate::Unchanged;
    };

    let ctx = ResolutionContext::new(&record.versions, &record.metadata)
        .preferred(Some(version_id))
        .current(record.active_version_id.as_deref());
    let active_version_id = resolve_active_version_id(strategy, &ctx);

    if active_version_id == record.active_version_id {
        return RecordUpdate::Unchanged;
    }

    RecordUpdate::Write(CacheRecord {
        active_version_id,
        ..record.clone()
    })
}

/// 删除版本
///
/// `version_ids` 为 `None` 时删除整条记录；删除后为空同样删除记录。
/// 被删除的版本包含当前活跃版本时重新解析，否则保持活跃 id 不变。
pub fn remove_versions(
    current: Option<&CacheRecord>,
    version_ids: Option<&[String]>,
    strategy: &dyn ActiveVersionStrategy,
) -> RecordUpdate {
    let Some(record) = current else {
        return RecordUpdate::Unchanged;
    };
    let Some(version_ids) = version_ids else {
        return RecordUpdate::Delete;
    };

    let versions: Vec<_> = record
        .versions
        .iter()
        .filter(|v| !version_ids.contains(&v.id))
        .cloned()
        .collect();

    if versions.len() == record.versions.len() {
        return RecordUpdate::Unchanged;
    }
    if versions.is_empty() {
        return RecordUpdate::Delete;
    }

    let active_removed = record
        .active_version_id
        .as_ref()
        .map_or(false, |id| version_ids.contains(id));

    let active_version_id = if active_removed {
        // 当前活跃 id 已失效，从元数据提示开始重新解析
        let ctx = ResolutionContext::new(&versions, &record.metadata);
        resolve_active_version_id(strategy, &ctx)
    } else {
        record.active_version_id.clone()
    };

    RecordUpdate::Write(CacheRecord {
        versions,
        metadata: record.metadata.clone(),
        active_version_id,
    })
}

fn delete_if_present(current: Option<&CacheRecord>) -> RecordUpdate {
    match current {
        Some(_) => RecordUpdate::Delete,
        None => RecordUpdate::Unchanged,
    }
}
