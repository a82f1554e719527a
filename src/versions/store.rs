//! 词条版本缓存
//!
//! 以 term-key 为键的内存缓存。每次变更都在同一个写锁内完成
//! “读取当前记录 → 计算下一条记录 → 写回”，调用方不会观察到半更新的记录。
//!
//! 记录以 `Arc` 存放，变更总是替换为新的 `Arc`，
//! 界面层可以用 `Arc::ptr_eq` 判断记录是否变化。

use crate::versions::reducer::{self, RecordUpdate};
use crate::versions::registry::{ActiveVersionStrategy, LatestTimestampStrategy};
use crate::versions::types::{CacheRecord, SetVersionsOptions, WordVersion};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// 变更通知通道容量
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 缓存变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// 记录被创建或更新
    Updated { key: String },
    /// 记录被删除
    Removed { key: String },
    /// 缓存被清空
    Cleared,
}

/// 词条版本缓存
///
/// 每个会话创建一个实例并以引用（或 `Arc`）传递，登出/切换用户时调用 `clear`。
pub struct VersionCache {
    records: RwLock<HashMap<String, Arc<CacheRecord>>>,
    strategy: Arc<dyn ActiveVersionStrategy>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionCache {
    /// 使用默认的最新时间戳策略创建缓存
    pub fn new() -> Self {
        Self::with_strategy(Arc::new(LatestTimestampStrategy))
    }

    /// 使用自定义活跃版本策略创建缓存
    pub fn with_strategy(strategy: Arc<dyn ActiveVersionStrategy>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            strategy,
            events,
        }
    }

    /// 订阅变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// 写入（合并）版本
    ///
    /// 规范化后没有有效版本时删除整条记录
    pub fn set_versions(&self, term_key: &str, versions: &[Value], options: SetVersionsOptions) {
        self.update(term_key, |current, strategy| {
            reducer::set_versions(current, versions, &options, strategy)
        });
    }

    /// 写入已规范化的版本
    pub fn set_word_versions(
        &self,
        term_key: &str,
        versions: &[WordVersion],
        options: SetVersionsOptions,
    ) {
        let raw: Vec<Value> = versions.iter().map(WordVersion::to_value).collect();
        self.set_versions(term_key, &raw, options);
    }

    /// 切换活跃版本
    pub fn set_active_version(&self, term_key: &str, version_id: &str) {
        self.update(term_key, |current, strategy| {
            reducer::set_active_version(current, version_id, strategy)
        });
    }

    /// 删除版本，`version_ids` 为 `None` 时删除整条记录
    pub fn remove_versions(&self, term_key: &str, version_ids: Option<&[String]>) {
        self.update(term_key, |current, strategy| {
            reducer::remove_versions(current, version_ids, strategy)
        });
    }

    /// 获取指定版本，未指定时返回活跃版本
    pub fn get_entry(&self, term_key: &str, version_id: Option<&str>) -> Option<WordVersion> {
        let records = self.records.read();
        let record = records.get(term_key)?;
        let version = match version_id {
            Some(id) => record.version(id),
            None => record.active_version(),
        };
        version.cloned()
    }

    /// 获取整条记录
    pub fn get_record(&self, term_key: &str) -> Option<Arc<CacheRecord>> {
        self.records.read().get(term_key).cloned()
    }

    /// 清空缓存
    pub fn clear(&self) {
        let removed = {
            let mut records = self.records.write();
            let count = records.len();
            records.clear();
            count
        };
        debug!("[VersionCache] 清空缓存, 共 {} 条记录", removed);
        let _ = self.events.send(CacheEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains_key(&self, term_key: &str) -> bool {
        self.records.read().contains_key(term_key)
    }

    /// 所有缓存键（顺序不保证）
    pub fn keys(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// 在写锁内应用一次记录更新
    fn update<F>(&self, term_key: &str, reduce: F)
    where
        F: FnOnce(Option<&CacheRecord>, &dyn ActiveVersionStrategy) -> RecordUpdate,
    {
        let event = {
            let mut records = self.records.write();
            let current = records.get(term_key).map(Arc::as_ref);
            match reduce(current, self.strategy.as_ref()) {
                RecordUpdate::Write(record) => {
                    debug!(
                        "[VersionCache] 更新记录 {}: {} 个版本, 活跃版本 {:?}",
                        term_key,
                        record.versions.len(),
                        record.active_version_id
                    );
                    records.insert(term_key.to_string(), Arc::new(record));
                    CacheEvent::Updated {
                        key: term_key.to_string(),
                    }
                }
                RecordUpdate::Delete => {
                    records.remove(term_key);
                    debug!("[VersionCache] 删除记录 {}", term_key);
                    CacheEvent::Removed {
                        key: term_key.to_string(),
                    }
                }
                RecordUpdate::Unchanged => return,
            }
        };

        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }
}
