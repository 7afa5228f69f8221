//! 通知存储 - 去重、有序、有上限的本地视图
//!
//! - 按 `id` 去重，重复插入是空操作
//! - 最新的在前，超过上限时淘汰最旧的
//! - 维护未读计数，始终等于存储中未读记录的数量
//! - 乐观更新返回撤销令牌，远端失败时回滚

use super::record::NotificationRecord;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// 插入结果
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// 已插入；若超出上限则带上被淘汰的记录
    Inserted { evicted: Option<NotificationRecord> },
    /// `id` 已存在，忽略
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }
}

/// 乐观更新的撤销令牌
///
/// `rollback` 消费令牌内容后令牌变为 `Spent`，再次回滚是空操作。
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UndoToken {
    /// 目标不存在，无需回滚
    Noop,
    /// 标记已读前的状态
    Read {
        id: String,
        was_read: bool,
        prior_unread: usize,
    },
    /// 被删除的记录及其原位置
    Delete {
        record: NotificationRecord,
        index: usize,
        prior_unread: usize,
    },
    /// 已回滚
    #[default]
    Spent,
}

impl UndoToken {
    /// 乐观更新是否实际改变了存储
    pub fn is_noop(&self) -> bool {
        matches!(self, UndoToken::Noop | UndoToken::Spent)
    }
}

/// 存储快照（提供给观察者）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub user_id: Option<String>,
    pub records: Vec<NotificationRecord>,
    pub unread_count: usize,
}

/// 通知存储
#[derive(Debug)]
pub struct NotificationStore {
    /// 最新在前
    records: VecDeque<NotificationRecord>,
    ids: HashSet<String>,
    unread: usize,
    capacity: usize,
}

impl NotificationStore {
    /// 创建存储，`capacity` 至少为 1
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            ids: HashSet::new(),
            unread: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// 最新在前
    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.records.iter()
    }

    pub fn snapshot(&self, user_id: Option<&str>) -> StoreSnapshot {
        StoreSnapshot {
            user_id: user_id.map(str::to_string),
            records: self.records.iter().cloned().collect(),
            unread_count: self.unread,
        }
    }

    /// 插入记录（幂等）
    pub fn insert(&mut self, record: NotificationRecord) -> InsertOutcome {
        if self.ids.contains(&record.id) {
            debug!(id = %record.id, "Duplicate notification ignored");
            return InsertOutcome::Duplicate;
        }

        if !record.is_read {
            self.unread += 1;
        }
        self.ids.insert(record.id.clone());
        self.records.push_front(record);

        let evicted = if self.records.len() > self.capacity {
            self.records.pop_back().map(|old| {
                self.ids.remove(&old.id);
                if !old.is_read {
                    self.decrement_unread();
                }
                debug!(id = %old.id, capacity = self.capacity, "Evicted oldest notification");
                old
            })
        } else {
            None
        };

        InsertOutcome::Inserted { evicted }
    }

    /// 用一组记录替换全部内容：按 `id` 去重，按创建时间倒序，截断到上限
    pub fn replace_all(&mut self, mut records: Vec<NotificationRecord>) {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        self.records.clear();
        self.ids.clear();
        for record in records {
            if self.records.len() >= self.capacity {
                break;
            }
            if self.ids.insert(record.id.clone()) {
                self.records.push_back(record);
            }
        }
        self.recount_unread();
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.unread = 0;
    }

    /// 乐观标记已读
    pub fn apply_optimistic_read(&mut self, id: &str) -> UndoToken {
        let prior_unread = self.unread;
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return UndoToken::Noop;
        };

        let was_read = record.is_read;
        record.is_read = true;
        if !was_read {
            self.decrement_unread();
        }

        UndoToken::Read {
            id: id.to_string(),
            was_read,
            prior_unread,
        }
    }

    /// 乐观删除
    pub fn apply_optimistic_delete(&mut self, id: &str) -> UndoToken {
        let prior_unread = self.unread;
        let Some(index) = self.records.iter().position(|r| r.id == id) else {
            return UndoToken::Noop;
        };
        let Some(record) = self.records.remove(index) else {
            return UndoToken::Noop;
        };

        self.ids.remove(&record.id);
        if !record.is_read {
            self.decrement_unread();
        }

        UndoToken::Delete {
            record,
            index,
            prior_unread,
        }
    }

    /// 回滚乐观更新，返回是否实际改变了存储
    ///
    /// 令牌被消费，第二次调用是空操作。
    pub fn rollback(&mut self, token: &mut UndoToken) -> bool {
        match std::mem::take(token) {
            UndoToken::Noop | UndoToken::Spent => false,
            UndoToken::Read {
                id,
                was_read,
                prior_unread,
            } => {
                let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
                    // 期间被删除或淘汰，没有可恢复的对象
                    return false;
                };
                record.is_read = was_read;
                self.recount_unread();
                if self.unread != prior_unread {
                    debug!(id = %id, prior_unread, unread = self.unread, "Unread count changed since optimistic read");
                }
                true
            }
            UndoToken::Delete {
                record,
                index,
                prior_unread,
            } => {
                if self.ids.contains(&record.id) {
                    // 期间被重新投递，保留新的
                    return false;
                }
                let index = index.min(self.records.len());
                self.ids.insert(record.id.clone());
                self.records.insert(index, record);
                while self.records.len() > self.capacity {
                    if let Some(old) = self.records.pop_back() {
                        self.ids.remove(&old.id);
                    }
                }
                self.recount_unread();
                if self.unread != prior_unread {
                    debug!(prior_unread, unread = self.unread, "Unread count changed since optimistic delete");
                }
                true
            }
        }
    }

    /// 全部标记已读，返回之前未读的 ID（供调用方同步到远端）
    ///
    /// 批量操作不可单独撤销：远端部分失败时应整体重新加载。
    pub fn mark_all_read(&mut self) -> Vec<String> {
        let unread_ids: Vec<String> = self
            .records
            .iter()
            .filter(|r| !r.is_read)
            .map(|r| r.id.clone())
            .collect();

        for record in self.records.iter_mut() {
            record.is_read = true;
        }
        self.unread = 0;

        unread_ids
    }

    /// 用服务端返回的记录替换本地同 ID 记录（保持位置）
    pub fn replace_record(&mut self, record: NotificationRecord) -> bool {
        let Some(slot) = self.records.iter_mut().find(|r| r.id == record.id) else {
            return false;
        };
        *slot = record;
        self.recount_unread();
        true
    }

    fn decrement_unread(&mut self) {
        match self.unread.checked_sub(1) {
            Some(n) => self.unread = n,
            None => {
                warn!("Unread counter would go negative, recounting");
                self.recount_unread();
            }
        }
    }

    fn recount_unread(&mut self) {
        self.unread = self.records.iter().filter(|r| !r.is_read).count();
    }
}
