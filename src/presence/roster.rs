use crate::models::RosterEntry;

/// 按插入顺序保存的花名册，以用户ID为键
#[derive(Debug, Default, Clone)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&RosterEntry> {
        self.index_of(id).map(|i| &self.entries[i])
    }

    /// 插入或原地更新；返回 true 表示新插入
    pub fn upsert(&mut self, entry: RosterEntry) -> bool {
        match self.index_of(&entry.id) {
            Some(i) => {
                self.entries[i] = entry;
                false
            }
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<RosterEntry> {
        self.index_of(id).map(|i| self.entries.remove(i))
    }

    /// 清空后整体替换；重复ID以最后一次为准
    pub fn replace(&mut self, entries: Vec<RosterEntry>) {
        self.entries.clear();
        for entry in entries {
            self.upsert(entry);
        }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
