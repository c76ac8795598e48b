/// 用户记录哈希键前缀
const USER_RECORD_PREFIX: &str = "users:";

/// 所有用户ID的集合
pub const USER_INDEX_KEY: &str = "index:users";

/// 用户记录变化的发布频道
pub const USER_CHANGES_CHANNEL: &str = "changes:users";

/// 生成用户记录键
pub fn user_record_key(user_id: &str) -> String {
    format!("{}{}", USER_RECORD_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_do_not_collide_with_index() {
        assert_eq!(user_record_key("u1"), "users:u1");
        assert_ne!(user_record_key("index"), USER_INDEX_KEY);
    }
}
