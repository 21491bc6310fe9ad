//! Conventional composite keys used by feature code.

/// Set of known user ids
pub const USER_IDS: &str = "user_ids";

/// Titles of past dialogs
pub const CHAT_HISTORY: &str = "chat_history";

/// Prefix shared by every cache record
pub const CACHE_PREFIX: &str = "cache_";

pub fn chat(user_id: &str) -> String {
    format!("chat_{}", user_id)
}

/// One page of diary entries, pages start at 1.
pub fn diary_page(user_id: &str, page: u32) -> String {
    format!("diary_entries_{}_page{}", user_id, page)
}

pub fn diary_archive(user_id: &str) -> String {
    format!("diary_archive_{}", user_id)
}

pub fn diary_tags(user_id: &str) -> String {
    format!("diary_tags_{}", user_id)
}

pub fn triggers(user_id: &str) -> String {
    format!("triggers_{}", user_id)
}

pub fn cache(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
}

pub fn profile(user_id: &str) -> String {
    format!("profile_{}", user_id)
}

pub fn avatar(user_id: &str) -> String {
    format!("avatar_{}", user_id)
}
