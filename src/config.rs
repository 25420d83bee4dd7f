use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Upper bound on message content length, in characters.
    pub max_message_len: usize,
    pub max_group_name_len: usize,
    pub max_group_description_len: usize,
    /// Default page size for history and conversation listing.
    pub history_page_size: usize,
    pub search_result_limit: usize,
    /// Attempts per store call before a transient failure is surfaced.
    pub store_retry_attempts: u32,
    /// Static bearer-token table for the dev identity provider,
    /// `CHAT_DEV_TOKENS=token1:uuid1,token2:uuid2`.
    pub dev_tokens: HashMap<String, Uuid>,
}

impl Config {
    fn parse_dev_tokens(value: &str) -> HashMap<String, Uuid> {
        value
            .split(',')
            .filter_map(|pair| {
                let (token, id) = pair.trim().split_once(':')?;
                let id = Uuid::parse_str(id.trim()).ok()?;
                Some((token.trim().to_string(), id))
            })
            .collect()
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let max_message_len = env::var("CHAT_MAX_MESSAGE_LEN")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4096);
        let history_page_size = env::var("CHAT_HISTORY_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);
        let store_retry_attempts = env::var("CHAT_STORE_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let dev_tokens = env::var("CHAT_DEV_TOKENS")
            .map(|v| Self::parse_dev_tokens(&v))
            .unwrap_or_default();

        if max_message_len == 0 {
            return Err(crate::error::AppError::Config(
                "CHAT_MAX_MESSAGE_LEN must be positive".into(),
            ));
        }
        if store_retry_attempts == 0 {
            return Err(crate::error::AppError::Config(
                "CHAT_STORE_RETRY_ATTEMPTS must be positive".into(),
            ));
        }

        Ok(Self {
            port,
            max_message_len,
            max_group_name_len: 255,
            max_group_description_len: 1000,
            history_page_size,
            search_result_limit: 100,
            store_retry_attempts,
            dev_tokens,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            max_message_len: 4096,
            max_group_name_len: 255,
            max_group_description_len: 1000,
            history_page_size: 50,
            search_result_limit: 100,
            store_retry_attempts: 3,
            dev_tokens: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_tokens_parse_pairs_and_skip_garbage() {
        let id = Uuid::new_v4();
        let parsed =
            Config::parse_dev_tokens(&format!("alice:{id}, broken, other:not-a-uuid"));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("alice"), Some(&id));
    }
}
