//! 缓存键
//!
//! 缓存本身把 term-key 当作不透明字符串，这里只提供调用方拼接键的约定格式：
//! `{language}:{flavor}:{term}`

use serde::{Deserialize, Serialize};
use std::fmt;

/// 词典模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// 双语释义
    Bilingual,
    /// 单语释义
    Monolingual,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Bilingual => "bilingual",
            Flavor::Monolingual => "monolingual",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 构造缓存键
pub fn term_key(language: &str, flavor: Flavor, term: &str) -> String {
    format!("{language}:{flavor}:{term}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_key_format() {
        assert_eq!(term_key("en", Flavor::Bilingual, "run"), "en:bilingual:run");
        assert_eq!(
            term_key("ja", Flavor::Monolingual, "走る"),
            "ja:monolingual:走る"
        );
    }

    #[test]
    fn test_flavor_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Flavor::Monolingual).unwrap(),
            "\"monolingual\""
        );
        let flavor: Flavor = serde_json::from_str("\"bilingual\"").unwrap();
        assert_eq!(flavor, Flavor::Bilingual);
    }
}
