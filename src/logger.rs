//! 日志管理模块
use crate::config::{ConfigError, LoggingConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;

/// 是否对外部消息脱敏（默认开启）
static SANITIZE_ENABLED: AtomicBool = AtomicBool::new(true);

/// 脱敏规则：服务端消息可能回显请求头或凭证
static SANITIZE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer\s+[A-Za-z0-9._~+/=-]+", "Bearer ***"),
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"(access|refresh)[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "token: ***",
        ),
        (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// 初始化全局 tracing 订阅者
///
/// 已存在全局订阅者时返回 `Ok(false)`，不视为错误
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let level = Level::from_str(config.level.trim())
        .map_err(|_| ConfigError::InvalidLogLevel(config.level.clone()))?;
    SANITIZE_ENABLED.store(config.sanitize, Ordering::SeqCst);

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok();
    Ok(installed)
}

/// 按配置对消息脱敏
pub fn redact(message: &str) -> Cow<'_, str> {
    if SANITIZE_ENABLED.load(Ordering::SeqCst) {
        Cow::Owned(sanitize_log_message(message))
    } else {
        Cow::Borrowed(message)
    }
}

/// 遮蔽消息中的 bearer token、api key 等凭证
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_PATTERNS.iter() {
        if re.is_match(&sanitized) {
            sanitized = re.replace_all(&sanitized, *replacement).into_owned();
        }
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_bearer_token() {
        let output = sanitize_log_message("upstream rejected Authorization: Bearer abcDEF123._-XYZ");
        assert!(!output.contains("abcDEF123"));
        assert!(output.contains("Bearer ***"));
    }

    #[test]
    fn test_sanitize_api_key_and_tokens() {
        let output = sanitize_log_message(r#"api_key="sk-test_123" access_token=atk_999"#);
        assert!(!output.contains("sk-test_123"));
        assert!(!output.contains("atk_999"));
    }

    #[test]
    fn test_sanitize_password() {
        let output = sanitize_log_message(r#"{"password":"p@ssW0rd!"}"#);
        assert!(output.contains("password: ***"));
        assert!(!output.contains("p@ssW0rd!"));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let input = "词条生成失败，请稍后重试。";
        assert_eq!(sanitize_log_message(input), input);
    }

    #[test]
    fn test_init_logging_rejects_invalid_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            sanitize: true,
        };
        assert!(matches!(
            init_logging(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_init_logging_twice_is_ok() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }
}
