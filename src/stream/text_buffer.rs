//! 流式文本缓冲区
//!
//! 上游 chunk 边界是任意的，可能把一个单词切成两半，也可能在两个单词之间切开。
//! 该缓冲区负责把片段拼接成间距正确的完整文本：
//!
//! - 拉丁字母/数字之间补一个空格（"Hello" + "World" → "Hello World"）
//! - 句中标点后紧跟单词时补空格（"Hi," + "there" → "Hi, there"）
//! - 中日韩文字不补空格（"你好" + "世界" → "你好世界"）
//! - `\r\n` 和单独的 `\r` 统一为 `\n`

/// 流式文本缓冲区
///
/// 状态在多次 `append` 之间保持，每个逻辑流应创建新实例。
#[derive(Debug, Clone, Default)]
pub struct StreamingTextBuffer {
    text: String,
    /// 上一个 chunk 以 `\r` 结尾，下一个 chunk 开头的 `\n` 属于同一个换行
    pending_cr: bool,
}

impl StreamingTextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加片段，返回追加后的完整文本
    pub fn append(&mut self, chunk: &str) -> &str {
        let mut incoming = chunk;
        if self.pending_cr {
            incoming = incoming.strip_prefix('\n').unwrap_or(incoming);
        }
        if chunk.is_empty() {
            return &self.text;
        }
        self.pending_cr = chunk.ends_with('\r');

        let normalized = normalize_line_endings(incoming);
        if normalized.is_empty() {
            return &self.text;
        }

        if let (Some(prev), Some(next)) = (self.text.chars().last(), normalized.chars().next()) {
            if needs_separator(prev, next) {
                self.text.push(' ');
            }
        }
        self.text.push_str(&normalized);
        &self.text
    }

    /// 当前完整文本
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// 取出文本并消费缓冲区
    pub fn into_string(self) -> String {
        self.text
    }
}

fn normalize_line_endings(chunk: &str) -> String {
    if !chunk.contains('\r') {
        return chunk.to_string();
    }
    chunk.replace("\r\n", "\n").replace('\r', "\n")
}

/// 判断两个相邻字符之间是否需要补空格
fn needs_separator(prev: char, next: char) -> bool {
    if prev.is_whitespace() || next.is_whitespace() {
        return false;
    }
    if is_cjk(prev) || is_cjk(next) {
        return false;
    }
    if !is_latin_word_char(next) {
        return false;
    }
    is_latin_word_char(prev) || is_separating_punctuation(prev, next)
}

/// 拉丁字母（含扩展拉丁）或 ASCII 数字
fn is_latin_word_char(c: char) -> bool {
    if c.is_ascii_alphanumeric() {
        return true;
    }
    // Latin-1 补充、扩展 A/B，排除 × 和 ÷
    matches!(c, '\u{00C0}'..='\u{024F}') && c != '\u{00D7}' && c != '\u{00F7}'
}

/// 后面应跟空格的句中/句末标点
fn is_separating_punctuation(prev: char, next: char) -> bool {
    match prev {
        ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' => true,
        // 小数点后接数字不补空格（"3." + "14"）
        '.' => !next.is_ascii_digit(),
        _ => false,
    }
}

/// 中日韩文字：不以空格分词
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'     // 谚文字母
        | '\u{2E80}'..='\u{2FDF}'   // 部首
        | '\u{3000}'..='\u{303F}'   // 中日韩标点
        | '\u{3040}'..='\u{30FF}'   // 平假名、片假名
        | '\u{3130}'..='\u{318F}'   // 谚文兼容字母
        | '\u{31F0}'..='\u{31FF}'
        | '\u{3400}'..='\u{4DBF}'   // 扩展 A
        | '\u{4E00}'..='\u{9FFF}'   // 基本汉字
        | '\u{AC00}'..='\u{D7AF}'   // 谚文音节
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}'   // 全角字符
        | '\u{20000}'..='\u{2FA1F}'
    )
}
