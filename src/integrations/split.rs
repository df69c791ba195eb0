//! 长消息切分：平台单条消息有长度上限（如 4096 字符）

/// 单条消息默认上限（字符数）
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// 按字符数切分文本，每段不超过 limit
///
/// 优先在 limit 以内最后一个空白处切开（切点处的连续空白被丢弃），找不到空白时硬切。
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        // limit + 1 个字符以内的字节边界
        let window_end = rest
            .char_indices()
            .nth(limit + 1)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];

        let split_at = window
            .char_indices()
            .skip(1)
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .last();

        match split_at {
            Some(i) => {
                // 整段空白都丢弃，避免产生纯空白的消息
                let chunk = rest[..i].trim_end();
                if !chunk.is_empty() {
                    chunks.push(chunk.to_string());
                }
                rest = rest[i..].trim_start();
            }
            None => {
                let cut = rest
                    .char_indices()
                    .nth(limit)
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                chunks.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
        }
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
