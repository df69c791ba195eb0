//! 工具参数 JSON Schema 生成（schemars 自动生成，避免手写 schema 与实现不一致）
//!
//! 函数声明只接受 OpenAPI 子集，生成后去掉 `$schema` / `title` / `definitions` 等顶层字段。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// create_file 参数
#[allow(dead_code)]
#[derive(JsonSchema)]
pub struct CreateFileArgs {
    /// File name without extension; `.txt` is appended
    pub file_name: String,
    /// Text content to write into the file
    pub file_content: String,
}

/// read_file 参数
#[allow(dead_code)]
#[derive(JsonSchema)]
pub struct ReadFileArgs {
    /// Name of a file previously created in the sandbox, including extension
    pub file_name: String,
}

/// web_search 参数
#[allow(dead_code)]
#[derive(JsonSchema)]
pub struct WebSearchArgs {
    /// Search query
    pub query: String,
    /// When true, the top results are fetched and their page content is returned instead of snippets
    pub extract_websites: bool,
}

/// extract_websites 参数
#[allow(dead_code)]
#[derive(JsonSchema)]
pub struct ExtractWebsitesArgs {
    /// Absolute http(s) URLs to fetch
    pub links: Vec<String>,
}

/// 生成某个参数结构体的 schema（JSON Value）
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(obj) = value.as_object_mut() {
        for key in ["$schema", "title", "definitions"] {
            obj.remove(key);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_file_schema() {
        let schema = parameters_schema_for::<CreateFileArgs>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["file_name"]["type"], "string");
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required")
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"file_name") && required.contains(&"file_content"));
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
    }

    #[test]
    fn test_links_schema_is_string_array() {
        let schema = parameters_schema_for::<ExtractWebsitesArgs>();
        assert_eq!(schema["properties"]["links"]["type"], "array");
        assert_eq!(schema["properties"]["links"]["items"]["type"], "string");
    }

    #[test]
    fn test_bool_field() {
        let schema = parameters_schema_for::<WebSearchArgs>();
        assert_eq!(schema["properties"]["extract_websites"]["type"], "boolean");
    }
}
