//! 沙箱文件工具
//!
//! SafeFs 绑定沙箱目录，文件名只能是单层名字（禁止路径分隔符、`..`、绝对路径）；
//! CreateFileTool / ReadFileTool 基于 SafeFs 提供 create_file / read_file 能力。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::schema::{parameters_schema_for, CreateFileArgs, ReadFileArgs};
use crate::tools::{Tool, ToolOutput};

/// 默认沙箱目录
pub const DEFAULT_SANDBOX_DIR: &str = "synapse_files";

/// 沙箱文件系统：所有文件都直接位于 root_dir 下
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
        }
    }

    /// 解析沙箱内的文件路径；非单层文件名一律视为逃逸
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, AgentError> {
        let path = Path::new(file_name);
        let mut components = path.components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal || file_name.contains(['/', '\\']) || file_name.contains("..") {
            return Err(AgentError::PathEscape(file_name.to_string())); // 如 ../../etc/passwd
        }
        Ok(self.root_dir.join(path))
    }

    /// 写入文件（按需创建沙箱目录），返回写入路径
    pub async fn write_file(&self, file_name: &str, content: &str) -> Result<PathBuf, AgentError> {
        let path = self.resolve(file_name)?;
        tokio::fs::create_dir_all(&self.root_dir)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("failed to create directory: {e}")))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("failed to write file: {e}")))?;
        Ok(path)
    }

    pub async fn read_file(&self, file_name: &str) -> Result<String, AgentError> {
        let path = self.resolve(file_name)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("failed to read file: {e}")))
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("invalid or missing {key} argument"))
}

/// create_file：在沙箱中写入 `<file_name>.txt`，并把文件作为产物发送给用户
pub struct CreateFileTool {
    fs: SafeFs,
}

impl CreateFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a text file with the given name and content and send it to the user. The .txt extension is added automatically."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<CreateFileArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let file_name = required_str(&args, "file_name")?;
        let file_content = required_str(&args, "file_content")?;
        tracing::info!(file_name = %file_name, "create_file tool execute");

        let path = self
            .fs
            .write_file(&format!("{file_name}.txt"), file_content)
            .await
            .map_err(|e| e.tool_message())?;
        Ok(ToolOutput::text(format!("File created successfully at {}", path.display())).with_artifact(path))
    }
}

/// read_file：读取沙箱中的文件
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file previously created in the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<ReadFileArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let file_name = required_str(&args, "file_name")?;
        tracing::info!(file_name = %file_name, "read_file tool execute");
        self.fs
            .read_file(file_name)
            .await
            .map(ToolOutput::text)
            .map_err(|e| e.tool_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_rejects_traversal() {
        let fs = SafeFs::new("sandbox");
        for name in ["../etc/passwd", "a/b", "a\\b", "/etc/passwd", "..", ".", "", "x..y"] {
            assert!(
                matches!(fs.resolve(name), Err(AgentError::PathEscape(_))),
                "{name} should be rejected"
            );
        }
        assert_eq!(fs.resolve("notes.txt").expect("plain"), PathBuf::from("sandbox/notes.txt"));
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = SafeFs::new(dir.path().join("files"));
        let create = CreateFileTool::new(fs.clone());
        let read = ReadFileTool::new(fs);

        let out = create
            .execute(json!({ "file_name": "todo", "file_content": "buy milk" }))
            .await
            .expect("create");
        let expected = dir.path().join("files").join("todo.txt");
        assert_eq!(out.artifact.as_deref(), Some(expected.as_path()));
        assert_eq!(out.content, format!("File created successfully at {}", expected.display()));

        let content = read
            .execute(json!({ "file_name": "todo.txt" }))
            .await
            .expect("read");
        assert_eq!(content.content, "buy milk");
        assert!(content.artifact.is_none());
    }

    #[tokio::test]
    async fn test_missing_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let create = CreateFileTool::new(SafeFs::new(dir.path()));
        let err = create.execute(json!({ "file_content": "x" })).await.unwrap_err();
        assert_eq!(err, "invalid or missing file_name argument");
        let err = create
            .execute(json!({ "file_name": "a", "file_content": "" }))
            .await
            .unwrap_err();
        assert_eq!(err, "invalid or missing file_content argument");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let read = ReadFileTool::new(SafeFs::new(dir.path()));
        let err = read.execute(json!({ "file_name": "ghost.txt" })).await.unwrap_err();
        assert!(err.starts_with("failed to read file"), "{err}");
    }

    #[tokio::test]
    async fn test_create_rejects_escape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let create = CreateFileTool::new(SafeFs::new(dir.path()));
        let err = create
            .execute(json!({ "file_name": "../evil", "file_content": "x" }))
            .await
            .unwrap_err();
        assert!(err.starts_with("Path escape attempt"), "{err}");
    }
}
