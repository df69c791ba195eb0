//! 工具箱：沙箱文件工具、Web 工具，以及注册表与带超时的执行器

pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod web;

pub use executor::ToolExecutor;
pub use filesystem::{CreateFileTool, ReadFileTool, SafeFs, DEFAULT_SANDBOX_DIR};
pub use registry::{Tool, ToolOutput, ToolRegistry};
pub use schema::parameters_schema_for;
pub use web::{ExtractWebsitesTool, WebSearchTool, DEFAULT_TOP_K};
