//! 服务发现核心错误处理模块
//!
//! 提供统一的错误类型、错误代码分类以及与 gRPC Status 的转换

pub mod code;
pub mod core_error;
#[cfg(feature = "grpc")]
pub mod grpc;

pub use code::{ErrorCategory, ErrorCode};
pub use core_error::{BoxError, CoreError, Result};
