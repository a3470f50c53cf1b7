//! gRPC 错误处理
//!
//! 提供 CoreError 到 tonic Status 的转换

use super::{CoreError, ErrorCode};
use tonic::{Code, Status};

/// 错误代码到 gRPC 状态码的映射
pub fn map_error_code(code: ErrorCode) -> Code {
    match code {
        ErrorCode::NoClients
        | ErrorCode::RegistryUnavailable
        | ErrorCode::RegistryWatchFailed
        | ErrorCode::TransportError
        | ErrorCode::CallFailed => Code::Unavailable,
        ErrorCode::InstancerStopped | ErrorCode::SignalReceived => Code::Cancelled,
        ErrorCode::ConfigurationError => Code::FailedPrecondition,
        _ => Code::Internal,
    }
}

impl From<CoreError> for Status {
    fn from(err: CoreError) -> Self {
        let code = err.code();
        let mut status = Status::new(map_error_code(code), err.to_string());
        if let Ok(value) = code.as_str().parse() {
            status.metadata_mut().insert("x-error-code", value);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clients_maps_to_unavailable() {
        let status: Status = CoreError::NoClients.into();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(
            status.metadata().get("x-error-code").and_then(|v| v.to_str().ok()),
            Some("NO_CLIENTS")
        );
    }

    #[test]
    fn task_panic_maps_to_internal() {
        let status: Status = CoreError::TaskPanicked { name: "http".into() }.into();
        assert_eq!(status.code(), Code::Internal);
    }
}
