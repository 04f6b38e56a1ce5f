//! 설정 로드 에러 타입.

use thiserror::Error;

/// 설정 로드/검증 에러.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 필수 환경 변수 누락
    #[error("필수 환경 변수 누락: {0}")]
    MissingVar(&'static str),

    /// 잘못된 설정 값
    #[error("잘못된 설정 값 {key}={value}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// 파일/환경 변수 소스 로드 실패
    #[error("설정 로드 실패: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// 설정 작업용 Result 타입.
pub type ConfigResult<T> = Result<T, ConfigError>;
