//! # Notify Core
//!
//! 알림 디스패처의 공통 기반:
//! - 설정 로드 (환경 변수, TOML 파일)
//! - 설정 에러 타입
//! - 로깅 초기화

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;
