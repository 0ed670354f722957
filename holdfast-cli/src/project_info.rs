/// HoldFast CLI 项目信息模块
///
/// holdfast-cli 是面向用户的主程序，项目元数据统一在这里定义，
/// client-core 作为内部库只提供技术性常量

/// 项目元数据（自动从 Cargo.toml 同步）
pub mod metadata {
    /// 项目名称
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    /// 项目描述
    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    /// 项目作者
    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称
    pub mod display {
        pub const FRIENDLY_NAME: &str = "HoldFast";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "HoldFast 桌面备份客户端：登录并开通备份环境、管理备份预设、同步系统计划任务、执行并监控备份";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// 核心库版本
    pub const CORE_VERSION: &str = client_core::constants::version::CORE_VERSION;
}

/// 获取版本信息字符串
pub fn get_version_string() -> String {
    format!(
        "{} v{} (core v{})",
        metadata::display::FRIENDLY_NAME,
        version_info::CLI_VERSION,
        version_info::CORE_VERSION
    )
}
