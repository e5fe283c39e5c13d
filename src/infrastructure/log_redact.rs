//! 日志脱敏
//!
//! 日志中只允许出现 id 与脱敏后的地址

/// 脱敏地址（显示前6位和后4位）
pub fn redact_address(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return "*".repeat(address.chars().count());
    }

    let prefix = &address[..6];
    let suffix = &address[address.len() - 4..];
    format!("{}...{}", prefix, suffix)
}

/// 脱敏外部订单号（只保留末尾4位）
pub fn redact_external_id(id: &str) -> String {
    if id.len() <= 4 || !id.is_ascii() {
        return "****".to_string();
    }
    format!("****{}", &id[id.len() - 4..])
}
