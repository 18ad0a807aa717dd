//! 地理位置查询，用于预选国家区号

use crate::chat::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct GeoResp {
    #[serde(default)]
    country_calling_code: Option<String>,
}

/// 查询当前网络出口对应的国家区号（不带 `+`，例如 `"91"`）
pub async fn lookup_calling_code(client: &reqwest::Client, geo_url: &str) -> Result<Option<String>> {
    debug!("[Geo] 📡 查询地理位置: {}", geo_url);
    let response = client.get(geo_url).send().await.context("请求失败")?;
    let resp: GeoResp = handle_http_response(response, "地理位置").await?;
    let code = resp.country_calling_code.as_deref().and_then(normalize_calling_code);
    match &code {
        Some(c) => info!("[Geo] ✅ 默认区号: +{}", c),
        None => warn!("[Geo] ⚠️ 地理位置响应中没有可用的区号"),
    }
    Ok(code)
}

/// `"+91"` → `"91"`，`"+1-684"` → `"1684"`，无数字时为 `None`
pub fn normalize_calling_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{init_test_logger, MockBackend};

    #[test]
    fn calling_codes_are_normalized() {
        assert_eq!(normalize_calling_code("+91").as_deref(), Some("91"));
        assert_eq!(normalize_calling_code("+1-684").as_deref(), Some("1684"));
        assert_eq!(normalize_calling_code(" 44 ").as_deref(), Some("44"));
        assert_eq!(normalize_calling_code("+").as_deref(), None);
    }

    #[tokio::test]
    async fn lookup_reads_calling_code() {
        init_test_logger();
        let backend = MockBackend::start().await;
        let code = lookup_calling_code(&reqwest::Client::new(), &backend.config().geo_url)
            .await
            .unwrap();
        assert_eq!(code.as_deref(), Some("91"));
    }
}
