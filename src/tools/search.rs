use serde_json::json;

/// Canned web-search tool.
///
/// The search integration was never wired to a real provider; it reports a
/// not-found result for any query so the model can degrade gracefully.
#[must_use]
pub fn lookup(query: &str) -> serde_json::Value {
    json!({ "result": format!("关于“{query}”的搜索结果未找到。") })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_reports_not_found() {
        let value = lookup("比特币价格");
        assert_eq!(value["result"], "关于“比特币价格”的搜索结果未找到。");
    }
}
