//! Parsing of venue order responses.
//!
//! Responses differ across API generations: the order id may sit at the top
//! level under several spellings, inside an envelope, or be a bare order hash.

use rust_decimal::Decimal;
use serde_json::Value;

use super::order::{OrderState, OrderStatus};

/// Extract order ID from API response.
///
/// A bare string body counts only when it looks like an order hash, so
/// plain-text error pages are never mistaken for ids.
pub fn extract_order_id(result: &Value) -> Option<String> {
    match result {
        Value::String(s) => return is_order_hash(s.trim()).then(|| s.trim().to_string()),
        Value::Object(_) => {}
        _ => return None,
    }

    // Try various field names
    for key in ["orderID", "orderId", "order_id", "id"] {
        match result.get(key) {
            Some(Value::String(s)) => {
                if let Some(id) = non_empty(s) {
                    return Some(id);
                }
            }
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }

    // Try nested fields
    for key in ["order", "data", "result"] {
        if let Some(nested) = result.get(key).filter(|v| v.is_object()) {
            if let Some(id) = extract_order_id(nested) {
                return Some(id);
            }
        }
    }

    None
}

/// `0x` followed by hex digits only.
pub fn is_order_hash(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Rejection reason carried by an otherwise successful HTTP response.
pub fn rejection_reason(result: &Value) -> Option<String> {
    if result.get("success").and_then(Value::as_bool) == Some(false) {
        let msg = field_str(result, &["errorMsg", "error_msg", "error"])
            .unwrap_or_else(|| "success=false".to_string());
        return Some(msg);
    }
    field_str(result, &["errorMsg", "error_msg", "error"])
}

fn field_str(json: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| json.get(*k))
        .filter_map(Value::as_str)
        .find_map(non_empty)
}

/// Build an [`OrderState`] from a status response, handling various field
/// name conventions.
pub fn parse_order_state(order_id: &str, json: &Value) -> OrderState {
    let json = json.get("order").filter(|v| v.is_object()).unwrap_or(json);

    let status = json
        .get("status")
        .or_else(|| json.get("orderStatus"))
        .or_else(|| json.get("order_status"))
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse::<OrderStatus>().ok());

    OrderState {
        order_id: order_id.to_string(),
        status,
        filled_size: parse_decimal_field(
            json,
            &["size_matched", "sizeMatched", "filled", "filledSize", "filled_size"],
        ),
        original_size: parse_decimal_field(json, &["original_size", "originalSize", "size"]),
    }
}

/// Parse a decimal field from JSON, trying multiple field names.
pub fn parse_decimal_field(json: &Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(value) = json.get(*key) {
            // Try as string first
            if let Some(s) = value.as_str() {
                if let Ok(d) = s.trim().parse::<Decimal>() {
                    return Some(d);
                }
            }
            // Try as number
            if let Some(n) = value.as_f64() {
                if let Ok(d) = Decimal::try_from(n) {
                    return Some(d);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn extract_order_id_various_formats() {
        assert_eq!(extract_order_id(&json!({"orderID": "abc123"})), Some("abc123".to_string()));
        assert_eq!(extract_order_id(&json!({"orderId": "def456"})), Some("def456".to_string()));
        assert_eq!(extract_order_id(&json!({"order_id": 42})), Some("42".to_string()));
        assert_eq!(extract_order_id(&json!({"order": {"id": "ghi789"}})), Some("ghi789".to_string()));
        assert_eq!(extract_order_id(&json!({"data": {"orderID": "jkl"}})), Some("jkl".to_string()));
        assert_eq!(extract_order_id(&json!(" 0xbeef01 ")), Some("0xbeef01".to_string()));
        assert_eq!(extract_order_id(&json!({"error": "something"})), None);
    }

    #[test]
    fn empty_ids_are_not_ids() {
        assert_eq!(extract_order_id(&json!({"orderID": ""})), None);
        assert_eq!(extract_order_id(&json!({"orderID": "", "id": "x"})), Some("x".to_string()));
        assert_eq!(extract_order_id(&json!("   ")), None);
        assert_eq!(extract_order_id(&Value::Null), None);
        assert_eq!(extract_order_id(&json!([{"id": "a"}])), None);
    }

    #[test]
    fn plain_text_bodies_are_not_ids() {
        assert_eq!(extract_order_id(&json!("<html>Service Unavailable</html>")), None);
        assert_eq!(extract_order_id(&json!("OK")), None);
        assert_eq!(extract_order_id(&json!("0x")), None);
        assert_eq!(extract_order_id(&json!("0xnothex")), None);
        assert_eq!(extract_order_id(&json!(200)), None);
        assert!(is_order_hash("0xABCdef12"));
    }

    #[test]
    fn rejection_reasons_are_found() {
        assert_eq!(
            rejection_reason(&json!({"success": false, "errorMsg": "not enough balance"})),
            Some("not enough balance".to_string())
        );
        assert_eq!(
            rejection_reason(&json!({"success": false})),
            Some("success=false".to_string())
        );
        assert_eq!(rejection_reason(&json!({"success": true, "orderID": "a", "errorMsg": ""})), None);
    }

    #[test]
    fn order_state_parses_status_and_sizes() {
        let state = parse_order_state(
            "abc",
            &json!({"status": "MATCHED", "size_matched": "5", "original_size": 5}),
        );
        assert_eq!(state.order_id, "abc");
        assert_eq!(state.status, Some(OrderStatus::Filled));
        assert_eq!(state.filled_size, Some(dec!(5)));
        assert_eq!(state.original_size, Some(dec!(5)));

        let nested = parse_order_state("x", &json!({"order": {"orderStatus": "canceled"}}));
        assert!(nested.is_dead());

        let unknown = parse_order_state("y", &json!({"status": "weird"}));
        assert_eq!(unknown.status, None);
        assert!(!unknown.is_dead());
    }

    #[test]
    fn parse_decimal_field_works() {
        let json = json!({
            "filled": "10.5",
            "remaining": 5.25,
            "size": "100"
        });

        assert_eq!(parse_decimal_field(&json, &["filled"]), Some(Decimal::new(105, 1)));
        assert_eq!(parse_decimal_field(&json, &["remaining"]), Some(Decimal::new(525, 2)));
        assert_eq!(parse_decimal_field(&json, &["missing", "size"]), Some(dec!(100)));
        assert_eq!(parse_decimal_field(&json, &["missing"]), None);
    }
}
