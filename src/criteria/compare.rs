//! Per-kind comparison semantics
//!
//! A resolved message value is only compared when its JSON type matches
//! the kind of the configured [`Value`]. Every mismatch is `false`, and
//! object or list operands never match anything.

use super::{Operand, Value};

/// Compare a resolved message value against a configured operand.
///
/// # Examples
///
/// ```
/// use queuerator::criteria::compare::compare;
/// use queuerator::criteria::{Operand, Value};
/// use serde_json::json;
///
/// assert!(compare(&json!(10), Operand::Gt, &Value::Number(3.0)));
/// assert!(!compare(&json!("10"), Operand::Gt, &Value::Number(3.0)));
/// ```
pub fn compare(actual: &serde_json::Value, operand: Operand, expected: &Value) -> bool {
    match expected {
        Value::Number(v) => compare_number(actual, operand, *v),
        Value::Text(v) => compare_text(actual, operand, v),
        Value::Boolean(v) => compare_bool(actual, operand, *v),
        Value::Object(_) | Value::List(_) => false,
    }
}

/// Numeric comparison; `actual` must be a JSON number.
pub fn compare_number(actual: &serde_json::Value, operand: Operand, expected: f64) -> bool {
    match actual.as_f64() {
        Some(actual) => ordered(&actual, operand, &expected),
        None => false,
    }
}

/// Lexicographic comparison; `actual` must be a JSON string.
pub fn compare_text(actual: &serde_json::Value, operand: Operand, expected: &str) -> bool {
    match actual.as_str() {
        Some(actual) => ordered(actual, operand, expected),
        None => false,
    }
}

/// Boolean comparison with `false < true`; `actual` must be a JSON boolean.
///
/// `>=` returns `actual` and ignores `expected`.
pub fn compare_bool(actual: &serde_json::Value, operand: Operand, expected: bool) -> bool {
    let Some(actual) = actual.as_bool() else {
        return false;
    };

    match operand {
        Operand::Eq => actual == expected,
        Operand::Ne => actual != expected,
        Operand::Lt => !actual && expected,
        Operand::Le => !actual || (actual && expected),
        Operand::Gt => actual && !expected,
        // TODO: confirm with product owners whether `>=` should honour `expected`
        Operand::Ge => actual,
    }
}

fn ordered<T: PartialOrd + ?Sized>(actual: &T, operand: Operand, expected: &T) -> bool {
    match operand {
        Operand::Eq => actual == expected,
        Operand::Ne => actual != expected,
        Operand::Lt => actual < expected,
        Operand::Le => actual <= expected,
        Operand::Gt => actual > expected,
        Operand::Ge => actual >= expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL: [Operand; 6] = [
        Operand::Eq,
        Operand::Ne,
        Operand::Lt,
        Operand::Le,
        Operand::Gt,
        Operand::Ge,
    ];

    fn native<T: PartialOrd>(a: T, op: Operand, b: T) -> bool {
        match op {
            Operand::Eq => a == b,
            Operand::Ne => a != b,
            Operand::Lt => a < b,
            Operand::Le => a <= b,
            Operand::Gt => a > b,
            Operand::Ge => a >= b,
        }
    }

    #[test]
    fn test_number_matches_native_comparison() {
        let samples = [-3.5, 0.0, 1.0, 2.0, 1e9];
        for op in ALL {
            for actual in samples {
                for expected in samples {
                    assert_eq!(
                        compare_number(&json!(actual), op, expected),
                        native(actual, op, expected),
                        "{actual} {op} {expected}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_number_accepts_integer_json() {
        assert!(compare_number(&json!(5), Operand::Eq, 5.0));
        assert!(compare_number(&json!(-1), Operand::Lt, 0.0));
        assert!(compare_number(&json!(u64::MAX), Operand::Gt, 0.0));
    }

    #[test]
    fn test_text_matches_native_comparison() {
        let samples = ["", "a", "ab", "b", "Z"];
        for op in ALL {
            for actual in samples {
                for expected in samples {
                    assert_eq!(
                        compare_text(&json!(actual), op, expected),
                        native(actual, op, expected),
                        "{actual:?} {op} {expected:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_bool_ordering() {
        let t = json!(true);
        let f = json!(false);

        assert!(compare_bool(&t, Operand::Eq, true));
        assert!(!compare_bool(&t, Operand::Eq, false));
        assert!(compare_bool(&t, Operand::Ne, false));

        assert!(compare_bool(&f, Operand::Lt, true));
        assert!(!compare_bool(&t, Operand::Lt, true));
        assert!(!compare_bool(&f, Operand::Lt, false));

        assert!(compare_bool(&f, Operand::Le, false));
        assert!(compare_bool(&f, Operand::Le, true));
        assert!(compare_bool(&t, Operand::Le, true));
        assert!(!compare_bool(&t, Operand::Le, false));

        assert!(compare_bool(&t, Operand::Gt, false));
        assert!(!compare_bool(&t, Operand::Gt, true));
        assert!(!compare_bool(&f, Operand::Gt, false));
    }

    #[test]
    fn test_bool_ge_ignores_expected() {
        assert!(compare_bool(&json!(true), Operand::Ge, true));
        assert!(compare_bool(&json!(true), Operand::Ge, false));
        assert!(!compare_bool(&json!(false), Operand::Ge, true));
        // false >= false would hold under a total order, but only `actual` counts
        assert!(!compare_bool(&json!(false), Operand::Ge, false));
    }

    #[test]
    fn test_kind_mismatch_is_false() {
        for op in ALL {
            assert!(!compare(&json!("1"), op, &Value::Number(1.0)));
            assert!(!compare(&json!(1), op, &Value::Text("1".to_string())));
            assert!(!compare(&json!(1), op, &Value::Boolean(true)));
            assert!(!compare(&json!(null), op, &Value::Boolean(false)));
            assert!(!compare(&json!({"a": 1}), op, &Value::Text("a".to_string())));
        }
    }

    #[test]
    fn test_composite_operands_never_match() {
        let object = Value::from_json(&json!({"a": 1})).unwrap();
        let list = Value::from_json(&json!([1, 2])).unwrap();
        for op in ALL {
            assert!(!compare(&json!({"a": 1}), op, &object));
            assert!(!compare(&json!([1, 2]), op, &list));
        }
    }
}
