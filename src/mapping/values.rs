use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::core::{OgmError, PropertyKind, Result, Value};

/// Trait for Rust values that can be mapped to a graph property.
pub trait PropertyValue: Sized + Send + Sync + 'static {
    fn kind() -> PropertyKind;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self>;

    /// Whether `Null` is a legal value; only `Option<T>` says yes.
    fn is_optional() -> bool {
        false
    }
}

/// Prefixes a conversion failure with the field it happened in. Used by
/// derived `GraphEntity` setters.
pub fn in_field(type_name: &str, field: &str, err: OgmError) -> OgmError {
    match err {
        OgmError::Mapping(message) => {
            OgmError::Mapping(format!("{}.{}: {}", type_name, field, message))
        }
        other => other,
    }
}

fn mismatch(expected: PropertyKind, found: &Value) -> OgmError {
    OgmError::Mapping(format!(
        "Expected a {} property value, found {}",
        expected,
        found.type_name()
    ))
}

impl PropertyValue for i64 {
    fn kind() -> PropertyKind {
        PropertyKind::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| mismatch(Self::kind(), &value))
    }
}

impl PropertyValue for i32 {
    fn kind() -> PropertyKind {
        PropertyKind::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        let wide = value
            .as_i64()
            .ok_or_else(|| mismatch(Self::kind(), &value))?;
        i32::try_from(wide)
            .map_err(|_| OgmError::Mapping(format!("Integer {} does not fit in i32", wide)))
    }
}

impl PropertyValue for f64 {
    fn kind() -> PropertyKind {
        PropertyKind::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| mismatch(Self::kind(), &value))
    }
}

impl PropertyValue for bool {
    fn kind() -> PropertyKind {
        PropertyKind::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch(Self::kind(), &other)),
        }
    }
}

impl PropertyValue for String {
    fn kind() -> PropertyKind {
        PropertyKind::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(Self::kind(), &other)),
        }
    }
}

impl PropertyValue for Uuid {
    fn kind() -> PropertyKind {
        PropertyKind::Uuid
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::Text(s) => Uuid::parse_str(&s)
                .map_err(|err| OgmError::Mapping(format!("Invalid UUID '{}': {}", s, err))),
            other => Err(mismatch(Self::kind(), &other)),
        }
    }
}

impl PropertyValue for DateTime<Utc> {
    fn kind() -> PropertyKind {
        PropertyKind::Timestamp
    }

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(t) => Ok(t),
            Value::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|err| OgmError::Mapping(format!("Invalid timestamp '{}': {}", s, err))),
            other => Err(mismatch(Self::kind(), &other)),
        }
    }
}

impl PropertyValue for NaiveDate {
    fn kind() -> PropertyKind {
        PropertyKind::Date
    }

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Text(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|err| OgmError::Mapping(format!("Invalid date '{}': {}", s, err))),
            other => Err(mismatch(Self::kind(), &other)),
        }
    }
}

impl<T: PropertyValue> PropertyValue for Vec<T> {
    fn kind() -> PropertyKind {
        PropertyKind::List
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(PropertyValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch(Self::kind(), &other)),
        }
    }
}

impl<T: PropertyValue> PropertyValue for Option<T> {
    fn kind() -> PropertyKind {
        T::kind()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(value) => value.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn is_optional() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(i64::from_value(Value::Integer(7)).unwrap(), 7);
        assert_eq!(i32::from_value(Value::Integer(7)).unwrap(), 7);
        assert!(i32::from_value(Value::Integer(i64::MAX)).is_err());
        assert_eq!(f64::from_value(Value::Integer(2)).unwrap(), 2.0);
        assert!(bool::from_value(Value::Text("true".into())).is_err());
        assert_eq!(
            String::from_value(Value::from("known")).unwrap(),
            "known".to_string()
        );
    }

    #[test]
    fn test_optional_accepts_null() {
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Value::Integer(3)).unwrap(), Some(3));
        assert_eq!(Option::<String>::None.to_value(), Value::Null);
        assert!(Option::<String>::is_optional());
        assert!(!String::is_optional());
        assert!(i64::from_value(Value::Null).is_err());
    }

    #[test]
    fn test_text_forms_of_structured_values() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_value(Value::Text(id.to_string())).unwrap(), id);

        let date = NaiveDate::from_value(Value::from("2021-03-04")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 3, 4).unwrap());

        let ts = DateTime::<Utc>::from_value(Value::from("2021-03-04T05:06:07Z")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2021-03-04T05:06:07+00:00");
    }

    #[test]
    fn test_lists() {
        let tags = vec!["a".to_string(), "b".to_string()];
        let value = tags.to_value();
        assert_eq!(Vec::<String>::from_value(value).unwrap(), tags);
        assert!(Vec::<i64>::from_value(Value::List(vec![Value::from("x")])).is_err());
    }
}
