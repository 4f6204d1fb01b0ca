//! Column mapping: how one property is read from and written to a column

use rusqlite::types::Value as SqlValue;
use rust_decimal::Decimal;
use tracing::{trace, warn};

use crate::core::cipher::FieldCipher;
use crate::core::descriptor::LookupSource;
use crate::core::error::{ModelError, Result};
use crate::core::value::{
    encode_yes_no, parse_yes_no, LookupKey, LookupValue, PropertyName, Value, ValueType,
    DATE_FORMAT, TIMESTAMP_FORMAT,
};

/// Suffix of the alias under which a lookup's display label is selected
pub const DISPLAY_SUFFIX: &str = "__display";

/// One property bound to a column of its table
#[derive(Debug, Clone, PartialEq)]
pub struct SqlField {
    pub property: PropertyName,
    pub column: String,
    pub value_type: ValueType,
    pub key: bool,
    pub parent_link: bool,
    pub encrypted: bool,
    pub lookup: Option<LookupSource>,
}

impl SqlField {
    /// Whether the display label is selected next to the key
    pub fn uses_display_column(&self) -> bool {
        self.lookup.is_some()
    }

    /// Number of result columns this field occupies
    pub fn width(&self) -> usize {
        if self.uses_display_column() {
            2
        } else {
            1
        }
    }

    pub fn display_alias(&self) -> String {
        format!("{}{}", self.column, DISPLAY_SUFFIX)
    }

    /// Select-list expressions for this field
    pub fn select_expressions(&self, table_alias: &str) -> Vec<String> {
        let mut expressions = vec![format!("{}.{}", table_alias, self.column)];
        if let Some(lookup) = &self.lookup {
            expressions.push(format!(
                "(SELECT l.{display} FROM {table} l WHERE l.{key} = {alias}.{column}) AS {as_name}",
                display = lookup.display_column,
                table = lookup.table,
                key = lookup.key_column,
                alias = table_alias,
                column = self.column,
                as_name = self.display_alias(),
            ));
        }
        expressions
    }

    /// Column type used when creating the table
    pub fn sql_type(&self) -> &'static str {
        sql_type_of(self.value_type)
    }

    /// Decode this field from the raw result columns it occupies
    pub fn decode(&self, raw: &[SqlValue], cipher: &dyn FieldCipher) -> Result<Value> {
        let Some(first) = raw.first() else {
            return Err(ModelError::IllegalState(format!(
                "no result column for {}",
                self.column
            )));
        };

        if self.uses_display_column() {
            let display = match raw.get(1) {
                Some(SqlValue::Text(s)) => s.clone(),
                Some(SqlValue::Integer(i)) => i.to_string(),
                _ => String::new(),
            };
            let key = match first {
                SqlValue::Null => return Ok(Value::Null),
                SqlValue::Integer(i) if self.value_type.is_numeric_lookup() => LookupKey::Integer(*i),
                SqlValue::Integer(i) => LookupKey::Text(i.to_string()),
                SqlValue::Text(s) if self.value_type.is_numeric_lookup() => {
                    LookupKey::Integer(s.trim().parse().map_err(|_| self.mismatch(first))?)
                }
                SqlValue::Text(s) => LookupKey::Text(s.clone()),
                other => return Err(self.mismatch(other)),
            };
            return Ok(Value::Lookup(LookupValue::new(key, display)));
        }

        let mut value = match first {
            SqlValue::Null => return Ok(Value::Null),
            SqlValue::Integer(i) => Value::Integer(*i),
            SqlValue::Real(f) => Value::Decimal(
                Decimal::try_from(*f).map_err(|_| self.mismatch(first))?,
            ),
            SqlValue::Text(s) => Value::Text(s.clone()),
            SqlValue::Blob(b) => Value::Bytes(b.clone()),
        };

        if self.encrypted {
            if matches!(value, Value::Bytes(_)) {
                return Err(ModelError::cipher(
                    &self.column,
                    "encrypted columns hold text, found a blob",
                ));
            }
            if let Value::Text(stored) = &value {
                value = Value::Text(cipher.decrypt(&self.column, stored)?);
            }
        }

        let decoded = match (self.value_type, value) {
            (ValueType::YesNo, Value::Text(s)) => Value::Boolean(parse_yes_no(&s).unwrap_or(false)),
            (ValueType::Date, Value::Integer(secs)) => {
                let ts = ValueType::Timestamp.normalize(&self.property, Value::Integer(secs))?;
                ValueType::Date.normalize(&self.property, ts)?
            }
            (ValueType::Text | ValueType::LongText, Value::Bytes(bytes)) => {
                match String::from_utf8(bytes) {
                    Ok(text) => Value::Text(text),
                    Err(e) => {
                        warn!("Column {} holds non UTF-8 data, keeping bytes", self.column);
                        Value::Bytes(e.into_bytes())
                    }
                }
            }
            (value_type, value) => value_type.normalize(&self.property, value)?,
        };
        trace!("Retrieved value for {}: {:?}", self.column, decoded);
        Ok(decoded)
    }

    /// Encode a value for a statement parameter
    pub fn encode(&self, value: &Value, cipher: &dyn FieldCipher) -> Result<SqlValue> {
        let encoded = match value {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Decimal(d) => SqlValue::Text(d.normalize().to_string()),
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Boolean(b) => SqlValue::Text(encode_yes_no(*b).to_string()),
            Value::Timestamp(ts) => {
                let format = if self.value_type == ValueType::Date {
                    DATE_FORMAT
                } else {
                    TIMESTAMP_FORMAT
                };
                SqlValue::Text(ts.format(format).to_string())
            }
            Value::Bytes(bytes) => SqlValue::Blob(bytes.clone()),
            Value::Lookup(lookup) => match &lookup.key {
                LookupKey::Integer(id) => SqlValue::Integer(*id),
                LookupKey::Text(key) => SqlValue::Text(key.clone()),
            },
            Value::Rows(_) => {
                return Err(ModelError::invalid_value(
                    &self.property,
                    "rows cannot be stored in a column",
                ))
            }
        };

        if !self.encrypted || self.uses_display_column() {
            return Ok(encoded);
        }
        Ok(match encoded {
            SqlValue::Null | SqlValue::Blob(_) => encoded,
            SqlValue::Integer(i) => SqlValue::Text(cipher.encrypt(&self.column, &i.to_string())?),
            SqlValue::Real(f) => SqlValue::Text(cipher.encrypt(&self.column, &f.to_string())?),
            SqlValue::Text(s) => SqlValue::Text(cipher.encrypt(&self.column, &s)?),
        })
    }

    fn mismatch(&self, raw: &SqlValue) -> ModelError {
        ModelError::invalid_value(
            &self.property,
            format!("column {} holds {:?}, expected {:?}", self.column, raw, self.value_type),
        )
    }
}

/// SQLite column type for a value type
pub fn sql_type_of(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Integer | ValueType::Identifier | ValueType::Lookup => "INTEGER",
        ValueType::Binary => "BLOB",
        ValueType::Decimal
        | ValueType::Text
        | ValueType::LongText
        | ValueType::YesNo
        | ValueType::Date
        | ValueType::Timestamp
        | ValueType::TextLookup => "TEXT",
    }
}

/// Render a parameter for logs and error reports
pub fn describe(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => format!("'{}'", s),
        SqlValue::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cipher::PlainText;
    use chrono::NaiveDate;

    fn field(value_type: ValueType) -> SqlField {
        SqlField {
            property: PropertyName::from("Field"),
            column: "field".to_string(),
            value_type,
            key: false,
            parent_link: false,
            encrypted: false,
            lookup: None,
        }
    }

    struct Reversed;

    impl FieldCipher for Reversed {
        fn encrypt(&self, _column: &str, plain: &str) -> Result<String> {
            Ok(plain.chars().rev().collect())
        }

        fn decrypt(&self, _column: &str, stored: &str) -> Result<String> {
            Ok(stored.chars().rev().collect())
        }
    }

    #[test]
    fn test_lookup_select_uses_correlated_subselect() {
        let mut f = field(ValueType::Lookup);
        f.column = "c_bpartner_id".to_string();
        f.lookup = Some(LookupSource {
            table: "c_bpartner".to_string(),
            key_column: "c_bpartner_id".to_string(),
            display_column: "name".to_string(),
        });
        assert_eq!(
            f.select_expressions("t"),
            vec![
                "t.c_bpartner_id".to_string(),
                "(SELECT l.name FROM c_bpartner l WHERE l.c_bpartner_id = t.c_bpartner_id) AS c_bpartner_id__display".to_string(),
            ]
        );
    }

    #[test]
    fn test_decode_lookup_pair() {
        let mut f = field(ValueType::Lookup);
        f.lookup = Some(LookupSource {
            table: "p".to_string(),
            key_column: "id".to_string(),
            display_column: "name".to_string(),
        });
        let raw = [SqlValue::Integer(7), SqlValue::Text("Acme".to_string())];
        assert_eq!(
            f.decode(&raw, &PlainText).unwrap(),
            Value::Lookup(LookupValue::of_id(7, "Acme"))
        );
        assert_eq!(f.decode(&[SqlValue::Null, SqlValue::Null], &PlainText).unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_yes_no() {
        let f = field(ValueType::YesNo);
        assert_eq!(
            f.decode(&[SqlValue::Text("Y".to_string())], &PlainText).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            f.decode(&[SqlValue::Text("false".to_string())], &PlainText).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_decode_dates() {
        let f = field(ValueType::Date);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            f.decode(&[SqlValue::Text("2024-03-01 13:45:00".to_string())], &PlainText)
                .unwrap(),
            Value::Timestamp(expected)
        );
        assert_eq!(
            f.decode(&[SqlValue::Integer(expected.and_utc().timestamp() + 60)], &PlainText)
                .unwrap(),
            Value::Timestamp(expected)
        );
    }

    #[test]
    fn test_decimal_round_trips_as_text() {
        let f = field(ValueType::Decimal);
        let value = Value::decimal("12.50").unwrap();
        let encoded = f.encode(&value, &PlainText).unwrap();
        assert_eq!(encoded, SqlValue::Text("12.5".to_string()));
        assert_eq!(f.decode(&[encoded], &PlainText).unwrap(), value);
    }

    #[test]
    fn test_encrypted_yes_no_decrypts_before_parsing() {
        let mut f = field(ValueType::YesNo);
        f.encrypted = true;
        let encoded = f.encode(&Value::Boolean(true), &Reversed).unwrap();
        assert_eq!(encoded, SqlValue::Text("Y".to_string()));

        let mut f = field(ValueType::Text);
        f.encrypted = true;
        let encoded = f.encode(&Value::text("secret"), &Reversed).unwrap();
        assert_eq!(encoded, SqlValue::Text("terces".to_string()));
        assert_eq!(f.decode(&[encoded], &Reversed).unwrap(), Value::text("secret"));
    }

    struct Locked;

    impl FieldCipher for Locked {
        fn encrypt(&self, column: &str, _plain: &str) -> Result<String> {
            Err(ModelError::cipher(column, "no key loaded"))
        }

        fn decrypt(&self, column: &str, _stored: &str) -> Result<String> {
            Err(ModelError::cipher(column, "no key loaded"))
        }
    }

    #[test]
    fn test_cipher_failures_name_the_column() {
        let mut f = field(ValueType::Text);
        f.encrypted = true;
        match f.encode(&Value::text("secret"), &Locked).unwrap_err() {
            ModelError::Cipher { column, .. } => assert_eq!(column, "field"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            f.decode(&[SqlValue::Blob(vec![1, 2])], &PlainText).unwrap_err(),
            ModelError::Cipher { .. }
        ));
    }

    #[test]
    fn test_encode_lookup_uses_key() {
        let f = field(ValueType::Lookup);
        let encoded = f
            .encode(&Value::Lookup(LookupValue::of_id(3, "x")), &PlainText)
            .unwrap();
        assert_eq!(encoded, SqlValue::Integer(3));
    }
}
