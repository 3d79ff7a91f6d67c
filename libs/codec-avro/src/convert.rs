use std::collections::HashMap;

use apache_avro::types::Value;
use apache_avro::{Decimal, Schema};
use sanction_api::{CheckStatus, DecisionPayload, PaymentPayload, ScaledAmount};

use crate::CodecError;

/// Largest two's complement width that fits `decimal(18, _)`.
const MAX_AMOUNT_BYTES: usize = 8;

// ═══════════════════════════════════════════════════════════════
//  Avro record → PaymentPayload
// ═══════════════════════════════════════════════════════════════

/// Поля записи writer'а, доступные по имени.
///
/// Проекция на reader идёт по именам полей: лишние поля writer'а
/// игнорируются, отсутствующие: ошибка с именем поля.
struct RecordView {
    fields: HashMap<String, Value>,
}

impl RecordView {
    fn new(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Record(fields) => Ok(Self { fields: fields.into_iter().collect() }),
            _ => Err(CodecError::NotRecord),
        }
    }

    fn take(&mut self, name: &str) -> Result<Value, CodecError> {
        match self.fields.remove(name) {
            Some(Value::Union(_, inner)) => match *inner {
                Value::Null => Err(CodecError::field(name, "null")),
                other => Ok(other),
            },
            Some(Value::Null) => Err(CodecError::field(name, "null")),
            Some(value) => Ok(value),
            None => Err(CodecError::field(name, "missing")),
        }
    }

    fn string(&mut self, name: &str) -> Result<String, CodecError> {
        match self.take(name)? {
            Value::String(s) => Ok(s),
            other => Err(mismatch(name, "string", &other)),
        }
    }

    fn timestamp_millis(&mut self, name: &str) -> Result<i64, CodecError> {
        match self.take(name)? {
            Value::TimestampMillis(ms) | Value::Long(ms) => Ok(ms),
            Value::Int(ms) => Ok(i64::from(ms)),
            other => Err(mismatch(name, "timestamp-millis", &other)),
        }
    }

    fn amount(&mut self, name: &str) -> Result<ScaledAmount, CodecError> {
        let bytes = match self.take(name)? {
            Value::Decimal(d) => Vec::<u8>::try_from(&d)
                .map_err(|e| CodecError::field(name, e.to_string()))?,
            Value::Bytes(b) | Value::Fixed(_, b) => b,
            other => return Err(mismatch(name, "decimal bytes", &other)),
        };
        if bytes.is_empty() || bytes.len() > MAX_AMOUNT_BYTES {
            return Err(CodecError::field(
                name,
                format!(
                    "decimal({}, {}) needs 1..={MAX_AMOUNT_BYTES} bytes, got {}",
                    ScaledAmount::PRECISION,
                    ScaledAmount::SCALE,
                    bytes.len()
                ),
            ));
        }
        let amount = ScaledAmount::from_be_bytes(bytes);
        let limit = 10i128.pow(ScaledAmount::PRECISION as u32);
        match amount.unscaled() {
            Some(v) if v.abs() < limit => Ok(amount),
            _ => Err(CodecError::field(
                name,
                format!(
                    "{amount} does not fit decimal({}, {})",
                    ScaledAmount::PRECISION,
                    ScaledAmount::SCALE
                ),
            )),
        }
    }
}

fn mismatch(name: &str, expected: &str, got: &Value) -> CodecError {
    let got = apache_avro::schema::SchemaKind::from(got);
    CodecError::field(name, format!("expected {expected}, got {got:?}"))
}

pub(crate) fn payment_from_avro(value: Value) -> Result<PaymentPayload, CodecError> {
    let mut rec = RecordView::new(value)?;
    // порядок объявления полей Payment
    Ok(PaymentPayload {
        request_id: rec.string("requestId")?,
        created_at: rec.timestamp_millis("createdAt")?,
        status: rec.string("status")?,
        total: rec.amount("total")?,
        username_from: rec.string("usernameFrom")?,
        username_from_address: rec.string("usernameFromAddress")?,
        username_to: rec.string("usernameTo")?,
        username_to_address: rec.string("usernameToAddress")?,
    })
}

pub(crate) fn decision_from_avro(value: Value) -> Result<DecisionPayload, CodecError> {
    let mut rec = RecordView::new(value)?;
    let payment_id = rec.string("paymentId")?;
    let update_at = rec.timestamp_millis("updateAt")?;
    let reason_failed = match rec.take("reasonFailed") {
        Ok(Value::String(s)) => Some(s),
        Ok(other) => return Err(mismatch("reasonFailed", "string", &other)),
        Err(CodecError::Field { reason, .. }) if reason == "null" => None,
        Err(e) => return Err(e),
    };
    let status = match rec.take("status")? {
        Value::Enum(_, symbol) | Value::String(symbol) => CheckStatus::from_symbol(&symbol)
            .ok_or_else(|| CodecError::field("status", format!("unknown symbol {symbol}")))?,
        other => return Err(mismatch("status", "enum", &other)),
    };
    let check_failed = match rec.take("checkFailed")? {
        Value::Boolean(b) => b,
        other => return Err(mismatch("checkFailed", "boolean", &other)),
    };
    Ok(DecisionPayload { payment_id, update_at, reason_failed, status, check_failed })
}

// ═══════════════════════════════════════════════════════════════
//  Payload → Avro record (in the writer schema's field order)
// ═══════════════════════════════════════════════════════════════

pub(crate) fn payment_to_avro(p: &PaymentPayload, writer: &Schema) -> Result<Value, CodecError> {
    let fields = vec![
        ("requestId", Value::String(p.request_id.clone())),
        ("createdAt", Value::TimestampMillis(p.created_at)),
        ("status", Value::String(p.status.clone())),
        ("total", Value::Decimal(Decimal::from(p.total.as_bytes().to_vec()))),
        ("usernameFrom", Value::String(p.username_from.clone())),
        ("usernameFromAddress", Value::String(p.username_from_address.clone())),
        ("usernameTo", Value::String(p.username_to.clone())),
        ("usernameToAddress", Value::String(p.username_to_address.clone())),
    ];
    conform(fields, writer)
}

pub(crate) fn decision_to_avro(d: &DecisionPayload, writer: &Schema) -> Result<Value, CodecError> {
    let reason = match &d.reason_failed {
        Some(r) => Value::String(r.clone()),
        None => Value::Null,
    };
    let fields = vec![
        ("paymentId", Value::String(d.payment_id.clone())),
        ("updateAt", Value::TimestampMillis(d.update_at)),
        ("reasonFailed", reason),
        ("status", Value::Enum(d.status.index() as u32, d.status.as_str().to_string())),
        ("checkFailed", Value::Boolean(d.check_failed)),
    ];
    conform(fields, writer)
}

/// Разложить значения по полям writer-схемы: порядок, ветки union'ов,
/// индексы enum-символов берутся из схемы.
fn conform(fields: Vec<(&str, Value)>, writer: &Schema) -> Result<Value, CodecError> {
    let Schema::Record(record) = writer else {
        return Err(CodecError::NotRecord);
    };
    let mut by_name: HashMap<&str, Value> = fields.into_iter().collect();
    let mut out = Vec::with_capacity(record.fields.len());
    for field in &record.fields {
        let value = by_name
            .remove(field.name.as_str())
            .ok_or_else(|| CodecError::field(&field.name, "no value for writer schema field"))?;
        out.push((field.name.clone(), fit(&field.name, value, &field.schema)?));
    }
    Ok(Value::Record(out))
}

fn fit(name: &str, value: Value, schema: &Schema) -> Result<Value, CodecError> {
    match schema {
        Schema::Union(union) => {
            let position = union.variants().iter().position(|variant| {
                matches!(
                    (&value, variant),
                    (Value::Null, Schema::Null) | (Value::String(_), Schema::String)
                )
            });
            match position {
                Some(i) => Ok(Value::Union(i as u32, Box::new(value))),
                None => Err(CodecError::field(name, "no matching union branch")),
            }
        }
        Schema::Enum(schema) => match value {
            Value::Enum(_, symbol) => schema
                .symbols
                .iter()
                .position(|s| *s == symbol)
                .map(|i| Value::Enum(i as u32, symbol.clone()))
                .ok_or_else(|| CodecError::field(name, format!("symbol {symbol} not in writer enum"))),
            other => Ok(other),
        },
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: Vec<(&str, Value)>) -> Value {
        Value::Record(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn payment_fields() -> Vec<(&'static str, Value)> {
        vec![
            ("requestId", Value::String("REQ-1".into())),
            ("createdAt", Value::TimestampMillis(1_700_000_000_000)),
            ("status", Value::String("NEW".into())),
            ("total", Value::Decimal(Decimal::from(vec![0x04, 0xE2]))),
            ("usernameFrom", Value::String("Alice".into())),
            ("usernameFromAddress", Value::String("Main st 1".into())),
            ("usernameTo", Value::String("Bob".into())),
            ("usernameToAddress", Value::String("Side st 2".into())),
        ]
    }

    #[test]
    fn projects_by_name_ignoring_extra_fields() {
        let mut fields = payment_fields();
        fields.reverse();
        fields.push(("channel", Value::String("web".into())));
        let p = payment_from_avro(record(fields)).unwrap();
        assert_eq!(p.request_id, "REQ-1");
        assert_eq!(p.total.as_bytes(), &[0x04, 0xE2]);
        assert_eq!(p.total.to_string(), "12.50");
    }

    #[test]
    fn missing_field_is_named() {
        let fields: Vec<_> = payment_fields()
            .into_iter()
            .filter(|(k, _)| *k != "usernameTo")
            .collect();
        let err = payment_from_avro(record(fields)).unwrap_err();
        assert_eq!(err.field_name(), Some("usernameTo"));
    }

    #[test]
    fn type_mismatch_is_named() {
        let mut fields = payment_fields();
        fields[0].1 = Value::Long(5);
        let err = payment_from_avro(record(fields)).unwrap_err();
        assert_eq!(err.field_name(), Some("requestId"));
    }

    #[test]
    fn oversized_amount_is_rejected() {
        let mut fields = payment_fields();
        fields[3].1 = Value::Bytes(vec![1; 9]);
        let err = payment_from_avro(record(fields)).unwrap_err();
        assert_eq!(err.field_name(), Some("total"));
    }

    #[test]
    fn amount_beyond_eighteen_digits_is_rejected() {
        for bytes in [
            vec![0x0D, 0xE0, 0xB6, 0xB3, 0xA7, 0x64, 0x00, 0x00],
            vec![0xF2, 0x1F, 0x49, 0x4C, 0x58, 0x9C, 0x00, 0x00],
            vec![0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
        ] {
            let mut fields = payment_fields();
            fields[3].1 = Value::Bytes(bytes.clone());
            let err = payment_from_avro(record(fields)).unwrap_err();
            assert_eq!(err.field_name(), Some("total"), "{bytes:02x?}");
            assert!(err.to_string().contains("decimal(18, 2)"), "{err}");
        }

        let largest = vec![0x0D, 0xE0, 0xB6, 0xB3, 0xA7, 0x63, 0xFF, 0xFF];
        let mut fields = payment_fields();
        fields[3].1 = Value::Bytes(largest.clone());
        let p = payment_from_avro(record(fields)).unwrap();
        assert_eq!(p.total.as_bytes(), largest.as_slice());
        assert_eq!(p.total.to_string(), "9999999999999999.99");
    }

    #[test]
    fn union_branch_follows_writer_order() {
        let writer = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[
                {"name":"paymentId","type":"string"},
                {"name":"updateAt","type":"long"},
                {"name":"reasonFailed","type":["string","null"]},
                {"name":"status","type":{"type":"enum","name":"S","symbols":["AUTH_CHECK","SANCTION_CHECK"]}},
                {"name":"checkFailed","type":"boolean"}]}"#,
        )
        .unwrap();
        let d = DecisionPayload {
            payment_id: "REQ-1".into(),
            update_at: 1,
            reason_failed: None,
            status: CheckStatus::SanctionCheck,
            check_failed: false,
        };
        let Value::Record(fields) = decision_to_avro(&d, &writer).unwrap() else {
            panic!("not a record");
        };
        assert_eq!(fields[2].1, Value::Union(1, Box::new(Value::Null)));
        assert_eq!(fields[3].1, Value::Enum(1, "SANCTION_CHECK".into()));
    }
}
