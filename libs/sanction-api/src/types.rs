use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Broker records
// ════════════════════════════════════════════════════════════════

/// Заголовок записи брокера. Порядок заголовков сохраняется.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: Some(value.into()) }
    }

    /// Значение как UTF-8 строка (None если пусто или не UTF-8).
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_deref().and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Запись, прочитанная из входного topic'а.
///
/// Неизменяема после чтения. Принадлежит циклу pipeline на время
/// одной итерации и логически освобождается при commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<RecordHeader>,
}

impl InboundRecord {
    /// Первое значение заголовка с данным ключом (case-sensitive).
    pub fn header(&self, key: &str) -> Option<&RecordHeader> {
        self.headers.iter().find(|h| h.key == key)
    }
}

/// Запись для публикации в выходной topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<RecordHeader>,
}

/// Подтверждение доставки от брокера.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

// ════════════════════════════════════════════════════════════════
//  Payment
// ════════════════════════════════════════════════════════════════

/// Сумма decimal(18, 2): big-endian two's-complement байты unscaled
/// целого. Никогда не переводится во float.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScaledAmount {
    bytes: Vec<u8>,
}

impl ScaledAmount {
    pub const PRECISION: usize = 18;
    pub const SCALE: u32 = 2;

    pub fn from_be_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Минимальное two's-complement представление (как Java BigInteger).
    pub fn from_unscaled(value: i64) -> Self {
        let full = value.to_be_bytes();
        let mut start = 0;
        while start < full.len() - 1 {
            let (b, next) = (full[start], full[start + 1]);
            let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        Self { bytes: full[start..].to_vec() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Unscaled значение, если помещается в i128.
    pub fn unscaled(&self) -> Option<i128> {
        if self.bytes.is_empty() || self.bytes.len() > 16 {
            return None;
        }
        let fill = if self.bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
        let mut buf = [fill; 16];
        buf[16 - self.bytes.len()..].copy_from_slice(&self.bytes);
        Some(i128::from_be_bytes(buf))
    }
}

impl std::fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.unscaled() {
            Some(v) => {
                let divisor = 10i128.pow(Self::SCALE);
                let sign = if v < 0 { "-" } else { "" };
                let abs = v.unsigned_abs();
                let divisor = divisor as u128;
                write!(f, "{sign}{}.{:02}", abs / divisor, abs % divisor)
            }
            None => write!(f, "<{} bytes>", self.bytes.len()),
        }
    }
}

/// Платёжное событие (входной payload).
///
/// Все поля обязательны, отсутствие поля является ошибкой декодирования.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentPayload {
    pub request_id: String,
    /// timestamp-millis.
    pub created_at: i64,
    pub status: String,
    pub total: ScaledAmount,
    pub username_from: String,
    pub username_from_address: String,
    pub username_to: String,
    pub username_to_address: String,
}

impl PaymentPayload {
    /// Четыре поля идентичности, участвующие в screening.
    pub fn identity_fields(&self) -> [&str; 4] {
        [
            &self.username_from,
            &self.username_from_address,
            &self.username_to,
            &self.username_to_address,
        ]
    }
}

// ════════════════════════════════════════════════════════════════
//  Decision
// ════════════════════════════════════════════════════════════════

/// Тип проверки, к которому относится решение.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    SanctionCheck,
    AuthCheck,
    UserConfirmationCheck,
}

impl CheckStatus {
    /// Символы в порядке объявления enum'а в схеме.
    pub const SYMBOLS: [&'static str; 3] = ["SANCTION_CHECK", "AUTH_CHECK", "USER_CONFIRMATION_CHECK"];

    pub fn as_str(&self) -> &'static str {
        Self::SYMBOLS[self.index()]
    }

    pub fn index(&self) -> usize {
        match self {
            CheckStatus::SanctionCheck => 0,
            CheckStatus::AuthCheck => 1,
            CheckStatus::UserConfirmationCheck => 2,
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "SANCTION_CHECK" => Some(CheckStatus::SanctionCheck),
            "AUTH_CHECK" => Some(CheckStatus::AuthCheck),
            "USER_CONFIRMATION_CHECK" => Some(CheckStatus::UserConfirmationCheck),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Решение screening'а (выходной payload).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionPayload {
    /// Совпадает с `PaymentPayload::request_id`.
    pub payment_id: String,
    /// timestamp-millis.
    pub update_at: i64,
    /// Только при `check_failed == true`.
    pub reason_failed: Option<String>,
    pub status: CheckStatus,
    pub check_failed: bool,
}
