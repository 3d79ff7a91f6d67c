use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::Schema;
use sanction_api::{DecisionPayload, PaymentPayload};
use tokio::sync::RwLock;

use crate::convert::{decision_from_avro, decision_to_avro, payment_from_avro, payment_to_avro};
use crate::registry::{value_subject, SchemaRegistry};
use crate::{framing, CodecError};

/// Схема `com.example.schema.avro.Payment` (reader входного topic'а).
pub const PAYMENT_SCHEMA: &str = include_str!("../schemas/payment.avsc");
/// Схема `com.example.schema.avro.UpdatePayment` (writer выходного topic'а).
pub const DECISION_SCHEMA: &str = include_str!("../schemas/update-payment.avsc");

#[derive(Clone)]
struct WriterHandle {
    id: u32,
    schema: Arc<Schema>,
}

/// Avro codec over Confluent-framed records.
///
/// Схемы кэшируются на всё время жизни процесса и не вытесняются:
/// decode: по (topic, schema id) из заголовка фрейма,
/// encode: по (topic, record name) → (id, схема subject'а `<topic>-value`).
/// Недоступность registry влияет только на ещё не закэшированные схемы.
pub struct WireCodec {
    registry: Arc<dyn SchemaRegistry>,
    auto_register: bool,
    readers: RwLock<HashMap<(String, u32), Arc<Schema>>>,
    writers: RwLock<HashMap<(String, &'static str), WriterHandle>>,
}

impl WireCodec {
    /// `auto_register = false` encodes with the subject's latest registered
    /// schema instead of registering the embedded one.
    pub fn new(registry: Arc<dyn SchemaRegistry>, auto_register: bool) -> Self {
        Self {
            registry,
            auto_register,
            readers: RwLock::new(HashMap::new()),
            writers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn decode(&self, topic: &str, frame: &[u8]) -> Result<PaymentPayload, CodecError> {
        let value = self.read_datum(topic, frame).await?;
        payment_from_avro(value)
    }

    pub async fn encode(
        &self,
        topic: &str,
        decision: &DecisionPayload,
    ) -> Result<Vec<u8>, CodecError> {
        let writer = self.writer(topic, "UpdatePayment", DECISION_SCHEMA).await?;
        let value = decision_to_avro(decision, &writer.schema)?;
        write_datum(&writer, value)
    }

    /// Payment encoder for tooling that feeds the input topic.
    pub async fn encode_payment(
        &self,
        topic: &str,
        payment: &PaymentPayload,
    ) -> Result<Vec<u8>, CodecError> {
        let writer = self.writer(topic, "Payment", PAYMENT_SCHEMA).await?;
        let value = payment_to_avro(payment, &writer.schema)?;
        write_datum(&writer, value)
    }

    /// Decoder for the output topic, used by downstream tooling.
    pub async fn decode_decision(
        &self,
        topic: &str,
        frame: &[u8],
    ) -> Result<DecisionPayload, CodecError> {
        let value = self.read_datum(topic, frame).await?;
        decision_from_avro(value)
    }

    async fn read_datum(
        &self,
        topic: &str,
        frame: &[u8],
    ) -> Result<apache_avro::types::Value, CodecError> {
        let (id, mut datum) = framing::split(frame)?;
        let schema = self.schema_by_id(topic, id).await?;
        let value =
            apache_avro::from_avro_datum(&schema, &mut datum, None).map_err(CodecError::Decode)?;
        if !datum.is_empty() {
            return Err(CodecError::TrailingBytes(datum.len()));
        }
        Ok(value)
    }

    async fn schema_by_id(&self, topic: &str, id: u32) -> Result<Arc<Schema>, CodecError> {
        let key = (topic.to_string(), id);
        if let Some(schema) = self.readers.read().await.get(&key) {
            return Ok(schema.clone());
        }

        let definition = self.registry.schema_by_id(id).await?;
        let schema = Schema::parse_str(&definition)
            .map(Arc::new)
            .map_err(|source| CodecError::Schema { id, source })?;
        tracing::info!(topic, schema_id = id, "reader schema cached");
        self.readers.write().await.insert(key, schema.clone());
        Ok(schema)
    }

    async fn writer(
        &self,
        topic: &str,
        record: &'static str,
        embedded: &'static str,
    ) -> Result<WriterHandle, CodecError> {
        let key = (topic.to_string(), record);
        if let Some(handle) = self.writers.read().await.get(&key) {
            return Ok(handle.clone());
        }

        let subject = value_subject(topic);
        let (id, definition) = if self.auto_register {
            let id = self.registry.register(&subject, embedded).await?;
            (id, embedded.to_string())
        } else {
            let latest = self.registry.latest(&subject).await?;
            (latest.id, latest.schema)
        };
        let schema = Schema::parse_str(&definition)
            .map(Arc::new)
            .map_err(|source| CodecError::Schema { id, source })?;
        tracing::info!(topic, %subject, schema_id = id, "writer schema cached");

        let handle = WriterHandle { id, schema };
        self.writers.write().await.insert(key, handle.clone());
        Ok(handle)
    }
}

fn write_datum(
    writer: &WriterHandle,
    value: apache_avro::types::Value,
) -> Result<Vec<u8>, CodecError> {
    let datum = apache_avro::to_avro_datum(&writer.schema, value).map_err(CodecError::Encode)?;
    Ok(framing::frame(writer.id, &datum))
}
