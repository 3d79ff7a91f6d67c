//! Confluent-framed Avro codec for payments and screening decisions.

mod codec;
mod convert;
mod error;
pub mod framing;
pub mod registry;

pub use codec::{WireCodec, DECISION_SCHEMA, PAYMENT_SCHEMA};
pub use error::{CodecError, RegistryError};
pub use registry::{HttpSchemaRegistry, InMemoryRegistry, RegisteredSchema, SchemaRegistry};
