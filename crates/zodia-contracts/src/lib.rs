pub mod audit;
pub mod errors;
pub mod modes;
pub mod naming;
pub mod receipts;
pub mod request;
pub mod signs;

pub use audit::{AuditLog, AuditPayload};
pub use errors::GenerationError;
pub use modes::GenerationMode;
pub use naming::output_filename;
pub use receipts::{write_receipt, CostReceipt, RECEIPT_SCHEMA_VERSION};
pub use request::{GenerationRequest, GenerationResult};
pub use signs::{Category, ZodiacSign};
