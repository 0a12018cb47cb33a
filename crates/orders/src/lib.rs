//! SKU order reprocessing domain.
//!
//! Typed view of the documents stored in `som-orders` and the
//! [`OrderSchema`] used by the generic orchestrator. Pure: no IO.

pub mod sku_order;

pub use sku_order::{
    Envelope, OrderSchema, OrderSyncStatus, SkuOrderDocument, SkuOrderEnvelope, SkuOrderMessage,
    WrappedSkuOrder, SKU_ORDER_GROUP,
};
