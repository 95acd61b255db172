//! Persistent ledger entities.

pub mod enums;
pub mod item;
pub mod stock_batch;
pub mod stock_receipt;
pub mod stock_removal;
pub mod stock_transfer;
pub mod stock_transfer_line;

pub use enums::{BatchSource, ItemLocation, Location, RemovalReason, TransferDirection, UnitOfMeasure};
