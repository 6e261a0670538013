//! `pitstop-inventory`: the stock ledger.
//!
//! Each part kept on the shelf is a `StockItem` aggregate whose event
//! stream is the ledger: receipts, consumptions, and restocks are immutable
//! transaction records, and quantity-on-hand is the fold over them. The
//! aggregate rejects any consumption that would drive on-hand negative.

pub mod category;
pub mod item;

pub use category::{
    Category, CategoryCommand, CategoryCreated, CategoryEvent, CategoryId, CategoryRenamed,
    CreateCategory, RenameCategory,
};
pub use item::{
    AttributeField, ConsumeStock, CreateItem, ItemCreated, ReceiveStock, RestockReturn, StockItem,
    StockItemCommand, StockItemEvent, StockItemId, StockConsumed, StockReceived, StockRestocked,
};
