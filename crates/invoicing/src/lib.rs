//! `pitstop-invoicing`: booking settlement and invoice documents.
//!
//! Settlement prices a booking: service lines at catalog price, parts lines
//! at retail price unless they are bundled with a service. The invoice
//! document is the printable rendition of a settlement plus header data.

pub mod document;
pub mod settlement;

pub use document::{InvoiceDocument, InvoiceHeader, InvoiceRow};
pub use settlement::{PriceBook, Settlement, SettlementLine, SettlementLineKind, StaticPriceBook};
