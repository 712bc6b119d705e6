//! Contract types for the ledger HTTP API
//!
//! Request and response bodies shared by the routes and the services.

pub mod invoice_v1;
pub mod journal_entry_v1;
pub mod norma43_import_v1;
pub mod period_close_v1;

pub use invoice_v1::*;
pub use journal_entry_v1::*;
pub use norma43_import_v1::*;
pub use period_close_v1::*;
