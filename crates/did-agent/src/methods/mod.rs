//! DID method implementations.
//!
//! Each method ships a [`DidProvider`](crate::did::DidProvider) that
//! anchors identifiers and a
//! [`MethodResolver`](crate::resolver::MethodResolver) that reads them
//! back. The network side is abstracted behind [`web::DocumentHost`] and
//! [`ledger::Ledger`].

pub mod ethr;
pub mod ledger;
pub mod web;

pub use ethr::{EthrDidProvider, EthrDidResolver, EthrNetwork};
pub use ledger::{InMemoryLedger, Ledger, LedgerMode};
pub use web::{DirectoryHost, DocumentHost, InMemoryHost, WebDidProvider, WebDidResolver};
