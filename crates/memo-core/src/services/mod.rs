//! Service layer for study memos.
//!
//! - Orthanc (REST client for the remote catalog)
//! - Connectivity (reachability probe)
//! - Resolver (Study Instance UID → Orthanc id)
//! - MetadataStore (preferred remote channel)
//! - EmbeddedTagStore (legacy remote channel)
//! - Memo (tiered orchestration over the above and the local backup)

mod connectivity;
pub mod embedded_tags;
mod memo;
mod metadata_store;
mod orthanc;
mod resolver;

pub use connectivity::ConnectivityProbe;
pub use embedded_tags::EmbeddedTagStore;
pub use memo::MemoService;
pub use metadata_store::{MetadataStore, MEMO_METADATA_KEY};
pub use orthanc::OrthancClient;
pub use resolver::CatalogResolver;
