pub mod accounts;
pub mod answer;
pub mod attachments;
pub mod consultations;
pub mod expert;
pub mod settings;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use store::{AttachmentStore, AuthProvider, LocalStore, RemoteStore, StoreError};
