pub mod record;
pub mod region;
pub mod secret;

pub use record::{CredentialParams, CredentialRecord, CredentialScope, EncryptionContext};
pub use region::Region;
pub use secret::SecretValue;
