//! Local state: hash index, destination layout and path claims
//!
//! - [`index`]: the persistent [`HashStore`] of verified hashes
//! - [`policy`]: [`HashPolicy`] switches honored by the engine
//! - [`verification`]: chunked hashing of files and partial files
//! - [`layout`]: collision-free destination paths
//! - [`claims`]: per-destination mutual exclusion between workers

pub mod claims;
pub mod index;
pub mod layout;
pub mod policy;
pub mod verification;

pub use claims::{ClaimStatus, PathClaim, PathClaims};
pub use index::{DownloadRecord, FileIdentity, HashStore};
pub use layout::{sanitize_component, DestinationPlanner};
pub use policy::HashPolicy;
pub use verification::{hash_file, hash_prefix, hash_reader};
