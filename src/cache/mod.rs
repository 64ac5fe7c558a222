//! Cache requests and key resolution
//!
//! A run restores the artifact stored under its primary key if one exists,
//! otherwise the newest artifact under the first restore-key prefix that
//! matches anything.
//!
//! | Result | cache-hit | Save phase |
//! |--------|-----------|------------|
//! | Exact match | true | skipped |
//! | Prefix match | false | persists primary key |
//! | No match | false | persists primary key |

pub mod request;
pub mod resolver;

pub use request::{validate_key, CacheRequest};
pub use resolver::{resolve, ResolutionResult};
