// Cache module for on-disk result storage.
// Path layout, key digests, and the JSON entry store used by `Stash`.

pub mod canonical;
pub mod digest;
pub mod paths;
pub mod store;

pub use digest::{FunctionId, digest_args, digest_source};
pub use paths::{APP_NAME, default_base_dir};
pub use store::{StashedValue, read_stashed, write_stashed};
