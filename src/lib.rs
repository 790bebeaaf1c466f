//! Memoize function results to a directory on disk.
//!
//! A [`Stash`] owns a base directory, chosen automatically (the user's cache
//! directory, e.g. `~/.cache/bamboo-stash`) or given explicitly. Wrapping a
//! function with [`Stash::wrap`] or the [`stashed!`] macro returns a
//! [`Stashed`] whose calls are answered from disk when the same function,
//! unchanged, was already called with equal arguments, in this run or an
//! earlier one.
//!
//! ```no_run
//! use bamboo_stash::{Stash, stashed};
//!
//! let stash = Stash::new()?;
//! println!("{}", stash.base_dir().display());
//!
//! let slow_square = stashed!(stash, fn slow_square(n: u64) -> u64 {
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     n * n
//! });
//!
//! assert_eq!(slow_square.call((12,))?, 144); // computed
//! assert_eq!(slow_square.call((12,))?, 144); // read back from disk
//! # Ok::<(), bamboo_stash::StashError>(())
//! ```
//!
//! Entries live at `<base_dir>/<function name>/<source digest>/<args digest>.json`.

pub mod cache;
pub mod config;
pub mod error;
pub mod stash;

pub use cache::{FunctionId, StashedValue};
pub use config::{STASH_DIR_ENV, StashConfig};
pub use error::{Result, StashError};
pub use stash::{FunctionUsage, Stash, Stashed};

/// Define a function inline and wrap it with a [`Stash`].
///
/// The function's identity is its module path, its name, and its source text,
/// so editing the body starts a fresh set of results. The returned
/// [`Stashed`] takes the arguments as a tuple. Parameters are `name: Type` or
/// `mut name: Type`; generics and pattern parameters are not accepted.
#[macro_export]
macro_rules! stashed {
    (@params $ctx:tt $attrs:tt $name:ident $ret:tt $body:block [$($done:tt)*]
        mut $arg:ident : $ty:ty $(, $($rest:tt)*)?
    ) => {
        $crate::stashed!(@params $ctx $attrs $name $ret $body
            [$($done)* [(mut) $arg $ty]] $($($rest)*)?)
    };
    (@params $ctx:tt $attrs:tt $name:ident $ret:tt $body:block [$($done:tt)*]
        $arg:ident : $ty:ty $(, $($rest:tt)*)?
    ) => {
        $crate::stashed!(@params $ctx $attrs $name $ret $body
            [$($done)* [() $arg $ty]] $($($rest)*)?)
    };
    (@params ($stash:expr) [$(#[$meta:meta])*] $name:ident [$ret:ty] $body:block
        [$([($($m:tt)?) $arg:ident $ty:ty])*]
    ) => {{
        $(#[$meta])*
        fn $name($($($m)? $arg: $ty),*) -> $ret $body

        $stash.wrap(
            $crate::FunctionId::new(
                concat!(module_path!(), "::", stringify!($name)),
                stringify!(fn $name($($($m)? $arg: $ty),*) -> $ret $body),
            ),
            |($($arg,)*): ($($ty,)*)| $name($($arg),*),
        )
    }};
    (
        $stash:expr,
        $(#[$meta:meta])*
        fn $name:ident($($params:tt)*) -> $ret:ty $body:block
    ) => {
        $crate::stashed!(@params ($stash) [$(#[$meta])*] $name [$ret] $body [] $($params)*)
    };
}
