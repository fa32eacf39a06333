pub mod dynamodb;
pub mod kv_store;
pub mod memory;
pub mod messaging;
pub mod object_store;
pub mod s3;
pub mod ses;
pub mod sns;

use std::future::Future;

/// Drives an SDK future from the synchronous adapter traits. Requires the
/// multi-threaded tokio runtime the binaries start.
pub(crate) fn run_blocking<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
