/*! Integration tests for Covalent.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * Modules:
 * - ingest: ingestion, idempotence, gaps and signature failures
 * - convergence: delivery-order independence for every value type
 * - auth: roles evaluated at causal position
 * - encryption: read keys, delivery, rotation and sealing
 * - materialize: lazy and incremental strategies agree
 * - sync: exchanges between nodes, retries and resumption
 * - subscription: batching and cancellation
 * - storage: eviction, reload and file persistence
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("covalent=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod convergence;
mod encryption;
mod ingest;
mod materialize;
mod storage;
mod subscription;
mod sync;
