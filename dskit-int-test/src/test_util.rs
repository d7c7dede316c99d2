use dskit::client::{InMemoryConnector, MapEnv};
use dskit::context::Context;
use dskit::dynamic::{DsKit, KindRegistry};
use dskit::errors::{DsError, DsResult, ErrorKind};
use dskit::store::memory::{IdAllocation, MemoryStoreConfig};
use dskit::store::Datastore;
use std::backtrace::Backtrace;
use std::time::{Duration, Instant};
use std::thread;

/// Runs a test between a setup and a teardown step, retrying a few times.
///
/// `after` runs even when the test fails. A test that panics or keeps
/// failing after the last attempt fails the calling test with the last error.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DsResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> DsResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DsResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();
        let failure = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_backtrace = Some(Backtrace::capture().to_string());
                format!("Panic: {}", msg)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", failure);
            eprintln!("Retrying in {}ms...\n", 50 * attempt);
            thread::sleep(Duration::from_millis(50 * attempt as u64));
        }
        last_error = Some(failure);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A client over its own in-memory store, plus a registry for the dynamic
/// façade.
#[derive(Clone)]
pub struct TestContext {
    project_id: String,
    client: Datastore,
    registry: KindRegistry,
}

impl TestContext {
    pub fn new(project_id: String, client: Datastore) -> Self {
        Self {
            project_id,
            client,
            registry: KindRegistry::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn client(&self) -> &Datastore {
        &self.client
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// A dynamic façade sharing this context's client and registry.
    pub fn kit(&self) -> DsKit {
        DsKit::new(&self.client, self.registry.clone())
    }

    /// A fresh background context for one call chain.
    pub fn ctx(&self) -> Context {
        Context::background()
    }
}

pub fn random_project_id() -> String {
    format!("int-test-{}", uuid::Uuid::new_v4())
}

/// Opens a client with sequential ids and the default batch size.
pub fn create_test_context() -> DsResult<TestContext> {
    open_context(MemoryStoreConfig::new().with_id_allocation(IdAllocation::Sequential))
}

/// Opens a client whose queries return at most `batch_size` rows per batch,
/// so multi-batch scans are exercised with little data.
pub fn create_small_batch_context(batch_size: usize) -> DsResult<TestContext> {
    open_context(
        MemoryStoreConfig::new()
            .with_batch_size(batch_size)
            .with_id_allocation(IdAllocation::Sequential),
    )
}

fn open_context(config: MemoryStoreConfig) -> DsResult<TestContext> {
    let project_id = random_project_id();
    let client = Datastore::builder()
        .environment(MapEnv::new())
        .project_id(&project_id)
        .connector(InMemoryConnector::new(config))
        .open(&Context::background())?;
    log::debug!("created test context for {}", project_id);
    Ok(TestContext::new(project_id, client))
}

/// Closes the context's client.
pub fn cleanup(ctx: TestContext) -> DsResult<()> {
    if ctx.client.is_closed() {
        return Err(DsError::new(
            &format!("client of {} closed twice", ctx.project_id),
            ErrorKind::StoreAlreadyClosed,
        ));
    }
    ctx.client.close()
}
