//! Tokio runtime and mock collector shared across BDD steps.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use rstest_bdd::Slot;
use tokio::runtime::{Builder, Runtime};
use wiremock::MockServer;

/// Runtime handle cheap enough to clone into each step.
#[derive(Clone)]
pub struct SharedRuntime(Rc<RefCell<Runtime>>);

impl SharedRuntime {
    fn build() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self(Rc::new(RefCell::new(runtime))))
    }

    /// Drives `future` to completion on the scenario runtime.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.0.borrow().block_on(future)
    }
}

/// Lazily creates the scenario runtime and the mock collector endpoint.
///
/// # Errors
///
/// Returns an error when the runtime cannot be built.
pub fn ensure_runtime_and_server(
    runtime_slot: &Slot<SharedRuntime>,
    collector_slot: &Slot<MockServer>,
) -> io::Result<SharedRuntime> {
    let runtime = match runtime_slot.get() {
        Some(existing) => existing,
        None => {
            let created = SharedRuntime::build()?;
            runtime_slot.set(created.clone());
            created
        }
    };

    if collector_slot.with_ref(|_| ()).is_none() {
        collector_slot.set(runtime.block_on(MockServer::start()));
    }

    Ok(runtime)
}
