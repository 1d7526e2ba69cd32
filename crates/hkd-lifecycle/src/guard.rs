//! Hook invocation guards.
//!
//! A misbehaving hook never takes the driver down:
//! - `Err` or panic → the hook's documented default, logged at `error`
//! - confirmation past its budget → `false`, logged at `warn`

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use hkd_hooks::{HookKind, HookResult, StrategyHooks};
use tracing::{error, warn};

/// Run a synchronous hook, substituting `default` on error or panic.
pub(crate) fn call_hook<T>(
    kind: HookKind,
    pair: &str,
    default: T,
    f: impl FnOnce() -> HookResult<T>,
) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            error!(hook = %kind, pair, error = %e, "hook/failed; using default");
            default
        }
        Err(payload) => {
            error!(
                hook = %kind,
                pair,
                panic = %panic_message(payload.as_ref()),
                "hook/panicked; using default"
            );
            default
        }
    }
}

/// Run a confirmation hook on the blocking pool under `budget`.
///
/// The hook keeps running detached if it overruns; its answer is discarded.
pub(crate) async fn confirm_with_budget<R, F>(
    hooks: Arc<dyn StrategyHooks>,
    kind: HookKind,
    pair: &str,
    budget: Duration,
    req: R,
    f: F,
) -> bool
where
    R: Send + 'static,
    F: FnOnce(&dyn StrategyHooks, &R) -> HookResult<bool> + Send + 'static,
{
    const DEFAULT: bool = true;

    let task = tokio::task::spawn_blocking(move || f(hooks.as_ref(), &req));
    match tokio::time::timeout(budget, task).await {
        Ok(Ok(Ok(confirmed))) => confirmed,
        Ok(Ok(Err(e))) => {
            error!(hook = %kind, pair, error = %e, "hook/failed; using default");
            DEFAULT
        }
        Ok(Err(join)) => {
            error!(hook = %kind, pair, error = %join, "hook/panicked; using default");
            DEFAULT
        }
        Err(_) => {
            warn!(
                hook = %kind,
                pair,
                budget_ms = budget.as_millis() as u64,
                "hook/timeout; treated as denial"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkd_hooks::HookError;

    #[test]
    fn ok_passes_through() {
        assert_eq!(call_hook(HookKind::SizeStake, "BTC/USDT", 1.0, || Ok(2.0)), 2.0);
    }

    #[test]
    fn err_yields_default() {
        let v = call_hook(HookKind::SizeStake, "BTC/USDT", 1.0, || {
            Err(HookError::failed("boom"))
        });
        assert_eq!(v, 1.0);
    }

    #[test]
    fn panic_yields_default() {
        let v: bool = call_hook(HookKind::EntryTimeout, "BTC/USDT", false, || {
            panic!("strategy bug")
        });
        assert!(!v);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
