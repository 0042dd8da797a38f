use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static TENANT_SLOT: RefCell<Option<String>>;
}

thread_local! {
    static FALLBACK_SLOT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Ambient tenant identifier, scoped per logical task.
///
/// Inside a [`TenantContext::scope`] the identifier lives in a task-local
/// slot: spawned subtasks wrapped in their own scope inherit the value at
/// spawn time and later changes stay within the originating subtree. Outside
/// any scope (synchronous callers, tests) a thread-local slot is used
/// instead. The entity manager and the SQL generator only ever read
/// [`TenantContext::current`]; switching tenants between operations is
/// expected.
pub struct TenantContext;

impl TenantContext {
    /// Establish a tenant slot around `future`, seeded with the caller's
    /// current value.
    pub async fn scope<F: Future>(future: F) -> F::Output {
        let inherited = Self::current();
        TENANT_SLOT.scope(RefCell::new(inherited), future).await
    }

    pub fn set(tenant: impl Into<String>) {
        let tenant = tenant.into();
        let result = TENANT_SLOT.try_with(|slot| *slot.borrow_mut() = Some(tenant.clone()));
        if result.is_err() {
            FALLBACK_SLOT.with(|slot| *slot.borrow_mut() = Some(tenant));
        }
    }

    pub fn clear() {
        let result = TENANT_SLOT.try_with(|slot| slot.borrow_mut().take());
        if result.is_err() {
            FALLBACK_SLOT.with(|slot| slot.borrow_mut().take());
        }
    }

    pub fn current() -> Option<String> {
        TENANT_SLOT
            .try_with(|slot| slot.borrow().clone())
            .unwrap_or_else(|_| FALLBACK_SLOT.with(|slot| slot.borrow().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_current_outside_any_scope() {
        TenantContext::clear();
        assert_eq!(TenantContext::current(), None);
        TenantContext::set("acme-corp");
        assert_eq!(TenantContext::current(), Some("acme-corp".to_string()));
        TenantContext::set("contoso-ltd");
        assert_eq!(TenantContext::current(), Some("contoso-ltd".to_string()));
        TenantContext::clear();
        assert_eq!(TenantContext::current(), None);
    }

    #[tokio::test]
    async fn scopes_isolate_sibling_tasks() {
        TenantContext::clear();
        let first = TenantContext::scope(async {
            TenantContext::set("acme-corp");
            TenantContext::current()
        })
        .await;
        let second = TenantContext::scope(async { TenantContext::current() }).await;
        assert_eq!(first, Some("acme-corp".to_string()));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn nested_scope_inherits_then_diverges() {
        TenantContext::clear();
        TenantContext::scope(async {
            TenantContext::set("acme-corp");
            let inner = TenantContext::scope(async {
                let inherited = TenantContext::current();
                TenantContext::set("contoso-ltd");
                (inherited, TenantContext::current())
            })
            .await;
            assert_eq!(inner.0, Some("acme-corp".to_string()));
            assert_eq!(inner.1, Some("contoso-ltd".to_string()));
            // The inner scope's switch does not leak back out.
            assert_eq!(TenantContext::current(), Some("acme-corp".to_string()));
        })
        .await;
    }
}
