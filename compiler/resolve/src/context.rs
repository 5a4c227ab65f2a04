use crate::{lookup::Step, Driver, Type};

/// State shared by every component during a single call to
/// [`resolve`](crate::resolve). Dropped when the call returns.
pub(crate) struct ResolveContext<'a, D: Driver> {
    pub driver: &'a D,
    recursion_limit: u32,
    recursion_stack: Vec<Active<D>>,
}

/// An owner whose member (or, for aliases, whose expansion) is currently
/// being resolved.
struct Active<D: Driver> {
    owner: Type<D>,
    step: Option<Step<D>>,
}

impl<'a, D: Driver> ResolveContext<'a, D> {
    pub fn new(driver: &'a D) -> Self {
        ResolveContext {
            driver,
            recursion_limit: driver.recursion_limit(),
            recursion_stack: Vec::new(),
        }
    }

    /// Run `f` with `(owner, step)` marked active. Returns `None` without
    /// running `f` if the same pair is already active, since resolving it
    /// again can't make progress, or if the recursion limit is reached.
    pub fn guarded<T>(
        &mut self,
        owner: &Type<D>,
        step: Option<&Step<D>>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> Option<T> {
        if self.recursion_stack.len() as u32 >= self.recursion_limit {
            tracing::debug!(
                limit = self.recursion_limit,
                ?owner,
                "recursion limit reached"
            );

            return None;
        }

        if self
            .recursion_stack
            .iter()
            .any(|active| active.owner == *owner && active.step.as_ref() == step)
        {
            tracing::debug!(?owner, ?step, "cycle detected");
            return None;
        }

        self.recursion_stack.push(Active {
            owner: owner.clone(),
            step: step.cloned(),
        });

        let result = f(self);

        self.recursion_stack.pop();

        Some(result)
    }
}

/// Keeps a synthetic instantiation context pushed on the driver for as long as
/// it's alive.
pub(crate) struct InstantiationScope<'a, D: Driver> {
    driver: &'a D,
}

impl<'a, D: Driver> InstantiationScope<'a, D> {
    pub fn enter(driver: &'a D, entity: &D::Path) -> Self {
        driver.push_instantiation_context(entity);
        InstantiationScope { driver }
    }
}

impl<D: Driver> Drop for InstantiationScope<'_, D> {
    fn drop(&mut self) {
        self.driver.pop_instantiation_context();
    }
}
