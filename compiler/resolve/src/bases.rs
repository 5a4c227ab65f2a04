use crate::{
    context::{InstantiationScope, ResolveContext},
    lookup::{lookup_member, Lookup, Owner, Step},
    walk, Driver,
};

/// Search the base classes of `owner` for `step`, depth-first in declaration
/// order. The first base that declares the member wins.
pub(crate) fn lookup_in_bases<D: Driver>(
    owner: &Owner<D>,
    step: &Step<D>,
    context: &mut ResolveContext<'_, D>,
) -> Lookup<D> {
    let driver = context.driver;

    for base in driver.base_specifiers(&owner.scope) {
        let base = owner.environment.substitute(driver, &base.item);
        let base = walk::resolve_type(&base, context);

        let Some(base_owner) = Owner::enter(&base, context) else {
            tracing::trace!(?base, "skipping base without a visible definition");
            continue;
        };

        let _scope = InstantiationScope::enter(driver, &base_owner.scope);

        let result = context.guarded(&base_owner.r#type, Some(step), |context| {
            lookup_member(&base_owner, step, context)
        });

        match result {
            Some(Lookup::Missing) | None => continue,
            Some(lookup) => return lookup,
        }
    }

    Lookup::Missing
}
