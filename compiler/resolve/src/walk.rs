use crate::{
    context::{InstantiationScope, ResolveContext},
    lookup::{lookup_member, unwrap_alias_template, Lookup, Owner, Step},
    Declaration, Driver, TemplateArgument, Type,
};

pub(crate) fn resolve<D: Driver>(driver: &D, r#type: &Type<D>) -> Type<D> {
    let mut context = ResolveContext::new(driver);
    resolve_type(r#type, &mut context)
}

/// Resolve every member access inside `r#type` and desugar aliases.
pub(crate) fn resolve_type<D: Driver>(r#type: &Type<D>, context: &mut ResolveContext<'_, D>) -> Type<D> {
    match r#type {
        Type::Unknown | Type::Builtin(_) | Type::Parameter(_) => r#type.clone(),
        Type::Typedef(path) => match context.driver.get_declaration(path).item {
            Declaration::TypeAlias(alias) => context
                .guarded(r#type, None, |context| resolve_type(&alias.r#type, context))
                .unwrap_or_else(|| r#type.clone()),
            _ => r#type.clone(),
        },
        Type::Specialization {
            template,
            arguments,
            qualifier,
        } => {
            let resolved = Type::Specialization {
                template: template.clone(),
                arguments: resolve_arguments(arguments, context),
                qualifier: qualifier
                    .as_ref()
                    .map(|qualifier| Box::new(resolve_type(qualifier, context))),
            };

            match unwrap_alias_template(&resolved, context) {
                Some((alias, aliased)) => {
                    let _scope = InstantiationScope::enter(context.driver, &alias);

                    context
                        .guarded(&resolved, None, |context| resolve_type(&aliased, context))
                        .unwrap_or(resolved)
                }
                None => resolved,
            }
        }
        Type::Member { .. } => resolve_member(r#type, context),
        Type::Pointer(r#type) => Type::Pointer(Box::new(resolve_type(r#type, context))),
        Type::LValueReference(r#type) => {
            Type::LValueReference(Box::new(resolve_type(r#type, context)))
        }
        Type::RValueReference(r#type) => {
            Type::RValueReference(Box::new(resolve_type(r#type, context)))
        }
        Type::Const(r#type) => Type::Const(Box::new(resolve_type(r#type, context))),
        Type::Expansion(pattern) => Type::Expansion(Box::new(resolve_type(pattern, context))),
    }
}

fn resolve_arguments<D: Driver>(
    arguments: &[TemplateArgument<D>],
    context: &mut ResolveContext<'_, D>,
) -> Vec<TemplateArgument<D>> {
    arguments
        .iter()
        .map(|argument| match argument {
            TemplateArgument::Type(r#type) => TemplateArgument::Type(resolve_type(r#type, context)),
            TemplateArgument::Template(_) => argument.clone(),
            TemplateArgument::Pack(elements) => {
                TemplateArgument::Pack(resolve_arguments(elements, context))
            }
        })
        .collect()
}

/// Split `Q::a::b::c` into `Q` and `[a, b, c]`.
fn decompose<D: Driver>(r#type: &Type<D>) -> (Type<D>, Vec<Step<D>>) {
    let mut steps = Vec::new();
    let mut current = r#type;

    while let Type::Member {
        qualifier,
        name,
        template_keyword,
        arguments,
    } = current
    {
        steps.push(Step {
            name: name.clone(),
            template_keyword: *template_keyword,
            arguments: arguments.clone(),
        });

        current = qualifier;
    }

    steps.reverse();

    (current.clone(), steps)
}

fn resolve_member<D: Driver>(r#type: &Type<D>, context: &mut ResolveContext<'_, D>) -> Type<D> {
    let (root, steps) = decompose(r#type);

    let steps = steps
        .into_iter()
        .map(|step| Step {
            arguments: step
                .arguments
                .map(|arguments| resolve_arguments(&arguments, context)),
            ..step
        })
        .collect::<Vec<_>>();

    let mut owner = resolve_type(&root, context);

    for (index, step) in steps.iter().enumerate() {
        tracing::trace!(?owner, name = %step.name, "resolving member");

        match resolve_step(&owner, step, context) {
            Some(next) => owner = next,
            None => {
                tracing::debug!(?owner, name = %step.name, "could not resolve member");

                return steps[index..]
                    .iter()
                    .fold(owner, |qualifier, step| step.qualify(qualifier));
            }
        }
    }

    owner
}

/// Look up `step` in `owner` and resolve the result, or return `None` if the
/// member can't be followed.
fn resolve_step<D: Driver>(
    owner: &Type<D>,
    step: &Step<D>,
    context: &mut ResolveContext<'_, D>,
) -> Option<Type<D>> {
    let owner = Owner::enter(owner, context)?;
    let _scope = InstantiationScope::enter(context.driver, &owner.scope);

    context
        .guarded(&owner.r#type, Some(step), |context| {
            match lookup_member(&owner, step, context) {
                Lookup::Found(member) => Some(resolve_type(&member, context)),
                Lookup::Opaque | Lookup::Missing => None,
            }
        })
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AliasTemplateDeclaration, ClassDeclaration, Parameter, SpecializationPattern,
        TemplateName, TemplateParameter, TypeAliasDeclaration,
    };
    use std::cell::Cell;
    use tmpl_util::WithInfo;

    /// `template <typename T> struct A { using self = A<T>; using type = list<T>; using loop = typename A<T>::loop; };`
    /// `template <typename U> struct B : A<U> {};`
    /// `template <typename V> using C = A<V>;`
    #[derive(Default)]
    struct TestDriver {
        depth: Cell<u32>,
        deepest: Cell<u32>,
        pushes: Cell<u32>,
    }

    fn parameter(path: &'static str) -> Parameter<TestDriver> {
        Parameter {
            path: path.to_string(),
            depth: 0,
            index: 0,
            pack: false,
        }
    }

    fn specialization(template: &'static str, argument: Type<TestDriver>) -> Type<TestDriver> {
        Type::Specialization {
            template: TemplateName::Declared(template.to_string()),
            arguments: vec![TemplateArgument::Type(argument)],
            qualifier: None,
        }
    }

    fn member(qualifier: Type<TestDriver>, name: &str) -> Type<TestDriver> {
        Type::Member {
            qualifier: Box::new(qualifier),
            name: name.to_string(),
            template_keyword: false,
            arguments: None,
        }
    }

    fn class(path: &'static str) -> ClassDeclaration<TestDriver> {
        ClassDeclaration {
            parameters: vec![TemplateParameter {
                parameter: parameter(path),
                default: None,
            }],
            defined: true,
        }
    }

    fn x() -> Type<TestDriver> {
        Type::Parameter(parameter("X"))
    }

    impl Driver for TestDriver {
        type Info = ();
        type Path = String;

        fn recursion_limit(&self) -> u32 {
            16
        }

        fn paths_are_equal(&self, left: &Self::Path, right: &Self::Path) -> bool {
            left == right
        }

        fn get_declaration(&self, path: &Self::Path) -> WithInfo<(), Declaration<Self>> {
            let t = || Type::Parameter(parameter("T"));

            let item = match path.as_str() {
                "A" => Declaration::Class(class("T")),
                "B" => Declaration::Class(class("U")),
                "C" => Declaration::AliasTemplate(AliasTemplateDeclaration {
                    parameters: class("V").parameters,
                    r#type: specialization("A", Type::Parameter(parameter("V"))),
                }),
                "A::self" => Declaration::TypeAlias(TypeAliasDeclaration {
                    r#type: specialization("A", t()),
                }),
                "A::type" => Declaration::TypeAlias(TypeAliasDeclaration {
                    r#type: specialization("list", t()),
                }),
                "A::loop" => Declaration::TypeAlias(TypeAliasDeclaration {
                    r#type: member(specialization("A", t()), "loop"),
                }),
                _ => Declaration::Opaque,
            };

            WithInfo { info: (), item }
        }

        fn lookup_members(&self, scope: &Self::Path, name: &str) -> Vec<Self::Path> {
            match (scope.as_str(), name) {
                ("A", "self") => vec![String::from("A::self")],
                ("A", "type") => vec![String::from("A::type")],
                ("A", "loop") => vec![String::from("A::loop")],
                _ => Vec::new(),
            }
        }

        fn partial_specializations(
            &self,
            _template: &Self::Path,
        ) -> Vec<WithInfo<(), SpecializationPattern<Self>>> {
            Vec::new()
        }

        fn base_specifiers(&self, scope: &Self::Path) -> Vec<WithInfo<(), Type<Self>>> {
            match scope.as_str() {
                "B" => vec![WithInfo {
                    info: (),
                    item: specialization("A", Type::Parameter(parameter("U"))),
                }],
                _ => Vec::new(),
            }
        }

        fn push_instantiation_context(&self, _entity: &Self::Path) {
            self.depth.set(self.depth.get() + 1);
            self.deepest.set(self.deepest.get().max(self.depth.get()));
            self.pushes.set(self.pushes.get() + 1);
        }

        fn pop_instantiation_context(&self) {
            self.depth.set(self.depth.get() - 1);
        }
    }

    #[test]
    fn decompose_splits_qualifier_chains() {
        let (root, steps) = decompose(&member(member(specialization("A", x()), "self"), "type"));

        assert_eq!(root, specialization("A", x()));
        assert_eq!(
            steps.iter().map(|step| step.name.as_str()).collect::<Vec<_>>(),
            ["self", "type"]
        );
    }

    #[test]
    fn self_references_resolve_for_any_length() {
        let driver = TestDriver::default();

        for length in 0..8 {
            let mut r#type = specialization("A", x());
            for _ in 0..length {
                r#type = member(r#type, "self");
            }

            let resolved = resolve(&driver, &member(r#type, "type"));
            assert_eq!(resolved, specialization("list", x()));
        }

        assert_eq!(driver.depth.get(), 0);
    }

    #[test]
    fn members_are_found_through_bases_and_aliases() {
        let driver = TestDriver::default();

        assert_eq!(
            resolve(&driver, &member(specialization("B", x()), "type")),
            specialization("list", x())
        );

        assert_eq!(
            resolve(&driver, &member(specialization("C", x()), "type")),
            specialization("list", x())
        );

        assert!(driver.pushes.get() > 0);
        assert_eq!(driver.depth.get(), 0);
    }

    #[test]
    fn bases_and_aliases_enter_their_own_instantiation_contexts() {
        let driver = TestDriver::default();

        resolve(&driver, &member(specialization("B", x()), "type"));
        assert_eq!(driver.deepest.get(), 2);
        assert_eq!(driver.depth.get(), 0);

        let driver = TestDriver::default();

        resolve(&driver, &member(specialization("C", x()), "type"));
        assert_eq!(driver.pushes.get(), 2);
        assert_eq!(driver.depth.get(), 0);
    }

    #[test]
    fn cycles_return_the_unresolved_member() {
        let driver = TestDriver::default();
        let r#type = member(specialization("A", x()), "loop");

        assert_eq!(resolve(&driver, &r#type), r#type);
        assert_eq!(driver.depth.get(), 0);
    }

    #[test]
    fn failed_lookups_keep_the_remaining_steps() {
        let driver = TestDriver::default();
        let r#type = member(member(specialization("A", x()), "missing"), "type");

        assert_eq!(resolve(&driver, &r#type), r#type);

        let dependent = member(x(), "type");
        assert_eq!(resolve(&driver, &dependent), dependent);
    }
}
