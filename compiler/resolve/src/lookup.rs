use crate::{
    bases, context::ResolveContext, specialize, Declaration, Driver, Environment, Frame,
    TemplateArgument, TemplateName, Type,
};
use derivative::Derivative;

/// One `::name` (or `::template name<Args>`) in a qualifier chain.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""), PartialEq(bound = ""))]
pub(crate) struct Step<D: Driver> {
    pub name: String,
    pub template_keyword: bool,
    pub arguments: Option<Vec<TemplateArgument<D>>>,
}

impl<D: Driver> Step<D> {
    /// Apply the step to `qualifier` without resolving it.
    pub fn qualify(&self, qualifier: Type<D>) -> Type<D> {
        Type::Member {
            qualifier: Box::new(qualifier),
            name: self.name.clone(),
            template_keyword: self.template_keyword,
            arguments: self.arguments.clone(),
        }
    }
}

/// A class specialization whose definition members are looked up in.
pub(crate) struct Owner<D: Driver> {
    /// The specialization as written, eg. `B<A<X>>`.
    pub r#type: Type<D>,

    /// The declaration whose members and bases apply: the primary template or
    /// the selected specialization.
    pub scope: D::Path,

    /// The bindings for the scope and every class enclosing it.
    pub environment: Environment<D>,
}

impl<D: Driver> Owner<D> {
    /// Enter the definition of the class specialization `r#type`. Returns
    /// `None` for anything that isn't a class with a visible definition.
    pub fn enter(r#type: &Type<D>, context: &ResolveContext<'_, D>) -> Option<Self> {
        let driver = context.driver;

        let Type::Specialization {
            template: TemplateName::Declared(template),
            arguments,
            qualifier,
        } = r#type
        else {
            return None;
        };

        let mut environment = match qualifier {
            Some(qualifier) => Owner::enter(qualifier, context)?.environment,
            None => Environment::new(),
        };

        let Declaration::Class(class) = driver.get_declaration(template).item else {
            return None;
        };

        let (scope, frame) =
            match specialize::select(driver, template, &class, arguments, &environment) {
                Some(selected) if selected.pattern.defined => (selected.pattern.path, selected.frame),
                Some(selected) => {
                    tracing::trace!(specialization = ?selected.pattern.path, "specialization has no definition");
                    return None;
                }
                None if class.defined => {
                    let frame =
                        Frame::from_arguments(driver, &class.parameters, arguments, &environment);

                    if !frame.binds_all(&class.parameters) {
                        tracing::trace!(?template, "arguments don't bind every parameter");
                        return None;
                    }

                    (template.clone(), frame)
                }
                None => {
                    tracing::trace!(?template, "class has no definition");
                    return None;
                }
            };

        environment.push(frame);

        Some(Owner {
            r#type: r#type.clone(),
            scope,
            environment,
        })
    }
}

/// The outcome of looking up a member.
pub(crate) enum Lookup<D: Driver> {
    /// The member names a type. The type still needs to be resolved.
    Found(Type<D>),

    /// The member exists but can't be used symbolically (eg. it's not a
    /// type, or it's a template used without arguments). Hides any members of
    /// the same name in base classes.
    Opaque,

    /// Neither the owner nor its bases declare the member.
    Missing,
}

/// Look up `step` in `owner`'s own members, falling back to its bases.
pub(crate) fn lookup_member<D: Driver>(
    owner: &Owner<D>,
    step: &Step<D>,
    context: &mut ResolveContext<'_, D>,
) -> Lookup<D> {
    let driver = context.driver;

    let members = driver.lookup_members(&owner.scope, &step.name);
    let Some(member) = members.first() else {
        return bases::lookup_in_bases(owner, step, context);
    };

    if members.len() > 1 {
        tracing::trace!(count = members.len(), name = %step.name, "using the first of several members");
    }

    let requires_template_keyword = owner.r#type.is_dependent() && !step.template_keyword;

    match driver.get_declaration(member).item {
        Declaration::TypeAlias(alias) => {
            if step.arguments.is_some() {
                tracing::debug!(name = %step.name, "template arguments given to a non-template alias");
                return Lookup::Opaque;
            }

            Lookup::Found(owner.environment.substitute(driver, &alias.r#type))
        }
        Declaration::AliasTemplate(alias) => {
            let Some(arguments) = &step.arguments else {
                tracing::debug!(name = %step.name, "alias template used without arguments");
                return Lookup::Opaque;
            };

            if requires_template_keyword {
                tracing::debug!(name = %step.name, "member template of a dependent type needs `template`");
                return Lookup::Opaque;
            }

            let mut environment = owner.environment.clone();
            let frame = Frame::from_arguments(driver, &alias.parameters, arguments, &environment);
            if !frame.binds_all(&alias.parameters) {
                tracing::trace!(name = %step.name, "arguments don't bind every alias parameter");
                return Lookup::Opaque;
            }

            environment.push(frame);

            Lookup::Found(environment.substitute(driver, &alias.r#type))
        }
        Declaration::Class(class) => {
            let arguments = match (&step.arguments, class.parameters.is_empty()) {
                (None, true) => Vec::new(),
                (Some(arguments), false) => {
                    if requires_template_keyword {
                        tracing::debug!(name = %step.name, "member template of a dependent type needs `template`");
                        return Lookup::Opaque;
                    }

                    arguments.clone()
                }
                _ => {
                    tracing::debug!(name = %step.name, "template arguments don't match the member class");
                    return Lookup::Opaque;
                }
            };

            Lookup::Found(Type::Specialization {
                template: TemplateName::Declared(member.clone()),
                arguments,
                qualifier: Some(Box::new(owner.r#type.clone())),
            })
        }
        Declaration::Opaque => Lookup::Opaque,
    }
}

/// If `r#type` is a specialization of an alias template, substitute its
/// arguments into the aliased type. Also returns the alias template's path
/// so the caller can enter its instantiation context.
pub(crate) fn unwrap_alias_template<D: Driver>(
    r#type: &Type<D>,
    context: &ResolveContext<'_, D>,
) -> Option<(D::Path, Type<D>)> {
    let driver = context.driver;

    let Type::Specialization {
        template: TemplateName::Declared(template),
        arguments,
        qualifier,
    } = r#type
    else {
        return None;
    };

    let Declaration::AliasTemplate(alias) = driver.get_declaration(template).item else {
        return None;
    };

    let mut environment = match qualifier {
        Some(qualifier) => Owner::enter(qualifier, context)?.environment,
        None => Environment::new(),
    };

    let frame = Frame::from_arguments(driver, &alias.parameters, arguments, &environment);
    if !frame.binds_all(&alias.parameters) {
        return None;
    }

    environment.push(frame);

    Some((template.clone(), environment.substitute(driver, &alias.r#type)))
}
