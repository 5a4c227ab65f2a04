use crate::{
    ClassDeclaration, Driver, Environment, Frame, Parameter, SpecializationPattern,
    TemplateArgument, TemplateName, Type,
};
use tmpl_util::WithInfo;

/// A specialization selected for a set of arguments, along with the bindings
/// deduced for its parameters.
pub(crate) struct Selected<D: Driver> {
    pub pattern: SpecializationPattern<D>,
    pub frame: Frame<D>,
}

/// Select the most specific specialization of `template` matching
/// `arguments`, or `None` if the primary template applies.
pub(crate) fn select<D: Driver>(
    driver: &D,
    template: &D::Path,
    class: &ClassDeclaration<D>,
    arguments: &[TemplateArgument<D>],
    environment: &Environment<D>,
) -> Option<Selected<D>> {
    let candidates = driver.partial_specializations(template);
    if candidates.is_empty() {
        return None;
    }

    // Specializations are matched against the complete argument list,
    // including defaults
    let frame = Frame::from_arguments(driver, &class.parameters, arguments, environment);
    if !frame.binds_all(&class.parameters) {
        return None;
    }

    let arguments = frame.arguments_for(&class.parameters);

    let mut best: Option<(WithInfo<D::Info, SpecializationPattern<D>>, Frame<D>)> = None;
    for candidate in candidates {
        let Some(frame) = deduce(
            driver,
            &candidate.item.parameters,
            &candidate.item.arguments,
            &arguments,
        ) else {
            continue;
        };

        best = match best {
            None => Some((candidate, frame)),
            Some(current) => {
                let candidate_first =
                    at_least_as_specialized(driver, &candidate.item, &current.0.item);
                let current_first =
                    at_least_as_specialized(driver, &current.0.item, &candidate.item);

                if candidate_first && !current_first {
                    Some((candidate, frame))
                } else {
                    if candidate_first == current_first {
                        tracing::debug!(
                            chosen = ?current.0.info,
                            other = ?candidate.info,
                            "ambiguous specializations, keeping the first declared"
                        );
                    }

                    Some(current)
                }
            }
        };
    }

    best.map(|(pattern, frame)| Selected {
        pattern: pattern.item,
        frame,
    })
}

/// Whether `pattern`'s arguments can be deduced by `other`'s pattern, ie.
/// `pattern` matches a subset of what `other` matches.
fn at_least_as_specialized<D: Driver>(
    driver: &D,
    pattern: &SpecializationPattern<D>,
    other: &SpecializationPattern<D>,
) -> bool {
    deduce(driver, &other.parameters, &other.arguments, &pattern.arguments).is_some()
}

/// Deduce `parameters` by matching `patterns` against `arguments`. Returns a
/// frame binding every parameter, or `None` if deduction fails.
pub(crate) fn deduce<D: Driver>(
    driver: &D,
    parameters: &[Parameter<D>],
    patterns: &[TemplateArgument<D>],
    arguments: &[TemplateArgument<D>],
) -> Option<Frame<D>> {
    let mut deduction = Deduction {
        driver,
        parameters,
        bindings: vec![None; parameters.len()],
    };

    if !deduction.deduce_arguments(patterns, arguments) {
        return None;
    }

    let mut frame = Frame::new();
    for (parameter, binding) in parameters.iter().zip(deduction.bindings) {
        frame.bind(parameter.clone(), binding?);
    }

    Some(frame)
}

struct Deduction<'a, D: Driver> {
    driver: &'a D,
    parameters: &'a [Parameter<D>],
    bindings: Vec<Option<TemplateArgument<D>>>,
}

impl<D: Driver> Deduction<'_, D> {
    fn position(&self, parameter: &Parameter<D>) -> Option<usize> {
        self.parameters
            .iter()
            .position(|candidate| self.driver.paths_are_equal(&candidate.path, &parameter.path))
    }

    #[must_use]
    fn bind(&mut self, position: usize, argument: TemplateArgument<D>) -> bool {
        match &self.bindings[position] {
            Some(existing) => *existing == argument,
            None => {
                self.bindings[position] = Some(argument);
                true
            }
        }
    }

    #[must_use]
    fn deduce_arguments(
        &mut self,
        patterns: &[TemplateArgument<D>],
        arguments: &[TemplateArgument<D>],
    ) -> bool {
        let mut remaining = arguments;

        for (index, pattern) in patterns.iter().enumerate() {
            // A trailing pack parameter takes the rest of the arguments
            if let TemplateArgument::Type(Type::Expansion(expansion)) = pattern {
                if let Type::Parameter(parameter) = expansion.as_ref() {
                    if let Some(position) = self.position(parameter) {
                        return index + 1 == patterns.len()
                            && self.bind(position, TemplateArgument::Pack(remaining.to_vec()));
                    }
                }
            }

            let Some((argument, rest)) = remaining.split_first() else {
                return false;
            };

            if !self.deduce_argument(pattern, argument) {
                return false;
            }

            remaining = rest;
        }

        remaining.is_empty()
    }

    #[must_use]
    fn deduce_argument(&mut self, pattern: &TemplateArgument<D>, argument: &TemplateArgument<D>) -> bool {
        match (pattern, argument) {
            (TemplateArgument::Type(pattern), TemplateArgument::Type(argument)) => {
                self.deduce_type(pattern, argument)
            }
            (TemplateArgument::Template(pattern), TemplateArgument::Template(argument)) => {
                self.deduce_template_name(pattern, argument)
            }
            (TemplateArgument::Pack(patterns), TemplateArgument::Pack(arguments)) => {
                self.deduce_arguments(patterns, arguments)
            }
            _ => false,
        }
    }

    #[must_use]
    fn deduce_template_name(&mut self, pattern: &TemplateName<D>, argument: &TemplateName<D>) -> bool {
        if let TemplateName::Parameter(parameter) = pattern {
            if let Some(position) = self.position(parameter) {
                return self.bind(position, TemplateArgument::Template(argument.clone()));
            }
        }

        pattern == argument
    }

    #[must_use]
    fn deduce_type(&mut self, pattern: &Type<D>, argument: &Type<D>) -> bool {
        if let Type::Parameter(parameter) = pattern {
            if let Some(position) = self.position(parameter) {
                return self.bind(position, TemplateArgument::Type(argument.clone()));
            }
        }

        match (pattern, argument) {
            (
                Type::Specialization {
                    template,
                    arguments: patterns,
                    qualifier,
                },
                Type::Specialization {
                    template: argument_template,
                    arguments,
                    qualifier: argument_qualifier,
                },
            ) => {
                self.deduce_template_name(template, argument_template)
                    && self.deduce_arguments(patterns, arguments)
                    && match (qualifier, argument_qualifier) {
                        (None, None) => true,
                        (Some(qualifier), Some(argument_qualifier)) => {
                            self.deduce_type(qualifier, argument_qualifier)
                        }
                        _ => false,
                    }
            }
            (Type::Pointer(pattern), Type::Pointer(argument))
            | (Type::LValueReference(pattern), Type::LValueReference(argument))
            | (Type::RValueReference(pattern), Type::RValueReference(argument))
            | (Type::Const(pattern), Type::Const(argument))
            | (Type::Expansion(pattern), Type::Expansion(argument)) => {
                self.deduce_type(pattern, argument)
            }
            // Nested names are non-deduced contexts
            (Type::Member { .. }, _) => true,
            _ => pattern == argument,
        }
    }
}
