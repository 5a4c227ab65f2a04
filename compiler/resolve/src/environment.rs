use crate::{Declaration, Driver, Parameter, TemplateArgument, TemplateName, TemplateParameter, Type};
use derivative::Derivative;
use itertools::Itertools;

/// The arguments bound to the parameters of one template nesting level.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""), Default(bound = ""))]
pub struct Frame<D: Driver> {
    bindings: Vec<(Parameter<D>, TemplateArgument<D>)>,
}

impl<D: Driver> Frame<D> {
    /// Create a frame with no bindings.
    pub fn new() -> Self {
        Frame::default()
    }

    /// Bind `parameter` to `argument`, replacing any previous binding for the
    /// same position.
    pub fn bind(&mut self, parameter: Parameter<D>, argument: TemplateArgument<D>) {
        self.bindings
            .retain(|(bound, _)| !(bound.depth == parameter.depth && bound.index == parameter.index));

        self.bindings.push((parameter, argument));
    }

    /// Retrieve the argument bound to `parameter`.
    pub fn get(&self, parameter: &Parameter<D>) -> Option<&TemplateArgument<D>> {
        self.bindings.iter().find_map(|(bound, argument)| {
            (bound.depth == parameter.depth && bound.index == parameter.index).then_some(argument)
        })
    }

    /// Whether the frame binds no parameters.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bind `parameters` to `arguments` positionally. A pack parameter takes
    /// every remaining argument, and missing arguments fall back to the
    /// parameter's default (substituted through `outer` and the bindings made
    /// so far). Parameters with neither stay unbound, as does every parameter
    /// from the first non-pack parameter reached by a pack expansion, since
    /// the expansion's length isn't known.
    pub fn from_arguments(
        driver: &D,
        parameters: &[TemplateParameter<D>],
        arguments: &[TemplateArgument<D>],
        outer: &Environment<D>,
    ) -> Self {
        let mut frame = Frame::new();
        let mut arguments = flatten(arguments).into_iter().peekable();

        for parameter in parameters {
            if parameter.parameter.pack {
                frame.bind(
                    parameter.parameter.clone(),
                    TemplateArgument::Pack(arguments.by_ref().collect()),
                );

                break;
            }

            if matches!(
                arguments.peek(),
                Some(TemplateArgument::Type(Type::Expansion(_)))
            ) {
                break;
            }

            if let Some(argument) = arguments.next() {
                frame.bind(parameter.parameter.clone(), argument);
                continue;
            }

            if let Some(default) = &parameter.default {
                let mut environment = outer.clone();
                environment.push(frame.clone());

                let default = environment.substitute_argument(driver, default);
                frame.bind(parameter.parameter.clone(), default);
            }
        }

        frame
    }

    /// Whether every one of `parameters` is bound.
    pub fn binds_all(&self, parameters: &[TemplateParameter<D>]) -> bool {
        parameters
            .iter()
            .all(|parameter| self.get(&parameter.parameter).is_some())
    }

    /// The arguments bound to `parameters`, in order, with packs spliced in.
    /// Stops at the first unbound parameter.
    pub fn arguments_for(&self, parameters: &[TemplateParameter<D>]) -> Vec<TemplateArgument<D>> {
        let mut arguments = Vec::new();
        for parameter in parameters {
            match self.get(&parameter.parameter) {
                Some(TemplateArgument::Pack(elements)) => arguments.extend(elements.iter().cloned()),
                Some(argument) => arguments.push(argument.clone()),
                None => break,
            }
        }

        arguments
    }
}

/// A stack of [`Frame`]s, one per template nesting level, searched from the
/// innermost frame outward.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""), Default(bound = ""))]
pub struct Environment<D: Driver> {
    frames: Vec<Frame<D>>,
}

impl<D: Driver> Environment<D> {
    /// Create an environment with no frames.
    pub fn new() -> Self {
        Environment::default()
    }

    /// Enter a new nesting level.
    pub fn push(&mut self, frame: Frame<D>) {
        self.frames.push(frame);
    }

    /// Leave the innermost nesting level.
    pub fn pop(&mut self) -> Option<Frame<D>> {
        self.frames.pop()
    }

    /// Retrieve the argument bound to `parameter` in the innermost frame that
    /// binds it.
    pub fn lookup(&self, parameter: &Parameter<D>) -> Option<&TemplateArgument<D>> {
        self.frames.iter().rev().find_map(|frame| frame.get(parameter))
    }

    /// Replace every bound parameter in `r#type` with its argument. Arguments
    /// are inserted as-is and never substituted again, so parameters of the
    /// caller that appear in them are left alone. References to type aliases
    /// are expanded, since their meaning depends on the same bindings.
    pub fn substitute(&self, driver: &D, r#type: &Type<D>) -> Type<D> {
        match r#type {
            Type::Unknown | Type::Builtin(_) => r#type.clone(),
            Type::Parameter(parameter) => match self.lookup(parameter) {
                Some(TemplateArgument::Type(argument)) => argument.clone(),
                _ => r#type.clone(),
            },
            Type::Typedef(path) => match driver.get_declaration(path).item {
                Declaration::TypeAlias(alias) => self.substitute(driver, &alias.r#type),
                _ => r#type.clone(),
            },
            Type::Specialization {
                template,
                arguments,
                qualifier,
            } => Type::Specialization {
                template: self.substitute_template_name(template),
                arguments: self.substitute_arguments(driver, arguments),
                qualifier: qualifier
                    .as_ref()
                    .map(|qualifier| Box::new(self.substitute(driver, qualifier))),
            },
            Type::Member {
                qualifier,
                name,
                template_keyword,
                arguments,
            } => Type::Member {
                qualifier: Box::new(self.substitute(driver, qualifier)),
                name: name.clone(),
                template_keyword: *template_keyword,
                arguments: arguments
                    .as_ref()
                    .map(|arguments| self.substitute_arguments(driver, arguments)),
            },
            Type::Pointer(r#type) => Type::Pointer(Box::new(self.substitute(driver, r#type))),
            Type::LValueReference(r#type) => {
                Type::LValueReference(Box::new(self.substitute(driver, r#type)))
            }
            Type::RValueReference(r#type) => {
                Type::RValueReference(Box::new(self.substitute(driver, r#type)))
            }
            Type::Const(r#type) => Type::Const(Box::new(self.substitute(driver, r#type))),
            // Outside an argument list there's nowhere to splice the elements
            Type::Expansion(pattern) => Type::Expansion(Box::new(self.substitute(driver, pattern))),
        }
    }

    /// Substitute an argument list, expanding pack expansions whose packs are
    /// bound and splicing in nested packs.
    pub fn substitute_arguments(
        &self,
        driver: &D,
        arguments: &[TemplateArgument<D>],
    ) -> Vec<TemplateArgument<D>> {
        let mut substituted = Vec::with_capacity(arguments.len());

        for argument in arguments {
            match argument {
                TemplateArgument::Type(Type::Expansion(pattern)) => {
                    match self.expansion_length(pattern) {
                        Some(length) => {
                            for index in 0..length {
                                let (element, expanded) = self.pack_element(index, pattern);
                                let r#type = element.substitute(driver, pattern);

                                substituted.push(TemplateArgument::Type(if expanded {
                                    Type::Expansion(Box::new(r#type))
                                } else {
                                    r#type
                                }));
                            }
                        }
                        None => substituted.push(TemplateArgument::Type(Type::Expansion(
                            Box::new(self.substitute(driver, pattern)),
                        ))),
                    }
                }
                TemplateArgument::Pack(elements) => {
                    substituted.extend(self.substitute_arguments(driver, elements));
                }
                argument => substituted.push(self.substitute_argument(driver, argument)),
            }
        }

        substituted
    }

    fn substitute_argument(&self, driver: &D, argument: &TemplateArgument<D>) -> TemplateArgument<D> {
        match argument {
            TemplateArgument::Type(r#type) => TemplateArgument::Type(self.substitute(driver, r#type)),
            TemplateArgument::Template(name) => {
                TemplateArgument::Template(self.substitute_template_name(name))
            }
            TemplateArgument::Pack(elements) => {
                TemplateArgument::Pack(self.substitute_arguments(driver, elements))
            }
        }
    }

    fn substitute_template_name(&self, name: &TemplateName<D>) -> TemplateName<D> {
        match name {
            TemplateName::Declared(_) => name.clone(),
            TemplateName::Parameter(parameter) => match self.lookup(parameter) {
                Some(TemplateArgument::Template(argument)) => argument.clone(),
                _ => name.clone(),
            },
        }
    }

    /// The number of elements `pattern...` expands to, if every pack it
    /// mentions is bound and they all agree.
    fn expansion_length(&self, pattern: &Type<D>) -> Option<usize> {
        let mut packs = Vec::new();
        unexpanded_packs(pattern, &mut packs);

        let lengths = packs
            .iter()
            .filter_map(|parameter| match self.lookup(parameter) {
                Some(TemplateArgument::Pack(elements)) => Some(elements.len()),
                _ => None,
            })
            .collect::<Vec<_>>();

        if lengths.is_empty() || !lengths.iter().all_equal() {
            return None;
        }

        lengths.first().copied()
    }

    /// An environment in which every pack mentioned by `pattern` is bound to
    /// its `index`th element. An element that is itself an expansion (a
    /// forwarded `Xs...`) is bound to its pattern instead, and the returned
    /// flag is set so the caller re-wraps the result: `Ts*...` with
    /// `Ts = [Xs...]` becomes `Xs*...`.
    fn pack_element(&self, index: usize, pattern: &Type<D>) -> (Self, bool) {
        let mut packs = Vec::new();
        unexpanded_packs(pattern, &mut packs);

        let mut frame = Frame::new();
        let mut expanded = false;
        for parameter in packs {
            if let Some(TemplateArgument::Pack(elements)) = self.lookup(&parameter) {
                match elements.get(index) {
                    Some(TemplateArgument::Type(Type::Expansion(inner))) => {
                        expanded = true;
                        frame.bind(parameter, TemplateArgument::Type(inner.as_ref().clone()));
                    }
                    Some(element) => frame.bind(parameter, element.clone()),
                    None => {}
                }
            }
        }

        let mut environment = self.clone();
        environment.push(frame);
        (environment, expanded)
    }
}

fn flatten<D: Driver>(arguments: &[TemplateArgument<D>]) -> Vec<TemplateArgument<D>> {
    arguments
        .iter()
        .flat_map(|argument| match argument {
            TemplateArgument::Pack(elements) => flatten(elements),
            argument => vec![argument.clone()],
        })
        .collect()
}

fn unexpanded_packs<D: Driver>(r#type: &Type<D>, packs: &mut Vec<Parameter<D>>) {
    match r#type {
        Type::Parameter(parameter) => {
            if parameter.pack && !packs.contains(parameter) {
                packs.push(parameter.clone());
            }
        }
        Type::Specialization {
            template,
            arguments,
            qualifier,
        } => {
            if let TemplateName::Parameter(parameter) = template {
                if parameter.pack && !packs.contains(parameter) {
                    packs.push(parameter.clone());
                }
            }

            for argument in arguments {
                if let TemplateArgument::Type(r#type) = argument {
                    unexpanded_packs(r#type, packs);
                }
            }

            if let Some(qualifier) = qualifier {
                unexpanded_packs(qualifier, packs);
            }
        }
        Type::Member {
            qualifier,
            arguments,
            ..
        } => {
            unexpanded_packs(qualifier, packs);

            for argument in arguments.iter().flatten() {
                if let TemplateArgument::Type(r#type) = argument {
                    unexpanded_packs(r#type, packs);
                }
            }
        }
        Type::Pointer(r#type)
        | Type::LValueReference(r#type)
        | Type::RValueReference(r#type)
        | Type::Const(r#type) => unexpanded_packs(r#type, packs),
        // Packs inside a nested expansion belong to that expansion
        Type::Expansion(_) | Type::Unknown | Type::Builtin(_) | Type::Typedef(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Declaration, SpecializationPattern};
    use tmpl_util::WithInfo;

    struct TestDriver;

    impl Driver for TestDriver {
        type Info = ();
        type Path = String;

        fn recursion_limit(&self) -> u32 {
            64
        }

        fn paths_are_equal(&self, left: &Self::Path, right: &Self::Path) -> bool {
            left == right
        }

        fn get_declaration(&self, _path: &Self::Path) -> WithInfo<(), Declaration<Self>> {
            WithInfo {
                info: (),
                item: Declaration::Opaque,
            }
        }

        fn lookup_members(&self, _scope: &Self::Path, _name: &str) -> Vec<Self::Path> {
            Vec::new()
        }

        fn partial_specializations(
            &self,
            _template: &Self::Path,
        ) -> Vec<WithInfo<(), SpecializationPattern<Self>>> {
            Vec::new()
        }

        fn base_specifiers(&self, _scope: &Self::Path) -> Vec<WithInfo<(), Type<Self>>> {
            Vec::new()
        }

        fn push_instantiation_context(&self, _entity: &Self::Path) {}

        fn pop_instantiation_context(&self) {}
    }

    fn parameter(path: &'static str, depth: u32, index: u32, pack: bool) -> Parameter<TestDriver> {
        Parameter {
            path: path.to_string(),
            depth,
            index,
            pack,
        }
    }

    fn declared(parameter: Parameter<TestDriver>) -> TemplateParameter<TestDriver> {
        TemplateParameter {
            parameter,
            default: None,
        }
    }

    fn list(arguments: Vec<Type<TestDriver>>) -> Type<TestDriver> {
        Type::Specialization {
            template: TemplateName::Declared(String::from("type_list")),
            arguments: arguments.into_iter().map(TemplateArgument::Type).collect(),
            qualifier: None,
        }
    }

    fn int() -> Type<TestDriver> {
        Type::Builtin(String::from("int"))
    }

    #[test]
    fn pack_parameter_takes_remaining_arguments() {
        let t = parameter("T", 0, 0, false);
        let rest = parameter("Rest", 0, 1, true);

        let frame = Frame::from_arguments(
            &TestDriver,
            &[declared(t.clone()), declared(rest.clone())],
            &[
                TemplateArgument::Type(int()),
                TemplateArgument::Type(Type::Builtin(String::from("char"))),
                TemplateArgument::Type(Type::Builtin(String::from("bool"))),
            ],
            &Environment::new(),
        );

        assert_eq!(frame.get(&t), Some(&TemplateArgument::Type(int())));
        assert_eq!(
            frame.get(&rest),
            Some(&TemplateArgument::Pack(vec![
                TemplateArgument::Type(Type::Builtin(String::from("char"))),
                TemplateArgument::Type(Type::Builtin(String::from("bool"))),
            ]))
        );
    }

    #[test]
    fn default_arguments_see_earlier_parameters() {
        let t = parameter("T", 0, 0, false);
        let alloc = parameter("Alloc", 0, 1, false);

        let parameters = [
            declared(t.clone()),
            TemplateParameter {
                parameter: alloc.clone(),
                default: Some(TemplateArgument::Type(list(vec![Type::Parameter(t)]))),
            },
        ];

        let frame = Frame::from_arguments(
            &TestDriver,
            &parameters,
            &[TemplateArgument::Type(int())],
            &Environment::new(),
        );

        assert_eq!(frame.get(&alloc), Some(&TemplateArgument::Type(list(vec![int()]))));
        assert_eq!(frame.arguments_for(&parameters).len(), 2);
    }

    #[test]
    fn inner_frames_shadow_outer_frames() {
        let outer = parameter("T", 0, 0, false);
        let inner = parameter("U", 1, 0, false);

        let mut first = Frame::new();
        first.bind(outer.clone(), TemplateArgument::Type(int()));

        let mut second = Frame::new();
        second.bind(inner.clone(), TemplateArgument::Type(Type::Builtin(String::from("char"))));

        let mut environment = Environment::new();
        environment.push(first);
        environment.push(second);

        let substituted = environment.substitute(
            &TestDriver,
            &list(vec![Type::Parameter(outer), Type::Parameter(inner.clone())]),
        );

        assert_eq!(
            substituted,
            list(vec![int(), Type::Builtin(String::from("char"))])
        );

        environment.pop();
        assert_eq!(environment.lookup(&inner), None);
    }

    #[test]
    fn expansions_splice_bound_packs() {
        let ts = parameter("Ts", 0, 0, true);

        let mut frame = Frame::new();
        frame.bind(
            ts.clone(),
            TemplateArgument::Pack(vec![
                TemplateArgument::Type(int()),
                TemplateArgument::Type(Type::Pointer(Box::new(int()))),
            ]),
        );

        let mut environment = Environment::new();
        environment.push(frame);

        let pattern = list(vec![
            Type::Builtin(String::from("bool")),
            Type::Expansion(Box::new(Type::Const(Box::new(Type::Parameter(ts))))),
        ]);

        assert_eq!(
            environment.substitute(&TestDriver, &pattern),
            list(vec![
                Type::Builtin(String::from("bool")),
                Type::Const(Box::new(int())),
                Type::Const(Box::new(Type::Pointer(Box::new(int())))),
            ])
        );
    }

    #[test]
    fn unbound_expansions_are_kept() {
        let ts = parameter("Ts", 0, 0, true);
        let pattern = list(vec![Type::Expansion(Box::new(Type::Parameter(ts)))]);

        assert_eq!(
            Environment::new().substitute(&TestDriver, &pattern),
            pattern
        );
    }

    #[test]
    fn expansions_of_unknown_length_stop_positional_binding() {
        let t = parameter("T", 0, 0, false);
        let ts = parameter("Ts", 0, 1, true);
        let xs = Type::Expansion(Box::new(Type::Parameter(parameter("Xs", 1, 0, true))));
        let parameters = [declared(t.clone()), declared(ts.clone())];

        let forwarded = Frame::from_arguments(
            &TestDriver,
            &parameters,
            &[TemplateArgument::Type(xs.clone())],
            &Environment::new(),
        );

        assert_eq!(forwarded.get(&t), None);
        assert!(!forwarded.binds_all(&parameters));

        let trailing = Frame::from_arguments(
            &TestDriver,
            &parameters,
            &[TemplateArgument::Type(int()), TemplateArgument::Type(xs.clone())],
            &Environment::new(),
        );

        assert_eq!(trailing.get(&t), Some(&TemplateArgument::Type(int())));
        assert_eq!(
            trailing.get(&ts),
            Some(&TemplateArgument::Pack(vec![TemplateArgument::Type(xs)]))
        );
        assert!(trailing.binds_all(&parameters));
    }

    #[test]
    fn forwarded_expansions_are_expanded_again() {
        let ts = parameter("Ts", 0, 0, true);
        let xs = Type::Parameter(parameter("Xs", 1, 0, true));

        let mut frame = Frame::new();
        frame.bind(
            ts.clone(),
            TemplateArgument::Pack(vec![
                TemplateArgument::Type(int()),
                TemplateArgument::Type(Type::Expansion(Box::new(xs.clone()))),
            ]),
        );

        let mut environment = Environment::new();
        environment.push(frame);

        let pattern = list(vec![Type::Expansion(Box::new(Type::Pointer(Box::new(
            Type::Parameter(ts),
        ))))]);

        assert_eq!(
            environment.substitute(&TestDriver, &pattern),
            list(vec![
                Type::Pointer(Box::new(int())),
                Type::Expansion(Box::new(Type::Pointer(Box::new(xs)))),
            ])
        );
    }
}
