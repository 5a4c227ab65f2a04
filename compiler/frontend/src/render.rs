use crate::{EntryKind, Program};
use itertools::Itertools;
use tmpl_resolve::{Declaration, TemplateArgument, TemplateName, Type};

impl Program {
    /// Render a type as C++ source code.
    pub fn render(&self, r#type: &Type<Program>) -> String {
        match r#type {
            Type::Unknown => String::from("<unknown>"),
            Type::Builtin(name) => name.clone(),
            Type::Parameter(parameter) => self.render_name(parameter.path),
            Type::Typedef(path) => self.qualified_name(*path),
            Type::Specialization {
                template,
                arguments,
                qualifier,
            } => {
                let name = match (template, qualifier) {
                    (TemplateName::Declared(path), Some(qualifier)) => {
                        format!("{}::{}", self.render(qualifier), self.render_name(*path))
                    }
                    (template, _) => self.render_template_name(template),
                };

                let is_template = match template {
                    TemplateName::Declared(path) => match &self.entry(*path).kind {
                        EntryKind::Declaration(Declaration::Class(class)) => {
                            !class.parameters.is_empty()
                        }
                        _ => true,
                    },
                    TemplateName::Parameter(_) => true,
                };

                if is_template {
                    format!("{}<{}>", name, self.render_arguments(arguments))
                } else {
                    name
                }
            }
            Type::Member {
                qualifier,
                name,
                template_keyword,
                arguments,
            } => {
                let mut rendered = format!(
                    "{}::{}{}",
                    self.render(qualifier),
                    if *template_keyword { "template " } else { "" },
                    name
                );

                if let Some(arguments) = arguments {
                    rendered.push_str(&format!("<{}>", self.render_arguments(arguments)));
                }

                rendered
            }
            Type::Pointer(r#type) => format!("{}*", self.render(r#type)),
            Type::LValueReference(r#type) => format!("{}&", self.render(r#type)),
            Type::RValueReference(r#type) => format!("{}&&", self.render(r#type)),
            Type::Const(r#type) => match r#type.as_ref() {
                Type::Pointer(_) | Type::LValueReference(_) | Type::RValueReference(_) => {
                    format!("{} const", self.render(r#type))
                }
                _ => format!("const {}", self.render(r#type)),
            },
            Type::Expansion(pattern) => format!("{}...", self.render(pattern)),
        }
    }

    fn render_arguments(&self, arguments: &[TemplateArgument<Program>]) -> String {
        arguments
            .iter()
            .map(|argument| match argument {
                TemplateArgument::Type(r#type) => self.render(r#type),
                TemplateArgument::Template(name) => self.render_template_name(name),
                TemplateArgument::Pack(elements) => self.render_arguments(elements),
            })
            // Empty packs
            .filter(|argument| !argument.is_empty())
            .join(", ")
    }

    fn render_template_name(&self, name: &TemplateName<Program>) -> String {
        match name {
            TemplateName::Declared(path) => self.qualified_name(*path),
            TemplateName::Parameter(parameter) => self.render_name(parameter.path),
        }
    }

    fn render_name(&self, path: crate::Path) -> String {
        let name = &self.entry(path).name;

        if name.is_empty() {
            String::from("<anonymous>")
        } else {
            name.clone()
        }
    }
}
