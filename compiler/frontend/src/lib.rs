//! An in-memory C++ frontend for the dependent-name resolver.
//!
//! [`parse`] reads a subset of C++ (namespaces, class templates and their
//! specializations, base classes and type aliases) into a [`Program`], which
//! implements [`tmpl_resolve::Driver`]. Anything outside the subset, like
//! function bodies or variables, is kept as an opaque member.

mod parse;
mod render;
pub mod tokenize;

use serde::{Deserialize, Serialize};
use std::{
    cell::{Cell, RefCell},
    fmt,
    ops::Range,
    sync::Arc,
};
use tmpl_resolve::{
    ClassDeclaration, Declaration, Driver, Parameter, SpecializationPattern, TemplateArgument,
    TemplateName, Type,
};
use tmpl_util::WithInfo;

/// The default value of [`Driver::recursion_limit`].
pub const DEFAULT_RECURSION_LIMIT: u32 = 64;

/// The location of a declaration or token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    /// The path of the source file.
    pub path: Arc<str>,

    /// The byte range within the source file.
    pub span: Range<u32>,
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.path, self.span.start, self.span.end)
    }
}

/// Identifies an entity declared in a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(pub u32);

/// Parse a source file into a [`Program`].
pub fn parse(path: &str, code: &str) -> Result {
    parse::parse(Arc::from(path), code)
}

/// The result of [`parse`].
#[derive(Debug)]
pub struct Result {
    /// The parsed program.
    pub program: Program,

    /// Any errors encountered while parsing the source code.
    pub diagnostics: Vec<WithInfo<Info, Diagnostic>>,
}

/// An error occurring during [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum Diagnostic {
    /// The tokenizer encountered a character it doesn't recognize.
    InvalidToken,

    /// The parser expected one token, but a different one was found.
    #[serde(rename_all = "camelCase")]
    UnexpectedToken {
        /// A description of the expected token.
        expected: String,

        /// The provided token, or `None` if the end of the file was reached.
        found: Option<String>,
    },

    /// A name isn't declared in any enclosing scope.
    UnknownName(String),

    /// A name was used as a template, but it doesn't refer to one.
    NotATemplate(String),

    /// A name was used as a type, but it refers to something else.
    NotAType(String),

    /// Non-type template parameters and arguments are represented as unknown
    /// types.
    UnsupportedNonTypeTemplateArgument,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InvalidToken => write!(f, "invalid token"),
            Diagnostic::UnexpectedToken {
                expected,
                found: Some(found),
            } => write!(f, "expected {expected}, found `{found}`"),
            Diagnostic::UnexpectedToken {
                expected,
                found: None,
            } => write!(f, "expected {expected}, found end of file"),
            Diagnostic::UnknownName(name) => write!(f, "cannot find `{name}`"),
            Diagnostic::NotATemplate(name) => write!(f, "`{name}` is not a template"),
            Diagnostic::NotAType(name) => write!(f, "`{name}` is not a type"),
            Diagnostic::UnsupportedNonTypeTemplateArgument => {
                write!(f, "non-type template parameters are not supported")
            }
        }
    }
}

/// A type alias found by [`Program::find_alias`].
#[derive(Debug, Clone)]
pub struct Alias {
    /// The alias declaration.
    pub path: Path,

    /// The alias's name, qualified by its enclosing namespaces and classes.
    pub qualified_name: String,

    /// The aliased type, as written.
    pub r#type: Type<Program>,
}

/// The declarations in a source file.
#[derive(Debug)]
pub struct Program {
    entries: Vec<Entry>,
    recursion_limit: u32,
    instantiation_stack: RefCell<Vec<Path>>,
    deepest_instantiation: Cell<usize>,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    info: Info,

    /// The namespace or class (or class specialization) the entry is declared
    /// in. Template parameters have no parent.
    parent: Option<Path>,

    kind: EntryKind,

    /// The base-class specifiers of a class or specialization.
    bases: Vec<WithInfo<Info, Type<Program>>>,
}

#[derive(Debug, Clone)]
enum EntryKind {
    Namespace,
    Parameter {
        parameter: Parameter<Program>,
        template: bool,
    },
    Declaration(Declaration<Program>),
    Specialization {
        template: Path,
        pattern: SpecializationPattern<Program>,
    },
}

impl Program {
    fn new() -> Self {
        Program {
            entries: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            instantiation_stack: RefCell::new(Vec::new()),
            deepest_instantiation: Cell::new(0),
        }
    }

    /// Override [`DEFAULT_RECURSION_LIMIT`].
    pub fn set_recursion_limit(&mut self, limit: u32) {
        self.recursion_limit = limit;
    }

    /// The instantiation contexts currently pushed by the resolver, innermost
    /// last.
    pub fn instantiation_stack(&self) -> Vec<Path> {
        self.instantiation_stack.borrow().clone()
    }

    /// The largest number of instantiation contexts that were pushed at the
    /// same time.
    pub fn deepest_instantiation(&self) -> usize {
        self.deepest_instantiation.get()
    }

    /// Find every type alias named `name`, in source order.
    pub fn find_alias(&self, name: &str) -> Vec<WithInfo<Info, Alias>> {
        self.paths()
            .filter_map(|path| {
                let entry = self.entry(path);
                if entry.name != name {
                    return None;
                }

                let EntryKind::Declaration(Declaration::TypeAlias(alias)) = &entry.kind else {
                    return None;
                };

                Some(WithInfo {
                    info: entry.info.clone(),
                    item: Alias {
                        path,
                        qualified_name: self.qualified_name(path),
                        r#type: alias.r#type.clone(),
                    },
                })
            })
            .collect()
    }

    /// The name of the entity at `path`, qualified by its enclosing namespaces
    /// and classes.
    pub fn qualified_name(&self, path: Path) -> String {
        let mut names = vec![self.entry(path).name.as_str()];

        let mut parent = self.entry(path).parent;
        while let Some(path) = parent {
            let entry = self.entry(path);
            names.push(entry.name.as_str());
            parent = entry.parent;
        }

        names.reverse();
        names.join("::")
    }

    fn paths(&self) -> impl Iterator<Item = Path> {
        (0..self.entries.len() as u32).map(Path)
    }

    fn entry(&self, path: Path) -> &Entry {
        &self.entries[path.0 as usize]
    }

    fn entry_mut(&mut self, path: Path) -> &mut Entry {
        &mut self.entries[path.0 as usize]
    }

    /// The path the next call to `insert` will return.
    fn next_path(&self) -> Path {
        Path(self.entries.len() as u32)
    }

    fn insert(&mut self, entry: Entry) -> Path {
        let path = self.next_path();
        self.entries.push(entry);
        path
    }

    /// The members named `name` declared directly in `scope`, including nested
    /// namespaces.
    fn children<'a>(&'a self, scope: Option<Path>, name: &'a str) -> impl Iterator<Item = Path> + 'a {
        self.paths().filter(move |&path| {
            let entry = self.entry(path);

            entry.parent == scope
                && entry.name == name
                && matches!(entry.kind, EntryKind::Namespace | EntryKind::Declaration(_))
        })
    }

    fn class(&self, path: Path) -> Option<&ClassDeclaration<Program>> {
        match &self.entry(path).kind {
            EntryKind::Declaration(Declaration::Class(class)) => Some(class),
            _ => None,
        }
    }

    /// The type referred to by a class's injected class name, ie. `A` inside
    /// the definition of `template <typename T> struct A`.
    fn injected_class_type(&self, path: Path) -> Option<Type<Program>> {
        let entry = self.entry(path);

        let (template, arguments) = match &entry.kind {
            EntryKind::Declaration(Declaration::Class(class)) => {
                let arguments = class
                    .parameters
                    .iter()
                    .map(|parameter| self.parameter_argument(&parameter.parameter))
                    .collect();

                (path, arguments)
            }
            EntryKind::Specialization { template, pattern } => {
                (*template, pattern.arguments.clone())
            }
            _ => return None,
        };

        Some(Type::Specialization {
            template: TemplateName::Declared(template),
            arguments,
            qualifier: self.enclosing_class_type(entry.parent).map(Box::new),
        })
    }

    /// The injected class type of `scope` if it's a class, used to qualify
    /// the members of nested classes.
    fn enclosing_class_type(&self, scope: Option<Path>) -> Option<Type<Program>> {
        scope.and_then(|scope| self.injected_class_type(scope))
    }

    /// A parameter forwarded as an argument to its own template.
    fn parameter_argument(&self, parameter: &Parameter<Program>) -> TemplateArgument<Program> {
        let is_template = matches!(
            self.entry(parameter.path).kind,
            EntryKind::Parameter { template: true, .. }
        );

        if is_template {
            TemplateArgument::Template(TemplateName::Parameter(parameter.clone()))
        } else if parameter.pack {
            TemplateArgument::Type(Type::Expansion(Box::new(Type::Parameter(parameter.clone()))))
        } else {
            TemplateArgument::Type(Type::Parameter(parameter.clone()))
        }
    }
}

impl Driver for Program {
    type Info = Info;
    type Path = Path;

    fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }

    fn paths_are_equal(&self, left: &Self::Path, right: &Self::Path) -> bool {
        left == right
    }

    fn get_declaration(&self, path: &Self::Path) -> WithInfo<Self::Info, Declaration<Self>> {
        let entry = self.entry(*path);

        let declaration = match &entry.kind {
            EntryKind::Declaration(declaration) => declaration.clone(),
            EntryKind::Namespace | EntryKind::Parameter { .. } | EntryKind::Specialization { .. } => {
                Declaration::Opaque
            }
        };

        WithInfo {
            info: entry.info.clone(),
            item: declaration,
        }
    }

    fn lookup_members(&self, scope: &Self::Path, name: &str) -> Vec<Self::Path> {
        self.children(Some(*scope), name)
            .filter(|&path| matches!(self.entry(path).kind, EntryKind::Declaration(_)))
            .collect()
    }

    fn partial_specializations(
        &self,
        template: &Self::Path,
    ) -> Vec<WithInfo<Self::Info, SpecializationPattern<Self>>> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.kind {
                EntryKind::Specialization {
                    template: specialized,
                    pattern,
                } if specialized == template => Some(WithInfo {
                    info: entry.info.clone(),
                    item: pattern.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn base_specifiers(&self, scope: &Self::Path) -> Vec<WithInfo<Self::Info, Type<Self>>> {
        self.entry(*scope).bases.clone()
    }

    fn push_instantiation_context(&self, entity: &Self::Path) {
        let mut stack = self.instantiation_stack.borrow_mut();
        stack.push(*entity);

        if stack.len() > self.deepest_instantiation.get() {
            self.deepest_instantiation.set(stack.len());
        }
    }

    fn pop_instantiation_context(&self) {
        self.instantiation_stack.borrow_mut().pop();
    }
}
