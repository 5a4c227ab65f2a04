//! Resolves dependent names inside C++ templates to the most concrete type
//! reachable without instantiating the enclosing templates.
//!
//! Given `typename Base<T>::type`, the resolver walks the qualifier chain,
//! looks up each member in the template's uninstantiated definition,
//! substitutes the arguments it knows about and selects partial
//! specializations and base classes along the way. It never reports errors: a
//! type that cannot be improved is returned in its best partially-substituted
//! form.

mod bases;
mod context;
mod environment;
mod lookup;
mod specialize;
mod walk;

pub use environment::{Environment, Frame};

use derivative::Derivative;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt::Debug, hash::Hash};
use tmpl_util::WithInfo;

/// Provides the resolver with read-only access to the host compiler's
/// declarations.
pub trait Driver: Sized + 'static {
    /// Additional information attached to every declaration.
    type Info: Debug + Clone + Eq + Hash + Serialize + DeserializeOwned + 'static;

    /// Identifies a declaration.
    type Path: Debug + Clone + Eq + Ord + Hash + Serialize + DeserializeOwned + 'static;

    /// The maximum number of nested lookups allowed within a single call to
    /// [`resolve`].
    fn recursion_limit(&self) -> u32;

    /// Check if two paths refer to the same declaration.
    fn paths_are_equal(&self, left: &Self::Path, right: &Self::Path) -> bool;

    /// Retrieve the declaration at the given path.
    fn get_declaration(&self, path: &Self::Path) -> WithInfo<Self::Info, Declaration<Self>>;

    /// Retrieve the declarations named `name` directly inside `scope` (a class,
    /// a class template or one of its specializations), in declaration order.
    /// Inherited members are not included.
    fn lookup_members(&self, scope: &Self::Path, name: &str) -> Vec<Self::Path>;

    /// Retrieve the partial and explicit specializations of the class template
    /// at the given path, in declaration order.
    fn partial_specializations(
        &self,
        template: &Self::Path,
    ) -> Vec<WithInfo<Self::Info, SpecializationPattern<Self>>>;

    /// Retrieve the base-class specifiers of `scope`, in declaration order,
    /// written in terms of the scope's own template parameters.
    fn base_specifiers(&self, scope: &Self::Path) -> Vec<WithInfo<Self::Info, Type<Self>>>;

    /// Record that the resolver is symbolically entering the definition of
    /// `entity`.
    fn push_instantiation_context(&self, entity: &Self::Path);

    /// Retire the most recent context pushed by
    /// [`push_instantiation_context`](Driver::push_instantiation_context).
    fn pop_instantiation_context(&self);
}

/// Resolve `r#type` as far as possible. Concrete types are returned unchanged
/// apart from desugared aliases; dependent types come back with every member
/// access the resolver could follow replaced by its target.
pub fn resolve<D: Driver>(driver: &D, r#type: &Type<D>) -> Type<D> {
    walk::resolve(driver, r#type)
}

/// A possibly-dependent type expression.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(
    Debug(bound = ""),
    Clone(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
#[serde(bound = "")]
pub enum Type<D: Driver> {
    /// A type that could not be determined by the frontend.
    Unknown,

    /// A fundamental type like `int` or `unsigned long`.
    Builtin(String),

    /// A template type parameter.
    Parameter(Parameter<D>),

    /// A reference to a non-template alias declaration.
    Typedef(D::Path),

    /// A class, class template or alias template applied to arguments.
    #[serde(rename_all = "camelCase")]
    Specialization {
        /// The template being specialized.
        template: TemplateName<D>,

        /// The arguments written for the template. Empty for plain classes.
        arguments: Vec<TemplateArgument<D>>,

        /// The enclosing specialization when the template is declared inside
        /// another class, as in `Outer<X>::Inner<Y>`.
        qualifier: Option<Box<Type<D>>>,
    },

    /// A member named through a qualifier, as in `typename Q::name` or
    /// `typename Q::template name<Args>`.
    #[serde(rename_all = "camelCase")]
    Member {
        /// The type the member is looked up in.
        qualifier: Box<Type<D>>,

        /// The name of the member.
        name: String,

        /// Whether the member was written with the `template` keyword.
        template_keyword: bool,

        /// The explicit template arguments, if any were written.
        arguments: Option<Vec<TemplateArgument<D>>>,
    },

    /// `T*`.
    Pointer(Box<Type<D>>),

    /// `T&`.
    LValueReference(Box<Type<D>>),

    /// `T&&`.
    RValueReference(Box<Type<D>>),

    /// `const T`.
    Const(Box<Type<D>>),

    /// A pack expansion, `pattern...`.
    Expansion(Box<Type<D>>),
}

/// A template parameter, identified by its nesting depth and its position
/// within its template parameter list.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(
    Debug(bound = ""),
    Clone(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct Parameter<D: Driver> {
    /// The declaration of the parameter.
    pub path: D::Path,

    /// The number of enclosing template parameter lists.
    pub depth: u32,

    /// The position of the parameter in its list.
    pub index: u32,

    /// Whether the parameter is a pack (`typename... Ts`).
    pub pack: bool,
}

/// The name of a template in a specialization.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(
    Debug(bound = ""),
    Clone(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
#[serde(bound = "")]
pub enum TemplateName<D: Driver> {
    /// A declared class template or alias template.
    Declared(D::Path),

    /// A template template parameter.
    Parameter(Parameter<D>),
}

/// An argument bound to a template parameter.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(
    Debug(bound = ""),
    Clone(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
#[serde(bound = "")]
pub enum TemplateArgument<D: Driver> {
    /// A type argument.
    Type(Type<D>),

    /// A template argument for a template template parameter.
    Template(TemplateName<D>),

    /// The arguments bound to a parameter pack. Only appears in
    /// [`Frame`]s; argument lists written in source spell pack expansions as
    /// [`Type::Expansion`].
    Pack(Vec<TemplateArgument<D>>),
}

/// A declaration the resolver can look into.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
#[serde(bound = "")]
pub enum Declaration<D: Driver> {
    /// `using name = type;`
    TypeAlias(TypeAliasDeclaration<D>),

    /// `template <...> using name = type;`
    AliasTemplate(AliasTemplateDeclaration<D>),

    /// A class or class template, possibly nested in another class.
    Class(ClassDeclaration<D>),

    /// Anything else (functions, variables, namespaces) or a declaration whose
    /// contents the driver can't provide.
    Opaque,
}

/// A non-template type alias.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct TypeAliasDeclaration<D: Driver> {
    /// The aliased type.
    pub r#type: Type<D>,
}

/// An alias template.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct AliasTemplateDeclaration<D: Driver> {
    /// The alias template's parameters.
    pub parameters: Vec<TemplateParameter<D>>,

    /// The aliased type.
    pub r#type: Type<D>,
}

/// A class or class template.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct ClassDeclaration<D: Driver> {
    /// The class template's parameters. Empty for plain classes.
    pub parameters: Vec<TemplateParameter<D>>,

    /// Whether the primary template has a visible definition. Classes that
    /// are only forward-declared can still have defined specializations.
    pub defined: bool,
}

/// A template parameter along with its default argument.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct TemplateParameter<D: Driver> {
    /// The parameter.
    pub parameter: Parameter<D>,

    /// The default argument, written in terms of earlier parameters.
    pub default: Option<TemplateArgument<D>>,
}

/// A partial or explicit specialization of a class template.
#[derive(Serialize, Deserialize, Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct SpecializationPattern<D: Driver> {
    /// The specialization's declaration, used as the scope for member and base
    /// lookup when the specialization is selected.
    pub path: D::Path,

    /// The parameters deduced from the pattern. Empty for explicit
    /// specializations.
    pub parameters: Vec<Parameter<D>>,

    /// The pattern, written in terms of [`parameters`](Self::parameters).
    pub arguments: Vec<TemplateArgument<D>>,

    /// Whether the specialization has a visible definition.
    pub defined: bool,
}

impl<D: Driver> Type<D> {
    /// Whether the type mentions a template parameter, a pack expansion or a
    /// member that hasn't been resolved yet.
    pub fn is_dependent(&self) -> bool {
        match self {
            Type::Unknown | Type::Builtin(_) | Type::Typedef(_) => false,
            Type::Parameter(_) | Type::Member { .. } | Type::Expansion(_) => true,
            Type::Specialization {
                template,
                arguments,
                qualifier,
            } => {
                matches!(template, TemplateName::Parameter(_))
                    || arguments.iter().any(TemplateArgument::is_dependent)
                    || qualifier.as_deref().is_some_and(Type::is_dependent)
            }
            Type::Pointer(r#type)
            | Type::LValueReference(r#type)
            | Type::RValueReference(r#type)
            | Type::Const(r#type) => r#type.is_dependent(),
        }
    }
}

impl<D: Driver> TemplateArgument<D> {
    /// Whether the argument mentions a template parameter.
    pub fn is_dependent(&self) -> bool {
        match self {
            TemplateArgument::Type(r#type) => r#type.is_dependent(),
            TemplateArgument::Template(name) => matches!(name, TemplateName::Parameter(_)),
            TemplateArgument::Pack(arguments) => arguments.iter().any(TemplateArgument::is_dependent),
        }
    }
}
