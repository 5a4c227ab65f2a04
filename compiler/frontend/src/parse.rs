use crate::{
    tokenize::{tokenize, Keyword, Token},
    Diagnostic, Entry, EntryKind, Info, Path, Program, Result,
};
use itertools::Itertools;
use std::sync::Arc;
use tmpl_resolve::{
    AliasTemplateDeclaration, ClassDeclaration, Declaration, Environment, Frame, Parameter,
    SpecializationPattern, TemplateArgument, TemplateName, TemplateParameter, Type,
    TypeAliasDeclaration,
};
use tmpl_util::WithInfo;

pub(crate) fn parse(path: Arc<str>, code: &str) -> Result {
    let (tokens, diagnostics): (Vec<_>, Vec<_>) = tokenize(path.clone(), code).partition_result();

    let mut parser = Parser {
        code,
        end: Info {
            path,
            span: (code.len() as u32)..(code.len() as u32),
        },
        tokens,
        position: 0,
        program: Program::new(),
        scopes: vec![Scope::Entity(None)],
        diagnostics,
    };

    while parser.peek().is_some() {
        parser.parse_declarations();

        // A stray `}` at the top level
        if let Some(token) = parser.next() {
            parser.error(token.info, Diagnostic::UnexpectedToken {
                expected: String::from("a declaration"),
                found: Some(String::from("}")),
            });
        }
    }

    Result {
        program: parser.program,
        diagnostics: parser.diagnostics,
    }
}

struct Parser<'src> {
    code: &'src str,
    end: Info,
    tokens: Vec<WithInfo<Info, Token<'src>>>,
    position: usize,
    program: Program,
    scopes: Vec<Scope>,
    diagnostics: Vec<WithInfo<Info, Diagnostic>>,
}

enum Scope {
    /// A namespace or class body. `None` is the global namespace.
    Entity(Option<Path>),

    /// A template parameter list.
    Parameters(Vec<Path>),
}

/// What a name refers to at the point it's used.
enum Named {
    Namespace(Path),
    Parameter {
        parameter: Parameter<Program>,
        template: bool,
    },
    Declaration {
        path: Path,
        qualifier: Option<Type<Program>>,
    },
    /// The name of the class currently being defined.
    Injected(Path),
}

/// A partially-parsed qualified name.
enum Current {
    Namespace(Path),
    Type(Type<Program>),
    Template(TemplateName<Program>),
}

enum Parsed {
    Type(Type<Program>),
    Template(TemplateName<Program>),
}

// Token handling
impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token<'src>> {
        self.tokens.get(self.position + n).map(|token| &token.item)
    }

    fn next(&mut self) -> Option<WithInfo<Info, Token<'src>>> {
        let token = self.tokens.get(self.position).cloned()?;
        self.position += 1;
        Some(token)
    }

    fn info(&self) -> Info {
        self.tokens
            .get(self.position)
            .map(|token| token.info.clone())
            .unwrap_or_else(|| self.end.clone())
    }

    fn eat(&mut self, token: &Token<'_>) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&Token::Keyword(keyword))
    }

    fn eat_name(&mut self) -> Option<(String, Info)> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.to_string();
                let info = self.info();
                self.position += 1;
                Some((name, info))
            }
            _ => None,
        }
    }

    fn expect(&mut self, token: &Token<'_>, expected: &str) -> bool {
        if self.eat(token) {
            return true;
        }

        self.unexpected(expected);
        false
    }

    fn expect_name(&mut self, expected: &str) -> Option<(String, Info)> {
        let name = self.eat_name();
        if name.is_none() {
            self.unexpected(expected);
        }

        name
    }

    fn unexpected(&mut self, expected: &str) {
        let info = self.info();
        let found = self.tokens.get(self.position).map(|token| self.text(&token.info));

        self.error(info, Diagnostic::UnexpectedToken {
            expected: expected.to_string(),
            found,
        });
    }

    fn text(&self, info: &Info) -> String {
        self.code[info.span.start as usize..info.span.end as usize].to_string()
    }

    fn error(&mut self, info: Info, diagnostic: Diagnostic) {
        tracing::debug!(%info, %diagnostic, "parse error");
        self.diagnostics.push(WithInfo {
            info,
            item: diagnostic,
        });
    }

    /// Skip from an opening token to its matching closing token.
    fn skip_balanced(&mut self, open: &Token<'_>, close: &Token<'_>) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            if token.item == *open {
                depth += 1;
            } else if token.item == *close {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return;
                }
            }
        }

        if depth > 0 {
            let expected = match close {
                Token::RightAngle => "`>`",
                Token::RightBrace => "`}`",
                Token::RightParenthesis => "`)`",
                Token::RightBracket => "`]`",
                _ => "a closing bracket",
            };

            self.error(self.end.clone(), Diagnostic::UnexpectedToken {
                expected: String::from(expected),
                found: None,
            });
        }
    }

    /// Skip a non-type template argument or parameter, up to the next `,` or
    /// `>` outside of any brackets.
    fn skip_expression(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Comma | Token::RightAngle if depth == 0 => return,
                Token::LeftAngle | Token::LeftParenthesis | Token::LeftBracket | Token::LeftBrace => {
                    depth += 1
                }
                Token::RightAngle
                | Token::RightParenthesis
                | Token::RightBracket
                | Token::RightBrace => {
                    if depth == 0 {
                        return;
                    }

                    depth -= 1;
                }
                Token::Semicolon => return,
                _ => {}
            }

            self.position += 1;
        }
    }

    fn skip_to_semicolon(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::Semicolon => {
                    self.position += 1;
                    return;
                }
                Token::RightBrace => return,
                Token::LeftBrace => self.skip_balanced(&Token::LeftBrace, &Token::RightBrace),
                _ => self.position += 1,
            }
        }
    }
}

// Scopes and names
impl Parser<'_> {
    fn current_entity(&self) -> Option<Path> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| match scope {
                Scope::Entity(entity) => Some(*entity),
                Scope::Parameters(_) => None,
            })
            .flatten()
    }

    fn template_depth(&self) -> u32 {
        self.scopes
            .iter()
            .filter(|scope| matches!(scope, Scope::Parameters(_)))
            .count() as u32
    }

    fn lookup(&self, name: &str) -> Option<Named> {
        self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Parameters(parameters) => parameters
                .iter()
                .find(|&&path| self.program.entry(path).name == name)
                .and_then(|&path| self.named(path, None)),
            Scope::Entity(entity) => {
                if let Some(entity) = *entity {
                    let entry = self.program.entry(entity);
                    let is_class = matches!(
                        entry.kind,
                        EntryKind::Declaration(Declaration::Class(_)) | EntryKind::Specialization { .. }
                    );

                    if is_class && entry.name == name {
                        return Some(Named::Injected(entity));
                    }
                }

                self.lookup_in(*entity, name)
            }
        })
    }

    fn lookup_in(&self, scope: Option<Path>, name: &str) -> Option<Named> {
        let path = self.program.children(scope, name).find(|&path| {
            !matches!(
                self.program.entry(path).kind,
                EntryKind::Declaration(Declaration::Opaque)
            )
        })?;

        self.named(path, scope)
    }

    fn named(&self, path: Path, scope: Option<Path>) -> Option<Named> {
        match &self.program.entry(path).kind {
            EntryKind::Namespace => Some(Named::Namespace(path)),
            EntryKind::Parameter {
                parameter,
                template,
            } => Some(Named::Parameter {
                parameter: parameter.clone(),
                template: *template,
            }),
            EntryKind::Declaration(_) => Some(Named::Declaration {
                path,
                qualifier: self.program.enclosing_class_type(scope),
            }),
            EntryKind::Specialization { .. } => None,
        }
    }

    fn declare(&mut self, name: String, info: Info, kind: EntryKind) -> Path {
        let parent = self.current_entity();

        self.program.insert(Entry {
            name,
            info,
            parent,
            kind,
            bases: Vec::new(),
        })
    }
}

// Declarations
impl Parser<'_> {
    /// Parse declarations up to (but not including) the next `}`.
    fn parse_declarations(&mut self) {
        while let Some(token) = self.peek() {
            if *token == Token::RightBrace {
                break;
            }

            let position = self.position;
            self.parse_declaration(None);

            if self.position == position {
                self.position += 1;
            }
        }
    }

    fn parse_declaration(&mut self, parameters: Option<Vec<TemplateParameter<Program>>>) {
        match self.peek() {
            Some(Token::Keyword(Keyword::Template)) => {
                self.position += 1;

                // Explicit instantiations don't declare anything new
                if self.peek() != Some(&Token::LeftAngle) {
                    self.skip_to_semicolon();
                    return;
                }

                let parameters = self.parse_template_header();
                self.parse_declaration(Some(parameters));
                self.scopes.pop();
            }
            Some(Token::Keyword(Keyword::Namespace)) => self.parse_namespace(),
            Some(Token::Keyword(Keyword::Struct | Keyword::Class | Keyword::Union)) => {
                self.parse_class(parameters)
            }
            Some(Token::Keyword(Keyword::Using)) => self.parse_using(parameters),
            Some(Token::Keyword(Keyword::Typedef)) => self.parse_typedef(),
            Some(Token::Keyword(Keyword::Public | Keyword::Protected | Keyword::Private)) => {
                self.position += 1;
                self.expect(&Token::Colon, "`:`");
            }
            Some(Token::Semicolon) => self.position += 1,
            Some(Token::Name(name)) if name == "friend" || name == "static_assert" => {
                self.skip_to_semicolon();
            }
            Some(_) => self.parse_opaque_declaration(),
            None => {}
        }
    }

    fn parse_namespace(&mut self) {
        self.position += 1;

        let mut names = Vec::new();
        while let Some(name) = self.eat_name() {
            names.push(name);

            if !self.eat(&Token::Scope) {
                break;
            }
        }

        // Namespace aliases aren't supported
        if self.peek() == Some(&Token::Equal) {
            self.skip_to_semicolon();
            return;
        }

        if !self.expect(&Token::LeftBrace, "`{`") {
            self.skip_to_semicolon();
            return;
        }

        // Anonymous namespaces are transparent
        let count = names.len();
        for (name, info) in names {
            let scope = self.current_entity();
            let existing = self
                .program
                .children(scope, &name)
                .find(|&path| matches!(self.program.entry(path).kind, EntryKind::Namespace));

            let namespace = match existing {
                Some(path) => path,
                None => self.declare(name, info, EntryKind::Namespace),
            };

            self.scopes.push(Scope::Entity(Some(namespace)));
        }

        self.parse_declarations();
        self.expect(&Token::RightBrace, "`}`");

        for _ in 0..count {
            self.scopes.pop();
        }
    }

    fn parse_template_header(&mut self) -> Vec<TemplateParameter<Program>> {
        let depth = self.template_depth();
        self.scopes.push(Scope::Parameters(Vec::new()));

        let mut parameters = Vec::new();

        if !self.expect(&Token::LeftAngle, "`<`") || self.eat(&Token::RightAngle) {
            return parameters;
        }

        loop {
            let index = parameters.len() as u32;
            parameters.push(self.parse_template_parameter(depth, index));

            if self.eat(&Token::Comma) {
                continue;
            }

            self.expect(&Token::RightAngle, "`>`");
            break;
        }

        parameters
    }

    fn parse_template_parameter(&mut self, depth: u32, index: u32) -> TemplateParameter<Program> {
        let info = self.info();

        let template = self.peek() == Some(&Token::Keyword(Keyword::Template));
        if template {
            self.position += 1;

            // The template template parameter's own parameters are never bound
            if self.peek() == Some(&Token::LeftAngle) {
                self.skip_balanced(&Token::LeftAngle, &Token::RightAngle);
            }
        }

        if !(self.eat_keyword(Keyword::Typename) || self.eat_keyword(Keyword::Class)) {
            self.error(info.clone(), Diagnostic::UnsupportedNonTypeTemplateArgument);
            self.skip_expression();

            return TemplateParameter {
                parameter: self.declare_parameter(String::new(), info, depth, index, false, false),
                default: None,
            };
        }

        let pack = self.eat(&Token::Ellipsis);
        let name = self.eat_name().map(|(name, _)| name).unwrap_or_default();
        let parameter = self.declare_parameter(name, info, depth, index, pack, template);

        let default = self.eat(&Token::Equal).then(|| self.parse_template_argument());

        TemplateParameter { parameter, default }
    }

    fn declare_parameter(
        &mut self,
        name: String,
        info: Info,
        depth: u32,
        index: u32,
        pack: bool,
        template: bool,
    ) -> Parameter<Program> {
        let parameter = Parameter {
            path: self.program.next_path(),
            depth,
            index,
            pack,
        };

        let path = self.program.insert(Entry {
            name,
            info,
            parent: None,
            kind: EntryKind::Parameter {
                parameter: parameter.clone(),
                template,
            },
            bases: Vec::new(),
        });

        if let Some(Scope::Parameters(parameters)) = self.scopes.last_mut() {
            parameters.push(path);
        }

        parameter
    }

    fn parse_class(&mut self, parameters: Option<Vec<TemplateParameter<Program>>>) {
        self.position += 1;

        let Some((name, info)) = self.eat_name() else {
            tracing::trace!("skipping anonymous class");
            self.skip_to_semicolon();
            return;
        };

        let arguments = (self.peek() == Some(&Token::LeftAngle)).then(|| self.parse_template_arguments());
        self.eat_keyword(Keyword::Final);

        // An elaborated type specifier, as in `struct A* pointer;`
        if !matches!(
            self.peek(),
            Some(Token::LeftBrace | Token::Semicolon | Token::Colon)
        ) {
            self.skip_to_semicolon();
            return;
        }

        let defined = self.peek() != Some(&Token::Semicolon);
        let parameters = parameters.unwrap_or_default();

        let path = match arguments {
            None => self.declare_class(name, info, parameters, defined),
            Some(arguments) => {
                let template = match self.lookup(&name) {
                    Some(Named::Declaration { path, .. } | Named::Injected(path))
                        if self.program.class(path).is_some() =>
                    {
                        path
                    }
                    _ => {
                        self.error(info, Diagnostic::NotATemplate(name));
                        self.skip_to_semicolon();
                        return;
                    }
                };

                self.declare_specialization(template, name, info, parameters, arguments, defined)
            }
        };

        if !defined {
            self.position += 1;
            return;
        }

        self.scopes.push(Scope::Entity(Some(path)));

        if self.eat(&Token::Colon) {
            let bases = self.parse_base_list();
            self.program.entry_mut(path).bases = bases;
        }

        if self.expect(&Token::LeftBrace, "`{`") {
            self.parse_declarations();
            self.expect(&Token::RightBrace, "`}`");
        }

        self.scopes.pop();

        if !self.eat(&Token::Semicolon) {
            // `struct A { ... } a;`
            self.skip_to_semicolon();
        }
    }

    fn declare_class(
        &mut self,
        name: String,
        info: Info,
        mut parameters: Vec<TemplateParameter<Program>>,
        defined: bool,
    ) -> Path {
        let scope = self.current_entity();
        let existing = self
            .program
            .children(scope, &name)
            .find(|&path| self.program.class(path).is_some());

        let Some(path) = existing else {
            return self.declare(
                name,
                info,
                EntryKind::Declaration(Declaration::Class(ClassDeclaration {
                    parameters,
                    defined,
                })),
            );
        };

        let entry = self.program.entry_mut(path);
        if let EntryKind::Declaration(Declaration::Class(class)) = &mut entry.kind {
            // Default arguments may be given on any declaration
            for (new, old) in parameters.iter_mut().zip(&mut class.parameters) {
                if new.default.is_none() {
                    new.default = old.default.clone();
                } else if old.default.is_none() {
                    old.default = new.default.clone();
                }
            }

            if defined {
                class.parameters = parameters;
                class.defined = true;
                entry.info = info;
            }
        }

        path
    }

    fn declare_specialization(
        &mut self,
        template: Path,
        name: String,
        info: Info,
        parameters: Vec<TemplateParameter<Program>>,
        arguments: Vec<TemplateArgument<Program>>,
        defined: bool,
    ) -> Path {
        let existing = self.program.paths().find(|&path| {
            matches!(
                &self.program.entry(path).kind,
                EntryKind::Specialization { template: specialized, pattern }
                    if *specialized == template && self.redeclares(pattern, &parameters, &arguments)
            )
        });

        if let Some(path) = existing {
            let entry = self.program.entry_mut(path);
            if let EntryKind::Specialization { pattern, .. } = &mut entry.kind {
                if defined {
                    pattern.defined = true;
                    entry.info = info;
                }
            }

            return path;
        }

        let pattern = SpecializationPattern {
            path: self.program.next_path(),
            parameters: parameters
                .into_iter()
                .map(|parameter| parameter.parameter)
                .collect(),
            arguments,
            defined,
        };

        self.declare(name, info, EntryKind::Specialization { template, pattern })
    }

    /// Whether `pattern` is an earlier declaration of the specialization
    /// with `parameters` and `arguments`, whose parameters may be named
    /// differently.
    fn redeclares(
        &self,
        pattern: &SpecializationPattern<Program>,
        parameters: &[TemplateParameter<Program>],
        arguments: &[TemplateArgument<Program>],
    ) -> bool {
        if pattern.parameters.len() != parameters.len() {
            return false;
        }

        // Bindings are keyed by position, so this renames the earlier
        // declaration's parameters to the new ones
        let mut frame = Frame::new();
        for parameter in parameters {
            let parameter = parameter.parameter.clone();
            let argument = match self.program.entry(parameter.path).kind {
                EntryKind::Parameter { template: true, .. } => {
                    TemplateArgument::Template(TemplateName::Parameter(parameter.clone()))
                }
                _ => TemplateArgument::Type(Type::Parameter(parameter.clone())),
            };

            frame.bind(parameter, argument);
        }

        let mut environment = Environment::new();
        environment.push(frame);

        environment.substitute_arguments(&self.program, &pattern.arguments) == arguments
    }

    fn parse_base_list(&mut self) -> Vec<WithInfo<Info, Type<Program>>> {
        let mut bases = Vec::new();

        loop {
            while self.eat_keyword(Keyword::Public)
                || self.eat_keyword(Keyword::Protected)
                || self.eat_keyword(Keyword::Private)
                || self.eat_keyword(Keyword::Virtual)
            {}

            let info = self.info();
            let mut base = self.parse_type();
            if self.eat(&Token::Ellipsis) {
                base = Type::Expansion(Box::new(base));
            }

            bases.push(WithInfo { info, item: base });

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        bases
    }

    fn parse_using(&mut self, parameters: Option<Vec<TemplateParameter<Program>>>) {
        self.position += 1;

        // Using-directives and using-declarations don't declare new types
        let is_alias = matches!(
            (self.peek(), self.peek_nth(1)),
            (Some(Token::Name(_)), Some(Token::Equal))
        );

        if !is_alias {
            self.skip_to_semicolon();
            return;
        }

        let Some((name, info)) = self.eat_name() else {
            return;
        };

        self.position += 1;

        let r#type = self.parse_type();
        self.expect(&Token::Semicolon, "`;`");

        let declaration = match parameters {
            None => Declaration::TypeAlias(TypeAliasDeclaration { r#type }),
            Some(parameters) => {
                Declaration::AliasTemplate(AliasTemplateDeclaration { parameters, r#type })
            }
        };

        self.declare(name, info, EntryKind::Declaration(declaration));
    }

    fn parse_typedef(&mut self) {
        self.position += 1;

        let r#type = self.parse_type();

        let Some((name, info)) = self.expect_name("a name") else {
            self.skip_to_semicolon();
            return;
        };

        if !self.expect(&Token::Semicolon, "`;`") {
            self.skip_to_semicolon();
        }

        self.declare(
            name,
            info,
            EntryKind::Declaration(Declaration::TypeAlias(TypeAliasDeclaration { r#type })),
        );
    }

    /// Skip a declaration the resolver can't look into (a function, variable,
    /// enumeration, etc.), recording its name so it hides members of the same
    /// name in base classes.
    fn parse_opaque_declaration(&mut self) {
        let stray = |token: Option<&Token<'_>>| {
            matches!(
                token,
                Some(
                    Token::RightAngle
                        | Token::RightParenthesis
                        | Token::RightBracket
                        | Token::Comma
                        | Token::Equal
                        | Token::Colon
                        | Token::Ellipsis
                )
            )
        };

        // Closing tokens can't start a declaration; report the first of a run
        if stray(self.peek()) {
            self.unexpected("a declaration");

            while stray(self.peek()) {
                self.position += 1;
            }

            return;
        }

        let mut name = None;
        let mut naming = true;

        while let Some(token) = self.peek() {
            match token {
                Token::Semicolon => {
                    self.position += 1;
                    break;
                }
                Token::RightBrace => break,
                Token::LeftBrace => {
                    self.skip_balanced(&Token::LeftBrace, &Token::RightBrace);

                    if self.peek() != Some(&Token::Semicolon) && self.peek() != Some(&Token::Comma) {
                        break;
                    }

                    naming = false;
                }
                Token::LeftParenthesis => {
                    naming = false;
                    self.skip_balanced(&Token::LeftParenthesis, &Token::RightParenthesis);
                }
                Token::LeftBracket => {
                    naming = false;
                    self.skip_balanced(&Token::LeftBracket, &Token::RightBracket);
                }
                Token::Equal => {
                    naming = false;
                    self.position += 1;
                }
                Token::Name(candidate) => {
                    if naming {
                        name = Some((candidate.to_string(), self.info()));
                    }

                    self.position += 1;
                }
                _ => self.position += 1,
            }
        }

        let Some((name, info)) = name else {
            return;
        };

        // Constructors and destructors
        if let Some(entity) = self.current_entity() {
            if self.program.entry(entity).name == name {
                return;
            }
        }

        tracing::trace!(name = %name, "declaring opaque member");
        self.declare(name, info, EntryKind::Declaration(Declaration::Opaque));
    }
}

// Types
impl Parser<'_> {
    fn parse_type(&mut self) -> Type<Program> {
        match self.parse_type_or_template(false) {
            Parsed::Type(r#type) => r#type,
            Parsed::Template(_) => Type::Unknown,
        }
    }

    fn parse_template_arguments(&mut self) -> Vec<TemplateArgument<Program>> {
        let mut arguments = Vec::new();

        if !self.expect(&Token::LeftAngle, "`<`") || self.eat(&Token::RightAngle) {
            return arguments;
        }

        loop {
            let mut argument = self.parse_template_argument();

            if self.eat(&Token::Ellipsis) {
                if let TemplateArgument::Type(r#type) = argument {
                    argument = TemplateArgument::Type(Type::Expansion(Box::new(r#type)));
                }
            }

            arguments.push(argument);

            if self.eat(&Token::Comma) {
                continue;
            }

            self.expect(&Token::RightAngle, "`>`");
            break;
        }

        arguments
    }

    fn parse_template_argument(&mut self) -> TemplateArgument<Program> {
        let starts_type = match self.peek() {
            Some(Token::Name(_) | Token::Scope) => true,
            Some(Token::Keyword(keyword)) => {
                keyword.is_builtin()
                    || matches!(
                        keyword,
                        Keyword::Typename | Keyword::Const | Keyword::Volatile
                    )
            }
            _ => false,
        };

        if !starts_type {
            let info = self.info();
            self.skip_expression();
            self.error(info, Diagnostic::UnsupportedNonTypeTemplateArgument);

            return TemplateArgument::Type(Type::Unknown);
        }

        match self.parse_type_or_template(true) {
            Parsed::Type(r#type) => TemplateArgument::Type(r#type),
            Parsed::Template(name) => TemplateArgument::Template(name),
        }
    }

    fn eat_qualifiers(&mut self) -> bool {
        let mut constant = false;
        loop {
            if self.eat_keyword(Keyword::Const) {
                constant = true;
            } else if !self.eat_keyword(Keyword::Volatile) {
                return constant;
            }
        }
    }

    fn parse_type_or_template(&mut self, allow_template: bool) -> Parsed {
        let mut constant = self.eat_qualifiers();

        let mut r#type = match self.parse_type_name(allow_template) {
            Parsed::Type(r#type) => r#type,
            Parsed::Template(name) if !constant => return Parsed::Template(name),
            Parsed::Template(_) => Type::Unknown,
        };

        constant |= self.eat_qualifiers();
        if constant {
            r#type = Type::Const(Box::new(r#type));
        }

        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.position += 1;
                    r#type = Type::Pointer(Box::new(r#type));

                    if self.eat_qualifiers() {
                        r#type = Type::Const(Box::new(r#type));
                    }
                }
                Some(Token::Ampersand) => {
                    self.position += 1;
                    r#type = Type::LValueReference(Box::new(r#type));
                }
                Some(Token::DoubleAmpersand) => {
                    self.position += 1;
                    r#type = Type::RValueReference(Box::new(r#type));
                }
                _ => break,
            }
        }

        Parsed::Type(r#type)
    }

    fn parse_type_name(&mut self, allow_template: bool) -> Parsed {
        let mut builtin = Vec::new();
        while let Some(Token::Keyword(keyword)) = self.peek() {
            if !keyword.is_builtin() {
                break;
            }

            builtin.push(keyword.to_string());
            self.position += 1;
        }

        if !builtin.is_empty() {
            return Parsed::Type(Type::Builtin(builtin.join(" ")));
        }

        self.eat_keyword(Keyword::Typename);
        let global = self.eat(&Token::Scope);

        let Some((name, info)) = self.expect_name("a type") else {
            return Parsed::Type(Type::Unknown);
        };

        let named = if global {
            self.lookup_in(None, &name)
        } else {
            self.lookup(&name)
        };

        let mut current = self.parse_named(named, name, info);

        while self.eat(&Token::Scope) {
            let template_keyword = self.eat_keyword(Keyword::Template);

            let Some((name, info)) = self.expect_name("a member name") else {
                break;
            };

            current = match current {
                Current::Namespace(namespace) => {
                    let named = self.lookup_in(Some(namespace), &name);
                    self.parse_named(named, name, info)
                }
                Current::Type(qualifier) => {
                    let arguments = (self.peek() == Some(&Token::LeftAngle))
                        .then(|| self.parse_template_arguments());

                    Current::Type(Type::Member {
                        qualifier: Box::new(qualifier),
                        name,
                        template_keyword,
                        arguments,
                    })
                }
                Current::Template(_) => {
                    self.error(info, Diagnostic::NotAType(name));
                    Current::Type(Type::Unknown)
                }
            };
        }

        match current {
            Current::Type(r#type) => Parsed::Type(r#type),
            Current::Template(name) if allow_template => Parsed::Template(name),
            Current::Template(_) => {
                self.unexpected("`<`");
                Parsed::Type(Type::Unknown)
            }
            Current::Namespace(_) => {
                self.unexpected("`::`");
                Parsed::Type(Type::Unknown)
            }
        }
    }

    fn parse_named(&mut self, named: Option<Named>, name: String, info: Info) -> Current {
        let has_arguments = self.peek() == Some(&Token::LeftAngle);

        let Some(named) = named else {
            self.error(info, Diagnostic::UnknownName(name));

            if has_arguments {
                self.skip_balanced(&Token::LeftAngle, &Token::RightAngle);
            }

            return Current::Type(Type::Unknown);
        };

        match named {
            Named::Namespace(path) => Current::Namespace(path),
            Named::Parameter {
                parameter,
                template: false,
            } => Current::Type(Type::Parameter(parameter)),
            Named::Parameter {
                parameter,
                template: true,
            } => {
                if has_arguments {
                    Current::Type(Type::Specialization {
                        template: TemplateName::Parameter(parameter),
                        arguments: self.parse_template_arguments(),
                        qualifier: None,
                    })
                } else {
                    Current::Template(TemplateName::Parameter(parameter))
                }
            }
            Named::Injected(path) => {
                if has_arguments {
                    let template = match &self.program.entry(path).kind {
                        EntryKind::Specialization { template, .. } => *template,
                        _ => path,
                    };

                    let qualifier = self
                        .program
                        .enclosing_class_type(self.program.entry(path).parent)
                        .map(Box::new);

                    Current::Type(Type::Specialization {
                        template: TemplateName::Declared(template),
                        arguments: self.parse_template_arguments(),
                        qualifier,
                    })
                } else {
                    Current::Type(self.program.injected_class_type(path).unwrap_or(Type::Unknown))
                }
            }
            Named::Declaration { path, qualifier } => {
                let is_template = match &self.program.entry(path).kind {
                    EntryKind::Declaration(Declaration::TypeAlias(_)) => {
                        return Current::Type(Type::Typedef(path));
                    }
                    EntryKind::Declaration(Declaration::AliasTemplate(_)) => true,
                    EntryKind::Declaration(Declaration::Class(class)) => !class.parameters.is_empty(),
                    _ => {
                        self.error(info, Diagnostic::NotAType(name));

                        if has_arguments {
                            self.skip_balanced(&Token::LeftAngle, &Token::RightAngle);
                        }

                        return Current::Type(Type::Unknown);
                    }
                };

                if !is_template {
                    if has_arguments {
                        self.error(info, Diagnostic::NotATemplate(name));
                        self.skip_balanced(&Token::LeftAngle, &Token::RightAngle);
                    }

                    return Current::Type(Type::Specialization {
                        template: TemplateName::Declared(path),
                        arguments: Vec::new(),
                        qualifier: qualifier.map(Box::new),
                    });
                }

                if !has_arguments {
                    return Current::Template(TemplateName::Declared(path));
                }

                Current::Type(Type::Specialization {
                    template: TemplateName::Declared(path),
                    arguments: self.parse_template_arguments(),
                    qualifier: qualifier.map(Box::new),
                })
            }
        }
    }
}
