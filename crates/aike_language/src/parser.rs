//! Recursive-descent parser with the offside rule.
//!
//! Blocks are terminated by layout: a block opened at some column ends at
//! the first token whose column is smaller (the token is *offside*). The
//! rule is applied uniformly to `let … =` bodies, `then`/`else`/`do`
//! bodies, match arm bodies, and the top level. A postfix form (call,
//! index) continues the current primary only while it stays to the right
//! of the primary's column; at the same column it starts a new statement.
//!
//! Binary expressions are parsed by precedence climbing over
//! [`SynBinaryOp::precedence`]. Errors are fatal: the first one aborts the
//! unit with a location.

use crate::arena_ctx::SynArenas;
use crate::ast::{
    Ident, SynAst, SynBinaryOp, SynKind, SynMatchArm, SynPat, SynPatKind, SynType, SynTypedVar,
    SynUnaryOp, SynUnionPayload, SynUnionVariant,
};
use crate::token::{Keyword, Token, TokenKind, TokenStream};
use aike_base::{CompileError, Interner, Location, Result, Symbol};

pub struct Parser<'a, 'i> {
    arenas: SynArenas<'a>,
    interner: &'i mut Interner,
    tokens: &'i [Token],
    pos: usize,
    underscore: Symbol,
}

/// Parses a token stream into a syntax tree rooted at the top-level block.
pub fn parse<'a>(
    stream: &TokenStream,
    arenas: SynArenas<'a>,
    interner: &mut Interner,
) -> Result<&'a SynAst<'a>> {
    let underscore = interner.intern("_");
    let mut parser = Parser { arenas, interner, tokens: &stream.tokens, pos: 0, underscore };

    let root = parser.parse_block()?;

    if parser.kind() != TokenKind::Eof {
        return Err(parser.error_here("Unexpected expression"));
    }

    Ok(root)
}

fn is_lower(lhs: Location, rhs: Location) -> bool {
    lhs.column < rhs.column
}

fn is_same_line(lhs: Location, rhs: Location) -> bool {
    lhs.line == rhs.line
}

impl<'a, 'i> Parser<'a, 'i> {
    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn loc(&self) -> Location {
        self.tokens[self.pos].location
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn checkpoint(&self) -> usize {
        self.pos
    }

    fn restore(&mut self, checkpoint: usize) {
        self.pos = checkpoint;
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.loc())
    }

    fn is_kw(&self, keyword: Keyword) -> bool {
        self.kind() == TokenKind::Keyword(keyword)
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Location> {
        if self.kind() != kind {
            return Err(self.error_here(message));
        }
        let location = self.loc();
        self.advance();
        Ok(location)
    }

    fn check_onside(&self, context: Location) -> Result<()> {
        if !is_lower(context, self.loc()) {
            return Err(self.error_here(format!(
                "Incorrect indentation: this token is offside of context at ({},{}). Indent this token further.",
                context.line + 1,
                context.column + 1
            )));
        }
        Ok(())
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let location = self.loc();
                self.advance();
                Ok(Ident { name, location })
            }
            _ => Err(self.error_here("Expected identifier")),
        }
    }

    /// A validated single-byte character literal payload.
    fn character_payload(&self, payload: Symbol) -> Result<u8> {
        let text = self.interner.resolve(payload);
        if text.is_empty() {
            return Err(self.error_here("Character missing"));
        }
        if text.len() > 1 {
            return Err(self.error_here("Multicharacter literals are not supported"));
        }
        Ok(text.as_bytes()[0])
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn parse_generic_params(&mut self) -> Result<&'a [Ident]> {
        if self.kind() != TokenKind::Less {
            return Ok(&[]);
        }
        self.advance();

        let mut params = Vec::new();
        while self.kind() != TokenKind::Greater {
            match self.kind() {
                TokenKind::GenericIdent(name) => {
                    params.push(Ident { name, location: self.loc() });
                    self.advance();
                }
                _ => return Err(self.error_here("Expected generic identifier")),
            }

            match self.kind() {
                TokenKind::Comma => self.advance(),
                TokenKind::Greater => {}
                _ => return Err(self.error_here("Expected ',' or '>'")),
            }
        }
        self.advance();

        Ok(self.arenas.ident_list(params))
    }

    fn parse_generic_args(&mut self) -> Result<&'a [&'a SynType<'a>]> {
        if self.kind() != TokenKind::Less {
            return Ok(&[]);
        }
        self.advance();

        let mut args = Vec::new();
        while self.kind() != TokenKind::Greater {
            args.push(self.parse_type()?);

            match self.kind() {
                TokenKind::Comma => self.advance(),
                TokenKind::Greater => {}
                _ => return Err(self.error_here("Expected ',' or '>'")),
            }
        }
        self.advance();

        Ok(self.arenas.ty_list(args))
    }

    fn parse_type_parenthesised(&mut self) -> Result<&'a SynType<'a>> {
        self.advance();

        let mut list = Vec::new();
        if self.kind() != TokenKind::RParen {
            list.push(self.parse_type()?);
            while self.kind() == TokenKind::Comma {
                self.advance();
                list.push(self.parse_type()?);
            }
        }
        self.expect(TokenKind::RParen, "Expected ')' after '('")?;

        if self.kind() == TokenKind::Arrow {
            self.advance();
            let result = self.parse_type()?;
            return Ok(self.arenas.ty(SynType::Function { args: self.arenas.ty_list(list), result }));
        }

        if list.len() == 1 {
            return Ok(list[0]);
        }

        Ok(self.arenas.ty(SynType::Tuple(self.arenas.ty_list(list))))
    }

    fn parse_type(&mut self) -> Result<&'a SynType<'a>> {
        let mut ty = match self.kind() {
            TokenKind::LParen => self.parse_type_parenthesised()?,
            TokenKind::GenericIdent(name) => {
                let ident = Ident { name, location: self.loc() };
                self.advance();
                self.arenas.ty(SynType::Generic(ident))
            }
            _ => {
                let name = self.parse_ident()?;
                let args = self.parse_generic_args()?;
                self.arenas.ty(SynType::Name { name, args })
            }
        };

        while self.kind() == TokenKind::LBracket {
            self.advance();
            self.expect(TokenKind::RBracket, "Expected ']' after '['")?;
            ty = self.arenas.ty(SynType::Array(ty));
        }

        Ok(ty)
    }

    /// `{ field: T; ... }` with fields separated by ';' or a newline.
    fn parse_record_fields(&mut self) -> Result<&'a [SynTypedVar<'a>]> {
        self.expect(TokenKind::LBrace, "Expected '{'")?;

        let mut fields: Vec<SynTypedVar<'a>> = Vec::new();
        let mut prev_line = self.loc().line;

        while self.kind() != TokenKind::RBrace {
            if !fields.is_empty() {
                if self.kind() != TokenKind::Semicolon && self.loc().line == prev_line {
                    return Err(
                        self.error_here("Expected ';' or a newline after previous type member")
                    );
                }
                if self.kind() == TokenKind::Semicolon {
                    self.advance();
                }
            }

            prev_line = self.loc().line;

            let name = self.parse_ident()?;
            self.expect(TokenKind::Colon, "Expected ': type' after member name")?;
            let ty = self.parse_type()?;

            fields.push(SynTypedVar { name, ty: Some(ty) });
        }
        self.advance();

        Ok(self.arenas.typed_var_list(fields))
    }

    fn parse_typed_var(&mut self) -> Result<SynTypedVar<'a>> {
        let name = self.parse_ident()?;

        let ty = if self.kind() == TokenKind::Colon {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        Ok(SynTypedVar { name, ty })
    }

    fn parse_function_args(&mut self) -> Result<&'a [SynTypedVar<'a>]> {
        self.expect(TokenKind::LParen, "Expected '('")?;

        let mut args = Vec::new();
        while self.kind() != TokenKind::RParen {
            args.push(self.parse_typed_var()?);

            match self.kind() {
                TokenKind::Comma => self.advance(),
                TokenKind::RParen => {}
                _ => return Err(self.error_here("Expected ',' or ')'")),
            }
        }
        self.advance();

        Ok(self.arenas.typed_var_list(args))
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_let_func(&mut self, name: Ident, start: Location) -> Result<&'a SynAst<'a>> {
        let args = self.parse_function_args()?;

        let ret = if self.kind() == TokenKind::Colon {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        self.expect(TokenKind::Equal, "Expected '='")?;
        self.check_onside(start)?;

        let body = self.parse_block()?;
        let location = start.merge(body.location);

        Ok(self.arenas.expr(SynAst::new(location, SynKind::LetFunc { name, ret, args, body })))
    }

    fn parse_let(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let mut vars: Vec<SynTypedVar<'a>> = Vec::new();

        if self.kind() == TokenKind::LParen {
            self.advance();

            while self.kind() != TokenKind::RParen {
                if !vars.is_empty() {
                    self.expect(TokenKind::Comma, "Expected ',' after previous name")?;
                }

                let var = self.parse_typed_var()?;

                if var.name.name != self.underscore
                    && vars.iter().any(|v| v.name.name == var.name.name)
                {
                    return Err(CompileError::new(
                        "This name is already used in this let expression",
                        var.name.location,
                    ));
                }

                vars.push(var);
            }
            self.advance();
        } else {
            vars.push(self.parse_typed_var()?);
        }

        if self.kind() == TokenKind::LParen {
            if vars.len() > 1 {
                return Err(self.error_here("unexpected '(' after variable name list"));
            }
            if vars[0].ty.is_some() {
                return Err(self.error_here("unexpected '(' after variable type"));
            }
            return self.parse_let_func(vars[0].name, start);
        }

        self.expect(TokenKind::Equal, "Expected '='")?;
        self.check_onside(start)?;

        let body = self.parse_block()?;
        let location = start.merge(body.location);

        if vars.len() == 1 {
            return Ok(
                self.arenas.expr(SynAst::new(location, SynKind::LetVar { var: vars[0], body }))
            );
        }

        Ok(self.arenas.expr(SynAst::new(
            location,
            SynKind::LetVars { vars: self.arenas.typed_var_list(vars), body },
        )))
    }

    fn parse_extern_func(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let name = self.parse_ident()?;
        let args = self.parse_function_args()?;

        for arg in args {
            if arg.ty.is_none() {
                return Err(CompileError::new(
                    format!(
                        "Extern function '{}': type declaration missing for argument '{}'",
                        self.interner.resolve(name.name),
                        self.interner.resolve(arg.name.name)
                    ),
                    arg.name.location,
                ));
            }
        }

        if self.kind() != TokenKind::Colon {
            return Err(CompileError::new(
                format!(
                    "Extern function '{}': type declaration missing for return type",
                    self.interner.resolve(name.name)
                ),
                name.location,
            ));
        }
        self.advance();

        let ret = self.parse_type()?;
        let location = start.merge(name.location);

        Ok(self.arenas.expr(SynAst::new(location, SynKind::ExternFunc { name, ret, args })))
    }

    fn parse_anonymous_func(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let mut args: &'a [SynTypedVar<'a>] = &[];
        let mut ret = None;

        if self.kind() == TokenKind::LParen {
            args = self.parse_function_args()?;

            if self.kind() == TokenKind::Colon {
                self.advance();
                ret = Some(self.parse_type()?);
            }
        } else if matches!(self.kind(), TokenKind::Ident(_)) {
            let name = self.parse_ident()?;
            args = self.arenas.typed_var_list([SynTypedVar { name, ty: None }]);
        }

        self.expect(TokenKind::Arrow, "Expected '->'")?;

        let body = self.parse_block()?;
        let location = start.merge(body.location);
        let name = Ident { name: Symbol::EMPTY, location: start };

        Ok(self.arenas.expr(SynAst::new(location, SynKind::LetFunc { name, ret, args, body })))
    }

    fn parse_type_definition(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let name = self.parse_ident()?;
        let start_line = self.loc().line;

        let generics = self.parse_generic_params()?;

        self.expect(TokenKind::Equal, "Expected '=' after type name")?;

        if self.kind() == TokenKind::LBrace {
            let fields = self.parse_record_fields()?;
            let location = start.merge(name.location);
            return Ok(
                self.arenas.expr(SynAst::new(location, SynKind::RecordDef { name, generics, fields }))
            );
        }

        let mut variants: Vec<SynUnionVariant<'a>> = Vec::new();

        // The leading '|' may be omitted while the first variant stays on
        // the definition line.
        while self.kind() == TokenKind::Pipe
            || (variants.is_empty()
                && matches!(self.kind(), TokenKind::Ident(_))
                && self.loc().line == start_line)
        {
            if self.kind() == TokenKind::Pipe {
                self.advance();
            }

            let variant_name = self.parse_ident()?;

            let payload = match self.kind() {
                TokenKind::LBrace => SynUnionPayload::Record(self.parse_record_fields()?),
                TokenKind::Ident(_) | TokenKind::GenericIdent(_) | TokenKind::LParen => {
                    SynUnionPayload::Ty(self.parse_type()?)
                }
                _ => SynUnionPayload::Unit,
            };

            variants.push(SynUnionVariant { name: variant_name, payload });
        }

        let location = start.merge(name.location);
        Ok(self.arenas.expr(SynAst::new(
            location,
            SynKind::UnionDef { name, generics, variants: self.arenas.variant_list(variants) },
        )))
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    fn parse_if(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let cond = self.parse_expr()?;

        if !self.is_kw(Keyword::Then) {
            return Err(self.error_here("Expected 'then'"));
        }
        self.advance();

        let then_body = self.parse_block()?;

        let else_body = if self.is_kw(Keyword::Else) {
            self.advance();
            self.parse_block()?
        } else {
            self.arenas.expr(SynAst::new(self.loc(), SynKind::Unit))
        };

        let location = start.merge(else_body.location).merge(then_body.location);
        Ok(self.arenas.expr(SynAst::new(location, SynKind::If { cond, then_body, else_body })))
    }

    fn parse_for(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let var = self.parse_typed_var()?;

        if !self.is_kw(Keyword::In) {
            return Err(self.error_here("Expected 'in' after array element name"));
        }
        self.advance();

        let array = self.parse_expr()?;

        let range_end = if self.kind() == TokenKind::DotDot {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        if !self.is_kw(Keyword::Do) {
            return Err(self.error_here("Expected 'do' after array expression"));
        }
        self.advance();

        let body = self.parse_block()?;
        let location = start.merge(body.location);

        match range_end {
            Some(end) => Ok(self.arenas.expr(SynAst::new(
                location,
                SynKind::ForInRange { var, start: array, end, body },
            ))),
            None => {
                Ok(self.arenas.expr(SynAst::new(location, SynKind::ForIn { var, array, body })))
            }
        }
    }

    fn parse_while(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let cond = self.parse_expr()?;

        if !self.is_kw(Keyword::Do) {
            return Err(self.error_here("Expected 'do' after condition"));
        }
        self.advance();

        let body = self.parse_block()?;
        let location = start.merge(body.location);

        Ok(self.arenas.expr(SynAst::new(location, SynKind::While { cond, body })))
    }

    // ------------------------------------------------------------------
    // Match
    // ------------------------------------------------------------------

    fn parse_match_pattern(&mut self) -> Result<&'a SynPat<'a>> {
        let location = self.loc();

        match self.kind() {
            TokenKind::Minus | TokenKind::Plus | TokenKind::Number(_) => {
                let negative = self.kind() == TokenKind::Minus;
                if matches!(self.kind(), TokenKind::Minus | TokenKind::Plus) {
                    self.advance();
                }

                match self.kind() {
                    TokenKind::Number(value) => {
                        let value = if negative { -value } else { value };
                        let pat_location = location.merge(self.loc());
                        self.advance();
                        Ok(self.arenas.pat(SynPat { location: pat_location, kind: SynPatKind::Int(value) }))
                    }
                    _ => Err(self.error_here("Expected a number")),
                }
            }

            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(self.arenas.pat(SynPat { location, kind: SynPatKind::Bool(true) }))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(self.arenas.pat(SynPat { location, kind: SynPatKind::Bool(false) }))
            }

            TokenKind::Character(payload) => {
                let value = self.character_payload(payload)?;
                self.advance();
                Ok(self.arenas.pat(SynPat { location, kind: SynPatKind::Char(value) }))
            }

            TokenKind::Str(payload) => {
                let bytes: Vec<u8> = self.interner.resolve(payload).bytes().collect();
                self.advance();
                let elements = self.arenas.pat_list(
                    bytes
                        .into_iter()
                        .map(|b| self.arenas.pat(SynPat { location, kind: SynPatKind::Char(b) }))
                        .collect::<Vec<_>>(),
                );
                Ok(self.arenas.pat(SynPat { location, kind: SynPatKind::Array(elements) }))
            }

            TokenKind::Ident(name) => {
                if name == self.underscore {
                    self.advance();
                    return Ok(self.arenas.pat(SynPat { location, kind: SynPatKind::Wildcard }));
                }

                let ident = self.parse_ident()?;

                // `ctor alias`
                if matches!(self.kind(), TokenKind::Ident(_)) {
                    let alias = self.parse_ident()?;
                    return Ok(self.arenas.pat(SynPat {
                        location: location.merge(alias.location),
                        kind: SynPatKind::CtorAlias { name: ident, alias },
                    }));
                }

                // `ctor(p1, …)` / `ctor(name = p1, …)`
                if self.kind() == TokenKind::LParen {
                    self.advance();

                    let mut arg_names: Vec<Ident> = Vec::new();
                    let mut arg_values: Vec<&'a SynPat<'a>> = Vec::new();

                    while self.kind() != TokenKind::RParen {
                        if !arg_values.is_empty() {
                            self.expect(
                                TokenKind::Comma,
                                "Expected ',' after previous member pattern",
                            )?;
                        }

                        if matches!(self.kind(), TokenKind::Ident(_)) {
                            let checkpoint = self.checkpoint();
                            let id = self.parse_ident()?;

                            if self.kind() == TokenKind::Equal {
                                self.advance();
                                arg_names.push(id);
                            } else {
                                self.restore(checkpoint);
                            }
                        }

                        arg_values.push(self.parse_match_pattern()?);
                    }

                    if !arg_names.is_empty() && arg_names.len() != arg_values.len() {
                        return Err(self.error_here(
                            "Named and unnamed function arguments are not allowed to be mixed in a single call",
                        ));
                    }

                    let close = self.loc();
                    self.advance();

                    return Ok(self.arenas.pat(SynPat {
                        location: location.merge(close),
                        kind: SynPatKind::Ctor {
                            name: ident,
                            args: self.arenas.pat_list(arg_values),
                            arg_names: self.arenas.ident_list(arg_names),
                        },
                    }));
                }

                let ty = if self.kind() == TokenKind::Colon {
                    self.advance();
                    Some(self.parse_type()?)
                } else {
                    None
                };

                Ok(self.arenas.pat(SynPat {
                    location,
                    kind: SynPatKind::Placeholder(SynTypedVar { name: ident, ty }),
                }))
            }

            TokenKind::LBracket => {
                self.advance();

                let mut elements = Vec::new();
                while self.kind() != TokenKind::RBracket {
                    if !elements.is_empty() {
                        self.expect(TokenKind::Comma, "Expected ',' after previous array element")?;
                    }
                    elements.push(self.parse_match_pattern()?);
                }
                let close = self.loc();
                self.advance();

                Ok(self.arenas.pat(SynPat {
                    location: location.merge(close),
                    kind: SynPatKind::Array(self.arenas.pat_list(elements)),
                }))
            }

            TokenKind::LParen => {
                self.advance();

                let mut elements = Vec::new();
                while self.kind() != TokenKind::RParen {
                    if !elements.is_empty() {
                        self.expect(TokenKind::Comma, "Expected ',' after previous tuple element")?;
                    }
                    elements.push(self.parse_match_pattern()?);
                }
                let close = self.loc();
                self.advance();

                if elements.is_empty() {
                    return Err(CompileError::new("unit cannot be matched", location));
                }
                if elements.len() == 1 {
                    return Ok(elements[0]);
                }

                Ok(self.arenas.pat(SynPat {
                    location: location.merge(close),
                    kind: SynPatKind::Tuple(self.arenas.pat_list(elements)),
                }))
            }

            other => Err(self.error_here(format!("Unexpected token {}", other.describe()))),
        }
    }

    fn parse_match(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();
        self.advance();

        let scrutinee = self.parse_expr()?;

        if !self.is_kw(Keyword::With) {
            return Err(self.error_here("Expected 'with' after expression"));
        }
        self.advance();

        if is_lower(self.loc(), start) {
            return Err(self.error_here(format!(
                "Incorrect indentation: this token is offside of context at ({},{}). Indent this token further.",
                start.line + 1,
                start.column + 1
            )));
        }

        let mut arms: Vec<SynMatchArm<'a>> = Vec::new();
        let mut location = start;

        // The leading '|' may be omitted while the first arm stays on the
        // same line as the match itself.
        while !is_lower(self.loc(), start)
            && (self.kind() == TokenKind::Pipe
                || (arms.is_empty() && is_same_line(start, self.loc())))
        {
            if self.kind() == TokenKind::Pipe {
                self.advance();
            }

            let pattern_location = self.loc();
            let mut pattern = self.parse_match_pattern()?;

            if self.kind() == TokenKind::Pipe {
                let mut options = vec![pattern];

                while self.kind() == TokenKind::Pipe {
                    self.advance();
                    options.push(self.parse_match_pattern()?);
                }

                pattern = self.arenas.pat(SynPat {
                    location: pattern_location,
                    kind: SynPatKind::Or(self.arenas.pat_list(options)),
                });
            }

            if self.is_kw(Keyword::If) {
                self.advance();
                let condition = self.parse_expr()?;
                pattern = self.arenas.pat(SynPat {
                    location: pattern_location,
                    kind: SynPatKind::Guard { pattern, condition },
                });
            }

            self.expect(TokenKind::Arrow, "Expected '->'")?;

            let body = self.parse_block()?;
            location = location.merge(body.location);

            arms.push(SynMatchArm { pattern, body });
        }

        Ok(self.arenas.expr(SynAst::new(
            location,
            SynKind::Match { scrutinee, arms: self.arenas.arm_list(arms) },
        )))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_term(&mut self) -> Result<&'a SynAst<'a>> {
        let location = self.loc();

        match self.kind() {
            TokenKind::LParen => {
                self.advance();

                if self.kind() == TokenKind::RParen {
                    let unit_location = location.merge(self.loc());
                    self.advance();
                    return Ok(self.arenas.expr(SynAst::new(unit_location, SynKind::Unit)));
                }

                let mut elements = Vec::new();
                while self.kind() != TokenKind::RParen {
                    if !elements.is_empty() {
                        self.expect(TokenKind::Comma, "Expected ',' after previous tuple element")?;
                    }
                    elements.push(self.parse_expr()?);
                }
                let close = self.loc();
                self.advance();

                if elements.len() == 1 {
                    return Ok(elements[0]);
                }

                Ok(self.arenas.expr(SynAst::new(
                    location.merge(close),
                    SynKind::Tuple(self.arenas.expr_list(elements)),
                )))
            }

            TokenKind::LBracket => {
                self.advance();

                let mut elements = Vec::new();
                while self.kind() != TokenKind::RBracket {
                    if !elements.is_empty() {
                        self.expect(TokenKind::Comma, "Expected ',' after previous array element")?;
                    }
                    elements.push(self.parse_expr()?);
                }
                let close = self.loc();
                self.advance();

                Ok(self.arenas.expr(SynAst::new(
                    location.merge(close),
                    SynKind::Array(self.arenas.expr_list(elements)),
                )))
            }

            TokenKind::Number(value) => {
                self.advance();
                Ok(self.arenas.expr(SynAst::new(location, SynKind::Int(value))))
            }

            TokenKind::Ident(name) => {
                self.advance();
                Ok(self.arenas.expr(SynAst::new(location, SynKind::Var(name))))
            }

            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(self.arenas.expr(SynAst::new(location, SynKind::Bool(true))))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(self.arenas.expr(SynAst::new(location, SynKind::Bool(false))))
            }

            TokenKind::Character(payload) => {
                let value = self.character_payload(payload)?;
                self.advance();
                Ok(self.arenas.expr(SynAst::new(location, SynKind::Char(value))))
            }

            TokenKind::Str(payload) => {
                let bytes: Vec<u8> = self.interner.resolve(payload).bytes().collect();
                self.advance();
                let elements = self.arenas.expr_list(
                    bytes
                        .into_iter()
                        .map(|b| self.arenas.expr(SynAst::new(location, SynKind::Char(b))))
                        .collect::<Vec<_>>(),
                );
                Ok(self.arenas.expr(SynAst::new(location, SynKind::Array(elements))))
            }

            other => Err(self.error_here(format!("Unexpected token {}", other.describe()))),
        }
    }

    fn unary_op(&self) -> Option<SynUnaryOp> {
        match self.kind() {
            TokenKind::Plus => Some(SynUnaryOp::Plus),
            TokenKind::Minus => Some(SynUnaryOp::Minus),
            TokenKind::Exclamation => Some(SynUnaryOp::Not),
            TokenKind::Keyword(Keyword::Not) => Some(SynUnaryOp::Not),
            _ => None,
        }
    }

    fn binary_op(&self) -> Option<SynBinaryOp> {
        match self.kind() {
            TokenKind::Plus => Some(SynBinaryOp::Add),
            TokenKind::Minus => Some(SynBinaryOp::Subtract),
            TokenKind::Star => Some(SynBinaryOp::Multiply),
            TokenKind::Slash => Some(SynBinaryOp::Divide),
            TokenKind::Less => Some(SynBinaryOp::Less),
            TokenKind::LessEqual => Some(SynBinaryOp::LessEqual),
            TokenKind::Greater => Some(SynBinaryOp::Greater),
            TokenKind::GreaterEqual => Some(SynBinaryOp::GreaterEqual),
            TokenKind::EqualEqual => Some(SynBinaryOp::Equal),
            TokenKind::NotEqual => Some(SynBinaryOp::NotEqual),
            TokenKind::ColonEqual => Some(SynBinaryOp::Assign),
            TokenKind::Keyword(Keyword::And) => Some(SynBinaryOp::And),
            TokenKind::Keyword(Keyword::Or) => Some(SynBinaryOp::Or),
            _ => None,
        }
    }

    /// Call arguments with named-argument detection; positional and named
    /// arguments must not mix.
    fn parse_call_args(&mut self) -> Result<(&'a [&'a SynAst<'a>], &'a [Ident], Location)> {
        let mut arg_names: Vec<Ident> = Vec::new();
        let mut arg_values: Vec<&'a SynAst<'a>> = Vec::new();

        while self.kind() != TokenKind::RParen {
            if matches!(self.kind(), TokenKind::Ident(_)) {
                let checkpoint = self.checkpoint();
                let id = self.parse_ident()?;

                if self.kind() == TokenKind::Equal {
                    self.advance();

                    if arg_names.len() != arg_values.len() {
                        return Err(self.error_here(
                            "Named and unnamed function arguments are not allowed to be mixed in a single call",
                        ));
                    }
                    arg_names.push(id);
                    arg_values.push(self.parse_expr()?);
                } else {
                    self.restore(checkpoint);

                    if !arg_names.is_empty() {
                        return Err(self.error_here(
                            "Named and unnamed function arguments are not allowed to be mixed in a single call",
                        ));
                    }
                    arg_values.push(self.parse_expr()?);
                }
            } else {
                if !arg_names.is_empty() {
                    return Err(self.error_here(
                        "Named and unnamed function arguments are not allowed to be mixed in a single call",
                    ));
                }
                arg_values.push(self.parse_expr()?);
            }

            match self.kind() {
                TokenKind::Comma => self.advance(),
                TokenKind::RParen => {}
                _ => return Err(self.error_here("Expected comma or closing brace")),
            }
        }

        let close = self.loc();
        self.advance();

        Ok((self.arenas.expr_list(arg_values), self.arenas.ident_list(arg_names), close))
    }

    fn parse_primary(&mut self) -> Result<&'a SynAst<'a>> {
        if let Some(op) = self.unary_op() {
            let location = self.loc();
            self.advance();
            let operand = self.parse_primary()?;
            return Ok(self
                .arenas
                .expr(SynAst::new(location.merge(operand.location), SynKind::Unary { op, operand })));
        }

        if self.is_kw(Keyword::Extern) {
            return self.parse_extern_func();
        }
        if self.is_kw(Keyword::Type) {
            return self.parse_type_definition();
        }
        if self.is_kw(Keyword::Let) {
            return self.parse_let();
        }
        if self.is_kw(Keyword::If) {
            return self.parse_if();
        }
        if self.is_kw(Keyword::For) {
            return self.parse_for();
        }
        if self.is_kw(Keyword::While) {
            return self.parse_while();
        }
        if self.is_kw(Keyword::Match) {
            return self.parse_match();
        }
        if self.is_kw(Keyword::Fun) {
            return self.parse_anonymous_func();
        }

        let column = self.loc().column;
        let mut result = self.parse_term()?;

        // Postfix forms continue the primary only while they stay to the
        // right of its column; '.' and '#' may sit at the same column.
        loop {
            let kind = self.kind();
            let at = self.loc();

            let continues = match kind {
                TokenKind::LParen | TokenKind::LBracket => at.column > column,
                TokenKind::Dot | TokenKind::Sharp => at.column >= column,
                _ => false,
            };
            if !continues {
                break;
            }

            match kind {
                TokenKind::LParen => {
                    self.advance();
                    let (args, arg_names, close) = self.parse_call_args()?;
                    result = self.arenas.expr(SynAst::new(
                        result.location.merge(close),
                        SynKind::Call { callee: result, args, arg_names },
                    ));
                }

                TokenKind::LBracket => {
                    self.advance();

                    if self.kind() == TokenKind::RBracket {
                        return Err(self.error_here("index or range is expected after '['"));
                    }

                    let index_start = if self.kind() == TokenKind::DotDot {
                        self.arenas.expr(SynAst::new(self.loc(), SynKind::Int(0)))
                    } else {
                        self.parse_expr()?
                    };

                    let mut index_end = None;
                    let mut to_end = false;

                    if self.kind() == TokenKind::DotDot {
                        self.advance();

                        if self.kind() == TokenKind::RBracket {
                            to_end = true;
                        } else {
                            index_end = Some(self.parse_expr()?);
                        }
                    }

                    let close = self.loc();
                    self.expect(TokenKind::RBracket, "']' expected after index")?;

                    let location = result.location.merge(close);
                    result = if to_end || index_end.is_some() {
                        self.arenas.expr(SynAst::new(
                            location,
                            SynKind::Slice { array: result, start: index_start, end: index_end },
                        ))
                    } else {
                        self.arenas.expr(SynAst::new(
                            location,
                            SynKind::Index { array: result, index: index_start },
                        ))
                    };
                }

                TokenKind::Dot => {
                    self.advance();

                    if !matches!(self.kind(), TokenKind::Ident(_)) {
                        return Err(self.error_here("identifier expected after '.'"));
                    }
                    let member = self.parse_ident()?;

                    result = self.arenas.expr(SynAst::new(
                        member.location,
                        SynKind::Member { aggregate: result, member },
                    ));
                }

                TokenKind::Sharp => {
                    self.advance();

                    let name = self.parse_ident()?;
                    let callee =
                        self.arenas.expr(SynAst::new(name.location, SynKind::Var(name.name)));

                    let mut args: Vec<&'a SynAst<'a>> = vec![result];
                    let mut close = name.location;

                    if self.kind() == TokenKind::LParen {
                        self.advance();

                        while self.kind() != TokenKind::RParen {
                            args.push(self.parse_expr()?);

                            match self.kind() {
                                TokenKind::Comma => self.advance(),
                                TokenKind::RParen => {}
                                _ => {
                                    return Err(
                                        self.error_here("Expected comma or closing brace")
                                    )
                                }
                            }
                        }
                        close = self.loc();
                        self.advance();
                    }

                    result = self.arenas.expr(SynAst::new(
                        name.location.merge(close),
                        SynKind::Call {
                            callee,
                            args: self.arenas.expr_list(args),
                            arg_names: &[],
                        },
                    ));
                }

                _ => unreachable!(),
            }
        }

        Ok(result)
    }

    fn parse_expr_climb(&mut self, mut left: &'a SynAst<'a>, limit: u8) -> Result<&'a SynAst<'a>> {
        let mut op = self.binary_op();

        while let Some(current) = op {
            if current.precedence() < limit {
                break;
            }
            self.advance();

            let mut right = self.parse_primary()?;

            let mut next = self.binary_op();
            while let Some(lookahead) = next {
                if lookahead.precedence() <= current.precedence() {
                    break;
                }
                right = self.parse_expr_climb(right, lookahead.precedence())?;
                next = self.binary_op();
            }

            left = self.arenas.expr(SynAst::new(
                left.location.merge(right.location),
                SynKind::Binary { op: current, left, right },
            ));

            op = self.binary_op();
        }

        Ok(left)
    }

    fn parse_expr(&mut self) -> Result<&'a SynAst<'a>> {
        let primary = self.parse_primary()?;
        self.parse_expr_climb(primary, 0)
    }

    fn parse_block(&mut self) -> Result<&'a SynAst<'a>> {
        let start = self.loc();

        let mut exprs = vec![self.parse_expr()?];

        loop {
            match self.kind() {
                TokenKind::Eof
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Comma => break,
                _ => {}
            }
            if is_lower(self.loc(), start) || is_same_line(self.loc(), start) {
                break;
            }

            exprs.push(self.parse_expr()?);
        }

        let location = exprs.iter().fold(start, |acc, e| acc.merge(e.location));
        Ok(self.arenas.expr(SynAst::new(location, SynKind::Block(self.arenas.expr_list(exprs)))))
    }
}
