//! Recursive-descent parser over the token stream.
//!
//! Two top-level entry points: a whole module (procedure declarations are
//! detected and skipped with a balanced depth counter) and a procedure
//! body. Expressions follow the classic precedence ladder, lowest first:
//! `Or`/`Xor`/`Eqv`/`Imp`, `And`, `Not`, comparisons plus `Is`/`Like`,
//! `&`, additive, `Mod`, `\`, multiplicative, `^`, unary sign, postfix
//! member/index, primary.

use crate::ast::{
    ArrayDim, BinaryOp, CaseArm, CaseCondition, ConditionPosition, DimVar, ErrorHandling,
    ExitKind, Expr, Literal, LoopConditionKind, Stmt, UnaryOp,
};
use crate::error::VbaError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Parse the statement list of a whole module. Procedure declarations,
/// `Option` directives and attribute lines are skipped.
pub fn parse_source(text: &str) -> Result<Vec<Stmt>, VbaError> {
    let tokens = Lexer::tokenize(text)?;
    Parser::new(tokens).parse_module()
}

/// Parse the statement list of a procedure body.
pub fn parse_procedure_body(text: &str) -> Result<Vec<Stmt>, VbaError> {
    let tokens = Lexer::tokenize(text)?;
    Parser::new(tokens).parse_body()
}

/// Parse a single expression.
pub fn parse_expression(text: &str) -> Result<Expr, VbaError> {
    let tokens = Lexer::tokenize(text)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    parser.skip_separators();
    if !parser.at_eof() {
        return Err(parser.error("trailing tokens after expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn error(&self, message: impl Into<String>) -> VbaError {
        let token = self.peek();
        VbaError::Syntax {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), VbaError> {
        if self.peek().is_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{word}', found '{}'", self.peek().text)))
        }
    }

    fn expect_operator(&mut self, op: &str) -> Result<(), VbaError> {
        if self.peek().is_operator(op) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}', found '{}'", self.peek().text)))
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), VbaError> {
        if self.peek().is_punct(punct) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{punct}', found '{}'", self.peek().text)))
        }
    }

    fn expect_name(&mut self) -> Result<String, VbaError> {
        let token = self.peek();
        if token.kind == TokenKind::Identifier {
            Ok(self.advance().text)
        } else {
            Err(self.error(format!("expected a name, found '{}'", token.text)))
        }
    }

    /// Statement separators: newlines and `:`.
    fn skip_separators(&mut self) {
        while self.peek().kind == TokenKind::Newline || self.peek().is_punct(":") {
            self.advance();
        }
    }

    fn skip_to_end_of_line(&mut self) {
        while self.peek().kind != TokenKind::Newline && !self.at_eof() {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) || self.peek().is_punct(":")
    }

    // ----- module / body entry points -------------------------------

    fn parse_module(&mut self) -> Result<Vec<Stmt>, VbaError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at_eof() {
                return Ok(statements);
            }
            if self.at_procedure_header() {
                self.skip_procedure()?;
                continue;
            }
            if self.at_skippable_directive() {
                self.skip_to_end_of_line();
                continue;
            }
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }
    }

    fn parse_body(&mut self) -> Result<Vec<Stmt>, VbaError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at_eof() {
                return Ok(statements);
            }
            if self.at_skippable_directive() {
                self.skip_to_end_of_line();
                continue;
            }
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }
    }

    /// `Option ...`, `Attribute ...`, `Declare ...` lines carry no
    /// statements.
    fn at_skippable_directive(&self) -> bool {
        let token = self.peek();
        token.is_keyword("option")
            || (token.kind == TokenKind::Identifier
                && (token.text.eq_ignore_ascii_case("attribute")
                    || token.text.eq_ignore_ascii_case("declare")))
    }

    fn at_procedure_header(&self) -> bool {
        let mut offset = 0;
        let token = self.peek_at(offset);
        if token.is_keyword("public") || token.is_keyword("private") || token.is_keyword("friend")
        {
            offset += 1;
        }
        if self.peek_at(offset).is_keyword("static") {
            offset += 1;
        }
        let token = self.peek_at(offset);
        token.is_keyword("sub") || token.is_keyword("function") || token.is_keyword("property")
    }

    /// Skip a whole procedure declaration using a balanced depth counter
    /// over `Sub`/`Function`/`Property` and their `End` forms.
    fn skip_procedure(&mut self) -> Result<(), VbaError> {
        let mut depth = 0usize;
        loop {
            if self.at_eof() {
                return Err(self.error("missing 'End Sub', 'End Function' or 'End Property'"));
            }
            let token = self.advance();
            if token.is_keyword("end") {
                let next = self.peek();
                if next.is_keyword("sub") || next.is_keyword("function") || next.is_keyword("property")
                {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
            } else if token.is_keyword("exit") {
                // `Exit Sub` and friends do not close the declaration.
                let next = self.peek();
                if next.is_keyword("sub") || next.is_keyword("function") || next.is_keyword("property")
                {
                    self.advance();
                }
            } else if token.is_keyword("sub")
                || token.is_keyword("function")
                || token.is_keyword("property")
            {
                depth += 1;
            }
        }
    }

    // ----- statements -----------------------------------------------

    /// Parse one statement. Returns `None` for constructs that carry no
    /// IR: labels, `Resume`/`GoTo` targets inside skipped handlers.
    fn parse_statement(&mut self) -> Result<Option<Stmt>, VbaError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Keyword => {
                let word = token.text.to_ascii_lowercase();
                match word.as_str() {
                    "dim" | "static" => {
                        self.advance();
                        Ok(Some(self.parse_dim_list()?))
                    }
                    "redim" => {
                        self.advance();
                        if self.peek().is_keyword("preserve") {
                            self.advance();
                        }
                        Ok(Some(self.parse_dim_list()?))
                    }
                    "public" | "private" => {
                        self.advance();
                        if self.peek().is_keyword("const") {
                            self.advance();
                            Ok(Some(self.parse_const()?))
                        } else {
                            Ok(Some(self.parse_dim_list()?))
                        }
                    }
                    "const" => {
                        self.advance();
                        Ok(Some(self.parse_const()?))
                    }
                    "set" => {
                        self.advance();
                        let target = self.parse_postfix_expr()?;
                        self.expect_operator("=")?;
                        let value = self.parse_expr()?;
                        Ok(Some(Stmt::SetAssign { target, value }))
                    }
                    "let" => {
                        self.advance();
                        let target = self.parse_postfix_expr()?;
                        self.expect_operator("=")?;
                        let value = self.parse_expr()?;
                        Ok(Some(Stmt::Assign { target, value }))
                    }
                    "if" => Ok(Some(self.parse_if()?)),
                    "select" => Ok(Some(self.parse_select()?)),
                    "for" => Ok(Some(self.parse_for()?)),
                    "do" => Ok(Some(self.parse_do()?)),
                    "while" => Ok(Some(self.parse_while()?)),
                    "with" => Ok(Some(self.parse_with()?)),
                    "exit" => Ok(Some(self.parse_exit()?)),
                    "on" => Ok(Some(self.parse_on_error()?)),
                    "call" => {
                        self.advance();
                        let expr = self.parse_postfix_expr()?;
                        Ok(Some(Stmt::Call(expr)))
                    }
                    "raiseevent" => {
                        self.advance();
                        let name = self.expect_name()?;
                        let args = if self.peek().is_punct("(") {
                            self.advance();
                            self.parse_paren_args()?
                        } else {
                            Vec::new()
                        };
                        Ok(Some(Stmt::RaiseEvent { name, args }))
                    }
                    "resume" | "goto" => {
                        // Reachable only inside error-handler tails; the
                        // supported subset treats them as inert.
                        self.skip_to_end_of_line();
                        Ok(None)
                    }
                    _ => Err(self.error(format!("unexpected keyword '{}'", token.text))),
                }
            }
            TokenKind::Identifier => {
                // A bare identifier directly followed by ':' is a label.
                if self.peek_at(1).is_punct(":") {
                    self.advance();
                    self.advance();
                    return Ok(None);
                }
                self.parse_assign_or_call().map(Some)
            }
            TokenKind::Punct if token.text == "." => self.parse_assign_or_call().map(Some),
            _ => Err(self.error(format!("unexpected token '{}'", token.text))),
        }
    }

    fn parse_assign_or_call(&mut self) -> Result<Stmt, VbaError> {
        let target = self.parse_postfix_expr()?;
        if self.peek().is_operator("=") {
            self.advance();
            let value = self.parse_expr()?;
            return Ok(Stmt::Assign { target, value });
        }
        if self.at_statement_end() || self.peek().is_keyword("else") || self.peek().is_keyword("then")
        {
            return Ok(Stmt::Call(target));
        }
        // Call statement with unparenthesized arguments.
        let args = self.parse_bare_args()?;
        Ok(Stmt::Call(Expr::Call {
            target: Box::new(target),
            args,
        }))
    }

    fn parse_bare_args(&mut self) -> Result<Vec<Expr>, VbaError> {
        let mut args = Vec::new();
        loop {
            if self.peek().is_punct(",") {
                args.push(Expr::Missing);
                self.advance();
                continue;
            }
            self.skip_named_argument_prefix();
            args.push(self.parse_expr()?);
            if self.peek().is_punct(",") {
                self.advance();
                continue;
            }
            return Ok(args);
        }
    }

    /// Named arguments parse but bind positionally; the name is dropped.
    fn skip_named_argument_prefix(&mut self) {
        if matches!(self.peek().kind, TokenKind::Identifier | TokenKind::Keyword)
            && self.peek_at(1).is_operator(":=")
        {
            self.advance();
            self.advance();
        }
    }

    fn parse_dim_list(&mut self) -> Result<Stmt, VbaError> {
        let mut vars = Vec::new();
        loop {
            let name = self.expect_name()?;
            let mut dims = Vec::new();
            if self.peek().is_punct("(") {
                self.advance();
                while !self.peek().is_punct(")") {
                    let first = self.parse_expr()?;
                    if self.peek().is_keyword("to") {
                        self.advance();
                        let upper = self.parse_expr()?;
                        dims.push(ArrayDim {
                            lower: Some(first),
                            upper,
                        });
                    } else {
                        dims.push(ArrayDim {
                            lower: None,
                            upper: first,
                        });
                    }
                    if self.peek().is_punct(",") {
                        self.advance();
                    }
                }
                self.expect_punct(")")?;
            }
            let type_name = self.parse_optional_as_clause()?;
            vars.push(DimVar {
                name,
                type_name,
                dims,
            });
            if self.peek().is_punct(",") {
                self.advance();
                continue;
            }
            return Ok(Stmt::Dim(vars));
        }
    }

    fn parse_optional_as_clause(&mut self) -> Result<Option<String>, VbaError> {
        if !self.peek().is_keyword("as") {
            return Ok(None);
        }
        self.advance();
        if self.peek().is_keyword("new") {
            self.advance();
        }
        let token = self.peek();
        if matches!(token.kind, TokenKind::Identifier | TokenKind::Keyword) {
            Ok(Some(self.advance().text))
        } else {
            Err(self.error("expected a type name after 'As'"))
        }
    }

    fn parse_const(&mut self) -> Result<Stmt, VbaError> {
        let name = self.expect_name()?;
        self.parse_optional_as_clause()?;
        self.expect_operator("=")?;
        let value = self.parse_expr()?;
        Ok(Stmt::Assign {
            target: Expr::Identifier(name),
            value,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("if")?;
        let condition = self.parse_expr()?;
        self.expect_keyword("then")?;

        // A newline right after `Then` selects the block form.
        if self.peek().kind == TokenKind::Newline {
            return self.parse_if_block(condition);
        }
        self.parse_if_single_line(condition)
    }

    fn parse_if_block(&mut self, condition: Expr) -> Result<Stmt, VbaError> {
        let mut branches = Vec::new();
        let body = self.parse_block(&["elseif", "else", "end"])?;
        branches.push((condition, body));

        let mut else_body = Vec::new();
        loop {
            if self.peek().is_keyword("elseif") {
                self.advance();
                let condition = self.parse_expr()?;
                self.expect_keyword("then")?;
                let body = self.parse_block(&["elseif", "else", "end"])?;
                branches.push((condition, body));
            } else if self.peek().is_keyword("else") {
                self.advance();
                else_body = self.parse_block(&["end"])?;
            } else if self.peek().is_keyword("end") {
                self.advance();
                self.expect_keyword("if")?;
                return Ok(Stmt::If {
                    branches,
                    else_body,
                });
            } else {
                return Err(self.error("expected 'ElseIf', 'Else' or 'End If'"));
            }
        }
    }

    fn parse_if_single_line(&mut self, condition: Expr) -> Result<Stmt, VbaError> {
        let mut then_body = Vec::new();
        loop {
            if let Some(statement) = self.parse_statement()? {
                then_body.push(statement);
            }
            if self.peek().is_punct(":")
                && !self.peek_at(1).is_keyword("else")
                && self.can_start_inline_statement(1)
            {
                self.advance();
                continue;
            }
            break;
        }
        let mut else_body = Vec::new();
        if self.peek().is_punct(":") && self.peek_at(1).is_keyword("else") {
            self.advance();
        }
        if self.peek().is_keyword("else") {
            self.advance();
            loop {
                if let Some(statement) = self.parse_statement()? {
                    else_body.push(statement);
                }
                if self.peek().is_punct(":") && self.can_start_inline_statement(1) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        Ok(Stmt::If {
            branches: vec![(condition, then_body)],
            else_body,
        })
    }

    /// Whether the token at `offset` can begin another inline statement.
    /// Block terminators after a `:` belong to the enclosing construct,
    /// e.g. `If i = 3 Then Exit For : Next`.
    fn can_start_inline_statement(&self, offset: usize) -> bool {
        let token = self.peek_at(offset);
        if matches!(token.kind, TokenKind::Newline | TokenKind::Eof) {
            return false;
        }
        !(token.is_keyword("next")
            || token.is_keyword("end")
            || token.is_keyword("loop")
            || token.is_keyword("wend")
            || token.is_keyword("case")
            || token.is_keyword("elseif"))
    }

    /// Parse statements until one of `terminators` starts a line. The
    /// terminator keyword is left for the caller to consume.
    fn parse_block(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, VbaError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at_eof() {
                return Err(self.error(format!("missing '{}'", terminators.join("' or '"))));
            }
            let token = self.peek();
            if token.kind == TokenKind::Keyword
                && terminators
                    .iter()
                    .any(|t| token.text.eq_ignore_ascii_case(t))
            {
                return Ok(statements);
            }
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }
    }

    fn parse_select(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("select")?;
        self.expect_keyword("case")?;
        let test = self.parse_expr()?;

        let mut cases = Vec::new();
        let mut else_body = Vec::new();
        loop {
            self.skip_separators();
            if self.peek().is_keyword("end") {
                self.advance();
                self.expect_keyword("select")?;
                return Ok(Stmt::SelectCase {
                    test,
                    cases,
                    else_body,
                });
            }
            self.expect_keyword("case")?;
            if self.peek().is_keyword("else") {
                self.advance();
                else_body = self.parse_block(&["case", "end"])?;
                continue;
            }
            let mut conditions = Vec::new();
            loop {
                conditions.push(self.parse_case_condition()?);
                if self.peek().is_punct(",") {
                    self.advance();
                    continue;
                }
                break;
            }
            let body = self.parse_block(&["case", "end"])?;
            cases.push(CaseArm { conditions, body });
        }
    }

    fn parse_case_condition(&mut self) -> Result<CaseCondition, VbaError> {
        if self.peek().is_keyword("is") {
            self.advance();
            let op = self.parse_comparison_operator()?;
            let expr = self.parse_expr()?;
            return Ok(CaseCondition::Is { op, expr });
        }
        let first = self.parse_expr()?;
        if self.peek().is_keyword("to") {
            self.advance();
            let to = self.parse_expr()?;
            return Ok(CaseCondition::Range { from: first, to });
        }
        Ok(CaseCondition::Expr(first))
    }

    fn parse_comparison_operator(&mut self) -> Result<BinaryOp, VbaError> {
        let token = self.peek().clone();
        let op = match token.text.as_str() {
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            _ => return Err(self.error("expected a comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    fn parse_for(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("for")?;
        if self.peek().is_keyword("each") {
            self.advance();
            let element = self.expect_name()?;
            self.expect_keyword("in")?;
            let collection = self.parse_expr()?;
            let body = self.parse_block(&["next"])?;
            self.expect_keyword("next")?;
            if self.peek().kind == TokenKind::Identifier {
                self.advance();
            }
            return Ok(Stmt::ForEach {
                element,
                collection,
                body,
            });
        }

        let counter = self.expect_name()?;
        self.expect_operator("=")?;
        let start = self.parse_expr()?;
        self.expect_keyword("to")?;
        let end = self.parse_expr()?;
        let step = if self.peek().is_keyword("step") {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        let body = self.parse_block(&["next"])?;
        self.expect_keyword("next")?;
        if self.peek().kind == TokenKind::Identifier {
            self.advance();
        }
        Ok(Stmt::For {
            counter,
            start,
            end,
            step,
            body,
        })
    }

    fn parse_do(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("do")?;
        let mut condition = None;
        let mut position = ConditionPosition::Pre;
        if self.peek().is_keyword("while") {
            self.advance();
            condition = Some((LoopConditionKind::While, self.parse_expr()?));
        } else if self.peek().is_keyword("until") {
            self.advance();
            condition = Some((LoopConditionKind::Until, self.parse_expr()?));
        }
        let body = self.parse_block(&["loop"])?;
        self.expect_keyword("loop")?;
        if condition.is_none() {
            if self.peek().is_keyword("while") {
                self.advance();
                condition = Some((LoopConditionKind::While, self.parse_expr()?));
                position = ConditionPosition::Post;
            } else if self.peek().is_keyword("until") {
                self.advance();
                condition = Some((LoopConditionKind::Until, self.parse_expr()?));
                position = ConditionPosition::Post;
            }
        }
        Ok(Stmt::DoLoop {
            condition,
            position,
            body,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("while")?;
        let condition = self.parse_expr()?;
        let body = self.parse_block(&["wend"])?;
        self.expect_keyword("wend")?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_with(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("with")?;
        let object = self.parse_expr()?;
        let body = self.parse_block(&["end"])?;
        self.expect_keyword("end")?;
        self.expect_keyword("with")?;
        Ok(Stmt::With { object, body })
    }

    fn parse_exit(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("exit")?;
        let token = self.advance();
        let kind = if token.is_keyword("sub") {
            ExitKind::Sub
        } else if token.is_keyword("function") {
            ExitKind::Function
        } else if token.is_keyword("property") {
            ExitKind::Property
        } else if token.is_keyword("for") {
            ExitKind::For
        } else if token.is_keyword("do") {
            ExitKind::Do
        } else {
            return Err(self.error("expected Sub, Function, Property, For or Do after 'Exit'"));
        };
        Ok(Stmt::Exit(kind))
    }

    fn parse_on_error(&mut self) -> Result<Stmt, VbaError> {
        self.expect_keyword("on")?;
        self.expect_keyword("error")?;
        if self.peek().is_keyword("resume") {
            self.advance();
            self.expect_keyword("next")?;
            return Ok(Stmt::OnError(ErrorHandling::ResumeNext));
        }
        self.expect_keyword("goto")?;
        let token = self.advance();
        match token.kind {
            TokenKind::Number if token.text == "0" => Ok(Stmt::OnError(ErrorHandling::Goto0)),
            TokenKind::Identifier => Ok(Stmt::OnError(ErrorHandling::Label(token.text))),
            _ => Err(self.error("expected 0 or a label after 'On Error GoTo'")),
        }
    }

    // ----- expressions ----------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_and_level()?;
        loop {
            let op = if self.peek().is_keyword("or") {
                BinaryOp::Or
            } else if self.peek().is_keyword("xor") {
                BinaryOp::Xor
            } else if self.peek().is_keyword("eqv") {
                BinaryOp::Eqv
            } else if self.peek().is_keyword("imp") {
                BinaryOp::Imp
            } else {
                return Ok(left);
            };
            self.advance();
            let right = self.parse_and_level()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_and_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_not_level()?;
        while self.peek().is_keyword("and") {
            self.advance();
            let right = self.parse_not_level()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not_level(&mut self) -> Result<Expr, VbaError> {
        if self.peek().is_keyword("not") {
            self.advance();
            let operand = self.parse_not_level()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison_level()
    }

    fn parse_comparison_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_concat_level()?;
        loop {
            let op = {
                let token = self.peek();
                if token.is_operator("=") {
                    BinaryOp::Eq
                } else if token.is_operator("<>") {
                    BinaryOp::Ne
                } else if token.is_operator("<") {
                    BinaryOp::Lt
                } else if token.is_operator(">") {
                    BinaryOp::Gt
                } else if token.is_operator("<=") {
                    BinaryOp::Le
                } else if token.is_operator(">=") {
                    BinaryOp::Ge
                } else if token.is_keyword("is") {
                    BinaryOp::Is
                } else if token.is_keyword("like") {
                    BinaryOp::Like
                } else {
                    return Ok(left);
                }
            };
            self.advance();
            let right = self.parse_concat_level()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_concat_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_additive_level()?;
        while self.peek().is_operator("&") {
            self.advance();
            let right = self.parse_additive_level()?;
            left = Expr::Binary {
                op: BinaryOp::Concat,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_mod_level()?;
        loop {
            let op = if self.peek().is_operator("+") {
                BinaryOp::Add
            } else if self.peek().is_operator("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            self.advance();
            let right = self.parse_mod_level()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_mod_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_int_div_level()?;
        while self.peek().is_keyword("mod") {
            self.advance();
            let right = self.parse_int_div_level()?;
            left = Expr::Binary {
                op: BinaryOp::Mod,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_int_div_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_mul_level()?;
        while self.peek().is_operator("\\") {
            self.advance();
            let right = self.parse_mul_level()?;
            left = Expr::Binary {
                op: BinaryOp::IntDiv,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_mul_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_pow_level()?;
        loop {
            let op = if self.peek().is_operator("*") {
                BinaryOp::Mul
            } else if self.peek().is_operator("/") {
                BinaryOp::Div
            } else {
                return Ok(left);
            };
            self.advance();
            let right = self.parse_pow_level()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_pow_level(&mut self) -> Result<Expr, VbaError> {
        let mut left = self.parse_unary_level()?;
        while self.peek().is_operator("^") {
            self.advance();
            let right = self.parse_unary_level()?;
            left = Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary_level(&mut self) -> Result<Expr, VbaError> {
        if self.peek().is_operator("-") {
            self.advance();
            let operand = self.parse_unary_level()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.peek().is_operator("+") {
            self.advance();
            return self.parse_unary_level();
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, VbaError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek().is_punct(".") {
                self.advance();
                let member = self.parse_member_name()?;
                expr = Expr::Member {
                    object: Some(Box::new(expr)),
                    member,
                };
            } else if self.peek().is_punct("(") {
                self.advance();
                let args = self.parse_paren_args()?;
                // Name-shaped targets are call expressions; the evaluator
                // falls back to indexing when the name holds data.
                expr = match expr {
                    Expr::Identifier(_) | Expr::Member { .. } => Expr::Call {
                        target: Box::new(expr),
                        args,
                    },
                    other => Expr::Index {
                        target: Box::new(other),
                        indexes: args,
                    },
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Member names may collide with reserved words (`.End`, `.Select`).
    fn parse_member_name(&mut self) -> Result<String, VbaError> {
        let token = self.peek();
        if matches!(token.kind, TokenKind::Identifier | TokenKind::Keyword) {
            Ok(self.advance().text)
        } else {
            Err(self.error(format!("expected a member name, found '{}'", token.text)))
        }
    }

    fn parse_paren_args(&mut self) -> Result<Vec<Expr>, VbaError> {
        let mut args = Vec::new();
        loop {
            if self.peek().is_punct(")") {
                self.advance();
                return Ok(args);
            }
            if self.peek().is_punct(",") {
                args.push(Expr::Missing);
                self.advance();
                continue;
            }
            self.skip_named_argument_prefix();
            args.push(self.parse_expr()?);
            if self.peek().is_punct(",") {
                self.advance();
                continue;
            }
            self.expect_punct(")")?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, VbaError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(parse_number_text(
                    &token.text,
                )?)))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(token.text)))
            }
            TokenKind::Date => {
                self.advance();
                Ok(Expr::Literal(Literal::Date(token.text)))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr::Identifier(token.text))
            }
            TokenKind::Keyword => {
                let word = token.text.to_ascii_lowercase();
                match word.as_str() {
                    "true" => {
                        self.advance();
                        Ok(Expr::Literal(Literal::Bool(true)))
                    }
                    "false" => {
                        self.advance();
                        Ok(Expr::Literal(Literal::Bool(false)))
                    }
                    "nothing" => {
                        self.advance();
                        Ok(Expr::Literal(Literal::Nothing))
                    }
                    "null" => {
                        self.advance();
                        Ok(Expr::Literal(Literal::Null))
                    }
                    "empty" => {
                        self.advance();
                        Ok(Expr::Literal(Literal::Empty))
                    }
                    "new" => {
                        self.advance();
                        let class = self.expect_name()?;
                        Ok(Expr::New(class))
                    }
                    "typeof" => {
                        self.advance();
                        let value = self.parse_concat_level()?;
                        self.expect_keyword("is")?;
                        let type_name = self.parse_member_name()?;
                        Ok(Expr::TypeOf {
                            value: Box::new(value),
                            type_name,
                        })
                    }
                    _ => Err(self.error(format!("unexpected keyword '{}'", token.text))),
                }
            }
            TokenKind::Punct if token.text == "(" => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::Punct if token.text == "." => {
                self.advance();
                let member = self.parse_member_name()?;
                Ok(Expr::Member {
                    object: None,
                    member,
                })
            }
            _ => Err(self.error(format!("unexpected token '{}'", token.text))),
        }
    }
}

/// Convert a number token's text (radix prefixes, exponent, optional
/// trailing type suffix) to a double.
fn parse_number_text(text: &str) -> Result<f64, VbaError> {
    let mut body = text;
    if let Some(last) = body.chars().last() {
        if matches!(last, '%' | '&' | '!' | '#' | '@' | '$') && !body.starts_with('&') {
            body = &body[..body.len() - 1];
        } else if matches!(last, '%' | '!' | '#' | '@' | '$') {
            body = &body[..body.len() - 1];
        }
    }
    let parsed = if let Some(hex) = body.strip_prefix("&H").or_else(|| body.strip_prefix("&h")) {
        i64::from_str_radix(hex, 16).ok().map(|n| n as f64)
    } else if let Some(oct) = body.strip_prefix("&O").or_else(|| body.strip_prefix("&o")) {
        i64::from_str_radix(oct, 8).ok().map(|n| n as f64)
    } else {
        body.parse::<f64>().ok()
    };
    parsed.ok_or_else(|| VbaError::Syntax {
        message: format!("malformed number literal '{text}'"),
        line: 0,
        column: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_literals_cover_radix_and_suffixes() {
        assert_eq!(parse_number_text("42").unwrap(), 42.0);
        assert_eq!(parse_number_text("1.5").unwrap(), 1.5);
        assert_eq!(parse_number_text("1.5E2").unwrap(), 150.0);
        assert_eq!(parse_number_text("&HFF").unwrap(), 255.0);
        assert_eq!(parse_number_text("&O17").unwrap(), 15.0);
        assert_eq!(parse_number_text("42%").unwrap(), 42.0);
        assert_eq!(parse_number_text("7&").unwrap(), 7.0);
    }

    #[test]
    fn precedence_puts_concat_below_additive() {
        let expr = parse_expression("\"n=\" & 1 + 2").unwrap();
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Concat);
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn comparison_binds_looser_than_arithmetic() {
        let expr = parse_expression("1 + 2 = 3").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn postfix_chains_member_and_call() {
        let expr = parse_expression("a.b(1).c").unwrap();
        let Expr::Member { object, member } = expr else {
            panic!("expected member");
        };
        assert_eq!(member, "c");
        assert!(matches!(*object.unwrap(), Expr::Call { .. }));
    }

    #[test]
    fn parse_errors_carry_positions() {
        let err = parse_expression("1 +").unwrap_err();
        let VbaError::Syntax { line, column, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 1);
        assert!(column >= 3);
    }
}
